//! Structural diff of two JSON documents as an RFC 6902 patch.
//!
//! Objects are compared member by member; anything else that differs,
//! arrays included, is replaced whole.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Add a member (or replace an existing one).
    Add {
        /// JSON Pointer to the target.
        path: String,
        /// New value.
        value: Value,
    },
    /// Remove a member.
    Remove {
        /// JSON Pointer to the target.
        path: String,
    },
    /// Replace an existing value.
    Replace {
        /// JSON Pointer to the target.
        path: String,
        /// New value.
        value: Value,
    },
}

impl PatchOperation {
    /// JSON Pointer the operation targets.
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }
}

/// Operations turning `before` into `after`. Empty when they are equal.
pub fn diff(before: &Value, after: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_value(&mut String::new(), before, after, &mut ops);
    ops
}

fn diff_value(path: &mut String, before: &Value, after: &Value, ops: &mut Vec<PatchOperation>) {
    match (before, after) {
        (Value::Object(before), Value::Object(after)) => diff_object(path, before, after, ops),
        (before, after) if before == after => {}
        (_, after) => ops.push(PatchOperation::Replace {
            path: path.clone(),
            value: after.clone(),
        }),
    }
}

fn diff_object(
    path: &mut String,
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    ops: &mut Vec<PatchOperation>,
) {
    for (key, old) in before {
        let len = path.len();
        push_token(path, key);
        match after.get(key) {
            Some(new) => diff_value(path, old, new, ops),
            None => ops.push(PatchOperation::Remove { path: path.clone() }),
        }
        path.truncate(len);
    }

    for (key, new) in after {
        if before.contains_key(key) {
            continue;
        }
        let len = path.len();
        push_token(path, key);
        ops.push(PatchOperation::Add {
            path: path.clone(),
            value: new.clone(),
        });
        path.truncate(len);
    }
}

/// Append `/token` with `~` and `/` escaped.
fn push_token(path: &mut String, token: &str) {
    path.push('/');
    for c in token.chars() {
        match c {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            c => path.push(c),
        }
    }
}
