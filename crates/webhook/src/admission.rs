//! `admission.k8s.io/v1` review types.
//!
//! Only what a mutating webhook reads and writes is modelled. The decoded
//! object payloads stay as raw JSON until the dispatcher types them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::patch::PatchOperation;

/// API version of the review envelope.
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// The envelope exchanged with the API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// Always `admission.k8s.io/v1`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Always `AdmissionReview`.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Set on the way in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Set on the way out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

fn default_api_version() -> String {
    ADMISSION_API_VERSION.to_owned()
}

fn default_kind() -> String {
    "AdmissionReview".to_owned()
}

impl AdmissionReview {
    /// Review carrying `request`.
    pub fn for_request(request: AdmissionRequest) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            request: Some(request),
            response: None,
        }
    }

    /// The reply to this review: same envelope, request dropped.
    #[must_use]
    pub fn reply(self, response: AdmissionResponse) -> Self {
        Self {
            api_version: self.api_version,
            kind: self.kind,
            request: None,
            response: Some(response),
        }
    }
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Object is being created.
    Create,
    /// Object is being updated.
    Update,
    /// Object is being deleted.
    Delete,
    /// A connect call (exec, proxy) on the object.
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
        })
    }
}

/// The intercepted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Echoed back in the response.
    pub uid: String,
    /// Operation being admitted.
    pub operation: Operation,
    /// Namespace of the request, empty for cluster-scoped objects.
    #[serde(default)]
    pub namespace: String,
    /// Object name, may be empty on create.
    #[serde(default)]
    pub name: String,
    /// The object as it will be stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    /// The stored object (update and delete).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<Value>,
    /// Nothing will be persisted.
    #[serde(default)]
    pub dry_run: bool,
}

impl AdmissionRequest {
    /// Request with no payload.
    pub fn new(uid: impl Into<String>, operation: Operation) -> Self {
        Self {
            uid: uid.into(),
            operation,
            namespace: String::new(),
            name: String::new(),
            object: None,
            old_object: None,
            dry_run: false,
        }
    }

    /// The object the dispatcher should look at.
    ///
    /// Deletes carry the object in `oldObject`; everything else in `object`.
    /// Either falls back to the other field.
    pub fn payload(&self) -> Option<&Value> {
        let (first, second) = match self.operation {
            Operation::Delete => (&self.old_object, &self.object),
            _ => (&self.object, &self.old_object),
        };
        first
            .as_ref()
            .filter(|v| !v.is_null())
            .or_else(|| second.as_ref().filter(|v| !v.is_null()))
    }
}

/// Patch encoding understood by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    /// RFC 6902.
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

/// Rejection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// HTTP-style status code.
    pub code: u16,
    /// Human readable reason shown to the client.
    pub message: String,
}

/// The webhook's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Request uid.
    pub uid: String,
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// Serialized JSON Patch; base64 on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub patch: Option<Vec<u8>>,
    /// Set whenever `patch` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
    /// Set on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl AdmissionResponse {
    /// Allow without changes.
    pub fn allowed(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            patch: None,
            patch_type: None,
            status: None,
        }
    }

    /// Reject with `code` and `message`.
    pub fn denied(uid: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: false,
            patch: None,
            patch_type: None,
            status: Some(Status {
                code,
                message: message.into(),
            }),
        }
    }

    /// Attach `operations`; an empty patch leaves the response untouched.
    pub fn with_patch(mut self, operations: &[PatchOperation]) -> Result<Self, serde_json::Error> {
        if operations.is_empty() {
            return Ok(self);
        }
        self.patch = Some(serde_json::to_vec(operations)?);
        self.patch_type = Some(PatchType::JsonPatch);
        Ok(self)
    }

    /// Decoded patch operations, empty for a no-op.
    pub fn patch_operations(&self) -> Result<Vec<PatchOperation>, serde_json::Error> {
        match &self.patch {
            Some(bytes) => serde_json::from_slice(bytes),
            None => Ok(Vec::new()),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(D::Error::custom))
            .transpose()
    }
}
