//! The object the webhook intercepts.
//!
//! Only the fields the allocator reads or writes are typed; everything else is
//! carried in `extra` maps so that serializing a decoded object reproduces the
//! input and a structural diff touches nothing but `spec.interface.ipConfig`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::IpConfig;
use crate::reference::PoolReference;

/// A machine with one network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: MachineSpec,
    /// `apiVersion`, `kind`, `status` and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The metadata fields the webhook reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name; empty while the platform still has to generate it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Name prefix used when `name` is generated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    /// Namespace of the object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Labels, annotations, uid and the rest.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    /// A name for log lines: `name`, else `generateName*`, else `<unnamed>`.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if !self.generate_name.is_empty() {
            format!("{}*", self.generate_name)
        } else {
            "<unnamed>".to_owned()
        }
    }
}

/// Machine spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// The interface that receives an address.
    #[serde(default)]
    pub interface: InterfaceSpec,
    /// Everything else in the spec.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Network interface of a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSpec {
    /// Pool to allocate from. No pool, no allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_pool: Option<PoolReference>,
    /// Configuration already assigned to this interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_config: Option<IpConfig>,
    /// Other interface fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InterfaceSpec {
    /// Interface drawing from `pool`, with nothing assigned yet.
    pub fn with_pool(pool: PoolReference) -> Self {
        Self {
            ipam_pool: Some(pool),
            ..Self::default()
        }
    }
}
