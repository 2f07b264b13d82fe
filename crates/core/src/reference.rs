//! References from an interface to the pool it draws addresses from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResourceTypeIdError;
use crate::pool::PoolKey;

/// Group, version and kind of a pool resource.
///
/// This is the key the provider registry is indexed by. The display form
/// mirrors the platform's own: `group/version, Kind=kind`, with the group
/// omitted for the core API group.
///
/// # Examples
///
/// ```
/// use ipam_core::ResourceTypeId;
///
/// let id = ResourceTypeId::from_api_version("ipam.k8s.io/v1beta1", "IPPool").unwrap();
/// assert_eq!(id.to_string(), "ipam.k8s.io/v1beta1, Kind=IPPool");
/// assert_eq!(id, "ipam.k8s.io/v1beta1, Kind=IPPool".parse().unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceTypeId {
    group: String,
    version: String,
    kind: String,
}

impl ResourceTypeId {
    /// Create an identifier from its parts. `group` may be empty (core group).
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Result<Self, ResourceTypeIdError> {
        let group = group.into();
        let version = version.into();
        let kind = kind.into();

        if version.is_empty() || version.contains('/') || group.contains('/') {
            return Err(ResourceTypeIdError::MalformedApiVersion(format!(
                "{group}/{version}"
            )));
        }
        if kind.is_empty() {
            return Err(ResourceTypeIdError::EmptyKind);
        }
        Ok(Self {
            group,
            version,
            kind,
        })
    }

    /// Build from an object reference's `apiVersion` (`group/version` or a
    /// bare core `version`) and `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Result<Self, ResourceTypeIdError> {
        if api_version.is_empty() {
            return Err(ResourceTypeIdError::EmptyApiVersion);
        }
        match api_version.split_once('/') {
            Some((group, version)) if !group.is_empty() && !version.is_empty() => {
                Self::new(group, version, kind)
            }
            Some(_) => Err(ResourceTypeIdError::MalformedApiVersion(
                api_version.to_owned(),
            )),
            None => Self::new("", api_version, kind),
        }
    }

    /// API group, empty for the core group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// API version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resource kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

impl FromStr for ResourceTypeId {
    type Err = ResourceTypeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (api_version, kind) = s
            .split_once(", Kind=")
            .ok_or_else(|| ResourceTypeIdError::Malformed(s.to_owned()))?;
        Self::from_api_version(api_version.trim(), kind.trim())
    }
}

impl TryFrom<String> for ResourceTypeId {
    type Error = ResourceTypeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceTypeId> for String {
    fn from(id: ResourceTypeId) -> Self {
        id.to_string()
    }
}

/// Reference to the pool an interface allocates from.
///
/// Shaped like the platform's object reference; fields other than the four
/// below are kept so the object round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolReference {
    /// `group/version` of the pool resource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Kind of the pool resource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Namespace of the pool; empty means "same as the referring object".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Name of the pool.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Remaining reference fields (`uid`, `resourceVersion`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PoolReference {
    /// Create a reference to the pool `namespace/name` of the given type.
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// The registry key for this reference.
    pub fn resource_type_id(&self) -> Result<ResourceTypeId, ResourceTypeIdError> {
        ResourceTypeId::from_api_version(&self.api_version, &self.kind)
    }

    /// The store key of the referenced pool.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.namespace.clone(), self.name.clone())
    }
}
