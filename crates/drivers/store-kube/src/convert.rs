//! Mapping between the `IPPool` custom resource and [`IpPool`].
//!
//! Persisted layout:
//!
//! ```yaml
//! metadata: { name, namespace, resourceVersion }
//! spec:
//!   reservedAddresses: [{ ipv4, gateway, netmask }]
//!   dns: [..]
//!   ntp: ..
//! status:
//!   allocatedAddresses: [{ ipv4, gateway, netmask }]
//! ```

use ipam_core::{Address, IpPool, PoolKey, ResourceVersion};
use ipam_ports::StoreError;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolSpec {
    #[serde(default)]
    reserved_addresses: Vec<Address>,
    #[serde(default)]
    dns: Vec<String>,
    #[serde(default)]
    ntp: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolStatus {
    #[serde(default)]
    allocated_addresses: Vec<Address>,
}

/// Read an [`IpPool`] out of a fetched object.
///
/// A pool whose address lists break the disjointness invariant is reported
/// as a serialization error rather than handed to an allocator.
pub(crate) fn pool_from_object(
    key: &PoolKey,
    object: &DynamicObject,
) -> Result<IpPool, StoreError> {
    let spec: PoolSpec = section(&object.data, "spec")?;
    let status: PoolStatus = section(&object.data, "status")?;

    let pool = IpPool {
        namespace: key.namespace.clone(),
        name: key.name.clone(),
        reserved_addresses: spec.reserved_addresses,
        allocated_addresses: status.allocated_addresses,
        dns: spec.dns,
        ntp: spec.ntp,
        version: object
            .metadata
            .resource_version
            .clone()
            .map(ResourceVersion::from),
    };
    pool.validate()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(pool)
}

fn section<T>(data: &Value, field: &str) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match data.get(field) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value)
            .map_err(|e| StoreError::Serialization(format!("{field}: {e}"))),
    }
}

/// Merge patch that rewrites both address lists, guarded by the version the
/// pool was read at.
///
/// The API server rejects the patch with 409 when `resourceVersion` is stale.
/// Lists are replaced wholesale by a merge patch; `dns`, `ntp` and any other
/// field are left untouched.
pub(crate) fn conditional_patch(pool: &IpPool) -> Result<Value, StoreError> {
    let version = pool
        .version
        .as_ref()
        .ok_or_else(|| StoreError::conflict(&pool.key(), None, None))?;
    Ok(json!({
        "metadata": { "resourceVersion": version.as_str() },
        "spec": { "reservedAddresses": serde_json::to_value(&pool.reserved_addresses)? },
        "status": { "allocatedAddresses": serde_json::to_value(&pool.allocated_addresses)? },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn object(data: Value) -> DynamicObject {
        serde_json::from_value(data).unwrap()
    }

    fn key() -> PoolKey {
        PoolKey::new("ns", "rack-1")
    }

    #[test]
    fn reads_spec_status_and_version() {
        let obj = object(json!({
            "apiVersion": "ipam.k8s.io/v1beta1",
            "kind": "IPPool",
            "metadata": { "name": "rack-1", "namespace": "ns", "resourceVersion": "42" },
            "spec": {
                "reservedAddresses": [
                    { "ipv4": "1.2.3.3", "gateway": "1.2.3.1", "netmask": "255.255.255.0" }
                ],
                "dns": ["8.8.8.8"],
                "ntp": "ntp.local"
            },
            "status": {
                "allocatedAddresses": [{ "ipv4": "1.2.3.2" }]
            }
        }));

        let pool = pool_from_object(&key(), &obj).unwrap();
        assert_eq!(pool.key(), key());
        assert_eq!(pool.reserved_addresses[0].ipv4, "1.2.3.3");
        assert_eq!(pool.allocated_addresses[0].ipv4, "1.2.3.2");
        assert_eq!(pool.dns, vec!["8.8.8.8"]);
        assert_eq!(pool.ntp, "ntp.local");
        assert_eq!(pool.version, Some(ResourceVersion::from("42")));
    }

    #[test]
    fn missing_status_means_nothing_allocated() {
        let obj = object(json!({
            "apiVersion": "ipam.k8s.io/v1beta1",
            "kind": "IPPool",
            "metadata": { "name": "rack-1", "namespace": "ns", "resourceVersion": "1" },
            "spec": { "reservedAddresses": [{ "ipv4": "1.2.3.2" }] }
        }));
        let pool = pool_from_object(&key(), &obj).unwrap();
        assert!(pool.allocated_addresses.is_empty());
        assert_eq!(pool.reserved_addresses.len(), 1);
    }

    #[test]
    fn overlapping_lists_are_rejected() {
        let obj = object(json!({
            "apiVersion": "ipam.k8s.io/v1beta1",
            "kind": "IPPool",
            "metadata": { "name": "rack-1", "namespace": "ns", "resourceVersion": "1" },
            "spec": { "reservedAddresses": [{ "ipv4": "1.2.3.2" }] },
            "status": { "allocatedAddresses": [{ "ipv4": "1.2.3.2" }] }
        }));
        let err = pool_from_object(&key(), &obj).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)), "got {err:?}");
    }

    #[test]
    fn malformed_spec_is_a_serialization_error() {
        let obj = object(json!({
            "apiVersion": "ipam.k8s.io/v1beta1",
            "kind": "IPPool",
            "metadata": { "name": "rack-1", "namespace": "ns" },
            "spec": { "reservedAddresses": "not-a-list" }
        }));
        let err = pool_from_object(&key(), &obj).unwrap_err();
        match err {
            StoreError::Serialization(msg) => assert!(msg.starts_with("spec:"), "{msg}"),
            other => panic!("expected Serialization, got {other:?}"),
        }
    }

    #[test]
    fn patch_carries_version_and_both_lists() {
        let mut pool = IpPool::new("ns", "rack-1")
            .with_reserved([Address::new("1.2.3.3", "", "")])
            .with_allocated([Address::new("1.2.3.2", "", "")]);
        pool.version = Some(ResourceVersion::from("7"));

        assert_eq!(
            conditional_patch(&pool).unwrap(),
            json!({
                "metadata": { "resourceVersion": "7" },
                "spec": { "reservedAddresses": [{ "ipv4": "1.2.3.3" }] },
                "status": { "allocatedAddresses": [{ "ipv4": "1.2.3.2" }] }
            })
        );
    }

    #[test]
    fn unversioned_patch_is_refused() {
        let pool = IpPool::new("ns", "rack-1");
        assert!(conditional_patch(&pool).unwrap_err().is_conflict());
    }
}
