//! Address pools and the identifiers the store uses for them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::PoolError;

/// `(namespace, name)` of a pool resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    /// Namespace of the pool.
    pub namespace: String,
    /// Name of the pool.
    pub name: String,
}

impl PoolKey {
    /// Create a pool key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Opaque version token issued by the pool store.
///
/// The store hands out a new token on every successful write and refuses a
/// write whose token is stale. Nothing else about the value is meaningful, so
/// tokens are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Wrap a store-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourceVersion {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for ResourceVersion {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// A pool of addresses: the free ones in `reserved_addresses`, the assigned
/// ones in `allocated_addresses`.
///
/// Reserved order is allocation priority: the first entry is handed out
/// next. Released addresses go to the back, so addresses are reused
/// first-in first-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPool {
    /// Namespace of the pool resource.
    pub namespace: String,
    /// Name of the pool resource.
    pub name: String,
    /// Free addresses, in allocation order.
    #[serde(default)]
    pub reserved_addresses: Vec<Address>,
    /// Addresses currently assigned to interfaces.
    #[serde(default)]
    pub allocated_addresses: Vec<Address>,
    /// DNS servers handed out with every address.
    #[serde(default)]
    pub dns: Vec<String>,
    /// NTP server handed out with every address.
    #[serde(default)]
    pub ntp: String,
    /// Version token of the stored copy this value was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ResourceVersion>,
}

impl IpPool {
    /// Create an empty, unversioned pool.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the reserved addresses.
    pub fn with_reserved(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.reserved_addresses = addresses.into_iter().collect();
        self
    }

    /// Set the allocated addresses.
    pub fn with_allocated(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.allocated_addresses = addresses.into_iter().collect();
        self
    }

    /// Set the DNS servers.
    pub fn with_dns(mut self, dns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dns = dns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the NTP server.
    pub fn with_ntp(mut self, ntp: impl Into<String>) -> Self {
        self.ntp = ntp.into();
        self
    }

    /// The store key of this pool.
    pub fn key(&self) -> PoolKey {
        PoolKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Number of addresses across both sequences.
    pub fn total_addresses(&self) -> usize {
        self.reserved_addresses.len() + self.allocated_addresses.len()
    }

    /// Move the first reserved address to the end of the allocated list.
    ///
    /// Returns `None` and leaves the pool untouched when nothing is reserved.
    pub fn take_next_reserved(&mut self) -> Option<Address> {
        if self.reserved_addresses.is_empty() {
            return None;
        }
        let address = self.reserved_addresses.remove(0);
        self.allocated_addresses.push(address.clone());
        Some(address)
    }

    /// Move the allocated entry for `ipv4` to the end of the reserved list.
    ///
    /// The pool's own record of the address is what gets reserved again, not
    /// whatever copy the caller holds. Returns `None` and leaves the pool
    /// untouched when `ipv4` is not allocated.
    pub fn return_allocated(&mut self, ipv4: &str) -> Option<Address> {
        let index = self
            .allocated_addresses
            .iter()
            .position(|a| a.ipv4 == ipv4)?;
        let address = self.allocated_addresses.remove(index);
        self.reserved_addresses.push(address.clone());
        Some(address)
    }

    /// Check that every address has an IPv4, appears once, and is not both
    /// reserved and allocated.
    pub fn validate(&self) -> crate::Result<()> {
        let pool = self.key().to_string();
        let reserved = unique_ipv4s(&self.reserved_addresses, "reservedAddresses", &pool)?;
        let allocated = unique_ipv4s(&self.allocated_addresses, "allocatedAddresses", &pool)?;

        if let Some(ipv4) = reserved.intersection(&allocated).min() {
            return Err(PoolError::Overlap {
                pool,
                ipv4: (*ipv4).to_owned(),
            });
        }
        Ok(())
    }
}

fn unique_ipv4s<'a>(
    addresses: &'a [Address],
    list: &'static str,
    pool: &str,
) -> crate::Result<HashSet<&'a str>> {
    let mut seen = HashSet::with_capacity(addresses.len());
    for address in addresses {
        if address.ipv4.is_empty() {
            return Err(PoolError::MissingIpv4 {
                pool: pool.to_owned(),
                list,
            });
        }
        if !seen.insert(address.ipv4.as_str()) {
            return Err(PoolError::DuplicateAddress {
                pool: pool.to_owned(),
                ipv4: address.ipv4.clone(),
                list,
            });
        }
    }
    Ok(seen)
}
