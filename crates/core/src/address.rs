//! Addresses held by a pool and the configuration handed to an interface.

use serde::{Deserialize, Serialize};

/// One IPv4 address entry of a pool, with the routing data that goes with it.
///
/// Entries are compared and searched by [`ipv4`](Self::ipv4) only; gateway and
/// netmask travel along unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// The address itself, dotted quad.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    /// Default gateway for the address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    /// Netmask, dotted quad.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub netmask: String,
}

impl Address {
    /// Create an address entry.
    pub fn new(
        ipv4: impl Into<String>,
        gateway: impl Into<String>,
        netmask: impl Into<String>,
    ) -> Self {
        Self {
            ipv4: ipv4.into(),
            gateway: gateway.into(),
            netmask: netmask.into(),
        }
    }
}

/// The network configuration assigned to an interface.
///
/// Built from one pool [`Address`] plus the pool's `dns` and `ntp` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfig {
    /// Assigned address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    /// Default gateway.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    /// Netmask.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub netmask: String,
    /// DNS servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    /// NTP server.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ntp: String,
}

impl IpConfig {
    /// Derive the interface configuration for `address` from a pool's settings.
    pub fn from_address(address: &Address, dns: &[String], ntp: &str) -> Self {
        Self {
            ipv4: address.ipv4.clone(),
            gateway: address.gateway.clone(),
            netmask: address.netmask.clone(),
            dns: dns.to_vec(),
            ntp: ntp.to_owned(),
        }
    }

    /// The pool entry this configuration was derived from.
    pub fn address(&self) -> Address {
        Address {
            ipv4: self.ipv4.clone(),
            gateway: self.gateway.clone(),
            netmask: self.netmask.clone(),
        }
    }
}
