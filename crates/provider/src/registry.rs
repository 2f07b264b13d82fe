//! Provider registry for looking up allocators by pool resource type.

use std::collections::HashMap;
use std::sync::Arc;

use ipam_core::ResourceTypeId;

use crate::error::RegistryError;
use crate::provider::IpamProvider;

/// Immutable map from pool resource type to the provider serving it.
///
/// Built once at startup through [`ProviderRegistryBuilder`] and shared
/// read-only afterwards, so lookups take no locks.
///
/// # Examples
///
/// ```rust,ignore
/// use ipam_provider::{ProviderRegistry, StaticPoolProvider};
///
/// let registry = ProviderRegistry::builder()
///     .register(pool_type, Arc::new(StaticPoolProvider::new(store)))?
///     .build();
/// let provider = registry.get(&pool_type).unwrap();
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceTypeId, Arc<dyn IpamProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ProviderRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Provider registered for `id`.
    pub fn get(&self, id: &ResourceTypeId) -> Option<Arc<dyn IpamProvider>> {
        self.providers.get(id).cloned()
    }

    /// Whether a provider is registered for `id`.
    #[must_use]
    pub fn contains(&self, id: &ResourceTypeId) -> bool {
        self.providers.contains_key(id)
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// All registered resource types, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ResourceTypeId> {
        let mut keys: Vec<_> = self.providers.keys().cloned().collect();
        keys.sort_by_key(ToString::to_string);
        keys
    }

    /// Whether every registered provider reports ready.
    ///
    /// An empty registry is ready: it simply never allocates.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.providers.values().all(|p| p.ready())
    }
}

/// Collects providers before the registry is frozen.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<ResourceTypeId, Arc<dyn IpamProvider>>,
}

impl std::fmt::Debug for ProviderRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.providers.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("ProviderRegistryBuilder")
            .field("keys", &keys)
            .finish()
    }
}

impl ProviderRegistryBuilder {
    /// Register `provider` for pools of type `id`.
    ///
    /// Registering the same type twice is an error; the first provider is
    /// kept.
    pub fn register(
        mut self,
        id: ResourceTypeId,
        provider: Arc<dyn IpamProvider>,
    ) -> Result<Self, RegistryError> {
        if self.providers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        tracing::info!(pool_type = %id, provider = provider.name(), "registered ipam provider");
        self.providers.insert(id, provider);
        Ok(self)
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::AllocationContext;
    use ipam_core::IpConfig;
    use pretty_assertions::assert_eq;

    /// Minimal provider with a fixed readiness.
    struct FixedProvider {
        ready: bool,
    }

    #[async_trait::async_trait]
    impl IpamProvider for FixedProvider {
        async fn allocate(&self, _ctx: &AllocationContext) -> Result<IpConfig, ProviderError> {
            Ok(IpConfig::default())
        }

        async fn release(
            &self,
            _ctx: &AllocationContext,
            _ip_config: &IpConfig,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        fn ready(&self) -> bool {
            self.ready
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn id(kind: &str) -> ResourceTypeId {
        ResourceTypeId::new("ipam.k8s.io", "v1beta1", kind).unwrap()
    }

    fn provider(ready: bool) -> Arc<dyn IpamProvider> {
        Arc::new(FixedProvider { ready })
    }

    #[test]
    fn register_and_lookup() {
        let reg = ProviderRegistry::builder()
            .register(id("IPPool"), provider(true))
            .unwrap()
            .build();

        assert!(reg.contains(&id("IPPool")));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&id("IPPool")).unwrap().name(), "fixed");
    }

    #[test]
    fn lookup_missing_returns_none() {
        let reg = ProviderRegistry::builder().build();
        assert!(reg.get(&id("IPPool")).is_none());
    }

    #[test]
    fn lookup_is_exact_on_group_version_and_kind() {
        let reg = ProviderRegistry::builder()
            .register(id("IPPool"), provider(true))
            .unwrap()
            .build();
        let other_version = ResourceTypeId::new("ipam.k8s.io", "v1", "IPPool").unwrap();
        assert!(reg.get(&other_version).is_none());
        assert!(reg.get(&id("IPPoolClaim")).is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = ProviderRegistry::builder()
            .register(id("IPPool"), provider(true))
            .unwrap()
            .register(id("IPPool"), provider(true))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(id("IPPool")));
    }

    #[test]
    fn builder_debug_lists_registered_types() {
        let builder = ProviderRegistry::builder()
            .register(id("IPPool"), provider(true))
            .unwrap();
        assert_eq!(
            format!("{builder:?}"),
            r#"ProviderRegistryBuilder { keys: ["ipam.k8s.io/v1beta1, Kind=IPPool"] }"#
        );
    }

    #[test]
    fn keys_lists_all() {
        let reg = ProviderRegistry::builder()
            .register(id("C"), provider(true))
            .unwrap()
            .register(id("A"), provider(true))
            .unwrap()
            .register(id("B"), provider(true))
            .unwrap()
            .build();

        let kinds: Vec<_> = reg.keys().iter().map(|k| k.kind().to_owned()).collect();
        assert_eq!(kinds, vec!["A", "B", "C"]);
    }

    #[test]
    fn readiness_is_the_conjunction() {
        let empty = ProviderRegistry::builder().build();
        assert!(empty.is_empty());
        assert!(empty.all_ready());

        let mixed = ProviderRegistry::builder()
            .register(id("A"), provider(true))
            .unwrap()
            .register(id("B"), provider(false))
            .unwrap()
            .build();
        assert!(!mixed.all_ready());
    }
}
