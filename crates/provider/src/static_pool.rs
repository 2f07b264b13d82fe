//! Allocator over a statically provisioned pool of addresses.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ipam_core::{IpConfig, IpPool};
use ipam_ports::PoolStore;

use crate::error::ProviderError;
use crate::provider::{AllocationContext, IpamProvider};
use crate::retry::RetryPolicy;

/// Hands out the first reserved address of a pool and takes released ones
/// back at the end of the reserved list.
///
/// Every call reads the pool fresh and writes it back with the version it
/// read; a version conflict means another writer got there first and the
/// whole read-modify-write is repeated under [`RetryPolicy`]. Nothing is
/// cached between calls.
pub struct StaticPoolProvider {
    store: OnceLock<Arc<dyn PoolStore>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StaticPoolProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPoolProvider")
            .field("store", &self.store.get().map(|s| s.backend()))
            .field("retry", &self.retry)
            .finish()
    }
}

impl StaticPoolProvider {
    /// Provider reading and writing pools through `store`.
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self {
            store: OnceLock::from(store),
            retry: RetryPolicy::default(),
        }
    }

    /// Provider with no store yet; not ready until [`bind_store`](Self::bind_store).
    pub fn unbound() -> Self {
        Self {
            store: OnceLock::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bind the store of an [`unbound`](Self::unbound) provider. Only the
    /// first bind succeeds.
    pub fn bind_store(&self, store: Arc<dyn PoolStore>) -> Result<(), ProviderError> {
        let backend = store.backend();
        self.store
            .set(store)
            .map_err(|_| ProviderError::AlreadyBound)?;
        tracing::info!(backend, "bound pool store");
        Ok(())
    }

    /// Active retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn store(&self) -> Result<&Arc<dyn PoolStore>, ProviderError> {
        self.store.get().ok_or(ProviderError::NotReady)
    }

    /// Fetch, mutate and conditionally write the context's pool until the
    /// write lands, `mutate` refuses, or the attempt budget runs out.
    async fn update_pool<T, F>(
        &self,
        ctx: &AllocationContext,
        operation: &'static str,
        mutate: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(&mut IpPool) -> Result<T, ProviderError> + Send + Sync,
        T: Send,
    {
        let store = self.store()?;
        let key = ctx.pool_key()?;
        let attempts = self.retry.attempts();

        for attempt in 0..attempts {
            if attempt > 0 {
                ctx.pause(self.retry.delay(attempt)).await?;
            }
            tracing::debug!(pool = %key, operation, attempt = attempt + 1, "reading pool");

            let mut pool = ctx.run(store.get(&key)).await?;
            let outcome = mutate(&mut pool)?;

            match ctx.run(store.update(&pool)).await {
                Ok(_) => return Ok(outcome),
                Err(ProviderError::Store(e)) if e.is_conflict() => {
                    tracing::warn!(
                        pool = %key,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "pool changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::AllocationConflict {
            pool: key,
            attempts,
        })
    }
}

#[async_trait]
impl IpamProvider for StaticPoolProvider {
    async fn allocate(&self, ctx: &AllocationContext) -> Result<IpConfig, ProviderError> {
        let ip_config = self
            .update_pool(ctx, "allocate", |pool| {
                let address = pool
                    .take_next_reserved()
                    .ok_or_else(|| ProviderError::NoAddressAvailable { pool: pool.key() })?;
                Ok(IpConfig::from_address(&address, &pool.dns, &pool.ntp))
            })
            .await?;

        tracing::info!(
            pool = %ctx.pool_key()?,
            ipv4 = %ip_config.ipv4,
            "allocated address"
        );
        Ok(ip_config)
    }

    async fn release(
        &self,
        ctx: &AllocationContext,
        ip_config: &IpConfig,
    ) -> Result<(), ProviderError> {
        let ipv4 = ip_config.ipv4.as_str();
        self.update_pool(ctx, "release", |pool| {
            pool.return_allocated(ipv4)
                .map(|_| ())
                .ok_or_else(|| ProviderError::BadRelease {
                    pool: pool.key(),
                    ipv4: ipv4.to_owned(),
                })
        })
        .await?;

        tracing::info!(pool = %ctx.pool_key()?, ipv4, "released address");
        Ok(())
    }

    fn ready(&self) -> bool {
        self.store.get().is_some()
    }

    fn name(&self) -> &'static str {
        "static-pool"
    }
}
