//! The provider capability and the context it is called with.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ipam_core::{InterfaceSpec, IpConfig, PoolKey};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// An address management backend.
///
/// Providers are selected by the resource type of the interface's pool
/// reference; see [`ProviderRegistry`](crate::ProviderRegistry). They hold no
/// per-pool state between calls.
#[async_trait]
pub trait IpamProvider: Send + Sync {
    /// Allocate an address for the interface in `ctx`.
    async fn allocate(&self, ctx: &AllocationContext) -> Result<IpConfig, ProviderError>;

    /// Return `ip_config`'s address to the interface's pool.
    async fn release(
        &self,
        ctx: &AllocationContext,
        ip_config: &IpConfig,
    ) -> Result<(), ProviderError>;

    /// Whether the provider can serve calls.
    fn ready(&self) -> bool;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// Input to an allocate or release call.
///
/// Carries the interface under interception plus the caller's cancellation
/// token and deadline. Every store round trip and every backoff pause a
/// provider makes should go through [`run`](Self::run) and
/// [`pause`](Self::pause) so a slow store cannot outlive the caller.
#[derive(Debug, Clone)]
pub struct AllocationContext {
    /// The interface being configured.
    pub interface: InterfaceSpec,
    /// Cooperative cancellation for the whole call.
    pub cancellation: CancellationToken,
    /// Point in time after which the call gives up.
    pub deadline: Option<Instant>,
}

impl AllocationContext {
    /// Context for `interface` with a fresh token and no deadline.
    pub fn new(interface: InterfaceSpec) -> Self {
        Self {
            interface,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Replace the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Give up at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Key of the referenced pool.
    pub fn pool_key(&self) -> Result<PoolKey, ProviderError> {
        self.interface
            .ipam_pool
            .as_ref()
            .map(ipam_core::PoolReference::pool_key)
            .ok_or(ProviderError::MissingPoolReference)
    }

    /// Whether the caller has already gone away.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` unless the caller cancels or the deadline passes first.
    ///
    /// A future that loses the race is dropped; nothing it would have written
    /// is written.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProviderError>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(ProviderError::Cancelled),
            () = expire(self.deadline) => Err(ProviderError::Cancelled),
            result = fut => result.map_err(Into::into),
        }
    }

    /// Sleep for `delay`, waking early with [`ProviderError::Cancelled`].
    pub async fn pause(&self, delay: Duration) -> Result<(), ProviderError> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok::<_, ProviderError>(())
        })
        .await
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_core::PoolReference;
    use ipam_ports::StoreError;

    fn ctx() -> AllocationContext {
        AllocationContext::new(InterfaceSpec::with_pool(PoolReference::new(
            "ipam.k8s.io/v1beta1",
            "IPPool",
            "ns",
            "n",
        )))
    }

    #[test]
    fn pool_key_from_reference() {
        assert_eq!(ctx().pool_key().unwrap(), PoolKey::new("ns", "n"));
    }

    #[test]
    fn pool_key_without_reference() {
        let ctx = AllocationContext::new(InterfaceSpec::default());
        assert!(matches!(
            ctx.pool_key(),
            Err(ProviderError::MissingPoolReference)
        ));
    }

    #[tokio::test]
    async fn run_passes_result_through() {
        let value = ctx().run(async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = ctx()
            .run(async { Err::<(), _>(StoreError::Internal("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Store(StoreError::Internal(_))));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let token = CancellationToken::new();
        let ctx = ctx().with_cancellation(token.clone());
        token.cancel();

        let err = ctx
            .run(std::future::pending::<Result<(), StoreError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_at_deadline() {
        let ctx = ctx().with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(std::future::pending::<Result<(), StoreError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_wakes_early_when_cancelled() {
        let token = CancellationToken::new();
        let ctx = ctx().with_cancellation(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = ctx.pause(Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(60));
        canceller.await.unwrap();
    }
}
