//! Turns admission requests into allocator calls and JSON patches.

use std::sync::Arc;

use ipam_core::Machine;
use ipam_provider::{AllocationContext, ProviderRegistry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::admission::{AdmissionRequest, AdmissionResponse, Operation};
use crate::error::AdmissionError;
use crate::patch::{self, PatchOperation};

/// Admission handler for machines.
///
/// Allocates an address when a machine that references a pool is created or
/// updated without one, and releases it when the machine is deleted. Requests
/// it has nothing to do for are allowed with an empty patch; pool kinds no
/// provider is registered for are ignored rather than rejected.
#[derive(Debug, Clone)]
pub struct IpamAdmission {
    registry: Arc<ProviderRegistry>,
}

impl IpamAdmission {
    /// Handler dispatching to `registry`.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Registry providers are looked up in.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Decide on `request`.
    ///
    /// Allocator calls are abandoned when `cancellation` fires or `deadline`
    /// passes. Never fails: errors become rejections.
    #[tracing::instrument(
        name = "admission",
        skip_all,
        fields(uid = %request.uid, operation = %request.operation, object = tracing::field::Empty)
    )]
    pub async fn handle(
        &self,
        request: &AdmissionRequest,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> AdmissionResponse {
        let result = self
            .mutate(request, cancellation, deadline)
            .await
            .and_then(|ops| {
                AdmissionResponse::allowed(&request.uid)
                    .with_patch(&ops)
                    .map_err(AdmissionError::from)
            });

        match result {
            Ok(response) => {
                tracing::debug!(patched = response.patch.is_some(), "admitted");
                response
            }
            Err(e) => {
                let code = e.status_code();
                tracing::warn!(code, error = %e, "rejected");
                AdmissionResponse::denied(&request.uid, code, e.to_string())
            }
        }
    }

    async fn mutate(
        &self,
        request: &AdmissionRequest,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Vec<PatchOperation>, AdmissionError> {
        let payload = request
            .payload()
            .ok_or_else(|| AdmissionError::Decode("request carries no object".into()))?;
        let machine: Machine = serde_json::from_value(payload.clone())
            .map_err(|e| AdmissionError::Decode(e.to_string()))?;
        tracing::Span::current().record("object", machine.metadata.display_name().as_str());

        if request.dry_run {
            tracing::debug!("dry run, skipping allocation");
            return Ok(Vec::new());
        }

        let interface = &machine.spec.interface;
        match (request.operation, &interface.ip_config) {
            (Operation::Connect, _) => return Ok(Vec::new()),
            (Operation::Create | Operation::Update, Some(ip)) => {
                tracing::debug!(ipv4 = %ip.ipv4, "address already assigned");
                return Ok(Vec::new());
            }
            (Operation::Delete, None) => return Ok(Vec::new()),
            _ => {}
        }

        let Some(pool_ref) = &interface.ipam_pool else {
            tracing::debug!("no pool reference");
            return Ok(Vec::new());
        };
        let pool_type = match pool_ref.resource_type_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable pool reference");
                return Ok(Vec::new());
            }
        };
        let Some(provider) = self.registry.get(&pool_type) else {
            tracing::info!(%pool_type, "no provider for pool type");
            return Ok(Vec::new());
        };

        let mut scoped = interface.clone();
        if let Some(pool) = scoped.ipam_pool.as_mut().filter(|p| p.namespace.is_empty()) {
            pool.namespace = if machine.metadata.namespace.is_empty() {
                request.namespace.clone()
            } else {
                machine.metadata.namespace.clone()
            };
        }
        let mut ctx = AllocationContext::new(scoped).with_cancellation(cancellation);
        if let Some(deadline) = deadline {
            ctx = ctx.with_deadline(deadline);
        }

        match (request.operation, &interface.ip_config) {
            (Operation::Delete, Some(ip)) => {
                provider.release(&ctx, ip).await?;
                Ok(Vec::new())
            }
            _ => {
                let ip = provider.allocate(&ctx).await?;
                let mut mutated = machine.clone();
                mutated.spec.interface.ip_config = Some(ip);
                Ok(patch::diff(
                    &serde_json::to_value(&machine)?,
                    &serde_json::to_value(&mutated)?,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use ipam_core::{IpConfig, ResourceTypeId};
    use ipam_provider::{IpamProvider, ProviderError};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    /// Provider that records calls and hands out a fixed address.
    #[derive(Default)]
    struct RecordingProvider {
        allocations: AtomicU32,
        releases: AtomicU32,
        last_pool: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl IpamProvider for RecordingProvider {
        async fn allocate(&self, ctx: &AllocationContext) -> Result<IpConfig, ProviderError> {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            *self.last_pool.lock().unwrap() = Some(ctx.pool_key()?.to_string());
            Ok(IpConfig {
                ipv4: "10.0.0.2".into(),
                gateway: "10.0.0.1".into(),
                ..IpConfig::default()
            })
        }

        async fn release(
            &self,
            ctx: &AllocationContext,
            ip_config: &IpConfig,
        ) -> Result<(), ProviderError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if ip_config.ipv4 != "10.0.0.2" {
                return Err(ProviderError::BadRelease {
                    pool: ctx.pool_key()?,
                    ipv4: ip_config.ipv4.clone(),
                });
            }
            Ok(())
        }

        fn ready(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    /// Provider whose store round trip never completes on its own.
    struct StallingProvider;

    #[async_trait]
    impl IpamProvider for StallingProvider {
        async fn allocate(&self, ctx: &AllocationContext) -> Result<IpConfig, ProviderError> {
            ctx.run(std::future::pending::<Result<IpConfig, ProviderError>>())
                .await
        }

        async fn release(
            &self,
            ctx: &AllocationContext,
            _ip_config: &IpConfig,
        ) -> Result<(), ProviderError> {
            ctx.run(std::future::pending::<Result<(), ProviderError>>())
                .await
        }

        fn ready(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "stalling"
        }
    }

    fn stalling() -> IpamAdmission {
        let registry = ProviderRegistry::builder()
            .register(
                ResourceTypeId::new("ipam.k8s.io", "v1beta1", "IPPool").unwrap(),
                Arc::new(StallingProvider),
            )
            .unwrap()
            .build();
        IpamAdmission::new(Arc::new(registry))
    }

    fn setup() -> (IpamAdmission, Arc<RecordingProvider>) {
        let provider = Arc::new(RecordingProvider::default());
        let registry = ProviderRegistry::builder()
            .register(
                ResourceTypeId::new("ipam.k8s.io", "v1beta1", "IPPool").unwrap(),
                provider.clone(),
            )
            .unwrap()
            .build();
        (IpamAdmission::new(Arc::new(registry)), provider)
    }

    fn machine(interface: Value) -> Value {
        json!({
            "apiVersion": "cluster.k8s.io/v1alpha1",
            "kind": "Machine",
            "metadata": { "name": "worker-0", "namespace": "default" },
            "spec": { "interface": interface }
        })
    }

    fn pool_ref() -> Value {
        json!({ "apiVersion": "ipam.k8s.io/v1beta1", "kind": "IPPool", "name": "rack-1" })
    }

    fn request(operation: Operation, object: Value) -> AdmissionRequest {
        let mut request = AdmissionRequest::new("uid-1", operation);
        request.namespace = "default".into();
        match operation {
            Operation::Delete => request.old_object = Some(object),
            _ => request.object = Some(object),
        }
        request
    }

    async fn handle(admission: &IpamAdmission, request: &AdmissionRequest) -> AdmissionResponse {
        admission
            .handle(request, CancellationToken::new(), None)
            .await
    }

    #[tokio::test]
    async fn create_allocates_and_patches_ip_config() {
        let (admission, provider) = setup();
        let response = handle(
            &admission,
            &request(Operation::Create, machine(json!({ "ipamPool": pool_ref() }))),
        )
        .await;

        assert!(response.allowed);
        assert_eq!(
            response.patch_operations().unwrap(),
            vec![PatchOperation::Add {
                path: "/spec/interface/ipConfig".into(),
                value: json!({ "ipv4": "10.0.0.2", "gateway": "10.0.0.1" }),
            }]
        );
        assert_eq!(provider.allocations.load(Ordering::SeqCst), 1);
        // Namespace inherited from the machine.
        assert_eq!(
            provider.last_pool.lock().unwrap().as_deref(),
            Some("default/rack-1")
        );
    }

    #[tokio::test]
    async fn existing_ip_config_is_left_alone() {
        let (admission, provider) = setup();
        let object = machine(json!({
            "ipamPool": pool_ref(),
            "ipConfig": { "ipv4": "10.0.0.7" }
        }));

        for operation in [Operation::Create, Operation::Update] {
            let response = handle(&admission, &request(operation, object.clone())).await;
            assert!(response.allowed);
            assert!(response.patch.is_none());
        }
        assert_eq!(provider.allocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_releases_assigned_address() {
        let (admission, provider) = setup();
        let object = machine(json!({
            "ipamPool": pool_ref(),
            "ipConfig": { "ipv4": "10.0.0.2" }
        }));

        let response = handle(&admission, &request(Operation::Delete, object)).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(provider.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_release_is_rejected() {
        let (admission, _) = setup();
        let object = machine(json!({
            "ipamPool": pool_ref(),
            "ipConfig": { "ipv4": "9.9.9.9" }
        }));

        let response = handle(&admission, &request(Operation::Delete, object)).await;

        assert!(!response.allowed);
        let status = response.status.unwrap();
        assert_eq!(status.code, 400);
        assert!(status.message.contains("9.9.9.9"), "{}", status.message);
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let (admission, provider) = setup();
        let cases = [
            // No pool reference.
            request(Operation::Create, machine(json!({}))),
            // Unknown pool kind.
            request(
                Operation::Create,
                machine(json!({
                    "ipamPool": { "apiVersion": "other.io/v1", "kind": "Pool", "name": "p" }
                })),
            ),
            // Unparseable pool reference.
            request(Operation::Create, machine(json!({ "ipamPool": { "name": "p" } }))),
            // Delete without an address.
            request(Operation::Delete, machine(json!({ "ipamPool": pool_ref() }))),
            // Connect.
            request(Operation::Connect, machine(json!({ "ipamPool": pool_ref() }))),
        ];

        for case in &cases {
            let response = handle(&admission, case).await;
            assert!(response.allowed, "{case:?}");
            assert!(response.patch.is_none(), "{case:?}");
        }
        assert_eq!(provider.allocations.load(Ordering::SeqCst), 0);
        assert_eq!(provider.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_never_allocates() {
        let (admission, provider) = setup();
        let mut request = request(Operation::Create, machine(json!({ "ipamPool": pool_ref() })));
        request.dry_run = true;

        let response = handle(&admission, &request).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(provider.allocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_bad_request() {
        let (admission, _) = setup();

        let missing = AdmissionRequest::new("uid-1", Operation::Create);
        let response = handle(&admission, &missing).await;
        assert!(!response.allowed);
        assert_eq!(response.uid, "uid-1");
        assert_eq!(response.status.unwrap().code, 400);

        let malformed = request(Operation::Create, json!({ "spec": { "interface": "eth0" } }));
        let response = handle(&admission, &malformed).await;
        assert_eq!(response.status.unwrap().code, 400);
    }

    #[tokio::test]
    async fn pool_namespace_falls_back_to_request_namespace() {
        let (admission, provider) = setup();
        let mut object = machine(json!({ "ipamPool": pool_ref() }));
        object["metadata"].as_object_mut().unwrap().remove("namespace");
        let mut request = request(Operation::Create, object);
        request.namespace = "tenant-a".into();

        handle(&admission, &request).await;

        assert_eq!(
            provider.last_pool.lock().unwrap().as_deref(),
            Some("tenant-a/rack-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reaches_the_provider() {
        let admission = stalling();
        let started = Instant::now();
        let deadline = started + std::time::Duration::from_millis(100);

        let response = admission
            .handle(
                &request(Operation::Create, machine(json!({ "ipamPool": pool_ref() }))),
                CancellationToken::new(),
                Some(deadline),
            )
            .await;

        assert!(!response.allowed);
        let status = response.status.unwrap();
        assert_eq!(status.code, 504);
        assert_eq!(status.message, "operation cancelled");
        assert!(Instant::now() >= deadline);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_also_bounds_release() {
        let admission = stalling();
        let object = machine(json!({
            "ipamPool": pool_ref(),
            "ipConfig": { "ipv4": "10.0.0.2" }
        }));
        let deadline = Instant::now() + std::time::Duration::from_millis(100);

        let response = admission
            .handle(
                &request(Operation::Delete, object),
                CancellationToken::new(),
                Some(deadline),
            )
            .await;

        assert!(!response.allowed);
        assert_eq!(response.status.unwrap().code, 504);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_the_provider() {
        let admission = stalling();
        let token = CancellationToken::new();
        let canceller = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                token.cancel();
            }
        });

        let response = admission
            .handle(
                &request(Operation::Create, machine(json!({ "ipamPool": pool_ref() }))),
                token,
                None,
            )
            .await;

        assert!(!response.allowed);
        assert_eq!(response.status.unwrap().code, 504);
        canceller.await.unwrap();
    }
}
