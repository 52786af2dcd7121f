//! Middleware chain compilation.
//!
//! A chain is compiled once per operation, when the application is
//! assembled. The result is a single [`Chain`] callable that runs every
//! middleware in order and ends in the terminal layer:
//!
//! ```text
//! service mw 1 → … → service mw N → operation mw 1 → … → operation mw M → terminal
//! ```
//!
//! Service middleware is skipped for operations that do not inherit it.
//! The terminal layer applies the operation, hands any fault to the
//! supervisor, records the outcome on the context, calls the operation's
//! fault report, and emits invocation telemetry.

use std::sync::Arc;
use talos_core::supervisor::dispatch;
use talos_core::{
    BoxFuture, BoxedMiddleware, Context, Layer, Next, Operation, Service, SharedSupervisor,
};
use talos_telemetry::metrics::record_invocation;

/// A compiled chain: one call runs every layer and the operation.
pub type Chain = Layer;

/// Compiles the full chain for `operation` mounted in `service`.
pub fn compile_chain(
    operation: Arc<dyn Operation>,
    service: &Service,
    supervisor: SharedSupervisor,
) -> Chain {
    let layers = collect_middleware(operation.as_ref(), service);
    let terminal = terminal_layer(operation, supervisor);
    layers
        .into_iter()
        .rev()
        .fold(terminal, |inner, middleware| wrap(middleware, inner))
}

/// Middleware that will wrap `operation`, outermost first.
pub fn collect_middleware(operation: &dyn Operation, service: &Service) -> Vec<BoxedMiddleware> {
    let inherited = if operation.inherits_middleware() {
        service.middleware()
    } else {
        &[]
    };
    inherited
        .iter()
        .chain(operation.middleware())
        .cloned()
        .collect()
}

fn wrap(middleware: BoxedMiddleware, inner: Layer) -> Layer {
    Arc::new(move |ctx: Arc<Context>| -> BoxFuture<'static, ()> {
        let middleware = Arc::clone(&middleware);
        let next = Next::new(Arc::clone(&inner));
        Box::pin(async move { middleware.process(ctx, next).await })
    })
}

fn terminal_layer(operation: Arc<dyn Operation>, supervisor: SharedSupervisor) -> Layer {
    Arc::new(move |ctx: Arc<Context>| -> BoxFuture<'static, ()> {
        let operation = Arc::clone(&operation);
        let supervisor = Arc::clone(&supervisor);
        Box::pin(async move {
            let outcome = operation.apply(Arc::clone(&ctx)).await;
            let kind = outcome.kind();

            dispatch(supervisor.as_ref(), &ctx, operation.as_ref(), &outcome);
            ctx.record_outcome(kind);
            operation.on_fault(&ctx, &outcome);

            let elapsed = ctx.elapsed();
            record_invocation(operation.identify(), kind.as_str(), elapsed);
            tracing::debug!(
                operation = operation.identify(),
                outcome = %kind,
                duration_ms = elapsed.as_millis() as u64,
                "operation applied"
            );
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use talos_core::fixtures::{RecordingSupervisor, SupervisorCall, Trail};
    use talos_core::{Endpoint, OutcomeKind, ServiceError};

    fn service_with(trail: &Trail) -> Service {
        Service::builder("orders", "/orders")
            .layer(trail.marker("svc-1"))
            .layer(trail.marker("svc-2"))
            .build()
            .expect("valid service")
    }

    #[tokio::test]
    async fn test_service_middleware_wraps_operation_middleware() {
        let trail = Trail::new();
        let service = service_with(&trail);
        let endpoint: Arc<dyn Operation> = Arc::new(
            Endpoint::builder("/")
                .method(Method::GET)
                .layer(trail.marker("op-1"))
                .layer(trail.marker("op-2"))
                .with_logic(trail.logic("logic"))
                .build()
                .expect("valid endpoint"),
        );

        let chain = compile_chain(endpoint, &service, RecordingSupervisor::shared());
        let ctx = Context::builder().build();
        chain(Arc::clone(&ctx)).await;

        assert_eq!(
            trail.entries(),
            vec!["svc-1", "svc-2", "op-1", "op-2", "logic"]
        );
        assert_eq!(ctx.outcome(), Some(OutcomeKind::Success));
    }

    #[tokio::test]
    async fn test_non_inheriting_operation_skips_service_middleware() {
        let trail = Trail::new();
        let service = service_with(&trail);
        let endpoint = Endpoint::builder("/health")
            .method(Method::GET)
            .inherit(false)
            .layer(trail.marker("op-1"))
            .with_logic(trail.logic("logic"))
            .build()
            .expect("valid endpoint");

        let names: Vec<_> = collect_middleware(&endpoint, &service)
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(names, vec!["op-1"]);

        let chain = compile_chain(Arc::new(endpoint), &service, RecordingSupervisor::shared());
        chain(Context::builder().build()).await;
        assert_eq!(trail.entries(), vec!["op-1", "logic"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_terminal() {
        let trail = Trail::new();
        let service = service_with(&trail);
        let supervisor = RecordingSupervisor::shared();
        let endpoint = Endpoint::builder("/")
            .method(Method::GET)
            .layer(trail.gate("deny"))
            .layer(trail.marker("never"))
            .with_logic(trail.logic("logic"))
            .build()
            .expect("valid endpoint");

        let chain = compile_chain(Arc::new(endpoint), &service, supervisor.clone());
        let ctx = Context::builder().build();
        chain(Arc::clone(&ctx)).await;

        assert_eq!(trail.entries(), vec!["svc-1", "svc-2", "deny"]);
        assert_eq!(ctx.outcome(), None);
        assert!(supervisor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_dispatches_faults() {
        let service = Service::builder("orders", "/orders")
            .build()
            .expect("valid service");
        let supervisor = RecordingSupervisor::shared();
        let endpoint = Endpoint::builder("/")
            .method(Method::POST)
            .logic(|_ctx| async { Err(ServiceError::conflict("duplicate order")) })
            .build()
            .expect("valid endpoint");

        let chain = compile_chain(Arc::new(endpoint), &service, supervisor.clone());
        let ctx = Context::builder().build();
        chain(Arc::clone(&ctx)).await;

        assert_eq!(ctx.outcome(), Some(OutcomeKind::BusinessError));
        assert_eq!(
            supervisor.calls(),
            vec![SupervisorCall::Faulted {
                operation: "POST /".into(),
                error: "Conflict: duplicate order".into(),
            }]
        );
    }

    #[test]
    fn test_chain_survives_many_layers() {
        let trail = Trail::new();
        let mut builder = Endpoint::builder("/deep").method(Method::GET);
        for _ in 0..64 {
            builder = builder.layer(trail.marker("layer"));
        }
        let endpoint = builder
            .with_logic(trail.logic("logic"))
            .build()
            .expect("valid endpoint");
        let service = Service::builder("deep", "/").build().expect("valid service");

        let chain = compile_chain(Arc::new(endpoint), &service, RecordingSupervisor::shared());
        tokio_test::block_on(chain(Context::builder().build()));
        assert_eq!(trail.entries().len(), 65);
    }
}
