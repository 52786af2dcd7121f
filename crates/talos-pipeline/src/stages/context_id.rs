//! Context ID middleware.
//!
//! Stamps every network response with the invocation's context ID, so a
//! caller can quote it when correlating with server logs. Contexts that came
//! in without a request pass through untouched.

use http::HeaderValue;
use std::sync::Arc;
use talos_core::{BoxFuture, Context, Middleware, Next};

/// The header carrying the context ID.
pub const CONTEXT_ID_HEADER: &str = "x-context-id";

/// Middleware that adds [`CONTEXT_ID_HEADER`] to the written response.
///
/// Install it outermost so the header is added after every inner layer has
/// had a chance to write the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextIdMiddleware;

impl ContextIdMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for ContextIdMiddleware {
    fn name(&self) -> &'static str {
        "context_id"
    }

    fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            next.run(Arc::clone(&ctx)).await;

            let Some(mut response) = ctx.take_response() else {
                return;
            };
            if let Ok(value) = HeaderValue::from_str(&ctx.id().to_string()) {
                response.headers_mut().insert(CONTEXT_ID_HEADER, value);
            }
            ctx.respond(response);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Response, StatusCode};
    use talos_core::Layer;

    fn writes_ok() -> Layer {
        Arc::new(|ctx: Arc<Context>| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                ctx.respond(
                    Response::builder()
                        .status(StatusCode::OK)
                        .body(Bytes::from_static(b"done"))
                        .unwrap(),
                );
            })
        })
    }

    fn request() -> http::Request<Bytes> {
        http::Request::builder()
            .uri("/orders")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(ContextIdMiddleware::new().name(), "context_id");
    }

    #[tokio::test]
    async fn test_header_added_to_response() {
        let ctx = Context::builder().request(request()).build();
        ContextIdMiddleware::new()
            .process(Arc::clone(&ctx), Next::new(writes_ok()))
            .await;

        let response = ctx.take_response().expect("response written");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTEXT_ID_HEADER].to_str().unwrap(),
            ctx.id().to_string()
        );
    }

    #[tokio::test]
    async fn test_no_response_left_alone() {
        let ctx = Context::builder().request(request()).build();
        let silent: Layer = Arc::new(|_ctx: Arc<Context>| -> BoxFuture<'static, ()> {
            Box::pin(async {})
        });
        ContextIdMiddleware::new()
            .process(Arc::clone(&ctx), Next::new(silent))
            .await;
        assert!(!ctx.has_response());
    }

    #[tokio::test]
    async fn test_internal_context_passes_through() {
        let ctx = Context::builder().build();
        ContextIdMiddleware::new()
            .process(Arc::clone(&ctx), Next::new(writes_ok()))
            .await;
        assert!(ctx.take_response().is_none());
    }
}
