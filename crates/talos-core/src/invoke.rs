//! The bounded invoker.
//!
//! Business logic runs on its own tokio task, raced against the operation's
//! deadline. The invoker always returns promptly with an [`Outcome`]:
//!
//! - logic that returns `Ok(())` is a success
//! - logic that returns `Err(e)` is a business error carrying `e`
//! - a panic whose payload is a [`ServiceError`] is a business error too
//! - any other panic, or cancellation by the runtime, is an unexpected fault
//! - when the deadline elapses first the task is abandoned, not aborted
//!
//! An abandoned task keeps running to completion in the background. Its
//! eventual result is discarded.
//!
//! # Runtime requirements
//!
//! The deadline timer and the logic share the caller's runtime. On a
//! multi-thread runtime a deadline holds even against logic that blocks. On
//! a current-thread runtime the timer only fires while the logic is parked
//! at an `.await`, so logic that blocks or never yields runs to completion
//! and its outcome is reported as if no deadline existed. The invoker logs a
//! warning the first time it runs on a current-thread runtime.

use crate::context::Context;
use crate::error::ServiceError;
use crate::operation::Operation;
use crate::outcome::Outcome;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinError;
use tracing::Instrument;

/// Runs an operation's business logic under its deadline.
///
/// Availability is checked first. An unavailable operation never spawns.
pub async fn invoke<O>(operation: &O, ctx: Arc<Context>) -> Outcome
where
    O: Operation + ?Sized,
{
    if !operation.is_available(&ctx) {
        tracing::debug!(
            operation = operation.identify(),
            environment = ctx.environment(),
            "skipping unavailable operation"
        );
        return Outcome::Unavailable;
    }

    warn_unless_preemptive();

    let deadline = operation.deadline();
    let logic = Arc::clone(operation.logic());
    let span = ctx.span().clone();
    let handle = tokio::spawn(async move { logic(ctx).await }.instrument(span));

    match tokio::time::timeout(deadline, handle).await {
        Err(_elapsed) => {
            tracing::warn!(
                operation = operation.identify(),
                deadline_ms = deadline.as_millis() as u64,
                "deadline elapsed, abandoning business logic"
            );
            Outcome::Timeout { deadline }
        }
        Ok(Ok(Ok(()))) => Outcome::Success,
        Ok(Ok(Err(error))) => Outcome::BusinessError(error),
        Ok(Err(join_error)) => classify_join_error(join_error),
    }
}

/// Whether the current runtime can fire a deadline while logic blocks.
///
/// False outside a runtime and on a current-thread runtime.
#[must_use]
pub fn enforces_blocking_deadlines() -> bool {
    Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() != RuntimeFlavor::CurrentThread)
}

fn warn_unless_preemptive() {
    static WARNED: AtomicBool = AtomicBool::new(false);
    if !enforces_blocking_deadlines() && !WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            "current-thread runtime: deadlines only fire while business logic is awaiting"
        );
    }
}

fn classify_join_error(error: JoinError) -> Outcome {
    if error.is_panic() {
        classify_panic(error.into_panic())
    } else {
        Outcome::UnexpectedFault(ServiceError::fault(
            "business logic was cancelled before it completed",
        ))
    }
}

/// Turns a panic payload into an outcome.
///
/// A [`ServiceError`] raised with [`std::panic::panic_any`] is passed through
/// unmodified as a business error. Anything else becomes an unexpected fault
/// whose description carries the panic message when there is one.
pub fn classify_panic(payload: Box<dyn Any + Send>) -> Outcome {
    match payload.downcast::<ServiceError>() {
        Ok(error) => Outcome::BusinessError(*error),
        Err(payload) => Outcome::UnexpectedFault(ServiceError::fault(describe_panic(&*payload))),
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        String::from("panic with a non-string payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::fixtures;
    use crate::operation::{Aux, Endpoint};
    use crate::outcome::OutcomeKind;
    use std::time::{Duration, Instant};

    fn explode(message: String) -> crate::OperationResult {
        std::panic::panic_any(message)
    }

    fn aux_with(deadline: Duration, logic: crate::Logic) -> Aux {
        Aux::builder("reindex")
            .deadline(deadline)
            .with_logic(logic)
            .build()
            .expect("valid aux")
    }

    #[tokio::test]
    async fn test_success() {
        let aux = aux_with(Duration::from_secs(1), fixtures::succeed());
        let outcome = invoke(&aux, Context::builder().build()).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_business_error_passed_through() {
        let aux = aux_with(
            Duration::from_secs(1),
            fixtures::fail_with(|| ServiceError::validation("bad input")),
        );
        match invoke(&aux, Context::builder().build()).await {
            Outcome::BusinessError(error) => {
                assert_eq!(error.category(), ErrorCategory::Validation);
                assert_eq!(error.to_string(), "Validation error: bad input");
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_error_panic_is_business_error() {
        let aux = aux_with(
            Duration::from_secs(1),
            fixtures::raise(|| ServiceError::conflict("raised")),
        );
        match invoke(&aux, Context::builder().build()).await {
            Outcome::BusinessError(ServiceError::Conflict { message }) => {
                assert_eq!(message, "raised");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_string_panic_is_unexpected_fault() {
        let aux = aux_with(Duration::from_secs(1), fixtures::panic_with("boom"));
        match invoke(&aux, Context::builder().build()).await {
            Outcome::UnexpectedFault(error) => {
                assert_eq!(error.category(), ErrorCategory::Fault);
                assert!(error.to_string().contains("boom"));
            }
            other => panic!("expected unexpected fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_formatted_panic_message_kept() {
        let aux = aux_with(
            Duration::from_secs(1),
            crate::logic(|_ctx| async { explode(format!("attempt {} failed", 3)) }),
        );
        let outcome = invoke(&aux, Context::builder().build()).await;
        let error = outcome.error().expect("fault carries an error");
        assert!(error.to_string().contains("attempt 3 failed"));
    }

    #[test]
    fn test_non_string_payload() {
        let outcome = classify_panic(Box::new(42_u32));
        assert_eq!(outcome.kind(), OutcomeKind::UnexpectedFault);
        assert!(outcome
            .error()
            .is_some_and(|e| e.to_string().contains("non-string payload")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses_first() {
        let aux = aux_with(
            Duration::from_millis(10),
            fixtures::sleep_then_store(Duration::from_millis(50), "result", "ok"),
        );
        let outcome = invoke(&aux, Context::builder().build()).await;
        assert!(matches!(
            outcome,
            Outcome::Timeout { deadline } if deadline == Duration::from_millis(10)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logic_finishing_inside_deadline() {
        let aux = aux_with(
            Duration::from_millis(50),
            fixtures::sleep_then_store(Duration::from_millis(10), "result", "ok"),
        );
        let ctx = Context::builder().build();
        let outcome = invoke(&aux, Arc::clone(&ctx)).await;
        assert!(outcome.is_success());
        assert_eq!(
            ctx.storage().get::<&'static str>("result").copied(),
            Some("ok")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_logic_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let aux = aux_with(
            Duration::from_millis(10),
            crate::logic(move |_ctx| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let outcome = invoke(&aux, Context::builder().build()).await;
        assert_eq!(outcome.kind(), OutcomeKind::Timeout);
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unavailable_never_spawns() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let endpoint = Endpoint::builder("/dev-only")
            .method(http::Method::GET)
            .available_in("development")
            .logic(move |_ctx| {
                flag.store(true, Ordering::SeqCst);
                async { Ok(()) }
            })
            .build()
            .expect("valid endpoint");

        let ctx = Context::builder().environment("production").build();
        let outcome = invoke(&endpoint, ctx).await;
        assert_eq!(outcome.kind(), OutcomeKind::Unavailable);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_current_thread_runtime_cannot_preempt() {
        assert!(!enforces_blocking_deadlines());
    }

    #[test]
    fn test_no_runtime_cannot_preempt() {
        assert!(!enforces_blocking_deadlines());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_logic_times_out_on_multi_thread_runtime() {
        assert!(enforces_blocking_deadlines());
        let aux = aux_with(
            Duration::from_millis(10),
            crate::logic(|_ctx| async {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            }),
        );

        let started = Instant::now();
        let outcome = invoke(&aux, Context::builder().build()).await;
        assert_eq!(outcome.kind(), OutcomeKind::Timeout);
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
