//! Task-scoped trace context.
//!
//! A sync pass runs inside [`scope`] with a freshly minted
//! [`TraceParent`]; outbound requests read it through [`current`] and
//! send a child span id in their `traceparent` header.

use std::future::Future;

use acaad_api::TraceParent;

tokio::task_local! {
    static CURRENT: TraceParent;
}

/// Run `fut` with `ctx` as the current trace context.
pub async fn scope<F: Future>(ctx: TraceParent, fut: F) -> F::Output {
    CURRENT.scope(ctx, fut).await
}

/// The active trace context, if any.
pub fn current() -> Option<TraceParent> {
    CURRENT.try_with(Clone::clone).ok()
}
