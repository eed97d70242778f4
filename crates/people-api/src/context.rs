//! Per-request [`RequestContext`] middleware.

use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response};
use people_core::context::RequestContext;

/// Insert a fresh [`RequestContext`] into the request's extensions; handlers
/// pick it up with `Extension<Arc<RequestContext>>`.
pub async fn attach_request_context(mut req: Request, next: Next) -> Response {
  req.extensions_mut().insert(Arc::new(RequestContext::new()));
  next.run(req).await
}
