// Route handlers, one module per action family. The router in
// `handler.rs` is a thin dispatcher over these.

pub mod callback;
pub mod providers;
pub mod session;
pub mod sign_in;
pub mod sign_out;

use gatehouse_core::ErrorPageParam;

use crate::context::AuthContext;

/// What a browser-facing route produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// 302 to the given URL.
    Redirect(String),
    /// 200 with a JSON body.
    Json(serde_json::Value),
}

/// Redirect to the error surface with a coarse error parameter.
pub fn error_redirect(ctx: &AuthContext, error: ErrorPageParam) -> RouteOutcome {
    RouteOutcome::Redirect(ctx.error_url(error))
}
