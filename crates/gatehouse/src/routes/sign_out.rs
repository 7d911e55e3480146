// Sign-out route.
//
// Deletes the storage record under the database strategy (best effort),
// clears the session cookie unconditionally, redirects.

use std::collections::HashMap;

use crate::context::AuthContext;
use crate::cookies::CookieJar;
use crate::routes::RouteOutcome;
use crate::session;

pub async fn handle_sign_out(
    ctx: &AuthContext,
    callback_url: Option<&str>,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> RouteOutcome {
    session::destroy_session(ctx, request_cookies, jar).await;
    RouteOutcome::Redirect(ctx.resolve_redirect(callback_url))
}
