// Session-read route.
//
// Returns the session view or `{}`; never an error body. A successful
// read refreshes the session cookie's expiry as a side effect.

use std::collections::HashMap;

use crate::context::AuthContext;
use crate::cookies::CookieJar;
use crate::session;

pub async fn handle_session(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> serde_json::Value {
    match session::get_session(ctx, request_cookies, jar).await {
        Ok(Some(view)) => serde_json::to_value(&view).unwrap_or_else(|_| serde_json::json!({})),
        Ok(None) => serde_json::json!({}),
        Err(e) => {
            ctx.logger.error(&format!("session read failed: {e}"));
            serde_json::json!({})
        }
    }
}
