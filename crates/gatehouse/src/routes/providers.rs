// Providers listing: public metadata for building sign-in UIs.

use crate::context::AuthContext;

pub fn handle_providers(ctx: &AuthContext) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for provider in &ctx.providers {
        let id = provider.id();
        out.insert(
            id.to_string(),
            serde_json::json!({
                "id": id,
                "name": provider.name(),
                "type": provider.type_name(),
                "signinUrl": ctx.action_url(&format!("/signin/{id}")),
                "callbackUrl": ctx.provider_callback_url(id),
            }),
        );
    }
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::test_support::make_context;

    #[test]
    fn test_listing_exposes_public_metadata_only() {
        let ctx = make_context(|_| {});
        let listing = handle_providers(&ctx);

        assert_eq!(listing["acme"]["type"], "oidc");
        assert_eq!(
            listing["acme"]["callbackUrl"],
            "https://app.example.com/auth/callback/acme"
        );
        // No client secret anywhere in the listing.
        assert!(!listing.to_string().contains("acme-client-secret"));
    }
}
