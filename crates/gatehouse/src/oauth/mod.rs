// OAuth2/OIDC plumbing for the authorization-code flow driver.

pub mod authorization_url;
pub mod client;
pub mod id_token;
pub mod tokens;

pub use authorization_url::{build_authorization_url, AuthorizationUrlParams};
pub use client::{HttpOAuthClient, OAuthHttp, ProviderMetadata, TokenRequest};
pub use tokens::TokenSet;

use gatehouse_core::error::Result;

use crate::context::AuthContext;
use crate::providers::OAuthProvider;

/// Resolve authorization server metadata for a provider: statically
/// configured endpoints win, discovery fills the gaps when an issuer is
/// configured. Runs at most one discovery request per call.
pub async fn resolve_metadata(
    ctx: &AuthContext,
    provider: &OAuthProvider,
) -> Result<ProviderMetadata> {
    let mut metadata = ProviderMetadata {
        issuer: provider.issuer.clone(),
        authorization_endpoint: provider.authorization.url.clone(),
        token_endpoint: provider.token.url.clone(),
        userinfo_endpoint: provider.userinfo.url.clone(),
    };

    let complete = metadata.authorization_endpoint.is_some()
        && metadata.token_endpoint.is_some()
        && metadata.userinfo_endpoint.is_some();

    if !complete {
        if let Some(ref issuer) = provider.issuer {
            let discovered = ctx.http.discover(issuer).await?;
            metadata.authorization_endpoint = metadata
                .authorization_endpoint
                .or(discovered.authorization_endpoint);
            metadata.token_endpoint = metadata.token_endpoint.or(discovered.token_endpoint);
            metadata.userinfo_endpoint =
                metadata.userinfo_endpoint.or(discovered.userinfo_endpoint);
            metadata.issuer = metadata.issuer.or(discovered.issuer);
        }
    }

    Ok(metadata)
}
