// ID-token claim handling.
//
// The code flow receives the ID token straight from the token endpoint
// over the client-authenticated TLS channel, so claims are read without a
// JWKS signature round-trip. Claim validation (audience, expiry, nonce)
// still applies before any claim is trusted as the profile.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use gatehouse_core::error::{AuthError, Result};

use crate::crypto::sealed::CLOCK_SKEW_TOLERANCE;

/// Extract the claims object from a compact JWT.
pub fn decode_claims(id_token: &str) -> Result<serde_json::Value> {
    let mut segments = id_token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(AuthError::Provider("ID token is not a compact JWT".into())),
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::Provider("ID token payload is not base64url".into()))?;

    serde_json::from_slice(&raw)
        .map_err(|e| AuthError::Provider(format!("ID token claims are malformed: {e}")))
}

/// Validate the claims the flow relies on.
///
/// `expected_nonce` is Some only when the provider's checks include nonce;
/// a missing or mismatched claim then fails the callback.
pub fn validate_claims(
    claims: &serde_json::Value,
    client_id: &str,
    issuer: Option<&str>,
    expected_nonce: Option<&str>,
) -> Result<()> {
    let aud_matches = match &claims["aud"] {
        serde_json::Value::String(aud) => aud == client_id,
        serde_json::Value::Array(auds) => auds.iter().any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };
    if !aud_matches {
        return Err(AuthError::Provider("ID token audience mismatch".into()));
    }

    if let Some(expected_issuer) = issuer {
        let iss = claims["iss"].as_str().unwrap_or_default();
        if iss.trim_end_matches('/') != expected_issuer.trim_end_matches('/') {
            return Err(AuthError::Provider("ID token issuer mismatch".into()));
        }
    }

    if let Some(exp) = claims["exp"].as_i64() {
        if chrono::Utc::now().timestamp() > exp + CLOCK_SKEW_TOLERANCE {
            return Err(AuthError::Provider("ID token expired".into()));
        }
    }

    if let Some(expected) = expected_nonce {
        match claims["nonce"].as_str() {
            Some(nonce) if nonce == expected => {}
            _ => return Err(AuthError::InvalidCheck("nonce")),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unsigned test JWT with the given claims.
    fn make_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    fn valid_claims() -> serde_json::Value {
        serde_json::json!({
            "iss": "https://id.example.com",
            "aud": "client-1",
            "sub": "user-1",
            "exp": chrono::Utc::now().timestamp() + 300,
            "nonce": "nonce-value",
        })
    }

    #[test]
    fn test_decode_claims() {
        let token = make_token(valid_claims());
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims["sub"], "user-1");
    }

    #[test]
    fn test_decode_rejects_non_jwt() {
        assert!(decode_claims("only-one-segment").is_err());
        assert!(decode_claims("a.%%%.c").is_err());
    }

    #[test]
    fn test_validate_ok() {
        let claims = valid_claims();
        validate_claims(
            &claims,
            "client-1",
            Some("https://id.example.com"),
            Some("nonce-value"),
        )
        .unwrap();
    }

    #[test]
    fn test_validate_audience_mismatch() {
        let claims = valid_claims();
        assert!(validate_claims(&claims, "other-client", None, None).is_err());
    }

    #[test]
    fn test_validate_audience_list() {
        let mut claims = valid_claims();
        claims["aud"] = serde_json::json!(["other", "client-1"]);
        validate_claims(&claims, "client-1", None, None).unwrap();
    }

    #[test]
    fn test_validate_issuer_mismatch() {
        let claims = valid_claims();
        assert!(validate_claims(&claims, "client-1", Some("https://evil.example.com"), None).is_err());
    }

    #[test]
    fn test_validate_expired() {
        let mut claims = valid_claims();
        claims["exp"] = serde_json::json!(chrono::Utc::now().timestamp() - 120);
        assert!(validate_claims(&claims, "client-1", None, None).is_err());
    }

    #[test]
    fn test_validate_nonce_mismatch() {
        let claims = valid_claims();
        let result = validate_claims(&claims, "client-1", None, Some("other-nonce"));
        assert!(matches!(result, Err(AuthError::InvalidCheck("nonce"))));
    }

    #[test]
    fn test_nonce_not_required_when_absent() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("nonce");
        validate_claims(&claims, "client-1", None, None).unwrap();
    }
}
