// Sealed token codec.
//
// Authenticated encryption of compact structured payloads: session state,
// OAuth check values, WebAuthn challenges. The key is derived per purpose
// via HKDF over (secret, salt), so a token sealed for one cookie cannot be
// replayed into another. Secrets are an ordered rotation list: encode uses
// the first entry, decode tries each until one passes integrity and
// freshness. Every failure mode decodes to `AuthError::Decode`; callers
// treat the token as absent and clean up.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use gatehouse_core::error::{AuthError, Result};

const NONCE_LEN: usize = 24;

/// Freshness tolerance for skewed clocks, in seconds.
pub const CLOCK_SKEW_TOLERANCE: i64 = 15;

/// Standard claims wrapped around every sealed payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    iat: i64,
    exp: i64,
    jti: String,
    data: T,
}

/// Derive the 32-byte purpose-bound key for `(secret, salt)`.
fn derive_key(secret: &str, salt: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret.as_bytes());
    let info = format!("Gatehouse Generated Encryption Key ({salt})");
    let mut okm = [0u8; 32];
    hk.expand(info.as_bytes(), &mut okm)
        .map_err(|e| AuthError::Crypto(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// Seal a payload into an opaque token.
///
/// Always encrypts with the first (newest) secret. `max_age` is in
/// seconds; 0 produces a token that is already expired, which is how
/// deletion values stay non-replayable even if a client resends them.
pub fn encode<T: Serialize>(
    payload: &T,
    secrets: &[String],
    salt: &str,
    max_age: i64,
) -> Result<String> {
    let secret = secrets
        .first()
        .ok_or_else(|| AuthError::Config("at least one secret must be configured".into()))?;

    let now = chrono::Utc::now().timestamp();
    let envelope = Envelope {
        iat: now,
        exp: now + max_age,
        jti: uuid::Uuid::new_v4().to_string(),
        data: payload,
    };
    let plaintext = serde_json::to_vec(&envelope)
        .map_err(|e| AuthError::Crypto(format!("payload serialization failed: {e}")))?;

    let key = derive_key(secret, salt)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| AuthError::Crypto(format!("cipher init failed: {e}")))?;

    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| AuthError::Crypto(format!("encryption failed: {e}")))?;

    let mut raw = nonce.to_vec();
    raw.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

/// Open a sealed token.
///
/// Tries each secret in rotation order. Fails closed on tampering, the
/// wrong purpose salt, expiry (with [`CLOCK_SKEW_TOLERANCE`]), and
/// tokens sealed as already-expired.
pub fn decode<T: DeserializeOwned>(token: &str, secrets: &[String], salt: &str) -> Result<T> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AuthError::Decode("token is not valid base64url".into()))?;

    if raw.len() < NONCE_LEN {
        return Err(AuthError::Decode("token too short".into()));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    for secret in secrets {
        let key = derive_key(secret, salt)?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| AuthError::Crypto(format!("cipher init failed: {e}")))?;

        let plaintext = match cipher.decrypt(nonce, ciphertext) {
            Ok(pt) => pt,
            // Wrong key or tampered ciphertext: try the next secret.
            Err(_) => continue,
        };

        let envelope: Envelope<T> = serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::Decode(format!("sealed payload is malformed: {e}")))?;

        let now = chrono::Utc::now().timestamp();
        if envelope.exp <= envelope.iat {
            return Err(AuthError::Decode("token was sealed already expired".into()));
        }
        if now > envelope.exp + CLOCK_SKEW_TOLERANCE {
            return Err(AuthError::Decode("token expired".into()));
        }
        return Ok(envelope.data);
    }

    Err(AuthError::Decode(
        "token does not match any configured secret".into(),
    ))
}
