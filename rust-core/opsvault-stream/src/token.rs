// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Video Streamer - Signed access tokens
//
// A compact three-segment token: `base64url(header).base64url(payload).
// base64url(signature)`, where the signature is HMAC-SHA256 over
// `header.payload`. The payload carries the target file coordinates and a
// short expiry. Verification checks structure, then signature (with a
// constant-time comparison), then expiry — in that order, so a forged
// token learns nothing from timing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Token lifetime from issuance.
pub const TOKEN_TTL_MINUTES: i64 = 15;

/// Why a token failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not three dot-separated base64url segments, or undecodable claims.
    #[error("malformed access token")]
    Malformed,

    /// Signature does not match the header and payload.
    #[error("access token signature mismatch")]
    BadSignature,

    /// The token's expiry has passed.
    #[error("access token expired")]
    Expired,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user: String,
    pub session: String,
    pub filename: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expires-at, Unix seconds.
    pub exp: i64,
}

impl TokenClaims {
    /// Claims for a file, valid for `TOKEN_TTL_MINUTES` from `now`.
    pub fn new(user: &str, session: &str, filename: &str, now: DateTime<Utc>) -> Self {
        Self {
            user: user.to_string(),
            session: session.to_string(),
            filename: filename.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(TOKEN_TTL_MINUTES)).timestamp(),
        }
    }
}

/// Sign claims into the three-segment token form.
pub fn sign_token(secret: &[u8], claims: &TokenClaims) -> String {
    let header = base64url_encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = base64url_encode(
        serde_json::to_string(claims)
            .expect("token claims serialize")
            .as_bytes(),
    );
    let signing_input = format!("{header}.{payload}");
    let signature = base64url_encode(&hmac_sha256(secret, signing_input.as_bytes()));
    format!("{signing_input}.{signature}")
}

/// Verify a token: structure, signature (constant-time), expiry.
pub fn verify_token(
    secret: &[u8],
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed);
    }

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    let expected = hmac_sha256(secret, signing_input.as_bytes());
    let provided = base64url_decode(parts[2]).map_err(|_| TokenError::Malformed)?;
    if !constant_time_eq(&expected, &provided) {
        return Err(TokenError::BadSignature);
    }

    let payload = base64url_decode(parts[1]).map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

    if now.timestamp() >= claims.exp {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// Compute HMAC-SHA256: H((key XOR opad) || H((key XOR ipad) || message)).
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    const BLOCK_SIZE: usize = 64;
    let mut key_block = [0u8; BLOCK_SIZE];

    if key.len() > BLOCK_SIZE {
        let hashed = Sha256::digest(key);
        key_block[..hashed.len()].copy_from_slice(&hashed);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; BLOCK_SIZE];
    let mut opad = [0x5cu8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        ipad[i] ^= key_block[i];
        opad[i] ^= key_block[i];
    }

    let mut inner = Sha256::new();
    inner.update(ipad);
    inner.update(data);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner_hash);
    outer.finalize().to_vec()
}

/// Compare two byte slices without an early exit on the first differing
/// byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Base64url encode (RFC 4648, no padding).
fn base64url_encode(input: &[u8]) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    let mut result = String::with_capacity(input.len().div_ceil(3) * 4);
    let mut i = 0;
    while i < input.len() {
        let a = input[i];
        let b = if i + 1 < input.len() { input[i + 1] } else { 0 };
        let c = if i + 2 < input.len() { input[i + 2] } else { 0 };

        result.push(CHARSET[(a >> 2) as usize] as char);
        result.push(CHARSET[((a & 0x03) << 4 | b >> 4) as usize] as char);
        if i + 1 < input.len() {
            result.push(CHARSET[((b & 0x0f) << 2 | c >> 6) as usize] as char);
        }
        if i + 2 < input.len() {
            result.push(CHARSET[(c & 0x3f) as usize] as char);
        }
        i += 3;
    }
    result
}

/// Base64url decode (RFC 4648, padding optional).
fn base64url_decode(input: &str) -> Result<Vec<u8>, &'static str> {
    fn char_to_val(c: u8) -> Result<u8, &'static str> {
        match c {
            b'A'..=b'Z' => Ok(c - b'A'),
            b'a'..=b'z' => Ok(c - b'a' + 26),
            b'0'..=b'9' => Ok(c - b'0' + 52),
            b'-' => Ok(62),
            b'_' => Ok(63),
            _ => Err("invalid base64url character"),
        }
    }

    let trimmed = input.trim_end_matches('=');
    let bytes = trimmed.as_bytes();
    if bytes.len() % 4 == 1 {
        return Err("invalid base64url length");
    }

    let mut result = Vec::with_capacity(bytes.len() * 3 / 4);
    for chunk in bytes.chunks(4) {
        let a = char_to_val(chunk[0])?;
        let b = if chunk.len() > 1 { char_to_val(chunk[1])? } else { 0 };
        result.push((a << 2) | (b >> 4));
        if chunk.len() > 2 {
            let c = char_to_val(chunk[2])?;
            result.push((b << 4) | (c >> 2));
            if chunk.len() > 3 {
                let d = char_to_val(chunk[3])?;
                result.push((c << 6) | d);
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"a-test-secret-at-least-32-bytes!";

    fn claims_now() -> TokenClaims {
        TokenClaims::new("alice", "sess-1", "clip.mp4", Utc::now())
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let claims = claims_now();
        let token = sign_token(SECRET, &claims);
        let verified = verify_token(SECRET, &token, Utc::now()).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_token_has_three_segments() {
        let token = sign_token(SECRET, &claims_now());
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let token = sign_token(SECRET, &claims_now());
        let result = verify_token(b"another-secret-of-sufficient-len", &token, Utc::now());
        assert_eq!(result.unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn test_tampered_payload_is_bad_signature() {
        let token = sign_token(SECRET, &claims_now());
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        // Swap in claims for a different file, keeping the old signature.
        let forged = TokenClaims::new("alice", "sess-1", "other.mp4", Utc::now());
        parts[1] = base64url_encode(serde_json::to_string(&forged).unwrap().as_bytes());
        let forged_token = parts.join(".");

        let result = verify_token(SECRET, &forged_token, Utc::now());
        assert_eq!(result.unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn test_two_segments_is_malformed() {
        assert_eq!(
            verify_token(SECRET, "onlyone.twosegs", Utc::now()).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let issued = Utc::now() - Duration::minutes(TOKEN_TTL_MINUTES + 1);
        let claims = TokenClaims::new("alice", "sess-1", "clip.mp4", issued);
        let token = sign_token(SECRET, &claims);

        let result = verify_token(SECRET, &token, Utc::now());
        assert_eq!(result.unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let mut claims = claims_now();
        claims.exp = now.timestamp();
        let token = sign_token(SECRET, &claims);
        assert_eq!(
            verify_token(SECRET, &token, now).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 Test Case 2.
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_base64url_roundtrip() {
        for payload in [&b"hello"[..], b"", b"\xff\x00\xfe", b"four"] {
            let encoded = base64url_encode(payload);
            assert!(!encoded.contains('+') && !encoded.contains('/'));
            assert_eq!(base64url_decode(&encoded).unwrap(), payload);
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
