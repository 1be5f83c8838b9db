//! Signed session token codec
//!
//! Compact three-segment tokens in the `header.payload.signature` shape:
//! base64url (no padding) segments, HMAC-SHA256 over `header.payload`.
//! Tokens are signed, not encrypted - never put secrets in the payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not three segments")]
    Format,

    #[error("signature mismatch")]
    Signature,

    #[error("payload is not valid JSON")]
    Payload,

    #[error("token has expired")]
    Expired,

    #[error("payload could not be serialized")]
    Serialize,
}

/// Fixed token header: algorithm identifier plus type tag
#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: "HS256",
    typ: "JWT",
};

fn mac_for(secret: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret).expect("hmac accepts any key length")
}

/// Sign a JSON payload into a compact token
pub fn sign(payload: &Value, secret: &[u8]) -> Result<String, TokenError> {
    let header_json = serde_json::to_vec(&HEADER).map_err(|_| TokenError::Serialize)?;
    let payload_json = serde_json::to_vec(payload).map_err(|_| TokenError::Serialize)?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );

    let mut mac = mac_for(secret);
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify a token and return its payload
///
/// Rejects tokens that are not exactly three segments, whose signature does
/// not recompute under `secret`, whose payload is not a JSON object, or whose
/// numeric `exp` field is at or before the current epoch second. Never panics
/// on untrusted input.
pub fn verify(token: &str, secret: &[u8]) -> Result<Map<String, Value>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Format);
    }

    let signing_input_len = segments[0].len() + 1 + segments[1].len();
    let signing_input = &token[..signing_input_len];

    let signature = URL_SAFE_NO_PAD
        .decode(segments[2])
        .map_err(|_| TokenError::Signature)?;

    let mut mac = mac_for(secret);
    mac.update(signing_input.as_bytes());
    // constant-time comparison
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::Signature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| TokenError::Payload)?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Payload)?;
    let payload = match payload {
        Value::Object(map) => map,
        _ => return Err(TokenError::Payload),
    };

    if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
        if exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"test_signing_secret";

    #[test]
    fn test_sign_verify_round_trip() {
        let payload = json!({ "sub": "U_K7NP3X", "exp": 9999999999i64 });
        let token = sign(&payload, SECRET).expect("sign failed");

        let decoded = verify(&token, SECRET).expect("verify failed");
        assert_eq!(decoded.get("sub").and_then(Value::as_str), Some("U_K7NP3X"));
        assert_eq!(
            decoded.get("exp").and_then(Value::as_i64),
            Some(9999999999i64)
        );
    }

    #[test]
    fn test_verify_fails_with_wrong_secret() {
        let payload = json!({ "sub": "U_K7NP3X", "exp": 9999999999i64 });
        let token = sign(&payload, SECRET).expect("sign failed");

        let result = verify(&token, b"some_other_secret");
        assert!(matches!(result, Err(TokenError::Signature)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let payload = json!({ "sub": "U_K7NP3X", "exp": 1000000000i64 });
        let token = sign(&payload, SECRET).expect("sign failed");

        let result = verify(&token, SECRET);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_exp_exactly_now_rejected() {
        let payload = json!({ "sub": "U_K7NP3X", "exp": Utc::now().timestamp() });
        let token = sign(&payload, SECRET).expect("sign failed");

        let result = verify(&token, SECRET);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_payload_without_exp_accepted() {
        let payload = json!({ "sub": "U_K7NP3X" });
        let token = sign(&payload, SECRET).expect("sign failed");

        assert!(verify(&token, SECRET).is_ok());
    }

    #[test]
    fn test_wrong_segment_counts_rejected() {
        for garbage in ["", "a", "a.b", "a.b.c.d", "...."] {
            let result = verify(garbage, SECRET);
            assert!(
                matches!(result, Err(TokenError::Format)),
                "{:?} should be rejected as malformed",
                garbage
            );
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = json!({ "sub": "U_K7NP3X", "exp": 9999999999i64 });
        let token = sign(&payload, SECRET).expect("sign failed");

        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({ "sub": "U_FORGED" })).unwrap());
        let segments: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", segments[0], forged_payload, segments[2]);

        assert!(matches!(verify(&forged, SECRET), Err(TokenError::Signature)));
    }

    #[test]
    fn test_garbage_segments_do_not_panic() {
        let result = verify("!!!.???.###", SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        // valid signature over a payload that is not a JSON object
        let payload_b64 = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&HEADER).unwrap());
        let signing_input = format!("{}.{}", header_b64, payload_b64);
        let mut mac = mac_for(SECRET);
        mac.update(signing_input.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        let token = format!("{}.{}", signing_input, sig);
        assert!(matches!(verify(&token, SECRET), Err(TokenError::Payload)));
    }
}
