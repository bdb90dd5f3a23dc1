use base64::{engine::general_purpose::STANDARD as B64, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Single-use request nonce, shaped as a version-4 / variant-1 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(Uuid);

impl Nonce {
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_random_bytes(bytes)
    }

    /// Stamps the version and variant bits onto caller-supplied entropy.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for Nonce {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Authentication material for one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub token: String,
    pub timestamp_ms: i64,
    pub nonce: String,
    pub sign: String,
}

impl SignedRequest {
    pub fn new(token: &str, secret: &str, timestamp_ms: i64, nonce: Nonce) -> Self {
        let nonce = nonce.to_string();
        let sign = sign(token, secret, timestamp_ms, &nonce);
        Self {
            token: token.to_string(),
            timestamp_ms,
            nonce,
            sign,
        }
    }

    /// Header pairs carrying the signature, in the order the API documents.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", self.token.clone()),
            ("sign", self.sign.clone()),
            ("t", self.timestamp_ms.to_string()),
            ("nonce", self.nonce.clone()),
        ]
    }
}

/// Upper-cased base64 of HMAC-SHA256(secret, token ‖ t ‖ nonce).
pub fn sign(token: &str, secret: &str, timestamp_ms: i64, nonce: &str) -> String {
    // OK unwrap: HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(token.as_bytes());
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(nonce.as_bytes());
    let digest = mac.finalize().into_bytes();

    B64.encode(digest).to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    const NONCE: &str = "00000000-0000-4000-8000-000000000000";

    fn is_v4_shape(text: &str) -> bool {
        let bytes = text.as_bytes();
        bytes.len() == 36
            && [8, 13, 18, 23].iter().all(|&i| bytes[i] == b'-')
            && bytes[14] == b'4'
            && matches!(bytes[19], b'8' | b'9' | b'a' | b'b')
            && text
                .chars()
                .filter(|c| *c != '-')
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn matches_known_signature() {
        assert_eq!(
            sign("token", "secret", 1_700_000_000_000, NONCE),
            "OFQAWGNENC7OJCITCNCABED+GOVYK5WIXL7BUGLPLUU="
        );
    }

    #[test]
    fn is_deterministic_for_fixed_inputs() {
        let first = sign("token", "secret", 1_700_000_000_000, NONCE);
        let second = sign("token", "secret", 1_700_000_000_000, NONCE);

        assert_eq!(first, second);
        assert_eq!(first, first.to_ascii_uppercase());
    }

    #[test]
    fn every_input_changes_signature() {
        let base = sign("token", "secret", 1_700_000_000_000, NONCE);
        let variants = [
            sign("token2", "secret", 1_700_000_000_000, NONCE),
            sign("token", "secret2", 1_700_000_000_000, NONCE),
            sign("token", "secret", 1_700_000_000_001, NONCE),
            sign("token", "secret", 1_700_000_000_000, "00000000-0000-4000-8000-000000000001"),
        ];

        let mut seen = HashSet::new();
        seen.insert(base.clone());
        for variant in variants {
            assert_ne!(variant, base);
            assert!(seen.insert(variant), "signature collision");
        }
    }

    #[test]
    fn nonce_bits_are_stamped() {
        let nonce = Nonce::from_random_bytes([0xff; 16]);

        assert_eq!(nonce.to_string(), "ffffffff-ffff-4fff-bfff-ffffffffffff");
        assert_eq!(nonce.as_uuid().get_version_num(), 4);

        let zero = Nonce::from_random_bytes([0; 16]);
        assert_eq!(zero.to_string(), NONCE);
    }

    #[test]
    fn generated_nonces_are_unique_and_well_formed() {
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let nonce = Nonce::generate().to_string();
            assert!(is_v4_shape(&nonce), "malformed nonce {nonce}");
            assert!(seen.insert(nonce), "duplicate nonce");
        }
    }

    #[test]
    fn signed_request_carries_headers() {
        let request = SignedRequest::new(
            "token",
            "secret",
            1_700_000_000_000,
            Nonce::from_random_bytes([0; 16]),
        );

        assert_eq!(
            request.headers(),
            vec![
                ("Authorization", "token".to_string()),
                ("sign", "OFQAWGNENC7OJCITCNCABED+GOVYK5WIXL7BUGLPLUU=".to_string()),
                ("t", "1700000000000".to_string()),
                ("nonce", NONCE.to_string()),
            ]
        );
    }
}
