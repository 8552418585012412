//! HMAC-SHA256 request signing (spec §4.8 step 5 / §8.6): the receiver's
//! side of `X-AISEO-Signature` must reproduce this byte-for-byte given the
//! same secret, timestamp, and body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `sha256=<hex(HMAC_SHA256(secret, ts + "." + body))>`.
pub fn sign(secret: &str, ts: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        let secret = "whsec_test";
        let ts = "1700000000000";
        let body = r#"{"type":"flow.completed"}"#;

        let signature = sign(secret, ts, body);
        assert!(signature.starts_with("sha256="));

        // Same inputs must reproduce the identical signature byte-for-byte.
        assert_eq!(signature, sign(secret, ts, body));
    }

    #[test]
    fn differs_when_body_changes() {
        let secret = "whsec_test";
        let ts = "1700000000000";
        assert_ne!(sign(secret, ts, "a"), sign(secret, ts, "b"));
    }
}
