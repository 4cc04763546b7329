// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 webhook signature verification.
//!
//! The provider signs the raw request body and sends the result in a header
//! formatted `sha256=<hex>`. Verification recomputes the MAC over the exact
//! raw bytes and compares in constant time. Malformed input is always a
//! mismatch, never a panic.
//!
//! When no secret is configured, all requests are rejected (fail-closed)
//! unless the explicit unsigned-forwarding mode is enabled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix for SHA-256 HMAC signatures.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verdict for one inbound request's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature present and matching the raw body.
    Valid,
    /// No signature, accepted through the explicit unsigned-forwarding mode.
    Unsigned,
    /// Missing, malformed, or non-matching signature.
    Mismatch,
}

impl SignatureCheck {
    pub fn accepted(self) -> bool {
        matches!(self, SignatureCheck::Valid | SignatureCheck::Unsigned)
    }
}

/// Verifies webhook signatures against a shared app secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
    allow_unsigned: bool,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("allow_unsigned", &self.allow_unsigned)
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier from the configured app secret and unsigned flag.
    ///
    /// Enabling the unsigned mode is logged loudly at startup so it can
    /// never pass as a silent fallback.
    pub fn new(secret: Option<&str>, allow_unsigned: bool) -> Self {
        if allow_unsigned {
            tracing::warn!(
                "unsigned webhook mode ENABLED -- only use for trusted internal forwarding"
            );
        }
        if secret.is_none() && !allow_unsigned {
            tracing::warn!(
                "no webhook app secret configured and unsigned mode disabled -- all requests will be rejected"
            );
        }
        Self {
            secret: secret.map(|s| s.as_bytes().to_vec()),
            allow_unsigned,
        }
    }

    /// Check a request's signature header against its raw body.
    pub fn verify(&self, raw_body: &[u8], signature_header: Option<&str>) -> SignatureCheck {
        match (&self.secret, signature_header) {
            (Some(secret), Some(header)) => {
                if verify_hmac(secret, raw_body, header) {
                    SignatureCheck::Valid
                } else {
                    SignatureCheck::Mismatch
                }
            }
            // A present-but-unverifiable signature is never accepted, even
            // in unsigned mode: the caller claims an identity we cannot check.
            (None, Some(_)) => SignatureCheck::Mismatch,
            (_, None) => {
                if self.allow_unsigned {
                    tracing::warn!("accepting unsigned webhook request (internal forwarding mode)");
                    SignatureCheck::Unsigned
                } else {
                    SignatureCheck::Mismatch
                }
            }
        }
    }
}

/// Compute the signature header value for a body, `sha256=<hex>`.
///
/// Used by outbound forwarders and by the test harness.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification of `sha256=<hex>` against the raw body.
///
/// Returns false for any malformed header.
fn verify_hmac(secret: &[u8], raw_body: &[u8], header: &str) -> bool {
    let Some(hex_part) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(hex_part) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    // verify_slice is the constant-time comparison from the hmac crate.
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "wa-app-secret-1234";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Some(SECRET), false)
    }

    #[test]
    fn valid_signature_roundtrip() {
        let body = br#"{"entry":[{"id":"1"}]}"#;
        let header = sign_payload(SECRET.as_bytes(), body);
        assert_eq!(verifier().verify(body, Some(&header)), SignatureCheck::Valid);
    }

    #[test]
    fn wrong_secret_is_mismatch() {
        let body = b"payload";
        let header = sign_payload(b"some-other-secret", body);
        assert_eq!(
            verifier().verify(body, Some(&header)),
            SignatureCheck::Mismatch
        );
    }

    #[test]
    fn tampered_body_is_mismatch() {
        let header = sign_payload(SECRET.as_bytes(), b"original body");
        assert_eq!(
            verifier().verify(b"tampered body", Some(&header)),
            SignatureCheck::Mismatch
        );
    }

    #[test]
    fn malformed_headers_are_mismatch_not_panic() {
        let body = b"payload";
        for bad in [
            "",
            "sha256=",
            "sha256=zzzz-not-hex",
            "sha1=deadbeef",
            "deadbeef",
            "sha256=dead", // valid hex, wrong length
        ] {
            assert_eq!(
                verifier().verify(body, Some(bad)),
                SignatureCheck::Mismatch,
                "header {bad:?} should be a mismatch"
            );
        }
    }

    #[test]
    fn missing_header_fails_closed() {
        assert_eq!(verifier().verify(b"payload", None), SignatureCheck::Mismatch);
    }

    #[test]
    fn no_secret_fails_closed_by_default() {
        let v = SignatureVerifier::new(None, false);
        assert_eq!(v.verify(b"payload", None), SignatureCheck::Mismatch);
    }

    #[test]
    fn unsigned_mode_accepts_missing_header_only() {
        let v = SignatureVerifier::new(None, true);
        assert_eq!(v.verify(b"payload", None), SignatureCheck::Unsigned);
        // A signature we cannot verify is still rejected.
        assert_eq!(
            v.verify(b"payload", Some("sha256=deadbeef")),
            SignatureCheck::Mismatch
        );
    }

    #[test]
    fn unsigned_mode_with_secret_still_verifies_present_signatures() {
        let v = SignatureVerifier::new(Some(SECRET), true);
        let body = b"payload";
        let good = sign_payload(SECRET.as_bytes(), body);
        assert_eq!(v.verify(body, Some(&good)), SignatureCheck::Valid);
        assert_eq!(
            v.verify(body, Some("sha256=deadbeef")),
            SignatureCheck::Mismatch
        );
        assert_eq!(v.verify(body, None), SignatureCheck::Unsigned);
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", verifier());
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn sign_payload_is_hex_with_prefix() {
        let header = sign_payload(SECRET.as_bytes(), b"body");
        let hex_part = header.strip_prefix("sha256=").unwrap();
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_body_roundtrips(body in proptest::collection::vec(any::<u8>(), 0..512)) {
                let header = sign_payload(SECRET.as_bytes(), &body);
                prop_assert_eq!(
                    verifier().verify(&body, Some(&header)),
                    SignatureCheck::Valid
                );
            }

            #[test]
            fn flipped_byte_never_verifies(
                body in proptest::collection::vec(any::<u8>(), 1..512),
                idx in any::<usize>(),
            ) {
                let header = sign_payload(SECRET.as_bytes(), &body);
                let mut tampered = body.clone();
                let i = idx % tampered.len();
                tampered[i] ^= 0x01;
                prop_assert_eq!(
                    verifier().verify(&tampered, Some(&header)),
                    SignatureCheck::Mismatch
                );
            }
        }
    }
}
