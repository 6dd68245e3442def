// SPDX-License-Identifier: EUPL-1.2

//! HMAC verification for signed mastery callbacks.
//!
//! The School Yourself server reports a learner's progress by POSTing a
//! mastery map signed with the block's shared key. The signature is a
//! lowercase hex HMAC over the user id followed by the canonical form of the
//! mastery map.
//!
//! ## Canonical message format
//!
//! ```text
//! {user_id}{topic_1}{score_1:.2}{topic_2}{score_2:.2}...
//! ```
//!
//! Topics are visited in ascending byte order and scores are always written
//! with exactly two decimals (`0.70`, never `0.7`). There are no separators.
//! Changing any of this invalidates every signature the partner has issued.
//!
//! The same key also signs the anonymous user id sent to the iframe as
//! `partner_signature` (see [`partner_signature`]).

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Topic id → mastery score. Iteration order is the signing order.
pub type MasteryMap = BTreeMap<String, f64>;

/// Hash function underneath the HMAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureHash {
    #[default]
    Sha256,
    /// Only for partners still issuing the historical HMAC-MD5 signatures.
    Md5,
}

impl SignatureHash {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureHash::Sha256 => "sha256",
            SignatureHash::Md5 => "md5",
        }
    }
}

impl std::str::FromStr for SignatureHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(SignatureHash::Sha256),
            "md5" => Ok(SignatureHash::Md5),
            other => Err(format!("unknown signature hash '{other}' (expected sha256 or md5)")),
        }
    }
}

/// Why a callback was rejected before any HMAC work was done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("mastery is missing or not a mapping")]
    MissingMastery,
    #[error("user_id is missing or empty")]
    MissingUserId,
    #[error("signature is missing or empty")]
    MissingSignature,
}

/// Outcome of [`verify`]. Every input shape ends in exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Verified(MasteryMap),
    SignatureMismatch,
    MalformedInput(MalformedReason),
}

/// Serialize a mastery map into the bytes that get signed.
pub fn canonicalize(mastery: &MasteryMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (topic, score) in mastery {
        out.extend_from_slice(topic.as_bytes());
        out.extend_from_slice(format!("{score:.2}").as_bytes());
    }
    out
}

/// Lowercase hex HMAC of `parts` concatenated, keyed with `shared_key`.
fn hmac_hex(shared_key: &str, hash: SignatureHash, parts: &[&[u8]]) -> String {
    let digest = match hash {
        SignatureHash::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(shared_key.as_bytes())
                .expect("HMAC accepts keys of any length");
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }
        SignatureHash::Md5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(shared_key.as_bytes())
                .expect("HMAC accepts keys of any length");
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }
    };
    hex::encode(digest)
}

/// Compute the signature the partner is expected to send for this callback.
pub fn sign_mastery(shared_key: &str, user_id: &str, mastery: &MasteryMap, hash: SignatureHash) -> String {
    let canonical = canonicalize(mastery);
    hmac_hex(shared_key, hash, &[user_id.as_bytes(), &canonical])
}

/// Signature over the bare user id, sent to the iframe as `partner_signature`.
pub fn partner_signature(shared_key: &str, user_id: &str, hash: SignatureHash) -> String {
    hmac_hex(shared_key, hash, &[user_id.as_bytes()])
}

/// Check that every field a callback must carry is present and non-empty.
pub fn require_fields<'a, M>(
    user_id: Option<&'a str>,
    mastery: Option<M>,
    claimed_signature: Option<&'a str>,
) -> Result<(&'a str, M, &'a str), MalformedReason> {
    let mastery = mastery.ok_or(MalformedReason::MissingMastery)?;
    let user_id = user_id
        .filter(|id| !id.is_empty())
        .ok_or(MalformedReason::MissingUserId)?;
    let claimed = claimed_signature
        .filter(|sig| !sig.is_empty())
        .ok_or(MalformedReason::MissingSignature)?;
    Ok((user_id, mastery, claimed))
}

/// Verify a signed mastery callback.
///
/// Missing or empty fields are rejected before the HMAC is computed. The
/// claimed signature is compared against the lowercase hex digest in
/// constant time.
pub fn verify(
    shared_key: &str,
    user_id: Option<&str>,
    mastery: Option<&MasteryMap>,
    claimed_signature: Option<&str>,
    hash: SignatureHash,
) -> VerificationResult {
    let (user_id, mastery, claimed) = match require_fields(user_id, mastery, claimed_signature) {
        Ok(fields) => fields,
        Err(reason) => return VerificationResult::MalformedInput(reason),
    };

    let expected = sign_mastery(shared_key, user_id, mastery, hash);

    if bool::from(expected.as_bytes().ct_eq(claimed.as_bytes())) {
        VerificationResult::Verified(mastery.clone())
    } else {
        VerificationResult::SignatureMismatch
    }
}
