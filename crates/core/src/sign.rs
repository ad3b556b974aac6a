//! Signing and verification boundary (§6.4, §1 "out of scope" collaborators).
//!
//! The Schnorr primitive and the SHA-256 primitive sit behind a trait rather
//! than being called directly; this module is that boundary, with a
//! concrete implementation on top of `secp256k1` and `sha2` — the same two
//! crates `damus-io/notedeck` (the real downstream consumer of nostrdb found
//! in the retrieval pack) uses for this exact role.

use secp256k1::{schnorr, Keypair as Secp256k1Keypair, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::{Error, Id32, Sig64};

/// Verifies a Schnorr signature over a 32-byte message (the note id) under a
/// 32-byte x-only public key. Implemented by [`Secp256k1Verifier`]; kept as a
/// trait so a caller can substitute a mock in tests or a hardware-backed
/// verifier in production without touching the ingester.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, id: &Id32, pubkey: &Id32, sig: &Sig64) -> bool;
}

/// Default verifier: BIP-340 Schnorr over secp256k1.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, id: &Id32, pubkey: &Id32, sig: &Sig64) -> bool {
        let Ok(pubkey) = XOnlyPublicKey::from_slice(pubkey) else {
            return false;
        };
        let Ok(sig) = schnorr::Signature::from_slice(sig) else {
            return false;
        };
        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(&sig, id, &pubkey).is_ok()
    }
}

/// A keypair used to sign notes at build time (see
/// [`crate::builder::NoteBuilder::finalize`]). Only used by test fixtures and
/// tools that mint their own events; the ingest/write path never signs.
pub struct Keypair {
    inner: Secp256k1Keypair,
}

impl Keypair {
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let inner = Secp256k1Keypair::from_seckey_slice(&secp, secret)
            .map_err(|_| Error::InvalidSignature)?;
        Ok(Keypair { inner })
    }

    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let inner = Secp256k1Keypair::new(&secp, &mut rand_entropy());
        Keypair { inner }
    }

    pub fn public_key_xonly(&self) -> Id32 {
        let (xonly, _parity) = self.inner.x_only_public_key();
        xonly.serialize()
    }

    pub fn sign(&self, message: &Id32) -> Sig64 {
        let secp = Secp256k1::new();
        let msg = secp256k1::Message::from_digest_slice(message).expect("32-byte message");
        let sig = secp.sign_schnorr(&msg, &self.inner);
        let mut out = [0u8; 64];
        out.copy_from_slice(sig.as_ref());
        out
    }
}

fn rand_entropy() -> impl rand::RngCore + rand::CryptoRng {
    rand::thread_rng()
}

/// SHA-256 of the canonical commitment bytes, used both to mint an id at
/// build time and to verify it at parse time (invariant 1, §8.1).
pub fn sha256(bytes: &[u8]) -> Id32 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Build the canonical commitment `[0,pubkey_hex,created_at,kind,tags,content]`
/// (§6.4) with no whitespace between tokens, tag arrays nested, and strings
/// JSON-escaped the same way the parser's unescape is applied in reverse.
pub fn canonical_commitment(
    pubkey: &Id32,
    created_at: u64,
    kind: u32,
    tags: &[Vec<Vec<u8>>],
    content: &[u8],
) -> Vec<u8> {
    let mut out = String::with_capacity(128 + content.len());
    out.push_str("[0,\"");
    out.push_str(&hex::encode(pubkey));
    out.push_str("\",");
    out.push_str(&created_at.to_string());
    out.push(',');
    out.push_str(&kind.to_string());
    out.push(',');
    out.push('[');
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        for (j, elem) in tag.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push('"');
            json_escape_into(&mut out, elem);
            out.push('"');
        }
        out.push(']');
    }
    out.push_str("],\"");
    json_escape_into(&mut out, content);
    out.push_str("\"]");
    out.into_bytes()
}

/// Minimal canonical JSON-string escaper: backslash, quote, and the named
/// control-character escapes, `\u00XX` for any other control byte, anything
/// else passed through verbatim (UTF-8 multi-byte sequences included).
fn json_escape_into(out: &mut String, bytes: &[u8]) {
    let s = String::from_utf8_lossy(bytes);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
}
