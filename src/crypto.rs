//! Cryptographic primitives: content hashing and detached
//! Ed25519 signatures, both bound to hex-encoded digests so every record
//! field in this crate is a plain hex string on the wire.
//!
//! Every operation here is pure: no I/O, no global state, safe to call
//! from any number of threads concurrently.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

use crate::error::{Error, Result};

/// Compute the 256-bit BLAKE3 digest of `data`, hex-encoded.
///
/// This is the sole hash function used for content addressing and as the
/// signing target throughout the protocol.
pub fn hash(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

/// Generate a new Ed25519 key pair, returning `(private_key_hex,
/// public_key_hex)`. An agent's public key doubles as its agent ID.
pub fn generate_keypair() -> (String, String) {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (
        hex::encode(signing_key.to_bytes()),
        hex::encode(verifying_key.to_bytes()),
    )
}

/// Sign a hex-encoded digest with a hex-encoded Ed25519 private key,
/// returning the hex-encoded detached signature.
///
/// Signs the *raw bytes* decoded from `digest_hex`, never the hex string
/// itself.
pub fn sign(digest_hex: &str, private_key_hex: &str) -> Result<String> {
    let digest = decode_hex(digest_hex)?;
    let key_bytes: [u8; 32] = decode_hex_fixed(private_key_hex)?;
    let signing_key = SigningKey::from_bytes(&key_bytes);
    let signature = signing_key.sign(&digest);
    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a hex-encoded Ed25519 signature over a hex-encoded digest with a
/// hex-encoded public key. Any parsing failure or bad signature yields
/// `false` rather than an error, matching spec §4.2.
pub fn verify(digest_hex: &str, signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(digest) = decode_hex(digest_hex) else {
        return false;
    };
    let Ok(sig_bytes) = decode_hex_fixed::<64>(signature_hex) else {
        return false;
    };
    let Ok(key_bytes) = decode_hex_fixed::<32>(public_key_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let signature = DalekSignature::from_bytes(&sig_bytes);
    verifying_key.verify(&digest, &signature).is_ok()
}

/// Generate a cryptographically strong 32-character (128-bit) hex nonce,
/// used as the default `MSR.nonce` when the caller omits one.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::Signature(format!("invalid hex: {e}")))
}

fn decode_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| Error::Signature(format!("expected {N}-byte hex value")))
}
