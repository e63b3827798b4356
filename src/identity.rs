//! secp256k1 Schnorr identities.

use std::fmt;

use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{SigningError, ValidationError};

/// Anything that can author claims.
pub trait Signer {
    /// Hex x-only public key written into `pubkey`.
    fn public_key_hex(&self) -> String;
    /// Sign `bytes`, returning a hex signature.
    fn sign(&self, bytes: &[u8]) -> Result<String, SigningError>;
}

/// Keypair used to sign claim events.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
}

impl Identity {
    /// Fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::signing_only();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        Self { keypair }
    }

    /// Load an identity from a 32-byte hex secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| SigningError(format!("secret key is not hex: {e}")))?;
        let sk = SecretKey::from_slice(&bytes)
            .map_err(|e| SigningError(format!("invalid secret key: {e}")))?;
        let secp = Secp256k1::signing_only();
        Ok(Self {
            keypair: Keypair::from_secret_key(&secp, &sk),
        })
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }
}

impl Signer for Identity {
    fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.x_only_public_key().0.serialize())
    }

    fn sign(&self, bytes: &[u8]) -> Result<String, SigningError> {
        let digest = Sha256::digest(bytes);
        let msg = Message::from_digest_slice(&digest).map_err(|e| SigningError(e.to_string()))?;
        let secp = Secp256k1::signing_only();
        let sig = secp.sign_schnorr(&msg, &self.keypair);
        Ok(hex::encode(sig.as_ref()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("pubkey", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Check a hex Schnorr signature over `bytes` against a hex x-only key.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify(pubkey: &str, bytes: &[u8], sig: &str) -> bool {
    let digest = Sha256::digest(bytes);
    verify_digest(pubkey, &digest, sig)
}

/// Normalize a hex x-only public key, rejecting anything that is not a
/// valid curve point.
pub fn parse_pubkey(raw: &str) -> Result<String, ValidationError> {
    let pubkey = raw.trim().to_ascii_lowercase();
    let valid = pubkey.len() == 64
        && hex::decode(&pubkey)
            .ok()
            .is_some_and(|bytes| XOnlyPublicKey::from_slice(&bytes).is_ok());
    if !valid {
        return Err(ValidationError::InvalidPubkey(raw.to_string()));
    }
    Ok(pubkey)
}

fn verify_digest(pubkey: &str, digest: &[u8], sig: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(sig) else {
        return false;
    };
    let Ok(pk_bytes) = hex::decode(pubkey) else {
        return false;
    };
    let (Ok(sig), Ok(pk), Ok(msg)) = (
        Signature::from_slice(&sig_bytes),
        XOnlyPublicKey::from_slice(&pk_bytes),
        Message::from_digest_slice(digest),
    ) else {
        return false;
    };
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&sig, &msg, &pk).is_ok()
}
