use data_encoding::BASE64URL_NOPAD;
use rand::thread_rng;
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::common::ledger::LedgerId;

/// Modulus size for new election keys unless configured otherwise.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// An election key pair, both halves exported as base64url DER
/// (SPKI for the public key, PKCS#8 for the private key).
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Generates election key pairs.
#[derive(Debug, Clone, Copy)]
pub struct KeyringManager {
    key_bits: usize,
}

impl KeyringManager {
    pub fn new(key_bits: usize) -> Self {
        Self { key_bits }
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Generate a fresh key pair. This is slow for realistic key sizes, so
    /// async callers should run it on a blocking thread.
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        let private_key = RsaPrivateKey::new(&mut thread_rng(), self.key_bits)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(KeyPair {
            public_key: export_public_key(&public_key)?,
            private_key: export_private_key(&private_key)?,
        })
    }
}

impl Default for KeyringManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS)
    }
}

pub fn export_public_key(key: &RsaPublicKey) -> Result<String> {
    let der = key.to_public_key_der().map_err(Error::crypto)?;
    Ok(BASE64URL_NOPAD.encode(der.as_bytes()))
}

pub fn export_private_key(key: &RsaPrivateKey) -> Result<String> {
    let der = key.to_pkcs8_der().map_err(Error::crypto)?;
    Ok(BASE64URL_NOPAD.encode(der.as_bytes()))
}

pub fn import_public_key(encoded: &str) -> Result<RsaPublicKey> {
    let der = BASE64URL_NOPAD
        .decode(encoded.as_bytes())
        .map_err(Error::crypto)?;
    RsaPublicKey::from_public_key_der(&der).map_err(Error::crypto)
}

pub fn import_private_key(encoded: &str) -> Result<RsaPrivateKey> {
    let der = BASE64URL_NOPAD
        .decode(encoded.as_bytes())
        .map_err(Error::crypto)?;
    RsaPrivateKey::from_pkcs8_der(&der).map_err(Error::crypto)
}

/// Derive the storage identifier of an election's ledger from its public modulus.
///
/// This is a SHA-256 digest of the big-endian modulus, base64url encoded, so it is
/// stable across processes, always 43 characters, and safe as a storage key.
/// Stores still refuse to let two different keys share an identifier.
pub fn derive_ledger_id(key: &RsaPublicKey) -> LedgerId {
    let modulus = key.n().to_bytes_be();
    LedgerId::new(BASE64URL_NOPAD.encode(&Sha256::digest(modulus)))
}

/// Convenience wrapper around [`derive_ledger_id`] for an exported public key.
pub fn ledger_id_for(encoded_public_key: &str) -> Result<LedgerId> {
    Ok(derive_ledger_id(&import_public_key(encoded_public_key)?))
}

/// Sign the payload with PKCS#1 v1.5 over SHA-256, returning the signature as base64url.
pub fn sign(payload: &[u8], key: &RsaPrivateKey) -> Result<String> {
    let digest = Sha256::digest(payload);
    let signature = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?;
    Ok(BASE64URL_NOPAD.encode(&signature))
}

/// Check a base64url signature produced by [`sign`].
pub fn verify(payload: &[u8], signature: &str, key: &RsaPublicKey) -> bool {
    let Ok(signature) = BASE64URL_NOPAD.decode(signature.as_bytes()) else {
        return false;
    };
    let digest = Sha256::digest(payload);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .is_ok()
}
