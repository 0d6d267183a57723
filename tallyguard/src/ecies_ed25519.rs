//! ECIES over Curve25519, used to move key-ceremony backups between trustees.
//!
//! Each trustee registers an auxiliary public key during `AUX_KEYS`. Backups are encrypted
//! to the recipient's auxiliary key so the server, which relays them, never sees a share.
//!
//!   - The secret key is an ed25519 `SecretKey` used directly as a scalar (no hashing or
//!     bit mangling), so it must come from a good RNG or KDF.
//!   - Key derivation is HKDF-SHA256 over `ephemeral_pk || shared_point`.
//!   - The payload is sealed with AES-256-GCM; the 12-byte nonce is prepended.

use crate::*;
use aes_gcm::aead::{generic_array::GenericArray, Aead, NewAead};
use aes_gcm::Aes256Gcm;
use curve25519_dalek::constants;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{PublicKey, SecretKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use sha2::Sha256;
use std::fmt;

const AES_IV_LENGTH: usize = 12;
const HKDF_INFO: &[u8] = b"tallyguard_backup_transport";

type AesKey = [u8; 32];
type SharedSecret = [u8; 32];

/// A trustee's auxiliary transport public key.
///
/// Not an ed25519 signing key: it is `secret * B` without the ed25519 secret-key hashing,
/// and must not be used for anything other than backup transport.
#[derive(Clone, PartialEq, Eq)]
pub struct AuxPublicKey(PublicKey);

impl AuxPublicKey {
    #[inline]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Construct a key from its compressed point encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let public = PublicKey::from_bytes(bytes)
            .map_err(|e| Error::Malformed(format!("auxiliary public key: {}", e)))?;
        Ok(AuxPublicKey(public))
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        Self::from_bytes(&hex::decode(s)?)
    }

    /// Derive the public key for a secret key.
    pub fn from_secret(sk: &SecretKey) -> Result<Self, Error> {
        let point = &Scalar::from_bits(sk.to_bytes()) * &constants::ED25519_BASEPOINT_TABLE;
        Self::from_bytes(&point.compress().to_bytes())
    }

    fn as_point(&self) -> Result<EdwardsPoint, Error> {
        CompressedEdwardsY::from_slice(self.0.as_bytes())
            .decompress()
            .ok_or_else(|| Error::Malformed("auxiliary public key is not a curve point".into()))
    }
}

impl fmt::Debug for AuxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AuxPublicKey({})", hex::encode(self.as_bytes()))
    }
}

impl serde::Serialize for AuxPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

impl<'de> serde::Deserialize<'de> for AuxPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        AuxPublicKey::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Generate an auxiliary transport keypair.
pub fn generate_aux_keypair<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<(SecretKey, AuxPublicKey), Error> {
    let mut bytes = [0u8; SECRET_KEY_LENGTH];
    rng.fill_bytes(&mut bytes);
    let secret = SecretKey::from_bytes(&bytes)
        .map_err(|e| Error::Malformed(format!("auxiliary secret key: {}", e)))?;
    let public = AuxPublicKey::from_secret(&secret)?;
    Ok((secret, public))
}

/// Encrypt a message so that only the holder of the receiver's secret key can read it.
pub fn transport_encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    receiver_pub: &AuxPublicKey,
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    let (ephemeral_sk, ephemeral_pk) = generate_aux_keypair(rng)?;

    let aes_key = encapsulate(&ephemeral_sk, receiver_pub)?;
    let encrypted = aes_encrypt(rng, &aes_key, msg)?;

    let mut cipher_text = Vec::with_capacity(PUBLIC_KEY_LENGTH + encrypted.len());
    cipher_text.extend_from_slice(ephemeral_pk.as_bytes());
    cipher_text.extend(encrypted);

    Ok(cipher_text)
}

/// Decrypt a message produced by [`transport_encrypt`].
pub fn transport_decrypt(receiver_sec: &SecretKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    if msg.len() < PUBLIC_KEY_LENGTH + AES_IV_LENGTH {
        return Err(Error::TransportDecryption);
    }

    let ephemeral_pk = AuxPublicKey::from_bytes(&msg[..PUBLIC_KEY_LENGTH])?;
    let encrypted = &msg[PUBLIC_KEY_LENGTH..];
    let aes_key = decapsulate(receiver_sec, &ephemeral_pk)?;

    aes_decrypt(&aes_key, encrypted)
}

fn hkdf_sha256(master: &[u8]) -> Result<AesKey, Error> {
    let h = Hkdf::<Sha256>::new(None, master);
    let mut out = [0u8; 32];
    h.expand(HKDF_INFO, &mut out)
        .map_err(|_| Error::TransportDecryption)?;
    Ok(out)
}

fn generate_shared(secret: &SecretKey, public: &AuxPublicKey) -> Result<SharedSecret, Error> {
    let public = public.as_point()?;
    let secret = Scalar::from_bits(secret.to_bytes());
    let shared_point = (public * secret).compress();
    Ok(shared_point.to_bytes())
}

fn encapsulate(ephemeral_sk: &SecretKey, peer_pk: &AuxPublicKey) -> Result<AesKey, Error> {
    let shared_point = generate_shared(ephemeral_sk, peer_pk)?;
    let ephemeral_pk = AuxPublicKey::from_secret(ephemeral_sk)?;

    let mut master = Vec::with_capacity(32 * 2);
    master.extend_from_slice(ephemeral_pk.as_bytes());
    master.extend_from_slice(&shared_point);
    hkdf_sha256(&master)
}

fn decapsulate(sk: &SecretKey, ephemeral_pk: &AuxPublicKey) -> Result<AesKey, Error> {
    let shared_point = generate_shared(sk, ephemeral_pk)?;

    let mut master = Vec::with_capacity(32 * 2);
    master.extend_from_slice(ephemeral_pk.as_bytes());
    master.extend_from_slice(&shared_point);
    hkdf_sha256(&master)
}

fn aes_encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &AesKey,
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; AES_IV_LENGTH];
    rng.fill_bytes(&mut nonce);
    let nonce = GenericArray::from_slice(&nonce);

    let ciphertext = aead.encrypt(nonce, msg)?;

    let mut output = Vec::with_capacity(AES_IV_LENGTH + ciphertext.len());
    output.extend_from_slice(nonce.as_slice());
    output.extend(ciphertext);

    Ok(output)
}

fn aes_decrypt(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let nonce = GenericArray::from_slice(&ciphertext[..AES_IV_LENGTH]);
    let encrypted = &ciphertext[AES_IV_LENGTH..];

    Ok(aead.decrypt(nonce, encrypted)?)
}
