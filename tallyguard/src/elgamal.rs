use crate::*;
use rand::{CryptoRng, RngCore};

/// An exponential ElGamal ciphertext `(g^r, g^m * K^r)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub pad: ElementModP,
    pub data: ElementModP,
}

impl Ciphertext {
    /// The neutral ciphertext `(1, 1)`, an encryption of zero with nonce zero.
    pub fn zero(group: &Group) -> Self {
        Ciphertext {
            pad: group.one_p(),
            data: group.one_p(),
        }
    }

    /// Encrypt `m` under `public_key` with an explicit nonce.
    pub fn encrypt_with_nonce(
        group: &Group,
        m: u64,
        nonce: &ElementModQ,
        public_key: &ElementModP,
    ) -> Self {
        let pad = group.g_pow(nonce);
        let gm = group.g_pow(&group.q_from_u64(m));
        let data = group.mul_p(&gm, &group.pow_p(public_key, nonce));
        Ciphertext { pad, data }
    }

    /// Encrypt `m` with a fresh nonce, returning the nonce so proofs can be built over it.
    pub fn encrypt<R: RngCore + CryptoRng>(
        group: &Group,
        rng: &mut R,
        m: u64,
        public_key: &ElementModP,
    ) -> (Self, ElementModQ) {
        let nonce = group.rand_q(rng);
        (Self::encrypt_with_nonce(group, m, &nonce, public_key), nonce)
    }

    /// Homomorphic addition.
    pub fn add(&self, group: &Group, other: &Ciphertext) -> Ciphertext {
        Ciphertext {
            pad: group.mul_p(&self.pad, &other.pad),
            data: group.mul_p(&self.data, &other.data),
        }
    }

    /// Sum a sequence of ciphertexts; an empty sequence sums to [`Ciphertext::zero`].
    pub fn accumulate<'a, I>(group: &Group, ciphertexts: I) -> Ciphertext
    where
        I: IntoIterator<Item = &'a Ciphertext>,
    {
        ciphertexts
            .into_iter()
            .fold(Ciphertext::zero(group), |acc, c| acc.add(group, c))
    }

    /// A trustee's decryption share `pad^secret`.
    pub fn partial_decrypt(&self, group: &Group, secret: &ElementModQ) -> ElementModP {
        group.pow_p(&self.pad, secret)
    }

    /// Strip the combined decryption shares, leaving `g^m`.
    pub fn unblind(&self, group: &Group, combined_shares: &ElementModP) -> ElementModP {
        group.div_p(&self.data, combined_shares)
    }

    pub fn crypto_hash(&self, group: &Group) -> ElementModQ {
        hash_elems(group, &[(&self.pad).into(), (&self.data).into()])
    }

    pub fn is_valid(&self, group: &Group) -> bool {
        group.is_valid_residue(&self.pad) && group.is_valid_residue(&self.data)
    }
}

/// An ElGamal key pair over the election group.
#[derive(Clone, Debug)]
pub struct ElGamalKeyPair {
    pub secret: ElementModQ,
    pub public: ElementModP,
}

impl ElGamalKeyPair {
    pub fn from_secret(group: &Group, secret: ElementModQ) -> Self {
        let public = group.g_pow(&secret);
        ElGamalKeyPair { secret, public }
    }

    pub fn generate<R: RngCore + CryptoRng>(group: &Group, rng: &mut R) -> Self {
        Self::from_secret(group, group.rand_q(rng))
    }
}
