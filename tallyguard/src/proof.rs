//! Zero-knowledge proofs.
//!
//! All proofs are non-interactive Fiat-Shamir constructions. The challenge inputs are
//! hashed in a fixed order and the order is part of the protocol:
//!
//!   - Schnorr:      `c = H(K, h)`
//!   - Disjunctive:  `c = H(Qbar, alpha, beta, a0, b0, a1, b1)`
//!   - Constant:     `c = H(Qbar, alpha, beta, a, b)`
//!   - Decryption:   `c = H(Qbar, alpha, beta, a, b, M)`
//!
//! where `Qbar` is the election's extended base hash and `(alpha, beta)` the ciphertext.

use crate::*;
use rand::{CryptoRng, RngCore};

/// Proof of knowledge of the secret behind a public key (a polynomial coefficient commitment).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SchnorrProof {
    pub public_key: ElementModP,
    pub commitment: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl SchnorrProof {
    pub fn make(group: &Group, keypair: &ElGamalKeyPair, nonce: &ElementModQ) -> Self {
        let commitment = group.g_pow(nonce);
        let challenge = hash_elems(group, &[(&keypair.public).into(), (&commitment).into()]);
        let response = group.add_q(nonce, &group.mul_q(&challenge, &keypair.secret));
        SchnorrProof {
            public_key: keypair.public.clone(),
            commitment,
            challenge,
            response,
        }
    }

    pub fn is_valid(&self, group: &Group) -> bool {
        let k = &self.public_key;
        let h = &self.commitment;

        if !group.is_valid_residue(k)
            || !group.is_valid_residue(h)
            || !group.is_in_bounds_q(&self.response)
        {
            return false;
        }

        let expected = hash_elems(group, &[k.into(), h.into()]);
        if expected != self.challenge {
            return false;
        }

        // g^v == h * K^c
        group.g_pow(&self.response) == group.mul_p(h, &group.pow_p(k, &self.challenge))
    }
}

/// A single Chaum-Pedersen transcript `(a, b, c, v)`.
///
/// Used on its own as the decryption-correctness proof and as each branch of a
/// [`DisjunctiveChaumPedersenProof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl ChaumPedersenProof {
    /// Prove that `share == message.pad^secret` for the secret behind `g^secret`.
    pub fn make_decryption(
        group: &Group,
        message: &Ciphertext,
        secret: &ElementModQ,
        share: &ElementModP,
        nonce: &ElementModQ,
        context: &ElementModQ,
    ) -> Self {
        let pad = group.g_pow(nonce);
        let data = group.pow_p(&message.pad, nonce);
        let challenge = hash_elems(
            group,
            &[
                context.into(),
                (&message.pad).into(),
                (&message.data).into(),
                (&pad).into(),
                (&data).into(),
                share.into(),
            ],
        );
        let response = group.add_q(nonce, &group.mul_q(&challenge, secret));
        ChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
        }
    }

    pub fn is_valid_decryption(
        &self,
        group: &Group,
        message: &Ciphertext,
        public_key: &ElementModP,
        share: &ElementModP,
        context: &ElementModQ,
    ) -> bool {
        if !self.in_bounds(group) || !group.is_valid_residue(share) {
            return false;
        }

        let expected = hash_elems(
            group,
            &[
                context.into(),
                (&message.pad).into(),
                (&message.data).into(),
                (&self.pad).into(),
                (&self.data).into(),
                share.into(),
            ],
        );
        if expected != self.challenge {
            return false;
        }

        let c = &self.challenge;
        let v = &self.response;

        // g^v == a * K^c
        let consistent_key =
            group.g_pow(v) == group.mul_p(&self.pad, &group.pow_p(public_key, c));
        // alpha^v == b * M^c
        let consistent_share = group.pow_p(&message.pad, v)
            == group.mul_p(&self.data, &group.pow_p(share, c));

        consistent_key && consistent_share
    }

    fn in_bounds(&self, group: &Group) -> bool {
        group.is_valid_residue(&self.pad)
            && group.is_valid_residue(&self.data)
            && group.is_in_bounds_q(&self.challenge)
            && group.is_in_bounds_q(&self.response)
    }
}

/// Proof that a ciphertext encrypts a known constant, used for a contest's selection sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
    pub constant: u64,
}

impl ConstantChaumPedersenProof {
    /// `r` is the aggregate nonce of `message`; `constant` is the claimed plaintext.
    pub fn make(
        group: &Group,
        message: &Ciphertext,
        r: &ElementModQ,
        public_key: &ElementModP,
        constant: u64,
        nonce: &ElementModQ,
        context: &ElementModQ,
    ) -> Self {
        let pad = group.g_pow(nonce);
        let data = group.pow_p(public_key, nonce);
        let challenge = hash_elems(
            group,
            &[
                context.into(),
                (&message.pad).into(),
                (&message.data).into(),
                (&pad).into(),
                (&data).into(),
            ],
        );
        let response = group.add_q(nonce, &group.mul_q(&challenge, r));
        ConstantChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
            constant,
        }
    }

    pub fn is_valid(
        &self,
        group: &Group,
        message: &Ciphertext,
        public_key: &ElementModP,
        context: &ElementModQ,
    ) -> bool {
        if !group.is_valid_residue(&self.pad)
            || !group.is_valid_residue(&self.data)
            || !group.is_in_bounds_q(&self.response)
        {
            return false;
        }

        let expected = hash_elems(
            group,
            &[
                context.into(),
                (&message.pad).into(),
                (&message.data).into(),
                (&self.pad).into(),
                (&self.data).into(),
            ],
        );
        if expected != self.challenge {
            return false;
        }

        let c = &self.challenge;
        let v = &self.response;
        let lc = group.mul_q(&group.q_from_u64(self.constant), c);

        // g^v == a * alpha^c
        let consistent_pad =
            group.g_pow(v) == group.mul_p(&self.pad, &group.pow_p(&message.pad, c));
        // g^(L*c) * K^v == b * beta^c
        let consistent_data = group.mul_p(&group.g_pow(&lc), &group.pow_p(public_key, v))
            == group.mul_p(&self.data, &group.pow_p(&message.data, c));

        consistent_pad && consistent_data
    }
}

/// Proof that a ciphertext encrypts 0 or 1, without revealing which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisjunctiveChaumPedersenProof {
    pub proof_zero: ChaumPedersenProof,
    pub proof_one: ChaumPedersenProof,
    pub challenge: ElementModQ,
}

impl DisjunctiveChaumPedersenProof {
    /// `r` is the encryption nonce of `message` and `plaintext` must be 0 or 1.
    pub fn make<R: RngCore + CryptoRng>(
        group: &Group,
        rng: &mut R,
        message: &Ciphertext,
        r: &ElementModQ,
        public_key: &ElementModP,
        plaintext: u64,
        context: &ElementModQ,
    ) -> Result<Self, Error> {
        let alpha = &message.pad;
        let beta = &message.data;
        let k = public_key;

        // One branch is real, the other is simulated from a chosen challenge and response
        let u = group.rand_q(rng);
        let fake_c = group.rand_q(rng);
        let fake_v = group.rand_q(rng);

        let (a0, b0, a1, b1) = match plaintext {
            0 => {
                let a0 = group.g_pow(&u);
                let b0 = group.pow_p(k, &u);
                let a1 = group.div_p(&group.g_pow(&fake_v), &group.pow_p(alpha, &fake_c));
                let b1 = group.div_p(
                    &group.mul_p(&group.g_pow(&fake_c), &group.pow_p(k, &fake_v)),
                    &group.pow_p(beta, &fake_c),
                );
                (a0, b0, a1, b1)
            }
            1 => {
                let a0 = group.div_p(&group.g_pow(&fake_v), &group.pow_p(alpha, &fake_c));
                let b0 = group.div_p(&group.pow_p(k, &fake_v), &group.pow_p(beta, &fake_c));
                let a1 = group.g_pow(&u);
                let b1 = group.pow_p(k, &u);
                (a0, b0, a1, b1)
            }
            other => {
                return Err(Error::ShapeMismatch(format!(
                    "selection plaintext must be 0 or 1, got {}",
                    other
                )))
            }
        };

        let challenge = hash_elems(
            group,
            &[
                context.into(),
                alpha.into(),
                beta.into(),
                (&a0).into(),
                (&b0).into(),
                (&a1).into(),
                (&b1).into(),
            ],
        );
        let real_c = group.sub_q(&challenge, &fake_c);
        let real_v = group.add_q(&u, &group.mul_q(&real_c, r));

        let (c0, v0, c1, v1) = if plaintext == 0 {
            (real_c, real_v, fake_c, fake_v)
        } else {
            (fake_c, fake_v, real_c, real_v)
        };

        Ok(DisjunctiveChaumPedersenProof {
            proof_zero: ChaumPedersenProof {
                pad: a0,
                data: b0,
                challenge: c0,
                response: v0,
            },
            proof_one: ChaumPedersenProof {
                pad: a1,
                data: b1,
                challenge: c1,
                response: v1,
            },
            challenge,
        })
    }

    pub fn is_valid(
        &self,
        group: &Group,
        message: &Ciphertext,
        public_key: &ElementModP,
        context: &ElementModQ,
    ) -> bool {
        let alpha = &message.pad;
        let beta = &message.data;
        let k = public_key;
        let p0 = &self.proof_zero;
        let p1 = &self.proof_one;

        if !p0.in_bounds(group) || !p1.in_bounds(group) {
            return false;
        }

        let expected = hash_elems(
            group,
            &[
                context.into(),
                alpha.into(),
                beta.into(),
                (&p0.pad).into(),
                (&p0.data).into(),
                (&p1.pad).into(),
                (&p1.data).into(),
            ],
        );
        if expected != self.challenge
            || group.add_q(&p0.challenge, &p1.challenge) != self.challenge
        {
            return false;
        }

        // g^v0 == a0 * alpha^c0
        let zero_pad = group.g_pow(&p0.response)
            == group.mul_p(&p0.pad, &group.pow_p(alpha, &p0.challenge));
        // K^v0 == b0 * beta^c0
        let zero_data = group.pow_p(k, &p0.response)
            == group.mul_p(&p0.data, &group.pow_p(beta, &p0.challenge));
        // g^v1 == a1 * alpha^c1
        let one_pad = group.g_pow(&p1.response)
            == group.mul_p(&p1.pad, &group.pow_p(alpha, &p1.challenge));
        // g^c1 * K^v1 == b1 * beta^c1
        let one_data = group.mul_p(&group.g_pow(&p1.challenge), &group.pow_p(k, &p1.response))
            == group.mul_p(&p1.data, &group.pow_p(beta, &p1.challenge));

        zero_pad && zero_data && one_pad && one_data
    }
}

/// A proof together with the values it attests to.
#[derive(Debug, Clone, Copy)]
pub enum Attestation<'a> {
    /// Knowledge of the secret behind a coefficient commitment.
    Schnorr { proof: &'a SchnorrProof },

    /// A selection ciphertext encrypts 0 or 1.
    Selection {
        proof: &'a DisjunctiveChaumPedersenProof,
        ciphertext: &'a Ciphertext,
        public_key: &'a ElementModP,
    },

    /// A contest's summed ciphertext encrypts exactly `expected`.
    ContestSum {
        proof: &'a ConstantChaumPedersenProof,
        ciphertext: &'a Ciphertext,
        public_key: &'a ElementModP,
        expected: u64,
    },

    /// A decryption share is consistent with the trustee's key and the ciphertext.
    Decryption {
        proof: &'a ChaumPedersenProof,
        ciphertext: &'a Ciphertext,
        public_key: &'a ElementModP,
        share: &'a ElementModP,
    },
}

/// Stateless proof checker bound to a group and, once the key ceremony is done, to the
/// election's extended base hash.
#[derive(Debug, Clone)]
pub struct ProofVerifier<'a> {
    group: &'a Group,
    context: Option<&'a ElementModQ>,
}

impl<'a> ProofVerifier<'a> {
    pub fn new(group: &'a Group, extended_base_hash: &'a ElementModQ) -> Self {
        ProofVerifier {
            group,
            context: Some(extended_base_hash),
        }
    }

    /// A verifier for the key ceremony, before the extended base hash exists.
    /// It accepts only Schnorr attestations.
    pub fn key_ceremony(group: &'a Group) -> Self {
        ProofVerifier {
            group,
            context: None,
        }
    }

    pub fn verify(&self, attestation: Attestation) -> Result<(), Error> {
        match attestation {
            Attestation::Schnorr { proof } => self.verify_schnorr(proof),
            Attestation::Selection {
                proof,
                ciphertext,
                public_key,
            } => self.verify_selection(proof, ciphertext, public_key),
            Attestation::ContestSum {
                proof,
                ciphertext,
                public_key,
                expected,
            } => self.verify_contest_sum(proof, ciphertext, public_key, expected),
            Attestation::Decryption {
                proof,
                ciphertext,
                public_key,
                share,
            } => self.verify_decryption(proof, ciphertext, public_key, share),
        }
    }

    fn context(&self, what: &str) -> Result<&'a ElementModQ, Error> {
        self.context
            .ok_or_else(|| Error::ProofFailed(format!("{} (no extended base hash yet)", what)))
    }

    fn verify_schnorr(&self, proof: &SchnorrProof) -> Result<(), Error> {
        if proof.is_valid(self.group) {
            Ok(())
        } else {
            Err(Error::ProofFailed("schnorr".into()))
        }
    }

    fn verify_selection(
        &self,
        proof: &DisjunctiveChaumPedersenProof,
        ciphertext: &Ciphertext,
        public_key: &ElementModP,
    ) -> Result<(), Error> {
        let context = self.context("disjunctive chaum-pedersen")?;
        if ciphertext.is_valid(self.group)
            && proof.is_valid(self.group, ciphertext, public_key, context)
        {
            Ok(())
        } else {
            Err(Error::ProofFailed("disjunctive chaum-pedersen".into()))
        }
    }

    fn verify_contest_sum(
        &self,
        proof: &ConstantChaumPedersenProof,
        ciphertext: &Ciphertext,
        public_key: &ElementModP,
        expected: u64,
    ) -> Result<(), Error> {
        let context = self.context("constant chaum-pedersen")?;
        if proof.constant != expected {
            return Err(Error::ProofFailed(format!(
                "constant chaum-pedersen (claims {}, contest allows {})",
                proof.constant, expected
            )));
        }
        if proof.is_valid(self.group, ciphertext, public_key, context) {
            Ok(())
        } else {
            Err(Error::ProofFailed("constant chaum-pedersen".into()))
        }
    }

    fn verify_decryption(
        &self,
        proof: &ChaumPedersenProof,
        ciphertext: &Ciphertext,
        public_key: &ElementModP,
        share: &ElementModP,
    ) -> Result<(), Error> {
        let context = self.context("decryption chaum-pedersen")?;
        if proof.is_valid_decryption(self.group, ciphertext, public_key, share, context) {
            Ok(())
        } else {
            Err(Error::ProofFailed("decryption chaum-pedersen".into()))
        }
    }
}
