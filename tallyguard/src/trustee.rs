use crate::*;
use ed25519_dalek::{SecretKey, SECRET_KEY_LENGTH};
use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};

/// A trustee safeguards one share of the election secret.
///
/// Trustees are numbered `1..=n`. Any `t` of them can decrypt, and while at least `t` are
/// present they can compensate for the ones who are not, using the backups they received
/// from them during the key ceremony.
pub trait Trustee {
    fn index(&self) -> u32;

    fn aux_public_key(&self) -> &AuxPublicKey;

    /// Generate this trustee's polynomial and address one encrypted backup to every other trustee.
    fn key_ceremony(
        &mut self,
        request: &KeyCeremonyRequest,
    ) -> Result<KeyCeremonySubmission, Error>;

    /// Decrypt and check every backup addressed to this trustee. Nothing is kept unless
    /// every backup verifies.
    fn receive_backups(&mut self, delivery: &BackupDelivery) -> Result<(), Error>;

    fn partial_decrypt(&self, request: &DecryptionRequest) -> Result<DecryptionSubmission, Error>;

    fn compensate(&self, request: &CompensationRequest) -> Result<CompensationSubmission, Error>;
}

/// Key material both trustee kinds hold.
#[derive(Clone)]
struct TrusteeSecrets {
    group: Group,
    index: u32,
    // ed25519 secret keys are not Clone; the bytes are rebuilt into one on use
    aux_secret: [u8; SECRET_KEY_LENGTH],
    aux_public: AuxPublicKey,
    polynomial: Option<ElectionPolynomial>,
    // P_sender(index) for every other trustee, once verified
    coordinates: BTreeMap<u32, ElementModQ>,
}

impl TrusteeSecrets {
    fn new<R: RngCore + CryptoRng>(group: &Group, index: u32, rng: &mut R) -> Result<Self, Error> {
        if index == 0 {
            return Err(Error::TrusteeNotFound(0));
        }
        let (secret, aux_public) = generate_aux_keypair(rng)?;
        Ok(TrusteeSecrets {
            group: group.clone(),
            index,
            aux_secret: secret.to_bytes(),
            aux_public,
            polynomial: None,
            coordinates: BTreeMap::new(),
        })
    }

    fn aux_secret(&self) -> Result<SecretKey, Error> {
        SecretKey::from_bytes(&self.aux_secret)
            .map_err(|e| Error::Malformed(format!("auxiliary secret key: {}", e)))
    }

    fn polynomial(&self) -> Result<&ElectionPolynomial, Error> {
        self.polynomial
            .as_ref()
            .ok_or_else(|| Error::MissingShare(format!("trustee {} has no key share", self.index)))
    }

    fn check_addressee(&self, index: u32) -> Result<(), Error> {
        if index != self.index {
            return Err(Error::Unauthorized(format!(
                "request for trustee {} sent to trustee {}",
                index, self.index
            )));
        }
        Ok(())
    }

    fn key_ceremony<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        request: &KeyCeremonyRequest,
        polynomial: ElectionPolynomial,
    ) -> Result<KeyCeremonySubmission, Error> {
        self.check_addressee(request.trustee_index)?;
        if polynomial.threshold() != request.threshold {
            return Err(Error::InvalidThreshold {
                threshold: request.threshold,
                trustees: request.recipients.len() as u32 + 1,
            });
        }

        let mut backups = BTreeMap::new();
        for (&recipient, aux_key) in &request.recipients {
            if recipient == self.index {
                continue;
            }
            let coordinate = polynomial.coordinate(&self.group, recipient);
            let share = transport_encrypt(&mut *rng, aux_key, coordinate.to_hex().as_bytes())?;
            backups.insert(
                recipient,
                EncryptedBackup {
                    sender: self.index,
                    share,
                },
            );
        }

        let submission = KeyCeremonySubmission {
            trustee_index: self.index,
            commitments: polynomial.commitments().to_vec(),
            backups,
        };
        self.polynomial = Some(polynomial);
        Ok(submission)
    }

    fn receive_backups(&mut self, delivery: &BackupDelivery) -> Result<(), Error> {
        self.check_addressee(delivery.recipient)?;
        let secret = self.aux_secret()?;
        let verifier = ProofVerifier::key_ceremony(&self.group);

        let senders: BTreeSet<u32> = delivery
            .commitments
            .keys()
            .copied()
            .filter(|&i| i != self.index)
            .collect();
        let received: BTreeSet<u32> = delivery.backups.keys().copied().collect();
        if senders != received {
            return Err(Error::ShapeMismatch(format!(
                "trustee {} received backups from {:?}, expected {:?}",
                self.index, received, senders
            )));
        }

        let mut coordinates = BTreeMap::new();
        for (&sender, backup) in &delivery.backups {
            let commitments = delivery
                .commitments
                .get(&sender)
                .ok_or(Error::TrusteeNotFound(sender))?;
            for commitment in commitments {
                verifier.verify(Attestation::Schnorr {
                    proof: &commitment.proof,
                })?;
            }

            let coordinate = open_backup(&secret, backup)
                .map_err(|_| Error::BackupVerificationFailed { sender })?;
            if backup.sender != sender
                || !self.group.is_in_bounds_q(&coordinate)
                || !verify_polynomial_coordinate(&self.group, &coordinate, self.index, commitments)
            {
                tracing::warn!(trustee = self.index, sender, "backup failed verification");
                return Err(Error::BackupVerificationFailed { sender });
            }
            coordinates.insert(sender, coordinate);
        }

        tracing::debug!(trustee = self.index, count = coordinates.len(), "backups verified");
        self.coordinates = coordinates;
        Ok(())
    }

    fn partial_decrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        request: &DecryptionRequest,
    ) -> Result<DecryptionSubmission, Error> {
        self.check_addressee(request.trustee_index)?;
        let secret = self.polynomial()?.secret();
        let shares = request.targets.map_shares(|c| {
            DecryptionShare::compute(&self.group, &mut *rng, c, secret, &request.extended_base_hash)
        });
        Ok(DecryptionSubmission {
            trustee_index: self.index,
            shares,
        })
    }

    fn compensate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        request: &CompensationRequest,
    ) -> Result<CompensationSubmission, Error> {
        self.check_addressee(request.trustee_index)?;
        let mut compensations = BTreeMap::new();
        for &missing in &request.missing {
            let coordinate = self.coordinates.get(&missing).ok_or_else(|| {
                Error::MissingShare(format!(
                    "trustee {} holds no backup from trustee {}",
                    self.index, missing
                ))
            })?;
            let shares = request.targets.map_shares(|c| {
                let context = &request.extended_base_hash;
                DecryptionShare::compute(&self.group, &mut *rng, c, coordinate, context)
            });
            compensations.insert(missing, shares);
        }
        Ok(CompensationSubmission {
            trustee_index: self.index,
            compensations,
        })
    }
}

fn open_backup(secret: &SecretKey, backup: &EncryptedBackup) -> Result<ElementModQ, Error> {
    let plaintext = transport_decrypt(secret, &backup.share)?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| Error::Malformed("backup is not a hex coordinate".into()))?;
    ElementModQ::from_hex(&text)
}

/// A trustee run by a person, off the server. Its polynomial is freshly random.
#[derive(Clone)]
pub struct RemoteTrustee {
    secrets: TrusteeSecrets,
}

impl RemoteTrustee {
    pub fn new<R: RngCore + CryptoRng>(
        group: &Group,
        index: u32,
        rng: &mut R,
    ) -> Result<Self, Error> {
        Ok(RemoteTrustee {
            secrets: TrusteeSecrets::new(group, index, rng)?,
        })
    }
}

impl Trustee for RemoteTrustee {
    fn index(&self) -> u32 {
        self.secrets.index
    }

    fn aux_public_key(&self) -> &AuxPublicKey {
        &self.secrets.aux_public
    }

    fn key_ceremony(
        &mut self,
        request: &KeyCeremonyRequest,
    ) -> Result<KeyCeremonySubmission, Error> {
        let mut rng = rand::rngs::OsRng {};
        let polynomial =
            ElectionPolynomial::generate(&self.secrets.group, &mut rng, request.threshold);
        self.secrets.key_ceremony(&mut rng, request, polynomial)
    }

    fn receive_backups(&mut self, delivery: &BackupDelivery) -> Result<(), Error> {
        self.secrets.receive_backups(delivery)
    }

    fn partial_decrypt(&self, request: &DecryptionRequest) -> Result<DecryptionSubmission, Error> {
        self.secrets.partial_decrypt(&mut rand::rngs::OsRng {}, request)
    }

    fn compensate(&self, request: &CompensationRequest) -> Result<CompensationSubmission, Error> {
        self.secrets.compensate(&mut rand::rngs::OsRng {}, request)
    }
}

/// The server-side trustee. It takes its turn as soon as a phase that needs it is entered.
///
/// Its polynomial is derived from its auxiliary secret key, so the server can rebuild it
/// from that key alone.
#[derive(Clone)]
pub struct AutomatedTrustee {
    secrets: TrusteeSecrets,
}

impl AutomatedTrustee {
    pub const IDENTITY: &'static str = "automated-trustee";

    pub fn new(group: &Group, index: u32) -> Result<Self, Error> {
        Ok(AutomatedTrustee {
            secrets: TrusteeSecrets::new(group, index, &mut rand::rngs::OsRng {})?,
        })
    }

    // A ChaCha20 generator seeded by HKDF over the auxiliary secret
    fn generator(&self) -> Result<rand_chacha::ChaCha20Rng, Error> {
        use hkdf::Hkdf;
        use rand_chacha::rand_core::SeedableRng;
        use rand_chacha::ChaCha20Rng;
        use sha2::Sha256;

        let h = Hkdf::<Sha256>::new(None, &self.secrets.aux_secret);
        let mut seed = [0u8; 32];
        h.expand(b"tallyguard_trustee_generator", &mut seed)
            .map_err(|_| Error::Malformed("trustee generator seed".into()))?;

        Ok(ChaCha20Rng::from_seed(seed))
    }

    /// Rebuild the polynomial this trustee uses for `threshold`.
    pub fn derive_polynomial(&self, threshold: u32) -> Result<ElectionPolynomial, Error> {
        let mut rng = self.generator()?;
        Ok(ElectionPolynomial::generate(&self.secrets.group, &mut rng, threshold))
    }
}

impl Trustee for AutomatedTrustee {
    fn index(&self) -> u32 {
        self.secrets.index
    }

    fn aux_public_key(&self) -> &AuxPublicKey {
        &self.secrets.aux_public
    }

    fn key_ceremony(
        &mut self,
        request: &KeyCeremonyRequest,
    ) -> Result<KeyCeremonySubmission, Error> {
        let polynomial = self.derive_polynomial(request.threshold)?;
        tracing::info!(trustee = self.index(), "automated trustee submitting key ceremony");
        self.secrets
            .key_ceremony(&mut rand::rngs::OsRng {}, request, polynomial)
    }

    fn receive_backups(&mut self, delivery: &BackupDelivery) -> Result<(), Error> {
        self.secrets.receive_backups(delivery)
    }

    fn partial_decrypt(&self, request: &DecryptionRequest) -> Result<DecryptionSubmission, Error> {
        tracing::info!(trustee = self.index(), "automated trustee decrypting");
        self.secrets.partial_decrypt(&mut rand::rngs::OsRng {}, request)
    }

    fn compensate(&self, request: &CompensationRequest) -> Result<CompensationSubmission, Error> {
        tracing::info!(
            trustee = self.index(),
            missing = request.missing.len(),
            "automated trustee compensating"
        );
        self.secrets.compensate(&mut rand::rngs::OsRng {}, request)
    }
}
