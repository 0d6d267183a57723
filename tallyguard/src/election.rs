use crate::*;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

/// Everything needed to create an election.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ElectionSetup {
    pub title: String,
    /// Identity allowed to drive phase transitions.
    pub authority: String,
    /// Identities of the human trustees, who get indices `1..=trustees.len()`.
    pub trustees: Vec<String>,
    pub threshold: u32,
    /// Add a server-side trustee with index `trustees.len() + 1`.
    pub automated_trustee: bool,
    pub end_time: u64,
    pub manifest: Manifest,
    pub voters: Vec<String>,
}

impl ElectionSetup {
    pub fn trustee_count(&self) -> u32 {
        self.trustees.len() as u32 + self.automated_trustee as u32
    }

    pub fn validate(&self) -> Result<(), Error> {
        let n = self.trustee_count();
        if self.threshold == 0 || self.threshold > n {
            return Err(Error::InvalidThreshold {
                threshold: self.threshold,
                trustees: n,
            });
        }
        self.manifest.validate()?;

        let mut seen = HashSet::new();
        for identity in &self.trustees {
            if identity == AutomatedTrustee::IDENTITY || !seen.insert(identity) {
                return Err(Error::Malformed(format!("duplicate trustee identity {}", identity)));
            }
        }
        let mut seen = HashSet::new();
        for identity in &self.voters {
            if !seen.insert(identity) {
                return Err(Error::Malformed(format!("duplicate voter {}", identity)));
            }
        }
        Ok(())
    }
}

/// The public election record. Cryptographic parameters are set once the key ceremony finishes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Election {
    pub id: Uuid,
    pub title: String,
    pub authority: String,
    pub phase: Phase,
    pub threshold: u32,
    pub trustee_count: u32,
    pub manifest: Manifest,
    pub joint_public_key: Option<ElementModP>,
    pub commitment_hash: Option<ElementModQ>,
    pub extended_base_hash: Option<ElementModQ>,
    pub start_time: Option<u64>,
    pub end_time: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrusteeRecord {
    pub index: u32,
    pub identity: String,
    pub automated: bool,
    pub aux_public_key: Option<AuxPublicKey>,
    pub commitments: Vec<CoefficientCommitment>,
    /// Backups addressed to this trustee, keyed by sender.
    pub backups: BTreeMap<u32, EncryptedBackup>,
    pub available: bool,
    /// This trustee's duty for the current phase is done.
    pub waiting: bool,
    /// Relative to the current available set only.
    pub lagrange_coefficient: Option<ElementModQ>,
}

impl TrusteeRecord {
    fn new(index: u32, identity: &str, automated: bool) -> Self {
        TrusteeRecord {
            index,
            identity: identity.to_string(),
            automated,
            aux_public_key: None,
            commitments: Vec::new(),
            backups: BTreeMap::new(),
            available: false,
            waiting: false,
            lagrange_coefficient: None,
        }
    }

    /// `g^{a_0}`, published as the first commitment.
    pub fn public_key(&self) -> Result<&ElementModP, Error> {
        self.commitments
            .first()
            .map(CoefficientCommitment::commitment)
            .ok_or_else(|| {
                Error::MissingShare(format!("trustee {} has no commitments", self.index))
            })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Voter {
    pub identity: String,
    pub has_voted: bool,
}

/// What a voter gets back for an accepted ballot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotReceipt {
    pub ballot_id: Uuid,
    pub tracking_code: TrackingCode,
    pub previous_tracking_code: TrackingCode,
}

/// All per-election state, guarded as one unit by the store.
#[derive(Clone)]
pub struct ElectionState {
    pub election: Election,
    pub trustees: Vec<TrusteeRecord>,
    pub voters: Vec<Voter>,
    pub ballots: IndexMap<Uuid, StoredBallot>,
    pub tracking: Option<TrackingChain>,
    /// Snapshot of the tally and spoiled ballots, taken when voting closes.
    pub targets: Option<CiphertextSet>,
    pub partial_decryptions: BTreeMap<u32, ShareSet>,
    /// By computing trustee, then by missing trustee.
    pub compensations: BTreeMap<u32, BTreeMap<u32, ShareSet>>,
    pub result: Option<ElectionResult>,
    pub automated: Option<AutomatedTrustee>,
}

impl ElectionState {
    pub fn new(group: &Group, setup: ElectionSetup) -> Result<Self, Error> {
        setup.validate()?;

        let mut trustees: Vec<TrusteeRecord> = setup
            .trustees
            .iter()
            .enumerate()
            .map(|(i, identity)| TrusteeRecord::new(i as u32 + 1, identity, false))
            .collect();

        let automated = if setup.automated_trustee {
            let index = trustees.len() as u32 + 1;
            let bot = AutomatedTrustee::new(group, index)?;
            let mut record = TrusteeRecord::new(index, AutomatedTrustee::IDENTITY, true);
            record.aux_public_key = Some(bot.aux_public_key().clone());
            record.waiting = true;
            trustees.push(record);
            Some(bot)
        } else {
            None
        };

        let election = Election {
            id: Uuid::new_v4(),
            title: setup.title,
            authority: setup.authority,
            phase: Phase::AuxKeys,
            threshold: setup.threshold,
            trustee_count: trustees.len() as u32,
            manifest: setup.manifest,
            joint_public_key: None,
            commitment_hash: None,
            extended_base_hash: None,
            start_time: None,
            end_time: setup.end_time,
        };

        Ok(ElectionState {
            election,
            trustees,
            voters: setup
                .voters
                .into_iter()
                .map(|identity| Voter {
                    identity,
                    has_voted: false,
                })
                .collect(),
            ballots: IndexMap::new(),
            tracking: None,
            targets: None,
            partial_decryptions: BTreeMap::new(),
            compensations: BTreeMap::new(),
            result: None,
            automated,
        })
    }

    pub fn id(&self) -> Uuid {
        self.election.id
    }

    pub fn phase(&self) -> Phase {
        self.election.phase
    }

    pub fn require_phase(&self, expected: Phase) -> Result<(), Error> {
        if self.election.phase != expected {
            return Err(Error::WrongPhase {
                expected,
                actual: self.election.phase,
            });
        }
        Ok(())
    }

    pub fn trustee(&self, index: u32) -> Result<&TrusteeRecord, Error> {
        self.trustees
            .iter()
            .find(|t| t.index == index)
            .ok_or(Error::TrusteeNotFound(index))
    }

    fn trustee_mut(&mut self, index: u32) -> Result<&mut TrusteeRecord, Error> {
        self.trustees
            .iter_mut()
            .find(|t| t.index == index)
            .ok_or(Error::TrusteeNotFound(index))
    }

    /// The index of the trustee acting as `identity`.
    pub fn trustee_for(&self, identity: &str) -> Result<u32, Error> {
        self.trustees
            .iter()
            .find(|t| t.identity == identity)
            .map(|t| t.index)
            .ok_or_else(|| Error::Unauthorized(identity.to_string()))
    }

    pub fn trustee_indices(&self) -> BTreeSet<u32> {
        self.trustees.iter().map(|t| t.index).collect()
    }

    pub fn available(&self) -> BTreeSet<u32> {
        self.trustees
            .iter()
            .filter(|t| t.available)
            .map(|t| t.index)
            .collect()
    }

    pub fn missing(&self) -> BTreeSet<u32> {
        self.trustees
            .iter()
            .filter(|t| !t.available)
            .map(|t| t.index)
            .collect()
    }

    pub fn reset_waiting(&mut self) {
        for trustee in &mut self.trustees {
            trustee.waiting = false;
        }
    }

    fn not_yet_submitted(&self, index: u32) -> Result<(), Error> {
        if self.trustee(index)?.waiting {
            return Err(Error::DuplicateSubmission(index));
        }
        Ok(())
    }

    fn crypto_context(&self) -> Result<(&ElementModP, &ElementModQ), Error> {
        match (&self.election.joint_public_key, &self.election.extended_base_hash) {
            (Some(key), Some(qbar)) => Ok((key, qbar)),
            _ => Err(Error::WrongPhase {
                expected: Phase::KeyCeremonyFinished,
                actual: self.election.phase,
            }),
        }
    }

    fn targets(&self) -> Result<&CiphertextSet, Error> {
        self.targets.as_ref().ok_or(Error::WrongPhase {
            expected: Phase::PDecryption,
            actual: self.election.phase,
        })
    }

    // Key ceremony

    pub fn accept_aux_key(&mut self, index: u32, key: AuxPublicKey) -> Result<(), Error> {
        self.require_phase(Phase::AuxKeys)?;
        self.not_yet_submitted(index)?;
        let trustee = self.trustee_mut(index)?;
        trustee.aux_public_key = Some(key);
        trustee.waiting = true;
        tracing::info!(election = %self.election.id, trustee = index, "auxiliary key registered");
        Ok(())
    }

    pub fn key_ceremony_request(&self, index: u32) -> Result<KeyCeremonyRequest, Error> {
        self.require_phase(Phase::Epkb)?;
        self.trustee(index)?;
        let mut recipients = BTreeMap::new();
        for trustee in self.trustees.iter().filter(|t| t.index != index) {
            let key = trustee.aux_public_key.clone().ok_or_else(|| {
                Error::MissingShare(format!("trustee {} auxiliary key", trustee.index))
            })?;
            recipients.insert(trustee.index, key);
        }
        Ok(KeyCeremonyRequest {
            election_id: self.election.id,
            trustee_index: index,
            threshold: self.election.threshold,
            recipients,
        })
    }

    pub fn accept_key_ceremony(
        &mut self,
        group: &Group,
        submission: KeyCeremonySubmission,
    ) -> Result<(), Error> {
        self.require_phase(Phase::Epkb)?;
        let sender = submission.trustee_index;
        self.not_yet_submitted(sender)?;

        let verifier = ProofVerifier::key_ceremony(group);
        if let Err(e) = validate_key_ceremony_submission(
            &verifier,
            &submission,
            self.election.threshold,
            &self.trustee_indices(),
        ) {
            tracing::warn!(
                election = %self.election.id,
                trustee = sender,
                error = %e,
                "key ceremony rejected"
            );
            return Err(e);
        }

        for (recipient, backup) in submission.backups {
            self.trustee_mut(recipient)?.backups.insert(sender, backup);
        }
        let trustee = self.trustee_mut(sender)?;
        trustee.commitments = submission.commitments;
        trustee.waiting = true;
        tracing::info!(election = %self.election.id, trustee = sender, "key ceremony accepted");
        Ok(())
    }

    /// Combine the joint key and bind every commitment into the extended base hash,
    /// which also seeds the tracking chain.
    pub fn finish_key_ceremony(&mut self, group: &Group) -> Result<(), Error> {
        let mut primary_keys = Vec::with_capacity(self.trustees.len());
        let mut commitments = BTreeMap::new();
        for trustee in &self.trustees {
            primary_keys.push(trustee.public_key()?);
            commitments.insert(trustee.index, trustee.commitments.clone());
        }
        let joint_key = combine_joint_key(group, primary_keys);
        let commitment_hash = commitment_hash(group, &commitments);
        let qbar = extended_base_hash(
            group,
            self.election.trustee_count,
            self.election.threshold,
            &self.election.manifest.crypto_hash(group),
            &commitment_hash,
        );

        self.tracking = Some(TrackingChain::new(qbar.clone()));
        self.election.joint_public_key = Some(joint_key);
        self.election.commitment_hash = Some(commitment_hash);
        self.election.extended_base_hash = Some(qbar);
        Ok(())
    }

    /// Every backup addressed to `index`, with the senders' commitments.
    pub fn backup_delivery(&self, index: u32) -> Result<BackupDelivery, Error> {
        if self.election.phase < Phase::KeyCeremonyFinished {
            return Err(Error::WrongPhase {
                expected: Phase::KeyCeremonyFinished,
                actual: self.election.phase,
            });
        }
        let recipient = self.trustee(index)?;
        Ok(BackupDelivery {
            election_id: self.election.id,
            recipient: index,
            backups: recipient.backups.clone(),
            commitments: self
                .trustees
                .iter()
                .map(|t| (t.index, t.commitments.clone()))
                .collect(),
        })
    }

    // Voting

    /// Verify a ballot, chain it and store it as spoiled.
    pub fn accept_ballot(
        &mut self,
        group: &Group,
        voter: &str,
        submission: BallotSubmission,
        now: u64,
    ) -> Result<BallotReceipt, Error> {
        self.require_phase(Phase::Open)?;
        let record = self
            .voters
            .iter()
            .find(|v| v.identity == voter)
            .ok_or_else(|| Error::VoterNotFound(voter.to_string()))?;
        if record.has_voted {
            return Err(Error::AlreadyVoted(voter.to_string()));
        }

        let start = self.election.start_time.unwrap_or(0);
        if submission.timestamp < start || submission.timestamp > now {
            return Err(Error::TimestampOutOfRange {
                timestamp: submission.timestamp,
                start,
                now,
            });
        }

        let manifest = &self.election.manifest;
        let (joint_key, qbar) = self.crypto_context()?;
        validate_ballot_shape(manifest, &submission)?;
        let verifier = ProofVerifier::new(group, qbar);
        if let Err(e) = verify_ballot_proofs(&verifier, group, manifest, joint_key, &submission) {
            tracing::warn!(election = %self.election.id, voter, error = %e, "ballot rejected");
            return Err(e);
        }
        let crypto_hash =
            ballot_crypto_hash(group, manifest, &submission.encryption_id, &submission.contests)?;

        let election_id = self.election.id;
        let chain = self.tracking.as_mut().ok_or(Error::WrongPhase {
            expected: Phase::KeyCeremonyFinished,
            actual: Phase::Open,
        })?;
        let (previous, code) = chain.append(group, submission.timestamp, &crypto_hash);

        let ballot = StoredBallot {
            id: Uuid::new_v4(),
            election_id,
            voter: voter.to_string(),
            encryption_id: submission.encryption_id,
            device_info: submission.device_info,
            timestamp: submission.timestamp,
            state: BallotState::Spoiled,
            contests: submission.contests,
            crypto_hash,
            tracking_code: code.clone(),
            previous_tracking_code: previous.clone(),
        };
        let receipt = BallotReceipt {
            ballot_id: ballot.id,
            tracking_code: code,
            previous_tracking_code: previous,
        };
        tracing::info!(
            election = %election_id,
            ballot = %ballot.id,
            tracking_code = %receipt.tracking_code,
            "ballot accepted"
        );
        self.ballots.insert(ballot.id, ballot);
        Ok(receipt)
    }

    /// Cast the spoiled ballot whose tracking code is `code`. Irreversible, and only once
    /// per voter.
    pub fn confirm_ballot(&mut self, voter: &str, code: &TrackingCode) -> Result<(), Error> {
        self.require_phase(Phase::Open)?;
        let ballot = self
            .ballots
            .values()
            .find(|b| &b.tracking_code == code)
            .ok_or_else(|| Error::BallotNotFound(code.to_string()))?;
        if ballot.voter != voter {
            return Err(Error::Unauthorized(voter.to_string()));
        }
        if ballot.state == BallotState::Submitted {
            return Err(Error::BallotAlreadySubmitted(code.to_string()));
        }
        let ballot_id = ballot.id;
        let record = self
            .voters
            .iter_mut()
            .find(|v| v.identity == voter)
            .ok_or_else(|| Error::VoterNotFound(voter.to_string()))?;
        if record.has_voted {
            return Err(Error::AlreadyVoted(voter.to_string()));
        }

        record.has_voted = true;
        if let Some(ballot) = self.ballots.get_mut(&ballot_id) {
            ballot.state = BallotState::Submitted;
        }
        tracing::info!(
            election = %self.election.id,
            ballot = %ballot_id,
            tracking_code = %code,
            "ballot submitted"
        );
        Ok(())
    }

    /// Sum the submitted ballots and snapshot every spoiled one.
    pub fn snapshot_targets(&mut self, group: &Group) -> Result<(), Error> {
        let manifest = &self.election.manifest;
        let tally = accumulate_tallies(group, manifest, self.ballots.values())?;
        let mut spoiled = BTreeMap::new();
        for ballot in self
            .ballots
            .values()
            .filter(|b| b.state == BallotState::Spoiled)
        {
            spoiled.insert(ballot.id, ballot.ciphertexts(manifest)?);
        }
        self.targets = Some(CiphertextSet { tally, spoiled });
        Ok(())
    }

    // Decryption

    pub fn decryption_request(&self, index: u32) -> Result<DecryptionRequest, Error> {
        self.require_phase(Phase::PDecryption)?;
        self.trustee(index)?;
        let (_, qbar) = self.crypto_context()?;
        Ok(DecryptionRequest {
            election_id: self.election.id,
            trustee_index: index,
            extended_base_hash: qbar.clone(),
            targets: self.targets()?.clone(),
        })
    }

    /// Accept a complete, fully proven set of phase P shares. The trustee becomes available.
    pub fn accept_partial_decryption(
        &mut self,
        group: &Group,
        submission: DecryptionSubmission,
    ) -> Result<(), Error> {
        self.require_phase(Phase::PDecryption)?;
        let index = submission.trustee_index;
        self.not_yet_submitted(index)?;

        let (_, qbar) = self.crypto_context()?;
        let verifier = ProofVerifier::new(group, qbar);
        let public_key = self.trustee(index)?.public_key()?;
        let targets = self.targets()?;
        if let Err(e) = verify_share_set(&verifier, targets, &submission.shares, public_key) {
            tracing::warn!(
                election = %self.election.id,
                trustee = index,
                error = %e,
                "partial decryption rejected"
            );
            return Err(e);
        }

        self.partial_decryptions.insert(index, submission.shares);
        let trustee = self.trustee_mut(index)?;
        trustee.available = true;
        trustee.waiting = true;
        tracing::info!(
            election = %self.election.id,
            trustee = index,
            "partial decryption accepted"
        );
        Ok(())
    }

    /// Recompute every Lagrange coefficient over the current available set.
    pub fn update_lagrange_coefficients(&mut self, group: &Group) {
        let coefficients = lagrange_coefficients(group, &self.available());
        for trustee in &mut self.trustees {
            trustee.lagrange_coefficient = coefficients.get(&trustee.index).cloned();
        }
    }

    pub fn compensation_request(&self, index: u32) -> Result<CompensationRequest, Error> {
        self.require_phase(Phase::PpDecryption)?;
        if !self.trustee(index)?.available {
            return Err(Error::Unauthorized(format!("trustee {} is not available", index)));
        }
        let (_, qbar) = self.crypto_context()?;
        Ok(CompensationRequest {
            election_id: self.election.id,
            trustee_index: index,
            extended_base_hash: qbar.clone(),
            targets: self.targets()?.clone(),
            missing: self.missing(),
        })
    }

    /// Accept compensating shares covering exactly the missing trustees, each proven
    /// against that trustee's recovery key for the submitter.
    pub fn accept_compensation(
        &mut self,
        group: &Group,
        submission: CompensationSubmission,
    ) -> Result<(), Error> {
        self.require_phase(Phase::PpDecryption)?;
        let index = submission.trustee_index;
        if !self.trustee(index)?.available {
            return Err(Error::Unauthorized(format!("trustee {} is not available", index)));
        }
        self.not_yet_submitted(index)?;

        let missing = self.missing();
        let covered: BTreeSet<u32> = submission.compensations.keys().copied().collect();
        if covered != missing {
            return Err(Error::ShapeMismatch(format!(
                "trustee {} compensated for {:?}, missing trustees are {:?}",
                index, covered, missing
            )));
        }

        let (_, qbar) = self.crypto_context()?;
        let verifier = ProofVerifier::new(group, qbar);
        let targets = self.targets()?;
        for (&absent, shares) in &submission.compensations {
            let recovery_key =
                generate_backup_share(group, &self.trustee(absent)?.commitments, index);
            if let Err(e) = verify_share_set(&verifier, targets, shares, &recovery_key) {
                tracing::warn!(
                    election = %self.election.id,
                    trustee = index,
                    missing = absent,
                    error = %e,
                    "compensation rejected"
                );
                return Err(e);
            }
        }

        self.compensations.insert(index, submission.compensations);
        self.trustee_mut(index)?.waiting = true;
        tracing::info!(election = %self.election.id, trustee = index, "compensation accepted");
        Ok(())
    }

    /// Combine every share and store the cleartext result.
    pub fn decrypt(&mut self, group: &Group, dlog: &DiscreteLog) -> Result<(), Error> {
        let available = self.available();
        let missing = self.missing();
        if (available.len() as u32) < self.election.threshold {
            return Err(Error::NotEnoughTrustees {
                needed: self.election.threshold,
                available: available.len() as u32,
            });
        }

        let lagrange: BTreeMap<u32, ElementModQ> = self
            .trustees
            .iter()
            .filter_map(|t| t.lagrange_coefficient.clone().map(|w| (t.index, w)))
            .collect();
        let collection = ShareCollection {
            partial: &self.partial_decryptions,
            compensations: &self.compensations,
            lagrange: &lagrange,
            available: &available,
            missing: &missing,
        };
        let result = decrypt_targets(
            group,
            dlog,
            &self.election.manifest,
            self.targets()?,
            &collection,
        )?;
        self.result = Some(result);
        Ok(())
    }

    pub fn tracking_log(&self) -> Result<TrackingLog, Error> {
        let chain = self.tracking.as_ref().ok_or(Error::WrongPhase {
            expected: Phase::KeyCeremonyFinished,
            actual: self.election.phase,
        })?;
        Ok(TrackingLog {
            election_id: self.election.id,
            genesis: chain.genesis().clone(),
            entries: chain.entries().to_vec(),
        })
    }
}
