use crate::*;
use indexmap::IndexMap;
use rand::{CryptoRng, RngCore};

/// Votes per contest, one 0/1 entry per real option.
pub type PlaintextBallot = IndexMap<String, Vec<u64>>;

/// Encrypts ballots the way a voting device does.
pub struct BallotEncryptor<'a> {
    group: &'a Group,
    manifest: &'a Manifest,
    public_key: &'a ElementModP,
    context: &'a ElementModQ,
}

impl<'a> BallotEncryptor<'a> {
    pub fn new(
        group: &'a Group,
        manifest: &'a Manifest,
        public_key: &'a ElementModP,
        extended_base_hash: &'a ElementModQ,
    ) -> Self {
        BallotEncryptor {
            group,
            manifest,
            public_key,
            context: extended_base_hash,
        }
    }

    /// Encrypt one selection, returning the nonce for the contest-sum proof.
    pub fn encrypt_selection<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        object_id: &str,
        plaintext: u64,
    ) -> Result<(EncryptedSelection, ElementModQ), Error> {
        let (ciphertext, nonce) = Ciphertext::encrypt(self.group, rng, plaintext, self.public_key);
        let proof = DisjunctiveChaumPedersenProof::make(
            self.group,
            rng,
            &ciphertext,
            &nonce,
            self.public_key,
            plaintext,
            self.context,
        )?;
        let selection = EncryptedSelection {
            object_id: object_id.to_string(),
            ciphertext,
            proof,
        };
        Ok((selection, nonce))
    }

    /// Encrypt a contest; placeholders are switched on until the selections sum to `max`.
    pub fn encrypt_contest<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        description: &ContestDescription,
        votes: &[u64],
    ) -> Result<EncryptedContest, Error> {
        if votes.len() != description.num_real_options() {
            return Err(Error::ShapeMismatch(format!(
                "contest {} has {} options, {} votes given",
                description.object_id,
                description.num_real_options(),
                votes.len()
            )));
        }
        let selected: u64 = votes.iter().sum();
        if votes.iter().any(|&v| v > 1) || selected > description.max as u64 {
            return Err(Error::ShapeMismatch(format!(
                "contest {} allows at most {} single selections",
                description.object_id, description.max
            )));
        }

        let mut remaining = description.max as u64 - selected;
        let mut plaintexts = votes.iter();
        let mut selections = Vec::with_capacity(description.all_options().len());
        let mut aggregate_nonce = self.group.zero_q();
        for option in description.all_options() {
            let plaintext = if option.placeholder {
                if remaining > 0 {
                    remaining -= 1;
                    1
                } else {
                    0
                }
            } else {
                plaintexts.next().copied().unwrap_or(0)
            };
            let (selection, nonce) = self.encrypt_selection(rng, &option.object_id, plaintext)?;
            aggregate_nonce = self.group.add_q(&aggregate_nonce, &nonce);
            selections.push(selection);
        }

        let proof =
            self.contest_sum_proof(rng, &selections, &aggregate_nonce, description.max as u64);
        Ok(EncryptedContest {
            object_id: description.object_id.clone(),
            selections,
            proof,
        })
    }

    /// Prove that the contest's selections sum to `constant`, given the summed nonce.
    pub fn contest_sum_proof<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        selections: &[EncryptedSelection],
        aggregate_nonce: &ElementModQ,
        constant: u64,
    ) -> ConstantChaumPedersenProof {
        let aggregate =
            Ciphertext::accumulate(self.group, selections.iter().map(|s| &s.ciphertext));
        ConstantChaumPedersenProof::make(
            self.group,
            &aggregate,
            aggregate_nonce,
            self.public_key,
            constant,
            &self.group.rand_q(rng),
            self.context,
        )
    }

    pub fn encrypt_ballot<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        encryption_id: &str,
        device_info: &str,
        timestamp: u64,
        votes: &PlaintextBallot,
    ) -> Result<BallotSubmission, Error> {
        let mut contests = Vec::with_capacity(self.manifest.contests.len());
        for description in &self.manifest.contests {
            let contest_votes = votes
                .get(&description.object_id)
                .cloned()
                .unwrap_or_else(|| vec![0; description.num_real_options()]);
            contests.push(self.encrypt_contest(rng, description, &contest_votes)?);
        }
        Ok(BallotSubmission {
            encryption_id: encryption_id.to_string(),
            device_info: device_info.to_string(),
            timestamp,
            contests,
        })
    }
}
