use crate::*;
use indexmap::IndexMap;
use uuid::Uuid;

/// Per-contest, per-option values in manifest order (contest id, then option id).
pub type ContestMap<T> = IndexMap<String, IndexMap<String, T>>;

/// One option's ciphertext and its 0-or-1 proof.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSelection {
    pub object_id: String,
    pub ciphertext: Ciphertext,
    pub proof: DisjunctiveChaumPedersenProof,
}

/// All of a contest's selections (placeholders included) and the proof that they sum to `max`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContest {
    pub object_id: String,
    pub selections: Vec<EncryptedSelection>,
    pub proof: ConstantChaumPedersenProof,
}

impl EncryptedContest {
    pub fn aggregate(&self, group: &Group) -> Ciphertext {
        Ciphertext::accumulate(group, self.selections.iter().map(|s| &s.ciphertext))
    }
}

/// What a voter's device sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotSubmission {
    /// Public identifier chosen by the encrypting device, folded into the crypto hash.
    pub encryption_id: String,
    pub device_info: String,
    pub timestamp: u64,
    pub contests: Vec<EncryptedContest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotState {
    /// Stored and inspectable, not counted.
    Spoiled,
    /// Cast. Irreversible.
    Submitted,
}

/// A ballot accepted by the server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredBallot {
    pub id: Uuid,
    pub election_id: Uuid,
    pub voter: String,
    pub encryption_id: String,
    pub device_info: String,
    pub timestamp: u64,
    pub state: BallotState,
    pub contests: Vec<EncryptedContest>,
    pub crypto_hash: ElementModQ,
    pub tracking_code: TrackingCode,
    pub previous_tracking_code: TrackingCode,
}

impl StoredBallot {
    /// Ciphertexts keyed by contest and option, in manifest order.
    pub fn ciphertexts(&self, manifest: &Manifest) -> Result<ContestMap<Ciphertext>, Error> {
        let mut map = ContestMap::new();
        for description in &manifest.contests {
            let contest = find_contest(&self.contests, &description.object_id)?;
            let mut options = IndexMap::new();
            for option in description.all_options() {
                let selection = find_selection(contest, &option.object_id)?;
                options.insert(option.object_id.clone(), selection.ciphertext.clone());
            }
            map.insert(description.object_id.clone(), options);
        }
        Ok(map)
    }
}

fn find_contest<'a>(
    contests: &'a [EncryptedContest],
    id: &str,
) -> Result<&'a EncryptedContest, Error> {
    contests
        .iter()
        .find(|c| c.object_id == id)
        .ok_or_else(|| Error::SelectionNotFound(id.to_string()))
}

fn find_selection<'a>(
    contest: &'a EncryptedContest,
    id: &str,
) -> Result<&'a EncryptedSelection, Error> {
    contest
        .selections
        .iter()
        .find(|s| s.object_id == id)
        .ok_or_else(|| Error::SelectionNotFound(id.to_string()))
}

/// The ballot must carry exactly the manifest's contests, each with exactly its
/// `options + max` selections.
pub fn validate_ballot_shape(manifest: &Manifest, ballot: &BallotSubmission) -> Result<(), Error> {
    if ballot.contests.len() != manifest.contests.len() {
        return Err(Error::ShapeMismatch(format!(
            "expected {} contests, found {}",
            manifest.contests.len(),
            ballot.contests.len()
        )));
    }

    for description in &manifest.contests {
        let matching = ballot
            .contests
            .iter()
            .filter(|c| c.object_id == description.object_id)
            .count();
        if matching != 1 {
            return Err(Error::ShapeMismatch(format!(
                "contest {} appears {} times",
                description.object_id, matching
            )));
        }
        let contest = find_contest(&ballot.contests, &description.object_id)?;

        let expected = description.all_options();
        if contest.selections.len() != expected.len() {
            return Err(Error::ShapeMismatch(format!(
                "contest {} needs {} selections, found {}",
                description.object_id,
                expected.len(),
                contest.selections.len()
            )));
        }
        for option in expected {
            let matching = contest
                .selections
                .iter()
                .filter(|s| s.object_id == option.object_id)
                .count();
            if matching != 1 {
                return Err(Error::ShapeMismatch(format!(
                    "selection {} appears {} times",
                    option.object_id, matching
                )));
            }
        }
    }
    Ok(())
}

/// Check every selection proof, then every contest-sum proof. Fails on the first bad proof.
pub fn verify_ballot_proofs(
    verifier: &ProofVerifier,
    group: &Group,
    manifest: &Manifest,
    joint_public_key: &ElementModP,
    ballot: &BallotSubmission,
) -> Result<(), Error> {
    for description in &manifest.contests {
        let contest = find_contest(&ballot.contests, &description.object_id)?;
        for selection in &contest.selections {
            verifier
                .verify(Attestation::Selection {
                    proof: &selection.proof,
                    ciphertext: &selection.ciphertext,
                    public_key: joint_public_key,
                })
                .map_err(|e| {
                    tracing::debug!(selection = %selection.object_id, "selection proof rejected");
                    e
                })?;
        }

        let aggregate = contest.aggregate(group);
        verifier
            .verify(Attestation::ContestSum {
                proof: &contest.proof,
                ciphertext: &aggregate,
                public_key: joint_public_key,
                expected: description.max as u64,
            })
            .map_err(|e| {
                tracing::debug!(contest = %contest.object_id, "contest sum proof rejected");
                e
            })?;
    }
    Ok(())
}

/// Sum every submitted ballot's ciphertexts per (contest, option).
///
/// Recomputed from scratch on each call. Options nobody voted on hold the neutral ciphertext.
pub fn accumulate_tallies<'a, I>(
    group: &Group,
    manifest: &Manifest,
    ballots: I,
) -> Result<ContestMap<Ciphertext>, Error>
where
    I: IntoIterator<Item = &'a StoredBallot>,
{
    let mut tallies: ContestMap<Ciphertext> = manifest
        .contests
        .iter()
        .map(|contest| {
            let options = contest
                .all_options()
                .iter()
                .map(|o| (o.object_id.clone(), Ciphertext::zero(group)))
                .collect();
            (contest.object_id.clone(), options)
        })
        .collect();

    for ballot in ballots
        .into_iter()
        .filter(|b| b.state == BallotState::Submitted)
    {
        for (contest_id, options) in ballot.ciphertexts(manifest)? {
            let contest_tally = tallies
                .get_mut(&contest_id)
                .ok_or_else(|| Error::SelectionNotFound(contest_id.clone()))?;
            for (option_id, ciphertext) in options {
                let sum = contest_tally
                    .get_mut(&option_id)
                    .ok_or_else(|| Error::SelectionNotFound(option_id.clone()))?;
                *sum = sum.add(group, &ciphertext);
            }
        }
    }

    Ok(tallies)
}
