use crate::*;
use std::fmt;
use std::str::FromStr;

/// A voter-visible tracking code: hex of a hash chained over every earlier ballot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TrackingCode(pub ElementModQ);

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackingCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TrackingCode(s.parse()?))
    }
}

/// `H(latest, timestamp, crypto_hash)`
pub fn next_tracking_code(
    group: &Group,
    latest: &ElementModQ,
    timestamp: u64,
    crypto_hash: &ElementModQ,
) -> TrackingCode {
    TrackingCode(hash_elems(
        group,
        &[latest.into(), timestamp.into(), crypto_hash.into()],
    ))
}

/// Hash of one encrypted ballot's content, in manifest contest/option order:
/// `H(ballot_id, manifest_hash, contest...)` where each contest is
/// `H(contest_id, contest_hash, [H(option_id, option_hash, H(ciphertext))...])`
pub fn ballot_crypto_hash(
    group: &Group,
    manifest: &Manifest,
    encryption_id: &str,
    contests: &[EncryptedContest],
) -> Result<ElementModQ, Error> {
    let manifest_hash = manifest.crypto_hash(group);

    let mut contest_hashes = Vec::with_capacity(manifest.contests.len());
    for description in &manifest.contests {
        let contest = contests
            .iter()
            .find(|c| c.object_id == description.object_id)
            .ok_or_else(|| Error::SelectionNotFound(description.object_id.clone()))?;

        let mut selection_hashes = Vec::with_capacity(description.all_options().len());
        for option in description.all_options() {
            let selection = contest
                .selections
                .iter()
                .find(|s| s.object_id == option.object_id)
                .ok_or_else(|| Error::SelectionNotFound(option.object_id.clone()))?;
            let option_hash = option.crypto_hash(group);
            let ciphertext_hash = selection.ciphertext.crypto_hash(group);
            selection_hashes.push(hash_elems(
                group,
                &[
                    (&option.object_id).into(),
                    (&option_hash).into(),
                    (&ciphertext_hash).into(),
                ],
            ));
        }

        let description_hash = description.crypto_hash(group);
        contest_hashes.push(hash_elems(
            group,
            &[
                (&description.object_id).into(),
                (&description_hash).into(),
                selection_hashes.iter().collect::<Vec<_>>().into(),
            ],
        ));
    }

    let mut elems: Vec<HashElem> = vec![encryption_id.into(), (&manifest_hash).into()];
    elems.extend(contest_hashes.iter().map(HashElem::from));
    Ok(hash_elems(group, &elems))
}

/// One link of the chain as it is published for audit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TrackingEntry {
    pub timestamp: u64,
    pub crypto_hash: ElementModQ,
    pub previous: TrackingCode,
    pub code: TrackingCode,
}

/// The per-election chain head. Appending takes `&mut self`, so the owner's lock
/// totally orders concurrent ballots.
#[derive(Debug, Clone)]
pub struct TrackingChain {
    genesis: ElementModQ,
    head: ElementModQ,
    entries: Vec<TrackingEntry>,
}

impl TrackingChain {
    /// Start a chain at the election's extended base hash.
    pub fn new(genesis: ElementModQ) -> Self {
        TrackingChain {
            head: genesis.clone(),
            genesis,
            entries: Vec::new(),
        }
    }

    pub fn head(&self) -> TrackingCode {
        TrackingCode(self.head.clone())
    }

    pub fn genesis(&self) -> &ElementModQ {
        &self.genesis
    }

    pub fn entries(&self) -> &[TrackingEntry] {
        &self.entries
    }

    /// Append a ballot and return `(previous, new)` codes.
    pub fn append(
        &mut self,
        group: &Group,
        timestamp: u64,
        crypto_hash: &ElementModQ,
    ) -> (TrackingCode, TrackingCode) {
        let previous = self.head();
        let code = next_tracking_code(group, &self.head, timestamp, crypto_hash);
        self.head = code.0.clone();
        self.entries.push(TrackingEntry {
            timestamp,
            crypto_hash: crypto_hash.clone(),
            previous: previous.clone(),
            code: code.clone(),
        });
        (previous, code)
    }
}

/// The published chain of one election.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TrackingLog {
    pub election_id: uuid::Uuid,
    pub genesis: ElementModQ,
    pub entries: Vec<TrackingEntry>,
}

impl TrackingLog {
    pub fn verify(&self, group: &Group) -> Result<(), Error> {
        verify_chain(group, &self.genesis, &self.entries)
    }
}

/// Recompute every code from `genesis`. Fails at the first entry that does not follow
/// from its predecessor, so one altered hash breaks everything after it.
pub fn verify_chain(
    group: &Group,
    genesis: &ElementModQ,
    entries: &[TrackingEntry],
) -> Result<(), Error> {
    let mut latest = genesis.clone();
    for (position, entry) in entries.iter().enumerate() {
        let expected = next_tracking_code(group, &latest, entry.timestamp, &entry.crypto_hash);
        if entry.previous.0 != latest || expected != entry.code {
            return Err(Error::ProofFailed(format!(
                "tracking chain at position {}",
                position
            )));
        }
        latest = expected.0;
    }
    Ok(())
}
