use crate::*;
use indexmap::IndexMap;
use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// One trustee's decryption share `alpha^s` for one ciphertext, with its proof.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DecryptionShare {
    pub share: ElementModP,
    pub proof: ChaumPedersenProof,
}

impl DecryptionShare {
    /// `secret` is either a primary secret `a_0` or, when compensating, a backup
    /// coordinate `P_M(A)`.
    pub fn compute<R: RngCore + CryptoRng>(
        group: &Group,
        rng: &mut R,
        ciphertext: &Ciphertext,
        secret: &ElementModQ,
        extended_base_hash: &ElementModQ,
    ) -> Self {
        let share = ciphertext.partial_decrypt(group, secret);
        let proof = ChaumPedersenProof::make_decryption(
            group,
            ciphertext,
            secret,
            &share,
            &group.rand_q(rng),
            extended_base_hash,
        );
        DecryptionShare { share, proof }
    }
}

/// Everything that gets decrypted after voting closes: the tally and every spoiled ballot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CiphertextSet {
    pub tally: ContestMap<Ciphertext>,
    pub spoiled: BTreeMap<Uuid, ContestMap<Ciphertext>>,
}

/// Decryption shares laid out exactly like a [`CiphertextSet`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShareSet {
    pub tally: ContestMap<DecryptionShare>,
    pub spoiled: BTreeMap<Uuid, ContestMap<DecryptionShare>>,
}

impl ShareSet {
    fn get(&self, ballot: Option<&Uuid>, contest: &str, option: &str) -> Option<&DecryptionShare> {
        let contests = match ballot {
            None => &self.tally,
            Some(id) => self.spoiled.get(id)?,
        };
        contests.get(contest)?.get(option)
    }
}

impl CiphertextSet {
    /// Apply `f` to every ciphertext, keeping the layout.
    pub fn map_shares<F>(&self, mut f: F) -> ShareSet
    where
        F: FnMut(&Ciphertext) -> DecryptionShare,
    {
        let mut map = |contests: &ContestMap<Ciphertext>| -> ContestMap<DecryptionShare> {
            contests
                .iter()
                .map(|(contest, options)| {
                    let shares = options.iter().map(|(o, c)| (o.clone(), f(c))).collect();
                    (contest.clone(), shares)
                })
                .collect()
        };
        let tally = map(&self.tally);
        let spoiled = self
            .spoiled
            .iter()
            .map(|(id, contests)| (*id, map(contests)))
            .collect();
        ShareSet { tally, spoiled }
    }

    /// Every ciphertext with its position:
    /// `(spoiled ballot id or None for the tally, contest, option)`.
    fn targets(&self) -> impl Iterator<Item = (Option<&Uuid>, &str, &str, &Ciphertext)> {
        let tally = flatten(&self.tally).map(|(c, o, x)| (None, c, o, x));
        let spoiled = self
            .spoiled
            .iter()
            .flat_map(|(id, contests)| flatten(contests).map(move |(c, o, x)| (Some(id), c, o, x)));
        tally.chain(spoiled)
    }
}

fn flatten<T>(contests: &ContestMap<T>) -> impl Iterator<Item = (&str, &str, &T)> {
    contests.iter().flat_map(|(contest, options)| {
        options
            .iter()
            .map(move |(option, value)| (contest.as_str(), option.as_str(), value))
    })
}

/// What a trustee needs for its phase P duty.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecryptionRequest {
    pub election_id: Uuid,
    pub trustee_index: u32,
    pub extended_base_hash: ElementModQ,
    pub targets: CiphertextSet,
}

/// What an available trustee needs to compensate for the missing ones in phase PP.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompensationRequest {
    pub election_id: Uuid,
    pub trustee_index: u32,
    pub extended_base_hash: ElementModQ,
    pub targets: CiphertextSet,
    pub missing: BTreeSet<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecryptionSubmission {
    pub trustee_index: u32,
    pub shares: ShareSet,
}

/// Compensating shares, keyed by the missing trustee they stand in for.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompensationSubmission {
    pub trustee_index: u32,
    pub compensations: BTreeMap<u32, ShareSet>,
}

fn same_keys<'a, A, B, I, J>(expected: I, found: J, what: &str) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a A>,
    J: IntoIterator<Item = &'a B>,
    A: AsRef<str> + 'a + ?Sized,
    B: AsRef<str> + 'a + ?Sized,
{
    let expected: BTreeSet<&str> = expected.into_iter().map(|k| k.as_ref()).collect();
    let found: BTreeSet<&str> = found.into_iter().map(|k| k.as_ref()).collect();
    if expected != found {
        return Err(Error::ShapeMismatch(format!(
            "{} covers {:?}, expected {:?}",
            what, found, expected
        )));
    }
    Ok(())
}

fn same_shape<T>(
    targets: &ContestMap<Ciphertext>,
    shares: &ContestMap<T>,
    what: &str,
) -> Result<(), Error> {
    same_keys(targets.keys(), shares.keys(), what)?;
    for (contest, options) in targets {
        let found = shares
            .get(contest)
            .ok_or_else(|| Error::SelectionNotFound(contest.clone()))?;
        same_keys(options.keys(), found.keys(), what)?;
    }
    Ok(())
}

/// Check that `shares` covers exactly `targets` and that every share is proven against
/// `public_key`. One bad share rejects the whole set.
pub fn verify_share_set(
    verifier: &ProofVerifier,
    targets: &CiphertextSet,
    shares: &ShareSet,
    public_key: &ElementModP,
) -> Result<(), Error> {
    same_shape(&targets.tally, &shares.tally, "tally shares")?;
    let expected: Vec<String> = targets.spoiled.keys().map(Uuid::to_string).collect();
    let found: Vec<String> = shares.spoiled.keys().map(Uuid::to_string).collect();
    same_keys(&expected, &found, "spoiled ballot shares")?;
    for (id, contests) in &targets.spoiled {
        let found = shares
            .spoiled
            .get(id)
            .ok_or_else(|| Error::BallotNotFound(id.to_string()))?;
        same_shape(contests, found, "spoiled ballot shares")?;
    }

    for (ballot, contest, option, ciphertext) in targets.targets() {
        let share = shares
            .get(ballot, contest, option)
            .ok_or_else(|| Error::MissingShare(option.to_string()))?;
        verifier.verify(Attestation::Decryption {
            proof: &share.proof,
            ciphertext,
            public_key,
            share: &share.share,
        })?;
    }
    Ok(())
}

/// `prod_A M_{M,A}^{w_A}`: rebuild a missing trustee's share from the compensating shares
/// of the available trustees, keyed by their index.
pub fn reconstruct_missing_share(
    group: &Group,
    compensating: &BTreeMap<u32, &ElementModP>,
    lagrange: &BTreeMap<u32, ElementModQ>,
) -> Result<ElementModP, Error> {
    let mut product = group.one_p();
    for (index, coefficient) in lagrange {
        let share = compensating
            .get(index)
            .ok_or_else(|| Error::MissingShare(format!("compensation from trustee {}", index)))?;
        product = group.mul_p(&product, &group.pow_p(share, coefficient));
    }
    Ok(product)
}

/// Multiply every share for one ciphertext, strip it off the data component and search
/// for the plaintext.
pub fn combine_shares<'a, I>(
    group: &Group,
    dlog: &DiscreteLog,
    ciphertext: &Ciphertext,
    shares: I,
) -> Result<u64, Error>
where
    I: IntoIterator<Item = &'a ElementModP>,
{
    let combined = group.product_p(shares);
    dlog.solve(&ciphertext.unblind(group, &combined))
}

/// Cleartext counts per contest, aligned with the contest's real options.
pub type ContestResults = IndexMap<String, Vec<u64>>;

/// Decrypted tally plus every spoiled ballot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionResult {
    pub tally: ContestResults,
    pub spoiled: BTreeMap<Uuid, ContestResults>,
}

/// Shares collected for one decryption round.
pub struct ShareCollection<'a> {
    /// Phase P shares, keyed by trustee index. Every available trustee must be present.
    pub partial: &'a BTreeMap<u32, ShareSet>,
    /// Phase PP shares, keyed by computing trustee then by missing trustee.
    pub compensations: &'a BTreeMap<u32, BTreeMap<u32, ShareSet>>,
    /// Lagrange coefficients over the available set. Empty when nobody is missing.
    pub lagrange: &'a BTreeMap<u32, ElementModQ>,
    pub available: &'a BTreeSet<u32>,
    pub missing: &'a BTreeSet<u32>,
}

/// Decrypt every target. Placeholders are decrypted too but left out of the result.
pub fn decrypt_targets(
    group: &Group,
    dlog: &DiscreteLog,
    manifest: &Manifest,
    targets: &CiphertextSet,
    collection: &ShareCollection,
) -> Result<ElectionResult, Error> {
    if collection.available.is_empty() {
        return Err(Error::NotEnoughTrustees {
            needed: 1,
            available: 0,
        });
    }

    let decrypt_contests = |ballot: Option<&Uuid>, contests: &ContestMap<Ciphertext>| {
        let mut results = ContestResults::new();
        for description in &manifest.contests {
            let options = contests
                .get(&description.object_id)
                .ok_or_else(|| Error::SelectionNotFound(description.object_id.clone()))?;
            let mut counts = Vec::with_capacity(description.num_real_options());
            for option in description.all_options() {
                let ciphertext = options
                    .get(&option.object_id)
                    .ok_or_else(|| Error::SelectionNotFound(option.object_id.clone()))?;
                let shares = collect_shares(
                    group,
                    collection,
                    ballot,
                    &description.object_id,
                    &option.object_id,
                )?;
                let count = combine_shares(group, dlog, ciphertext, &shares)?;
                if !option.placeholder {
                    counts.push(count);
                }
            }
            results.insert(description.object_id.clone(), counts);
        }
        Ok::<_, Error>(results)
    };

    let tally = decrypt_contests(None, &targets.tally)?;
    let mut spoiled = BTreeMap::new();
    for (id, contests) in &targets.spoiled {
        spoiled.insert(*id, decrypt_contests(Some(id), contests)?);
    }

    tracing::info!(
        contests = tally.len(),
        spoiled = spoiled.len(),
        missing = collection.missing.len(),
        "decryption complete"
    );
    Ok(ElectionResult { tally, spoiled })
}

fn collect_shares(
    group: &Group,
    collection: &ShareCollection,
    ballot: Option<&Uuid>,
    contest: &str,
    option: &str,
) -> Result<Vec<ElementModP>, Error> {
    let mut shares = Vec::with_capacity(collection.available.len() + collection.missing.len());
    for index in collection.available {
        let share = collection
            .partial
            .get(index)
            .and_then(|set| set.get(ballot, contest, option))
            .ok_or_else(|| {
                Error::MissingShare(format!("trustee {} share for {}", index, option))
            })?;
        shares.push(share.share.clone());
    }

    for missing in collection.missing {
        let mut compensating = BTreeMap::new();
        for index in collection.available {
            let share = collection
                .compensations
                .get(index)
                .and_then(|by_missing| by_missing.get(missing))
                .and_then(|set| set.get(ballot, contest, option))
                .ok_or_else(|| {
                    Error::MissingShare(format!(
                        "trustee {} compensation for trustee {} on {}",
                        index, missing, option
                    ))
                })?;
            compensating.insert(*index, &share.share);
        }
        shares.push(reconstruct_missing_share(group, &compensating, collection.lagrange)?);
    }
    Ok(shares)
}

/// Lagrange coefficient of every available trustee, relative to the available set.
pub fn lagrange_coefficients(
    group: &Group,
    available: &BTreeSet<u32>,
) -> BTreeMap<u32, ElementModQ> {
    let indices: Vec<u32> = available.iter().copied().collect();
    indices
        .iter()
        .map(|&i| (i, lagrange_coefficient(group, i, &indices)))
        .collect()
}
