use crate::*;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A transport-encrypted polynomial coordinate, addressed to one recipient.
/// The wire form is `senderIndex;shareHex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBackup {
    pub sender: u32,
    pub share: Vec<u8>,
}

/// One trustee's key-ceremony contribution: `t` proven coefficient commitments and one
/// backup per other trustee, keyed by recipient index.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyCeremonySubmission {
    pub trustee_index: u32,
    pub commitments: Vec<CoefficientCommitment>,
    pub backups: BTreeMap<u32, EncryptedBackup>,
}

/// What a trustee needs to build its [`KeyCeremonySubmission`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyCeremonyRequest {
    pub election_id: Uuid,
    pub trustee_index: u32,
    pub threshold: u32,
    /// Auxiliary keys of every other trustee.
    pub recipients: BTreeMap<u32, AuxPublicKey>,
}

/// Backups addressed to one trustee, with the senders' public commitments to check them against.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackupDelivery {
    pub election_id: Uuid,
    pub recipient: u32,
    pub backups: BTreeMap<u32, EncryptedBackup>,
    pub commitments: BTreeMap<u32, Vec<CoefficientCommitment>>,
}

/// Multiply every trustee's primary public key. The group is commutative, so order is irrelevant.
pub fn combine_joint_key<'a, I>(group: &Group, public_keys: I) -> ElementModP
where
    I: IntoIterator<Item = &'a ElementModP>,
{
    group.product_p(public_keys)
}

/// The public image `g^{P(recipient)}` of a sender's backup for `recipient`, from commitments only.
///
/// Recipients check decrypted backups against it, and it is the public key a compensating
/// decryption share is proven against.
pub fn generate_backup_share(
    group: &Group,
    commitments: &[CoefficientCommitment],
    recipient_index: u32,
) -> ElementModP {
    compute_recovery_public_key(group, commitments, recipient_index)
}

/// Validate a whole submission. Nothing is accepted unless everything checks out.
///
/// 1. The sender is one of `trustee_indices`
/// 2. Exactly `threshold` commitments, in coefficient order
/// 3. Every Schnorr proof verifies
/// 4. Exactly one backup per other trustee, each naming the submitter as sender
pub fn validate_key_ceremony_submission(
    verifier: &ProofVerifier,
    submission: &KeyCeremonySubmission,
    threshold: u32,
    trustee_indices: &BTreeSet<u32>,
) -> Result<(), Error> {
    let sender = submission.trustee_index;
    if !trustee_indices.contains(&sender) {
        return Err(Error::TrusteeNotFound(sender));
    }

    if submission.commitments.len() != threshold as usize {
        return Err(Error::ShapeMismatch(format!(
            "trustee {} published {} commitments, threshold is {}",
            sender,
            submission.commitments.len(),
            threshold
        )));
    }
    for (position, commitment) in submission.commitments.iter().enumerate() {
        if commitment.order != position as u32 {
            return Err(Error::ShapeMismatch(format!(
                "trustee {} commitment {} has order {}",
                sender, position, commitment.order
            )));
        }
        verifier.verify(Attestation::Schnorr {
            proof: &commitment.proof,
        })?;
    }

    let expected: BTreeSet<u32> = trustee_indices
        .iter()
        .copied()
        .filter(|&i| i != sender)
        .collect();
    let received: BTreeSet<u32> = submission.backups.keys().copied().collect();
    if expected != received {
        return Err(Error::ShapeMismatch(format!(
            "trustee {} sent backups for {:?}, expected {:?}",
            sender, received, expected
        )));
    }
    if let Some(backup) = submission.backups.values().find(|b| b.sender != sender) {
        return Err(Error::ShapeMismatch(format!(
            "backup from trustee {} claims sender {}",
            sender, backup.sender
        )));
    }

    Ok(())
}

/// Hash of every trustee's commitments, in trustee index order.
pub fn commitment_hash(
    group: &Group,
    commitments: &BTreeMap<u32, Vec<CoefficientCommitment>>,
) -> ElementModQ {
    let elems: Vec<HashElem> = commitments
        .values()
        .map(|trustee| {
            HashElem::Seq(trustee.iter().map(|c| c.commitment().into()).collect())
        })
        .collect();
    hash_elems(group, &elems)
}

/// `Qbar = H(H(p, q, g, n, t, manifest_hash), commitment_hash)`
pub fn extended_base_hash(
    group: &Group,
    trustee_count: u32,
    threshold: u32,
    manifest_hash: &ElementModQ,
    commitment_hash: &ElementModQ,
) -> ElementModQ {
    let p = ElementModP(group.p().clone());
    let q = ElementModQ(group.q().clone());
    let g = group.generator();
    let base = hash_elems(
        group,
        &[
            (&p).into(),
            (&q).into(),
            (&g).into(),
            trustee_count.into(),
            threshold.into(),
            manifest_hash.into(),
        ],
    );
    hash_elems(group, &[(&base).into(), commitment_hash.into()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn indices(n: u32) -> BTreeSet<u32> {
        (1..=n).collect()
    }

    fn submission(
        group: &Group,
        index: u32,
        threshold: u32,
        n: u32,
    ) -> (ElectionPolynomial, KeyCeremonySubmission) {
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(group, &mut rng, threshold);
        let backups = (1..=n)
            .filter(|&i| i != index)
            .map(|i| {
                let share = polynomial.coordinate(group, i).to_hex().into_bytes();
                (i, EncryptedBackup { sender: index, share })
            })
            .collect();
        let submission = KeyCeremonySubmission {
            trustee_index: index,
            commitments: polynomial.commitments().to_vec(),
            backups,
        };
        (polynomial, submission)
    }

    #[quickcheck]
    fn quickcheck_joint_key_order_independent(exponents: Vec<u64>, rotation: usize) -> bool {
        let group = Group::reduced();
        let keys: Vec<ElementModP> = exponents
            .iter()
            .map(|&e| group.g_pow(&group.q_from_u64(e)))
            .collect();

        let mut reversed = keys.clone();
        reversed.reverse();
        let mut rotated = keys.clone();
        if !rotated.is_empty() {
            let by = rotation % rotated.len();
            rotated.rotate_left(by);
        }

        let joint = combine_joint_key(&group, &keys);
        joint == combine_joint_key(&group, &reversed)
            && joint == combine_joint_key(&group, &rotated)
    }

    #[test]
    fn test_backup_share_matches_coordinate() {
        let group = Group::reduced();
        let (polynomial, _) = submission(&group, 1, 3, 4);
        for recipient in 2..=4 {
            let expected = group.g_pow(&polynomial.coordinate(&group, recipient));
            assert_eq!(
                generate_backup_share(&group, polynomial.commitments(), recipient),
                expected
            );
        }
    }

    #[test]
    fn test_validate_submission() {
        let group = Group::reduced();
        let verifier = ProofVerifier::key_ceremony(&group);
        let (_, good) = submission(&group, 2, 2, 3);
        validate_key_ceremony_submission(&verifier, &good, 2, &indices(3)).unwrap();

        // Wrong threshold
        assert!(validate_key_ceremony_submission(&verifier, &good, 3, &indices(3)).is_err());

        // Unknown sender
        let err = validate_key_ceremony_submission(&verifier, &good, 2, &indices(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Missing backup
        let mut missing = good.clone();
        missing.backups.remove(&3);
        assert!(validate_key_ceremony_submission(&verifier, &missing, 2, &indices(3)).is_err());

        // Backup to self
        let mut to_self = good.clone();
        to_self.backups.insert(2, EncryptedBackup { sender: 2, share: vec![] });
        assert!(validate_key_ceremony_submission(&verifier, &to_self, 2, &indices(3)).is_err());

        // Forged sender
        let mut forged = good.clone();
        if let Some(backup) = forged.backups.get_mut(&1) {
            backup.sender = 3;
        }
        assert!(validate_key_ceremony_submission(&verifier, &forged, 2, &indices(3)).is_err());

        // One bad Schnorr proof rejects the lot
        let mut bad_proof = good;
        let response = &bad_proof.commitments[1].proof.response;
        bad_proof.commitments[1].proof.response = group.add_q(response, &group.q_from_u64(1));
        let err =
            validate_key_ceremony_submission(&verifier, &bad_proof, 2, &indices(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Proof);
    }

    #[test]
    fn test_extended_base_hash_binds_commitments() {
        let group = Group::reduced();
        let manifest_hash = group.q_from_u64(42);
        let (_, a) = submission(&group, 1, 2, 2);
        let (_, b) = submission(&group, 2, 2, 2);

        let mut commitments = BTreeMap::new();
        commitments.insert(1, a.commitments.clone());
        commitments.insert(2, b.commitments.clone());
        let first = commitment_hash(&group, &commitments);
        let h1 = extended_base_hash(&group, 2, 2, &manifest_hash, &first);

        commitments.insert(2, a.commitments);
        let second = commitment_hash(&group, &commitments);
        let h2 = extended_base_hash(&group, 2, 2, &manifest_hash, &second);
        assert_ne!(h1, h2);
    }
}
