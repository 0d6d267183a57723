use super::*;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

const START: u64 = 1_000;
const END: u64 = 2_000;

struct Harness {
    service: ElectionService<MemStore, ManualClock>,
    id: Uuid,
    authority: Caller,
    trustees: Vec<(Caller, RemoteTrustee)>,
    automated: bool,
}

fn mayor(max: u32) -> Manifest {
    Manifest::new(vec![ContestDescription::new(
        "mayor",
        0,
        "Mayor",
        max,
        &["Ada Lovelace", "Alan Turing", "Grace Hopper"],
    )
    .unwrap()])
    .unwrap()
}

fn voter(i: u32) -> Caller {
    Caller::new(format!("voter-{}", i))
}

impl Harness {
    fn new(humans: u32, threshold: u32, automated: bool, manifest: Manifest) -> Self {
        let service = ElectionService::new(
            ServiceConfig {
                group: Group::reduced(),
                dlog_cap: 1_000,
            },
            MemStore::new(),
            ManualClock::new(START),
        );
        let authority = Caller::new("clerk");
        let setup = ElectionSetup {
            title: "City election".into(),
            authority: authority.identity.clone(),
            trustees: (1..=humans).map(|i| format!("trustee-{}", i)).collect(),
            threshold,
            automated_trustee: automated,
            end_time: END,
            manifest,
            voters: (1..=20).map(|i| voter(i).identity).collect(),
        };
        let id = service.create_election(&authority, setup).unwrap();

        let mut rng = rand::thread_rng();
        let trustees = (1..=humans)
            .map(|i| {
                let trustee = RemoteTrustee::new(service.group(), i, &mut rng).unwrap();
                (Caller::new(format!("trustee-{}", i)), trustee)
            })
            .collect();

        Harness {
            service,
            id,
            authority,
            trustees,
            automated,
        }
    }

    fn transition(&self, target: Phase) -> Result<Phase, Error> {
        self.service.transition(&self.authority, self.id, target)
    }

    fn key_ceremony(&mut self) {
        for (caller, trustee) in &self.trustees {
            let index = self
                .service
                .submit_aux_key(caller, self.id, trustee.aux_public_key().clone())
                .unwrap();
            assert_eq!(index, trustee.index());
        }
        self.transition(Phase::Epkb).unwrap();

        for (caller, trustee) in self.trustees.iter_mut() {
            let request = self.service.key_ceremony_request(caller, self.id).unwrap();
            let submission = trustee.key_ceremony(&request).unwrap();
            self.service.submit_key_ceremony(caller, self.id, submission).unwrap();
        }
        self.transition(Phase::KeyCeremonyFinished).unwrap();

        for (caller, trustee) in self.trustees.iter_mut() {
            let delivery = self.service.backup_delivery(caller, self.id).unwrap();
            trustee.receive_backups(&delivery).unwrap();
        }
        self.transition(Phase::Open).unwrap();
    }

    fn ballot(&self, votes: Vec<u64>) -> BallotSubmission {
        let election = self.service.election(self.id).unwrap();
        let key = election.joint_public_key.unwrap();
        let qbar = election.extended_base_hash.unwrap();
        let encryptor = BallotEncryptor::new(self.service.group(), &election.manifest, &key, &qbar);
        let mut plaintext = PlaintextBallot::new();
        plaintext.insert("mayor".into(), votes);
        encryptor
            .encrypt_ballot(
                &mut rand::thread_rng(),
                &format!("device-ballot-{}", Uuid::new_v4()),
                "test kiosk",
                self.service.clock().now(),
                &plaintext,
            )
            .unwrap()
    }

    /// Submit and confirm.
    fn cast(&self, voter: &Caller, votes: Vec<u64>) -> BallotReceipt {
        let receipt = self
            .service
            .submit_ballot(voter, self.id, self.ballot(votes))
            .unwrap();
        self.service
            .confirm_ballot(voter, self.id, &receipt.tracking_code)
            .unwrap();
        receipt
    }

    fn close(&self) {
        self.service.clock().set(END);
        assert!(self.service.observe_closing(self.id).unwrap());
        assert_eq!(self.phase(), Phase::PDecryption);
    }

    fn phase(&self) -> Phase {
        self.service.election(self.id).unwrap().phase
    }

    fn trustee_count(&self) -> usize {
        self.trustees.len() + self.automated as usize
    }

    fn present<'a>(
        &'a self,
        present: &'a [u32],
    ) -> impl Iterator<Item = &'a (Caller, RemoteTrustee)> + 'a {
        self.trustees
            .iter()
            .filter(move |(_, t)| present.contains(&t.index()))
    }

    fn partial_decrypt(&self, present: &[u32]) {
        for (caller, trustee) in self.present(present) {
            let request = self.service.decryption_request(caller, self.id).unwrap();
            let submission = trustee.partial_decrypt(&request).unwrap();
            self.service
                .submit_partial_decryption(caller, self.id, submission)
                .unwrap();
        }
    }

    fn compensate(&self, present: &[u32]) {
        for (caller, trustee) in self.present(present) {
            let request = self.service.compensation_request(caller, self.id).unwrap();
            let submission = trustee.compensate(&request).unwrap();
            self.service.submit_compensation(caller, self.id, submission).unwrap();
        }
    }

    /// Decrypt with the human trustees in `present`, compensating for the rest.
    fn decrypt(&self, present: &[u32]) -> ElectionResult {
        self.partial_decrypt(present);
        if present.len() + (self.automated as usize) < self.trustee_count() {
            self.transition(Phase::PpDecryption).unwrap();
            self.compensate(present);
        }
        self.transition(Phase::Done).unwrap();
        self.service.result(self.id).unwrap()
    }
}

#[test]
fn end_to_end_all_trustees() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 0, 0]);
    h.close();

    let result = h.decrypt(&[1, 2, 3]);
    assert_eq!(result.tally["mayor"], vec![1, 0, 0]);
    assert!(result.spoiled.is_empty());
    assert_eq!(h.phase(), Phase::Done);
}

#[test]
fn end_to_end_missing_trustee() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 0, 0]);

    // Submitted but never confirmed: stays spoiled, decrypted separately and not counted
    let spoiled = h
        .service
        .submit_ballot(&voter(2), h.id, h.ballot(vec![0, 0, 1]))
        .unwrap();
    h.close();

    let result = h.decrypt(&[1, 3]);
    assert_eq!(result.tally["mayor"], vec![1, 0, 0]);
    assert_eq!(result.spoiled[&spoiled.ballot_id]["mayor"], vec![0, 0, 1]);
}

#[test]
fn threshold_subsets_agree() {
    let votes = vec![
        vec![1, 0, 0],
        vec![0, 1, 0],
        vec![1, 0, 0],
        vec![0, 0, 0],
        vec![0, 0, 1],
    ];
    let mut results = Vec::new();
    for present in vec![vec![1, 2, 3], vec![1, 2], vec![2, 3], vec![1, 3]] {
        let mut h = Harness::new(3, 2, false, mayor(1));
        h.key_ceremony();
        for (i, v) in votes.iter().enumerate() {
            h.cast(&voter(i as u32 + 1), v.clone());
        }
        h.close();
        results.push(h.decrypt(&present).tally);
    }
    for result in &results {
        assert_eq!(result["mayor"], vec![2, 1, 1]);
    }
}

#[test]
fn multi_select_contest() {
    let mut h = Harness::new(2, 2, false, mayor(2));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 1, 0]);
    h.cast(&voter(2), vec![0, 1, 0]);
    h.cast(&voter(3), vec![0, 0, 0]);
    h.close();
    assert_eq!(h.decrypt(&[1, 2]).tally["mayor"], vec![1, 2, 0]);
}

#[test]
fn sum_proof_lie_rejected() {
    let mut h = Harness::new(2, 2, false, mayor(2));
    h.key_ceremony();

    let election = h.service.election(h.id).unwrap();
    let key = election.joint_public_key.unwrap();
    let qbar = election.extended_base_hash.unwrap();
    let group = h.service.group();
    let encryptor = BallotEncryptor::new(group, &election.manifest, &key, &qbar);
    let mut rng = rand::thread_rng();

    // One real selection, both placeholders off: the sum is 1, the proof claims 2
    let contest = &election.manifest.contests[0];
    let mut selections = Vec::new();
    let mut aggregate_nonce = group.zero_q();
    for (option, plaintext) in contest.all_options().iter().zip(vec![1, 0, 0, 0, 0]) {
        let (selection, nonce) = encryptor
            .encrypt_selection(&mut rng, &option.object_id, plaintext)
            .unwrap();
        aggregate_nonce = group.add_q(&aggregate_nonce, &nonce);
        selections.push(selection);
    }
    let proof = encryptor.contest_sum_proof(&mut rng, &selections, &aggregate_nonce, 2);
    let ballot = BallotSubmission {
        encryption_id: "device-ballot-liar".into(),
        device_info: "test kiosk".into(),
        timestamp: START,
        contests: vec![EncryptedContest {
            object_id: "mayor".into(),
            selections,
            proof,
        }],
    };

    let err = h.service.submit_ballot(&voter(1), h.id, ballot).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Proof);
    assert!(h.service.tracking_log(h.id).unwrap().entries.is_empty());
}

#[test]
fn automated_trustee_fills_in() {
    let mut h = Harness::new(2, 2, true, mayor(1));
    h.key_ceremony();

    let election = h.service.election(h.id).unwrap();
    assert_eq!(election.trustee_count, 3);

    h.cast(&voter(1), vec![0, 1, 0]);
    h.cast(&voter(2), vec![0, 1, 0]);
    h.close();

    // Trustee 2 never shows up; trustee 1 and the automated trustee (index 3) carry it
    let result = h.decrypt(&[1]);
    assert_eq!(result.tally["mayor"], vec![0, 2, 0]);
}

#[test]
fn duplicate_submissions_rejected() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    let (caller, trustee) = &h.trustees[0];
    h.service
        .submit_aux_key(caller, h.id, trustee.aux_public_key().clone())
        .unwrap();
    let err = h
        .service
        .submit_aux_key(caller, h.id, trustee.aux_public_key().clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    // The rest register, then everyone submits once
    for (caller, trustee) in &h.trustees[1..] {
        h.service
            .submit_aux_key(caller, h.id, trustee.aux_public_key().clone())
            .unwrap();
    }
    h.transition(Phase::Epkb).unwrap();

    let (caller, trustee) = &mut h.trustees[0];
    let request = h.service.key_ceremony_request(caller, h.id).unwrap();
    let submission = trustee.key_ceremony(&request).unwrap();
    h.service
        .submit_key_ceremony(caller, h.id, submission.clone())
        .unwrap();
    let err = h
        .service
        .submit_key_ceremony(caller, h.id, submission)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    // Too early to finish the ceremony
    let err = h.transition(Phase::KeyCeremonyFinished).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn duplicate_partial_decryption_rejected() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 0, 0]);
    h.close();

    let (caller, trustee) = &h.trustees[0];
    let request = h.service.decryption_request(caller, h.id).unwrap();
    let submission = trustee.partial_decrypt(&request).unwrap();
    h.service
        .submit_partial_decryption(caller, h.id, submission.clone())
        .unwrap();
    let err = h
        .service
        .submit_partial_decryption(caller, h.id, submission)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn unauthorized_callers_rejected() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    let stranger = Caller::new("mallory");

    let err = h
        .service
        .transition(&stranger, h.id, Phase::Epkb)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);

    let key = h.trustees[0].1.aux_public_key().clone();
    let err = h.service.submit_aux_key(&stranger, h.id, key).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);

    let err = h
        .service
        .create_election(
            &stranger,
            ElectionSetup {
                title: "Coup".into(),
                authority: "clerk".into(),
                trustees: vec!["a".into()],
                threshold: 1,
                automated_trustee: false,
                end_time: END,
                manifest: mayor(1),
                voters: vec![],
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);

    h.key_ceremony();

    // Trustee 1 submitting a decryption under trustee 2's index
    h.service.clock().set(END);
    h.service.observe_closing(h.id).unwrap();
    let (caller_one, _) = &h.trustees[0];
    let (caller_two, trustee_two) = &h.trustees[1];
    let request = h.service.decryption_request(caller_two, h.id).unwrap();
    let submission = trustee_two.partial_decrypt(&request).unwrap();
    let err = h
        .service
        .submit_partial_decryption(caller_one, h.id, submission)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);
}

#[test]
fn voters_confirm_once() {
    let mut h = Harness::new(2, 1, false, mayor(1));
    h.key_ceremony();
    let alice = voter(1);

    let receipt = h.cast(&alice, vec![1, 0, 0]);
    let err = h
        .service
        .confirm_ballot(&alice, h.id, &receipt.tracking_code)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = h
        .service
        .submit_ballot(&alice, h.id, h.ballot(vec![0, 1, 0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    // Someone else's ballot
    let bob = voter(2);
    let bobs = h
        .service
        .submit_ballot(&bob, h.id, h.ballot(vec![0, 1, 0]))
        .unwrap();
    let err = h
        .service
        .confirm_ballot(&alice, h.id, &bobs.tracking_code)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);

    // Not on the voter list
    let err = h
        .service
        .submit_ballot(&Caller::new("nobody"), h.id, h.ballot(vec![0, 1, 0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn confirmation_by_tracking_code() {
    let mut h = Harness::new(2, 1, false, mayor(1));
    h.key_ceremony();
    let alice = voter(1);

    let first = h
        .service
        .submit_ballot(&alice, h.id, h.ballot(vec![1, 0, 0]))
        .unwrap();
    let second = h
        .service
        .submit_ballot(&alice, h.id, h.ballot(vec![0, 1, 0]))
        .unwrap();

    // The chain's previous code names a different ballot
    assert_eq!(second.previous_tracking_code, first.tracking_code);
    let unknown = TrackingCode(h.service.group().q_from_u64(7));
    let err = h
        .service
        .confirm_ballot(&alice, h.id, &unknown)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Only the ballot carrying the code is cast
    h.service
        .confirm_ballot(&alice, h.id, &second.tracking_code)
        .unwrap();
    h.close();
    let result = h.decrypt(&[1, 2]);
    assert_eq!(result.tally["mayor"], vec![0, 1, 0]);
    assert_eq!(result.spoiled[&first.ballot_id]["mayor"], vec![1, 0, 0]);
}

#[test]
fn ballot_timestamp_window() {
    let mut h = Harness::new(2, 2, false, mayor(1));
    h.key_ceremony();

    let mut early = h.ballot(vec![1, 0, 0]);
    early.timestamp = START - 1;
    let err = h.service.submit_ballot(&voter(1), h.id, early).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let mut future = h.ballot(vec![1, 0, 0]);
    future.timestamp = START + 10;
    let err = h.service.submit_ballot(&voter(1), h.id, future).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn voting_closes_at_end_time() {
    let mut h = Harness::new(2, 2, false, mayor(1));
    h.key_ceremony();
    let ballot = h.ballot(vec![1, 0, 0]);

    // Reading the election never closes it
    h.service.clock().set(END + 1);
    assert_eq!(h.phase(), Phase::Open);

    let err = h.service.submit_ballot(&voter(1), h.id, ballot).unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::State,
        "ballot after end time should be refused: {}",
        err
    );
    assert_eq!(h.phase(), Phase::PDecryption);
}

#[test]
fn pp_refused_below_threshold() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 0, 0]);
    h.close();
    h.partial_decrypt(&[1]);

    let err = h.transition(Phase::PpDecryption).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Completeness);
    let err = h.transition(Phase::Done).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(h.phase(), Phase::PDecryption);

    // Results are not available before the end
    let err = h.service.result(h.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn compensation_must_cover_exactly_the_missing() {
    let mut h = Harness::new(3, 2, false, mayor(1));
    h.key_ceremony();
    h.cast(&voter(1), vec![1, 0, 0]);
    h.close();
    h.partial_decrypt(&[1, 3]);
    h.transition(Phase::PpDecryption).unwrap();

    let (caller, trustee) = &h.trustees[0];
    let mut request = h.service.compensation_request(caller, h.id).unwrap();
    assert_eq!(request.missing.iter().copied().collect::<Vec<_>>(), vec![2]);

    // Trustee 1 holds 3's backup too, but 3 is available: covering it is rejected
    request.missing.insert(3);
    let submission = trustee.compensate(&request).unwrap();
    let err = h
        .service
        .submit_compensation(caller, h.id, submission)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // Not done until trustee 3 compensates too
    h.compensate(&[1]);
    let err = h.transition(Phase::Done).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    h.compensate(&[3]);
    h.transition(Phase::Done).unwrap();
    assert_eq!(h.service.result(h.id).unwrap().tally["mayor"], vec![1, 0, 0]);
}

#[test]
fn tracking_chain_links_every_ballot() {
    let mut h = Harness::new(2, 2, false, mayor(1));
    h.key_ceremony();
    let qbar = h.service.election(h.id).unwrap().extended_base_hash.unwrap();

    let receipts: Vec<BallotReceipt> = (1..=4)
        .map(|i| h.cast(&voter(i), vec![1, 0, 0]))
        .collect();

    assert_eq!(receipts[0].previous_tracking_code, TrackingCode(qbar.clone()));
    for pair in receipts.windows(2) {
        assert_eq!(pair[1].previous_tracking_code, pair[0].tracking_code);
    }

    let log = h.service.tracking_log(h.id).unwrap();
    assert_eq!(log.genesis, qbar);
    assert_eq!(log.entries.len(), 4);
    log.verify(h.service.group()).unwrap();

    let mut tampered = log;
    tampered.entries[1].timestamp += 1;
    assert!(tampered.verify(h.service.group()).is_err());
}

#[test]
fn concurrent_ballots_are_totally_ordered() {
    let mut h = Harness::new(2, 2, false, mayor(1));
    h.key_ceremony();
    let ballots: Vec<(Caller, BallotSubmission)> = (1..=8)
        .map(|i| (voter(i), h.ballot(vec![(i % 2) as u64, 0, 0])))
        .collect();

    let h = Arc::new(h);
    let handles: Vec<_> = ballots
        .into_iter()
        .map(|(caller, ballot)| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                let receipt = h.service.submit_ballot(&caller, h.id, ballot).unwrap();
                h.service
                    .confirm_ballot(&caller, h.id, &receipt.tracking_code)
                    .unwrap();
                receipt
            })
        })
        .collect();
    let receipts: Vec<BallotReceipt> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    let log = h.service.tracking_log(h.id).unwrap();
    assert_eq!(log.entries.len(), 8);
    log.verify(h.service.group()).unwrap();
    for receipt in &receipts {
        assert_eq!(
            log.entries
                .iter()
                .filter(|e| e.code == receipt.tracking_code)
                .count(),
            1
        );
    }

    h.close();
    assert_eq!(h.decrypt(&[1, 2]).tally["mayor"], vec![4, 0, 0]);
}
