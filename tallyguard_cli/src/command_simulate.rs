use crate::config::Config;
use rand::Rng;
use std::collections::BTreeSet;
use tallyguard::*;
use uuid::Uuid;

const VOTING_WINDOW: u64 = 3600;

#[derive(serde::Serialize)]
struct SimulationReport {
    election: Election,
    expected: PlaintextBallot,
    result: ElectionResult,
    tracking_log: TrackingLog,
}

fn fail<E: std::fmt::Display>(what: &str, e: E) -> ! {
    eprintln!("tallyguard simulate: {}: {}", what, e);
    std::process::exit(1);
}

pub fn command_simulate(matches: &clap::ArgMatches, config: &Config) {
    let absent: BTreeSet<u32> = match matches.value_of("absent") {
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .unwrap_or_else(|e| fail("invalid --absent trustee index", e))
            })
            .collect(),
        None => BTreeSet::new(),
    };
    if let Some(index) = absent.iter().find(|i| **i == 0 || **i > config.trustees) {
        fail("invalid --absent trustee index", index);
    }

    let options = ["Yes", "No", "Abstain"];
    let manifest = ContestDescription::new("measure-1", 0, "Measure 1", 1, &options)
        .and_then(|contest| Manifest::new(vec![contest]))
        .unwrap_or_else(|e| fail("unable to build manifest", e));

    let clock = ManualClock::new(SystemClock.now());
    let service = ElectionService::new(config.service_config(), MemStore::new(), clock);
    let authority = Caller::new("election-authority");
    let voters: Vec<Caller> = (1..=config.voters)
        .map(|i| Caller::new(format!("voter-{}", i)))
        .collect();

    let setup = ElectionSetup {
        title: "Simulated election".into(),
        authority: authority.identity.clone(),
        trustees: (1..=config.trustees).map(|i| format!("trustee-{}", i)).collect(),
        threshold: config.threshold,
        automated_trustee: config.automated_trustee,
        end_time: service.clock().now() + VOTING_WINDOW,
        manifest,
        voters: voters.iter().map(|v| v.identity.clone()).collect(),
    };
    let id = service
        .create_election(&authority, setup)
        .unwrap_or_else(|e| fail("unable to create election", e));

    let mut rng = rand::thread_rng();
    let mut trustees = Vec::with_capacity(config.trustees as usize);
    for index in 1..=config.trustees {
        let trustee = RemoteTrustee::new(service.group(), index, &mut rng)
            .unwrap_or_else(|e| fail("unable to create trustee", e));
        trustees.push((Caller::new(format!("trustee-{}", index)), trustee));
    }

    let transition = |target: Phase| {
        service
            .transition(&authority, id, target)
            .unwrap_or_else(|e| fail("transition failed", e));
    };

    // Key ceremony
    for (caller, trustee) in &trustees {
        service
            .submit_aux_key(caller, id, trustee.aux_public_key().clone())
            .unwrap_or_else(|e| fail("aux key rejected", e));
    }
    transition(Phase::Epkb);
    for (caller, trustee) in trustees.iter_mut() {
        let submission = service
            .key_ceremony_request(caller, id)
            .and_then(|request| trustee.key_ceremony(&request))
            .unwrap_or_else(|e| fail("key ceremony failed", e));
        service
            .submit_key_ceremony(caller, id, submission)
            .unwrap_or_else(|e| fail("key ceremony rejected", e));
    }
    transition(Phase::KeyCeremonyFinished);
    for (caller, trustee) in trustees.iter_mut() {
        service
            .backup_delivery(caller, id)
            .and_then(|delivery| trustee.receive_backups(&delivery))
            .unwrap_or_else(|e| fail("backup verification failed", e));
    }
    transition(Phase::Open);

    // Voting
    let election = service
        .election(id)
        .unwrap_or_else(|e| fail("unable to read election", e));
    let (key, qbar) = match (&election.joint_public_key, &election.extended_base_hash) {
        (Some(key), Some(qbar)) => (key.clone(), qbar.clone()),
        _ => fail("key ceremony", "no joint public key"),
    };
    let encryptor = BallotEncryptor::new(service.group(), &election.manifest, &key, &qbar);

    let mut expected = vec![0u64; options.len()];
    for voter in &voters {
        let choice = rng.gen_range(0, options.len());
        let mut votes = vec![0u64; options.len()];
        votes[choice] = 1;
        expected[choice] += 1;

        let mut plaintext = PlaintextBallot::new();
        plaintext.insert("measure-1".into(), votes);
        let submission = encryptor
            .encrypt_ballot(
                &mut rng,
                &format!("sim-{}", Uuid::new_v4()),
                "simulator",
                service.clock().now(),
                &plaintext,
            )
            .unwrap_or_else(|e| fail("unable to encrypt ballot", e));
        let receipt = service
            .submit_ballot(voter, id, submission)
            .unwrap_or_else(|e| fail("ballot rejected", e));
        service
            .confirm_ballot(voter, id, &receipt.tracking_code)
            .unwrap_or_else(|e| fail("confirmation rejected", e));
        tracing::debug!(voter = %voter.identity, code = %receipt.tracking_code, "ballot cast");
    }

    // Close voting and decrypt
    service.clock().advance(VOTING_WINDOW);
    service
        .observe_closing(id)
        .unwrap_or_else(|e| fail("unable to close voting", e));

    let present: Vec<&(Caller, RemoteTrustee)> = trustees
        .iter()
        .filter(|(_, t)| !absent.contains(&t.index()))
        .collect();
    for (caller, trustee) in &present {
        let submission = service
            .decryption_request(caller, id)
            .and_then(|request| trustee.partial_decrypt(&request))
            .unwrap_or_else(|e| fail("partial decryption failed", e));
        service
            .submit_partial_decryption(caller, id, submission)
            .unwrap_or_else(|e| fail("partial decryption rejected", e));
    }
    if !absent.is_empty() {
        transition(Phase::PpDecryption);
        for (caller, trustee) in &present {
            let submission = service
                .compensation_request(caller, id)
                .and_then(|request| trustee.compensate(&request))
                .unwrap_or_else(|e| fail("compensation failed", e));
            service
                .submit_compensation(caller, id, submission)
                .unwrap_or_else(|e| fail("compensation rejected", e));
        }
    }
    transition(Phase::Done);

    let result = service
        .result(id)
        .unwrap_or_else(|e| fail("unable to read result", e));
    let tracking_log = service
        .tracking_log(id)
        .unwrap_or_else(|e| fail("unable to read tracking log", e));
    if result.tally.get("measure-1") != Some(&expected) {
        fail("tally mismatch", format!("expected {:?}", expected));
    }

    let mut expected_ballot = PlaintextBallot::new();
    expected_ballot.insert("measure-1".into(), expected);
    let report = SimulationReport {
        election: service
            .election(id)
            .unwrap_or_else(|e| fail("unable to read election", e)),
        expected: expected_ballot,
        result,
        tracking_log,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => fail("unable to serialize report", e),
    }
}
