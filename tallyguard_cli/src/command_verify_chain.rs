use crate::config::Config;
use tallyguard::TrackingLog;

pub fn command_verify_chain(matches: &clap::ArgMatches, config: &Config) {
    let filename = match matches.value_of("INPUT") {
        Some(filename) => crate::expand(filename),
        None => {
            eprintln!("tallyguard verify-chain: input filename required");
            std::process::exit(1);
        }
    };

    let file_bytes = match std::fs::read(&filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("tallyguard verify-chain: unable to read {}: {}", filename, e);
            std::process::exit(1);
        }
    };

    // Accept either a bare tracking log or a simulation report that embeds one
    let value: serde_json::Value = serde_json::from_slice(&file_bytes).unwrap_or_else(|e| {
        eprintln!("tallyguard verify-chain: unable to parse {}: {}", filename, e);
        std::process::exit(1);
    });
    let value = match value.get("tracking_log") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let log: TrackingLog = serde_json::from_value(value).unwrap_or_else(|e| {
        eprintln!("tallyguard verify-chain: {} is not a tracking log: {}", filename, e);
        std::process::exit(1);
    });

    match log.verify(&config.group()) {
        Ok(()) => {
            tracing::info!(
                election = %log.election_id,
                ballots = log.entries.len(),
                "tracking chain verified"
            );
            println!("> Tracking chain for election {} verified OK", log.election_id);
            match log.entries.last() {
                Some(entry) => println!("  {} ballots, head {}", log.entries.len(), entry.code),
                None => println!("  no ballots, head {}", log.genesis),
            }
        }
        Err(e) => {
            eprintln!("tallyguard verify-chain: {}", e);
            std::process::exit(1);
        }
    }
}
