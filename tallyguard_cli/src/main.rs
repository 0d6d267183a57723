use clap::{App, Arg, SubCommand};
use tracing_subscriber::EnvFilter;

mod command_keygen;
mod command_simulate;
mod command_verify_chain;
mod config;

use command_keygen::*;
use command_simulate::*;
use command_verify_chain::*;

fn main() {
    let matches = App::new("TallyGuard CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs and audits threshold ElGamal elections")
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity - can also be set with TALLYGUARD_LOG"),
        )
        .arg(
            Arg::with_name("group")
                .long("group")
                .takes_value(true)
                .possible_values(&["standard", "reduced"])
                .help("Group parameters - can also be set with TALLYGUARD_GROUP"),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a complete election in memory and print the result")
                .arg(
                    Arg::with_name("trustees")
                        .long("trustees")
                        .takes_value(true)
                        .help("Number of human trustees - also TALLYGUARD_TRUSTEES"),
                )
                .arg(
                    Arg::with_name("threshold")
                        .long("threshold")
                        .takes_value(true)
                        .help("Trustees needed to decrypt - also TALLYGUARD_THRESHOLD"),
                )
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .takes_value(true)
                        .help("Number of voters - can also be set with TALLYGUARD_VOTERS"),
                )
                .arg(
                    Arg::with_name("automated-trustee")
                        .long("automated-trustee")
                        .help("Add a server-side automated trustee"),
                )
                .arg(
                    Arg::with_name("absent")
                        .long("absent")
                        .takes_value(true)
                        .help("Comma-separated indexes of trustees that skip decryption"),
                ),
        )
        .subcommand(
            SubCommand::with_name("keygen").about("Generate an auxiliary transport keypair"),
        )
        .subcommand(
            SubCommand::with_name("verify-chain")
                .about("Recompute a published tracking chain")
                .arg(
                    Arg::with_name("INPUT")
                        .index(1)
                        .required(true)
                        .help("Tracking log JSON, or a simulation report"),
                ),
        )
        .get_matches();

    let config = config::Config::from_env()
        .and_then(|config| config.override_with(&matches))
        .unwrap_or_else(|e| {
            eprintln!("tallyguard: {}", e);
            std::process::exit(1);
        });

    let filter = match matches.occurrences_of("v") {
        0 => EnvFilter::new(&config.log),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Subcommands
    if let Some(matches) = matches.subcommand_matches("simulate") {
        let config = config.override_with(matches).unwrap_or_else(|e| {
            eprintln!("tallyguard simulate: {}", e);
            std::process::exit(1);
        });
        if let Err(e) = config.validate() {
            eprintln!("tallyguard simulate: {}", e);
            std::process::exit(1);
        }
        command_simulate(matches, &config);
        std::process::exit(0);
    }
    if let Some(matches) = matches.subcommand_matches("keygen") {
        command_keygen(matches);
        std::process::exit(0);
    }
    if let Some(matches) = matches.subcommand_matches("verify-chain") {
        command_verify_chain(matches, &config);
        std::process::exit(0);
    }

    eprintln!("tallyguard: no subcommand given, try --help");
    std::process::exit(1);
}

pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.to_string(),
        Err(e) => {
            eprintln!("tallyguard: unable to expand {}: {}", input, e);
            std::process::exit(1);
        }
    }
}
