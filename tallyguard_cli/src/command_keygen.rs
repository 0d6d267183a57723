pub fn command_keygen(_matches: &clap::ArgMatches) {
    let (secret, public) = tallyguard::generate_aux_keypair(&mut rand::rngs::OsRng {})
        .unwrap_or_else(|e| {
            eprintln!("tallyguard keygen: {}", e);
            std::process::exit(1);
        });

    println!("aux-secret-key: {}", hex::encode(secret.to_bytes()));
    println!("aux-public-key: {}", hex::encode(public.to_bytes()));
}
