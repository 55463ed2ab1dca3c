use digistore24::signature::{self, Options};
use digistore24::{Passphrase, Payload};
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize, Debug)]
struct Config {
    passphrase: Passphrase,
}

fn main() -> Result<(), Box<dyn Error>> {
    let config: Config = envy::prefixed("DIGISTORE24_IPN_").from_env()?;
    let mut payload = Payload::new();
    payload.insert("event".to_owned(), "connection_test".into());
    payload.insert("order_id".to_owned(), "TEST-1".into());
    let (key, digest) = signature::sign(&config.passphrase, &payload, Options::default())?;
    println!("{key}: {digest}");
    Ok(())
}
