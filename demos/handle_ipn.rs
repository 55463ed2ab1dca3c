use digistore24::signature::{self, Options};
use digistore24::{parse_form, Event, Notification, Passphrase, ResponseBuilder};
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize, Debug)]
struct Config {
    passphrase: Passphrase,
}

fn main() -> Result<(), Box<dyn Error>> {
    let config: Config = envy::prefixed("DIGISTORE24_IPN_").from_env()?;

    // in production this is the body of the POST the provider sends you
    let body = "event=on_payment&order_id=ORD-2023-17&product_id=4711\
                &amount_brutto=99.99&currency=EUR&email=buyer%40example.com\
                &tags=vip%2Cpremium";
    let mut payload = parse_form(body)?;
    // self-signed here so the demo round-trips without a live provider
    let (key, digest) = signature::sign(&config.passphrase, &payload, Options::default())?;
    payload.insert(key, digest.into());

    signature::validate(&config.passphrase, &payload, Options::default())?;
    let notification = Notification::decode(&payload)?;
    notification.validate()?;

    let mut response = ResponseBuilder::new();
    if notification.is_test() {
        println!("{}", response.serialize()?);
        return Ok(());
    }
    if notification.event == Some(Event::Payment) {
        response.set_thankyou_url("https://example.com/thanks")?;
        response.set_headline("Thanks for your order!");
        response.add_login_block("alice", "s3cr3t", "https://example.com/login");
        if let Some(order_id) = &notification.order_id {
            response.set_additional_data("order_ref", order_id.as_str())?;
        }
    }
    println!("{}", response.serialize()?);
    Ok(())
}
