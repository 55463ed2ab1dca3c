//! Typed view of one inbound notification.
//!
//! The wire payload is a flat map of strings. [`Notification::decode`]
//! walks it key by key, converting each known field through the rules in
//! [`convert`] and ignoring everything it does not recognise, so a new
//! provider field never breaks an existing integration. Validate the
//! signature before decoding; decode itself is a pure parse.

use crate::{convert, Error, Payload, Value};
use rust_decimal::Decimal;
use serde::de::{self, Unexpected, Visitor};
use serde::Serialize;
use std::fmt;
use time::PrimitiveDateTime;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Wire spelling of this variant
            #[must_use]
            pub const fn as_wire(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire, )+
                }
            }

            /// Look a wire value up in the closed set
            #[must_use]
            pub fn from_wire(value: &str) -> Option<Self> {
                match value {
                    $( $wire => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_wire())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_wire())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct WireVisitor;

                impl<'de> Visitor<'de> for WireVisitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        write!(formatter, "a {} wire value", stringify!($name))
                    }

                    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        $name::from_wire(s)
                            .ok_or_else(|| de::Error::invalid_value(Unexpected::Str(s), &self))
                    }
                }

                deserializer.deserialize_str(WireVisitor)
            }
        }
    };
}

wire_enum! {
    /// The business event a notification reports
    Event {
        /// A payment was received for an order.
        Payment => "on_payment",
        /// A due rebilling payment was not received in time.
        PaymentMissed => "on_payment_missed",
        /// A payment was refunded to the buyer.
        Refund => "on_refund",
        /// The buyer charged a payment back through their bank.
        Chargeback => "on_chargeback",
        /// A rebilling subscription was cancelled.
        RebillCancelled => "on_rebill_cancelled",
        /// A previously cancelled rebilling subscription was resumed.
        RebillResumed => "on_rebill_resumed",
        /// The buyer's access period ends; sent on the last paid day.
        LastPaidDay => "last_paid_day",
        /// A sale was credited to one of your affiliates.
        Affiliation => "on_affiliation",
        /// An e-ticket was issued for the order.
        Eticket => "eticket",
        /// A custom order form was submitted.
        CustomForm => "custom_form",
        /// Sent when you test the IPN connection from the vendor backend.
        ConnectionTest => "connection_test",
    }
}

impl Event {
    /// Events that move money for an order
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        matches!(
            self,
            Event::Payment | Event::PaymentMissed | Event::Refund | Event::Chargeback
        )
    }

    /// Events that change the rebilling state of a subscription
    #[must_use]
    pub fn is_rebill_update(&self) -> bool {
        matches!(
            self,
            Event::RebillCancelled | Event::RebillResumed | Event::LastPaidDay
        )
    }

    /// Whether this event never corresponds to a real order
    #[must_use]
    pub fn is_test(&self) -> bool {
        matches!(self, Event::ConnectionTest)
    }
}

wire_enum! {
    /// Rebilling state of the order's payment plan
    BillingStatus {
        Paying => "paying",
        Aborted => "aborted",
        Unpaid => "unpaid",
        Completed => "completed",
        Reminding => "reminding",
    }
}

wire_enum! {
    /// How the buyer paid
    PayMethod {
        Paypal => "paypal",
        CreditCard => "creditcard",
        /// SEPA direct debit
        DirectDebit => "elv",
        BankTransfer => "banktransfer",
        Sofort => "sofort",
        Klarna => "klarna",
        Test => "test",
    }
}

wire_enum! {
    /// Salutation of the buyer address
    Salutation {
        Mr => "M",
        Mrs => "F",
    }
}

/// An ordered group of values decoded from numbered wire keys.
///
/// The provider numbers repeated fields instead of nesting them:
/// `coupon_code`, `coupon_code_2`, … or `tag1` … `tag100`. Indices are
/// kept because the numbering may be sparse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Numbered<T>(Vec<(u32, T)>);

impl<T> Numbered<T> {
    /// Value at a 1-based wire index
    pub fn get(&self, index: u32) -> Option<&T> {
        self.0
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| &self.0[pos].1)
    }

    /// Values in wire-index order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, index: u32, value: T) {
        match self.0.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => self.0[pos].1 = value,
            Err(pos) => self.0.insert(pos, (index, value)),
        }
    }
}

/// One decoded notification.
///
/// Every field is independently optional; a key missing from the payload
/// simply leaves its field at `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Notification {
    pub event: Option<Event>,
    /// Opaque order identifier; the provider does not guarantee a numeric
    /// format
    pub order_id: Option<String>,
    pub order_time: Option<PrimitiveDateTime>,
    pub transaction_id: Option<String>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub quantity: Option<i64>,

    pub amount_brutto: Option<Decimal>,
    pub amount_netto: Option<Decimal>,
    pub amount_fee: Option<Decimal>,
    pub amount_affiliate: Option<Decimal>,
    pub amount_vendor: Option<Decimal>,
    pub amount_payout: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub currency: Option<String>,

    pub email: Option<String>,
    pub address_salutation: Option<Salutation>,
    pub address_first_name: Option<String>,
    pub address_last_name: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_zipcode: Option<String>,
    pub address_state: Option<String>,
    pub address_country: Option<String>,
    pub address_phone_no: Option<String>,

    pub billing_status: Option<BillingStatus>,
    pub pay_method: Option<PayMethod>,
    pub next_payment_at: Option<PrimitiveDateTime>,
    pub last_paid_day: Option<PrimitiveDateTime>,

    pub is_test_mode: Option<bool>,
    pub renewal: Option<bool>,
    pub newsletter_choice: Option<bool>,

    pub affiliate_name: Option<String>,
    pub campaignkey: Option<String>,

    /// Decoded from a comma-separated wire value; never contains empty
    /// elements
    pub tags: Option<Vec<String>>,

    pub coupon_codes: Numbered<String>,
    pub eticket_urls: Numbered<String>,
    pub license_keys: Numbered<String>,
    pub numbered_tags: Numbered<String>,
}

impl Notification {
    /// Decode a payload into a typed notification
    ///
    /// # Errors
    ///
    /// Returns an error on an unrecognised `event` value or a date field
    /// that matches no accepted profile
    pub fn decode(payload: &Payload) -> Result<Self, Error> {
        let mut notification = Self::default();
        for (key, value) in payload {
            notification.apply(key, value)?;
        }
        Ok(notification)
    }

    /// The field-type table: one arm per known wire key.
    fn apply(&mut self, key: &str, value: &Value) -> Result<(), Error> {
        match key {
            // the event drives downstream dispatch; silently dropping an
            // unrecognised value could misroute an order, so this lookup
            // alone is strict
            "event" => {
                if let Some(wire) = convert::to_string(value) {
                    match Event::from_wire(&wire) {
                        Some(event) => self.event = Some(event),
                        None => return Err(Error::UnknownEvent(wire)),
                    }
                }
            }
            "order_id" => self.order_id = convert::to_string(value),
            "order_time" => self.order_time = convert::to_datetime(value)?,
            "transaction_id" => self.transaction_id = convert::to_string(value),
            "product_id" => self.product_id = convert::to_int(value),
            "product_name" => self.product_name = convert::to_string(value),
            "quantity" => self.quantity = convert::to_int(value),

            "amount_brutto" => self.amount_brutto = convert::to_decimal(value),
            "amount_netto" => self.amount_netto = convert::to_decimal(value),
            "amount_fee" => self.amount_fee = convert::to_decimal(value),
            "amount_affiliate" => self.amount_affiliate = convert::to_decimal(value),
            "amount_vendor" => self.amount_vendor = convert::to_decimal(value),
            "amount_payout" => self.amount_payout = convert::to_decimal(value),
            "vat_amount" => self.vat_amount = convert::to_decimal(value),
            "currency" => self.currency = convert::to_string(value),

            "email" => self.email = convert::to_string(value),
            "address_salutation" => {
                self.address_salutation = enum_field(value, Salutation::from_wire);
            }
            "address_first_name" => self.address_first_name = convert::to_string(value),
            "address_last_name" => self.address_last_name = convert::to_string(value),
            "address_street" => self.address_street = convert::to_string(value),
            "address_city" => self.address_city = convert::to_string(value),
            "address_zipcode" => self.address_zipcode = convert::to_string(value),
            "address_state" => self.address_state = convert::to_string(value),
            "address_country" => self.address_country = convert::to_string(value),
            "address_phone_no" => self.address_phone_no = convert::to_string(value),

            "billing_status" => {
                self.billing_status = enum_field(value, BillingStatus::from_wire);
            }
            "pay_method" => self.pay_method = enum_field(value, PayMethod::from_wire),
            "next_payment_at" => self.next_payment_at = convert::to_datetime(value)?,
            "last_paid_day" => self.last_paid_day = convert::to_datetime(value)?,

            "is_test_mode" => self.is_test_mode = convert::to_bool(value),
            "renewal" => self.renewal = convert::to_bool(value),
            "newsletter_choice" => self.newsletter_choice = convert::to_bool(value),

            "affiliate_name" => self.affiliate_name = convert::to_string(value),
            "campaignkey" => self.campaignkey = convert::to_string(value),

            "tags" => self.tags = convert::to_tags(value),

            other => {
                for (base, group) in [
                    ("coupon_code", &mut self.coupon_codes),
                    ("eticket_url", &mut self.eticket_urls),
                    ("license_key", &mut self.license_keys),
                    ("tag", &mut self.numbered_tags),
                ] {
                    if let Some(index) = numbered_index(other, base) {
                        if let Some(text) = convert::to_string(value) {
                            group.insert(index, text);
                        }
                        return Ok(());
                    }
                }
                // unknown keys are ignored; the provider adds fields over
                // time
            }
        }
        Ok(())
    }

    /// Whether this notification must not trigger real fulfilment
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.is_test_mode == Some(true)
            || self.event.as_ref().map_or(false, Event::is_test)
    }

    /// Business-rule validation of the decoded amounts
    ///
    /// # Errors
    ///
    /// Returns an error naming the first monetary field with a negative
    /// value
    pub fn validate(&self) -> Result<(), Error> {
        let amounts = [
            ("amount_brutto", &self.amount_brutto),
            ("amount_netto", &self.amount_netto),
            ("amount_fee", &self.amount_fee),
            ("amount_affiliate", &self.amount_affiliate),
            ("amount_vendor", &self.amount_vendor),
            ("amount_payout", &self.amount_payout),
            ("vat_amount", &self.vat_amount),
        ];
        for (name, amount) in amounts {
            if let Some(amount) = amount {
                if *amount < Decimal::ZERO {
                    return Err(Error::NegativeAmount(name, *amount));
                }
            }
        }
        Ok(())
    }
}

fn enum_field<T>(value: &Value, lookup: fn(&str) -> Option<T>) -> Option<T> {
    convert::to_string(value).as_deref().and_then(lookup)
}

/// Match `key` against a numbered wire spelling of `base`.
///
/// The bare base name is index 1; later instances carry the index either
/// directly (`tag17`) or after an underscore (`coupon_code_2`).
fn numbered_index(key: &str, base: &str) -> Option<u32> {
    let rest = key.strip_prefix(base)?;
    if rest.is_empty() {
        return Some(1);
    }
    let digits = rest.strip_prefix('_').unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn payload(pairs: &[(&str, &str)]) -> Payload {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), Value::from(*value)))
            .collect()
    }

    #[test]
    fn decodes_a_typical_payment() {
        let data = payload(&[
            ("event", "on_payment"),
            ("order_id", "ORD-2023-17"),
            ("order_time", "2023-01-15 12:34:56"),
            ("product_id", "4711"),
            ("amount_brutto", "99.99"),
            ("amount_fee", "0"),
            ("currency", "EUR"),
            ("email", "buyer@example.com"),
            ("address_salutation", "F"),
            ("address_country", "DE"),
            ("billing_status", "paying"),
            ("pay_method", "paypal"),
            ("is_test_mode", "N"),
            ("tags", "vip, premium"),
        ]);
        let notification = Notification::decode(&data).unwrap();
        assert_eq!(notification.event, Some(Event::Payment));
        assert_eq!(notification.order_id.as_deref(), Some("ORD-2023-17"));
        assert_eq!(notification.order_time, Some(datetime!(2023-01-15 12:34:56)));
        assert_eq!(notification.product_id, Some(4711));
        assert_eq!(notification.amount_brutto, Some("99.99".parse().unwrap()));
        assert_eq!(notification.amount_fee, Some(Decimal::ZERO));
        assert_eq!(notification.address_salutation, Some(Salutation::Mrs));
        assert_eq!(notification.billing_status, Some(BillingStatus::Paying));
        assert_eq!(notification.pay_method, Some(PayMethod::Paypal));
        assert_eq!(notification.is_test_mode, Some(false));
        assert_eq!(
            notification.tags,
            Some(vec!["vip".to_owned(), "premium".to_owned()])
        );
        assert!(!notification.is_test());
        notification.validate().unwrap();
    }

    #[test]
    fn absent_and_unknown_keys_are_tolerated() {
        let data = payload(&[
            ("event", "on_refund"),
            ("some_future_field", "whatever"),
            ("email", ""),
        ]);
        let notification = Notification::decode(&data).unwrap();
        assert_eq!(notification.event, Some(Event::Refund));
        assert_eq!(notification.email, None);
        assert_eq!(notification.order_id, None);
    }

    #[test]
    fn unknown_event_is_a_hard_error() {
        let data = payload(&[("event", "not_a_real_event")]);
        assert!(matches!(
            Notification::decode(&data),
            Err(Error::UnknownEvent(value)) if value == "not_a_real_event"
        ));
    }

    #[test]
    fn unknown_values_for_other_enums_decode_to_none() {
        let data = payload(&[
            ("event", "on_payment"),
            ("billing_status", "not_a_real_status"),
            ("pay_method", "barter"),
            ("address_salutation", "X"),
        ]);
        let notification = Notification::decode(&data).unwrap();
        assert_eq!(notification.billing_status, None);
        assert_eq!(notification.pay_method, None);
        assert_eq!(notification.address_salutation, None);
    }

    #[test]
    fn numbered_groups_collect_in_index_order() {
        let data = payload(&[
            ("coupon_code", "WELCOME"),
            ("coupon_code_3", "SPRING"),
            ("coupon_code_2", "LOYAL"),
            ("tag1", "alpha"),
            ("tag17", "beta"),
            ("license_key_2", "AAAA-BBBB"),
        ]);
        let notification = Notification::decode(&data).unwrap();
        assert_eq!(
            notification.coupon_codes.values().collect::<Vec<_>>(),
            ["WELCOME", "LOYAL", "SPRING"]
        );
        assert_eq!(notification.coupon_codes.get(2).map(String::as_str), Some("LOYAL"));
        assert_eq!(
            notification.numbered_tags.values().collect::<Vec<_>>(),
            ["alpha", "beta"]
        );
        assert_eq!(notification.license_keys.len(), 1);
        assert!(notification.eticket_urls.is_empty());
    }

    #[test]
    fn malformed_date_is_a_field_level_error() {
        let data = payload(&[("order_time", "soonish")]);
        assert!(matches!(
            Notification::decode(&data),
            Err(Error::InvalidDateTime(..))
        ));
    }

    #[test]
    fn connection_tests_and_test_mode_flag_are_test_traffic() {
        let test_event = Notification::decode(&payload(&[("event", "connection_test")])).unwrap();
        assert!(test_event.is_test());
        assert!(test_event.event.unwrap().is_test());

        let flagged = Notification::decode(&payload(&[
            ("event", "on_payment"),
            ("is_test_mode", "Y"),
        ]))
        .unwrap();
        assert!(flagged.is_test());
    }

    #[test]
    fn event_classification() {
        assert!(Event::Payment.is_transaction());
        assert!(Event::Chargeback.is_transaction());
        assert!(!Event::RebillCancelled.is_transaction());
        assert!(Event::RebillResumed.is_rebill_update());
        assert!(Event::LastPaidDay.is_rebill_update());
        assert!(!Event::Payment.is_rebill_update());
    }

    #[test]
    fn negative_amounts_fail_validation() {
        let data = payload(&[("event", "on_payment"), ("amount_netto", "-5.00")]);
        let notification = Notification::decode(&data).unwrap();
        assert!(matches!(
            notification.validate(),
            Err(Error::NegativeAmount("amount_netto", ..))
        ));
    }

    #[test]
    fn already_split_tags_pass_through_the_filter() {
        let mut data = payload(&[("event", "on_payment")]);
        data.insert(
            "tags".to_owned(),
            Value::List(vec![" vip ".to_owned(), String::new()]),
        );
        let notification = Notification::decode(&data).unwrap();
        assert_eq!(notification.tags, Some(vec!["vip".to_owned()]));
    }
}
