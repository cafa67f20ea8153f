//! Read-only review summary and display helpers.

use serde::Serialize;

use super::model::{SubscriptionType, WizardData};

/// Character shown in place of a masked card digit.
pub const MASK_CHAR: char = '*';

/// Mask a card number for display.
///
/// The last four characters stay verbatim and every digit before them is
/// replaced with [`MASK_CHAR`]. Values of four characters or fewer have
/// nothing to mask and are returned as given (after trimming).
pub fn mask_card_number(number: &str) -> String {
    let number = number.trim();
    let chars: Vec<char> = number.chars().collect();
    if chars.len() <= 4 {
        return number.to_string();
    }
    let split = chars.len() - 4;
    chars[..split]
        .iter()
        .map(|c| if c.is_ascii_digit() { MASK_CHAR } else { *c })
        .chain(chars[split..].iter().copied())
        .collect()
}

/// Normalize a typed expiration into `MM/YY` as the user types.
///
/// Non-digits are dropped; once a third digit exists a slash is inserted
/// after the month and the year is cut to two digits.
pub fn format_expiration_input(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 3 {
        let end = digits.len().min(4);
        format!("{}/{}", &digits[..2], &digits[2..end])
    } else {
        digits
    }
}

/// Payment block of the review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub masked_card_number: String,
    pub expiration_date: String,
}

/// Everything the review step displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subscription_type: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub postal_code: String,
    pub state: String,
    pub country: String,
    /// Present only for premium subscriptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSummary>,
}

impl ReviewSummary {
    pub fn from_data(data: &WizardData) -> Self {
        let payment = (data.subscription() == Some(SubscriptionType::Premium)).then(|| {
            PaymentSummary {
                masked_card_number: mask_card_number(&data.credit_card_number),
                expiration_date: data.expiration_date.clone(),
            }
        });

        Self {
            name: data.name.clone(),
            email: data.email.clone(),
            phone: data.phone.clone(),
            subscription_type: data.subscription_type.clone(),
            address_line1: data.address_line1.clone(),
            address_line2: data.address_line2.clone(),
            city: data.city.clone(),
            postal_code: data.postal_code.clone(),
            state: data.state.clone(),
            country: data.country.clone(),
            payment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_card_number("4111111111111234"), "************1234");
    }

    #[test]
    fn short_numbers_are_not_masked() {
        assert_eq!(mask_card_number("123"), "123");
        assert_eq!(mask_card_number("1234"), "1234");
        assert_eq!(mask_card_number(""), "");
    }

    #[test]
    fn masking_keeps_separators_and_trims() {
        assert_eq!(mask_card_number(" 4111 1111 1234 "), "**** **** 1234");
    }

    #[test]
    fn expiration_input_formatting() {
        assert_eq!(format_expiration_input("1"), "1");
        assert_eq!(format_expiration_input("12"), "12");
        assert_eq!(format_expiration_input("123"), "12/3");
        assert_eq!(format_expiration_input("1230"), "12/30");
        assert_eq!(format_expiration_input("12/30"), "12/30");
        assert_eq!(format_expiration_input("12a3099"), "12/30");
    }

    #[test]
    fn payment_block_only_for_premium() {
        let mut data = WizardData {
            name: "Ann".into(),
            subscription_type: "free".into(),
            credit_card_number: "4111111111111234".into(),
            expiration_date: "12/30".into(),
            ..Default::default()
        };
        let summary = ReviewSummary::from_data(&data);
        assert!(summary.payment.is_none());
        assert_eq!(summary.name, "Ann");

        data.subscription_type = "premium".into();
        let summary = ReviewSummary::from_data(&data);
        let payment = summary.payment.unwrap();
        assert_eq!(payment.masked_card_number, "************1234");
        assert_eq!(payment.expiration_date, "12/30");
    }
}
