//! Wizard data models: the accumulated form, steps, fields and violations.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Subscription category chosen on the identity step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Free,
    Premium,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    /// Whether this category collects payment details.
    pub fn requires_payment(&self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted category value that names no known subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown subscription type: {0:?}")]
pub struct UnknownSubscriptionType(pub String);

impl std::str::FromStr for SubscriptionType {
    type Err = UnknownSubscriptionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(UnknownSubscriptionType(other.to_string())),
        }
    }
}

/// Every input the wizard collects, in form order.
///
/// Serializes to the camelCase name used on the wire and in error maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Name,
    Email,
    Phone,
    SubscriptionType,
    AddressLine1,
    AddressLine2,
    City,
    PostalCode,
    State,
    Country,
    CreditCardNumber,
    ExpirationDate,
    Cvv,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Name,
        Field::Email,
        Field::Phone,
        Field::SubscriptionType,
        Field::AddressLine1,
        Field::AddressLine2,
        Field::City,
        Field::PostalCode,
        Field::State,
        Field::Country,
        Field::CreditCardNumber,
        Field::ExpirationDate,
        Field::Cvv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::SubscriptionType => "subscriptionType",
            Self::AddressLine1 => "addressLine1",
            Self::AddressLine2 => "addressLine2",
            Self::City => "city",
            Self::PostalCode => "postalCode",
            Self::State => "state",
            Self::Country => "country",
            Self::CreditCardNumber => "creditCardNumber",
            Self::ExpirationDate => "expirationDate",
            Self::Cvv => "cvv",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four wizard screens. Discriminants are the wire step indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Identity = 0,
    Address = 1,
    Payment = 2,
    Review = 3,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Identity, Step::Address, Step::Payment, Step::Review];
    pub const FIRST: Step = Step::Identity;
    pub const LAST: Step = Step::Review;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Map a wire index to a step. Indices outside 0..=3 name no step.
    pub fn from_index(index: i64) -> Option<Step> {
        match index {
            0 => Some(Step::Identity),
            1 => Some(Step::Address),
            2 => Some(Step::Payment),
            3 => Some(Step::Review),
            _ => None,
        }
    }

    /// Inputs shown on this step. The review step has none of its own.
    pub fn fields(self) -> &'static [Field] {
        match self {
            Step::Identity => &[Field::Name, Field::Email, Field::Phone, Field::SubscriptionType],
            Step::Address => &[
                Field::AddressLine1,
                Field::AddressLine2,
                Field::City,
                Field::PostalCode,
                Field::State,
                Field::Country,
            ],
            Step::Payment => &[Field::CreditCardNumber, Field::ExpirationDate, Field::Cvv],
            Step::Review => &[],
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Address => "address",
            Self::Payment => "payment",
            Self::Review => "review",
        };
        write!(f, "{s}")
    }
}

/// Accumulated wizard input. Every field starts empty.
///
/// A field sent as `null` or left out decodes as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardData {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub subscription_type: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub address_line1: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub address_line2: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub city: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub postal_code: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub state: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub country: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub credit_card_number: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub expiration_date: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub cvv: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl WizardData {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Email => &self.email,
            Field::Phone => &self.phone,
            Field::SubscriptionType => &self.subscription_type,
            Field::AddressLine1 => &self.address_line1,
            Field::AddressLine2 => &self.address_line2,
            Field::City => &self.city,
            Field::PostalCode => &self.postal_code,
            Field::State => &self.state,
            Field::Country => &self.country,
            Field::CreditCardNumber => &self.credit_card_number,
            Field::ExpirationDate => &self.expiration_date,
            Field::Cvv => &self.cvv,
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Name => &mut self.name,
            Field::Email => &mut self.email,
            Field::Phone => &mut self.phone,
            Field::SubscriptionType => &mut self.subscription_type,
            Field::AddressLine1 => &mut self.address_line1,
            Field::AddressLine2 => &mut self.address_line2,
            Field::City => &mut self.city,
            Field::PostalCode => &mut self.postal_code,
            Field::State => &mut self.state,
            Field::Country => &mut self.country,
            Field::CreditCardNumber => &mut self.credit_card_number,
            Field::ExpirationDate => &mut self.expiration_date,
            Field::Cvv => &mut self.cvv,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Copy one step's fields from `source` into `self`. Never validates.
    pub fn merge_step(&mut self, step: Step, source: &WizardData) {
        for &field in step.fields() {
            self.set(field, source.get(field));
        }
    }

    /// Decoded subscription, or `None` when blank or unknown.
    pub fn subscription(&self) -> Option<SubscriptionType> {
        self.subscription_type.parse().ok()
    }
}

/// Field violations, keyed by field and kept in form order.
///
/// An empty result means the validated data is acceptable. Serializes as
/// `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationResult(BTreeMap<Field, Vec<String>>);

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a violation for `field`, after any it already has.
    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn get(&self, field: Field) -> Option<&[String]> {
        self.0.get(&field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &[String])> {
        self.0.iter().map(|(f, m)| (*f, m.as_slice()))
    }

    /// Fold another result into this one, preserving per-field message order.
    pub fn merge(&mut self, other: ValidationResult) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }
}
