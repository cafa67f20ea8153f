//! `RecordRepository` trait — the storage capability behind submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::wizard::model::{SubscriptionType, WizardData};

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subscription_type: SubscriptionType,
    pub created_at: DateTime<Utc>,
}

/// A persisted address, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub state: String,
    pub country: String,
}

/// Persisted payment details, owned by exactly one premium user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub credit_card_number: String,
    pub expiration_date: String,
    pub cvv: String,
}

/// The user, address and optional payment created by one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub user: User,
    pub address: Address,
    pub payment: Option<Payment>,
}

/// Validated input for a new record graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subscription_type: SubscriptionType,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub state: String,
    pub country: String,
    /// Present iff the subscription is premium.
    pub payment: Option<NewPayment>,
}

/// Payment fields of a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub credit_card_number: String,
    pub expiration_date: String,
    pub cvv: String,
}

impl NewRecord {
    /// Build the record graph for `data` under an already-decoded subscription.
    ///
    /// Payment fields are carried only for premium subscriptions, and an empty
    /// second address line is stored as absent.
    pub fn from_wizard(data: &WizardData, subscription_type: SubscriptionType) -> Self {
        let payment = subscription_type.requires_payment().then(|| NewPayment {
            credit_card_number: data.credit_card_number.clone(),
            expiration_date: data.expiration_date.clone(),
            cvv: data.cvv.clone(),
        });
        let address_line2 = Some(data.address_line2.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            name: data.name.clone(),
            email: data.email.clone(),
            phone: data.phone.clone(),
            subscription_type,
            address_line1: data.address_line1.clone(),
            address_line2,
            city: data.city.clone(),
            postal_code: data.postal_code.clone(),
            state: data.state.clone(),
            country: data.country.clone(),
            payment,
        }
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub users: u64,
    pub addresses: u64,
    pub payments: u64,
}

/// Durable storage for users, addresses and payments.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Whether a user with exactly this e-mail exists.
    async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError>;

    /// Create the user, address and optional payment as one atomic unit.
    ///
    /// Either all rows are written or none are. A duplicate e-mail fails
    /// with `DatabaseError::UniqueViolation { column: "email" }`, enforced by
    /// the store itself rather than by a prior lookup.
    async fn create_record(&self, record: &NewRecord) -> Result<PersistedRecord, DatabaseError>;

    /// Load a user and its related rows.
    async fn get_record(&self, user_id: i64) -> Result<Option<PersistedRecord>, DatabaseError>;

    /// Count rows in each table.
    async fn record_counts(&self) -> Result<RecordCounts, DatabaseError>;
}
