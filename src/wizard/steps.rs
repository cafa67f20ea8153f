//! Per-step validation: which entity rules apply to which wizard step.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::config::ValidationPolicy;
use crate::error::DatabaseError;
use crate::store::RecordRepository;

use super::model::{Field, Step, ValidationResult, WizardData};
use super::rules::{Entity, FieldValidator};

/// Violation reported when the e-mail already belongs to a user.
pub const EMAIL_TAKEN: &str = "This email is already in use.";

/// The entity whose rules a step enforces, if any.
pub fn step_entity(step: Step) -> Option<Entity> {
    match step {
        Step::Identity => Some(Entity::User),
        Step::Address => Some(Entity::Address),
        Step::Payment => Some(Entity::Payment),
        Step::Review => None,
    }
}

/// Validate the local field rules for a wire step index.
///
/// Pure: the result depends only on the arguments. Indices that name no
/// step, and the review step, validate successfully.
pub fn validate_step_fields(
    index: i64,
    data: &WizardData,
    policy: ValidationPolicy,
    today: NaiveDate,
) -> ValidationResult {
    match Step::from_index(index).and_then(step_entity) {
        Some(entity) => FieldValidator::new(policy, today).validate(entity, data),
        None => ValidationResult::new(),
    }
}

/// Validates one wizard step against the rule tables and the store.
///
/// The only lookup beyond the rule tables is e-mail uniqueness on the
/// identity step; the store's UNIQUE constraint still guards the final
/// write.
pub struct StepValidator {
    repo: Arc<dyn RecordRepository>,
    policy: ValidationPolicy,
    today: Option<NaiveDate>,
}

impl StepValidator {
    pub fn new(repo: Arc<dyn RecordRepository>, policy: ValidationPolicy) -> Self {
        Self {
            repo,
            policy,
            today: None,
        }
    }

    /// Pin the date used for expiration checks instead of the UTC clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Validate the fields a step covers.
    pub async fn validate(
        &self,
        index: i64,
        data: &WizardData,
    ) -> Result<ValidationResult, DatabaseError> {
        let mut result = validate_step_fields(index, data, self.policy, self.today());

        if Step::from_index(index) == Some(Step::Identity) {
            self.check_email_unique(data, &mut result).await?;
        }

        debug!(
            step = index,
            valid = result.is_empty(),
            fields = ?result.fields().collect::<Vec<_>>(),
            "Step validated"
        );
        Ok(result)
    }

    /// Validate every step the subscription makes active, merged in field order.
    ///
    /// When the subscription cannot be decoded the payment step is not
    /// checked; the identity violation on `subscriptionType` already rejects
    /// the data.
    pub async fn validate_all(&self, data: &WizardData) -> Result<ValidationResult, DatabaseError> {
        let mut result = self.validate(Step::Identity.index() as i64, data).await?;
        result.merge(self.validate(Step::Address.index() as i64, data).await?);
        if data.subscription().is_some_and(|s| s.requires_payment()) {
            result.merge(self.validate(Step::Payment.index() as i64, data).await?);
        }
        Ok(result)
    }

    async fn check_email_unique(
        &self,
        data: &WizardData,
        result: &mut ValidationResult,
    ) -> Result<(), DatabaseError> {
        // Only a well-formed address is worth a lookup.
        if data.email.is_empty() || result.contains(Field::Email) {
            return Ok(());
        }
        if self.repo.email_exists(&data.email).await? {
            result.add(Field::Email, EMAIL_TAKEN);
        }
        Ok(())
    }
}
