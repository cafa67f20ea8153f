//! Final submission: re-validate everything, then create the record graph.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::store::{NewRecord, PersistedRecord, RecordRepository};

use super::model::{Field, ValidationResult, WizardData};
use super::steps::{EMAIL_TAKEN, StepValidator};

/// What a submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// All rows were committed.
    Created(PersistedRecord),
    /// Nothing was written; these fields need correcting.
    Rejected(ValidationResult),
}

/// Turns a completed wizard into persisted records.
///
/// Client-side step gating is never trusted: every active step is validated
/// again against the full data before anything is written.
pub struct SubmissionService {
    validator: Arc<StepValidator>,
    repo: Arc<dyn RecordRepository>,
}

impl SubmissionService {
    pub fn new(validator: Arc<StepValidator>, repo: Arc<dyn RecordRepository>) -> Self {
        Self { validator, repo }
    }

    pub async fn submit(&self, data: &WizardData) -> Result<SubmissionOutcome, DatabaseError> {
        let mut violations = self.validator.validate_all(data).await?;
        if !violations.is_empty() {
            info!(
                fields = ?violations.fields().collect::<Vec<_>>(),
                "Submission rejected by validation"
            );
            return Ok(SubmissionOutcome::Rejected(violations));
        }

        let Some(subscription) = data.subscription() else {
            violations.add(Field::SubscriptionType, "Invalid subscription type.");
            return Ok(SubmissionOutcome::Rejected(violations));
        };

        let record = NewRecord::from_wizard(data, subscription);
        match self.repo.create_record(&record).await {
            Ok(created) => {
                info!(
                    user_id = created.user.id,
                    subscription = %subscription,
                    "Onboarding record created"
                );
                Ok(SubmissionOutcome::Created(created))
            }
            // Lost a race with a concurrent submission for the same address.
            Err(DatabaseError::UniqueViolation { column }) if column == "email" => {
                warn!("Email uniqueness conflict at commit");
                violations.add(Field::Email, EMAIL_TAKEN);
                Ok(SubmissionOutcome::Rejected(violations))
            }
            Err(e) => Err(e),
        }
    }
}
