//! Client-resident wizard state machine.
//!
//! Owns the current step and the accumulated form data, asks the server to
//! validate a step before moving past it, and applies the payment skip rule
//! through the adjacency tables in [`super::navigation`]. Only one remote
//! call may be outstanding at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{TransportError, WizardError};

use super::model::{Field, Step, ValidationResult, WizardData};
use super::navigation::{next_step, prev_step};
use super::review::{self, ReviewSummary};

/// Server reply to a create exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResponse {
    Created { user_id: i64 },
    Invalid(ValidationResult),
    Forbidden,
}

/// The two remote exchanges the wizard depends on.
#[async_trait]
pub trait WizardTransport: Send + Sync {
    /// Validate one step. An empty result means the step passed.
    async fn validate_step(
        &self,
        step: i64,
        data: &WizardData,
    ) -> Result<ValidationResult, TransportError>;

    /// Submit the completed wizard.
    async fn create(&self, data: &WizardData) -> Result<CreateResponse, TransportError>;
}

/// What the wizard currently displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepView {
    pub step: Step,
    /// The only fields shown on this screen.
    pub fields: &'static [Field],
    pub errors: ValidationResult,
    /// Read-only summary, present on the review step.
    pub review: Option<ReviewSummary>,
}

/// Build the view for `step` from saved data and displayed errors.
pub fn render_step(step: Step, form: &WizardData, errors: &ValidationResult) -> StepView {
    StepView {
        step,
        fields: step.fields(),
        errors: errors.clone(),
        review: (step == Step::Review).then(|| ReviewSummary::from_data(form)),
    }
}

/// Result of a submit that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created { user_id: i64 },
    Rejected(ValidationResult),
}

#[derive(Debug, Default)]
struct WizardState {
    current: Step,
    /// Saved data, authoritative per step once that step has been saved.
    form: WizardData,
    /// Values currently typed into the inputs, saved or not.
    screen: WizardData,
    errors: ValidationResult,
    completed: Option<i64>,
}

/// Clears the in-flight flag when a remote call finishes, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WizardStateMachine<T> {
    transport: T,
    state: RwLock<WizardState>,
    in_flight: AtomicBool,
}

impl<T: WizardTransport> WizardStateMachine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: RwLock::new(WizardState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn current_step(&self) -> Step {
        self.state.read().await.current
    }

    pub async fn form_data(&self) -> WizardData {
        self.state.read().await.form.clone()
    }

    pub async fn field_errors(&self) -> ValidationResult {
        self.state.read().await.errors.clone()
    }

    /// User id of the record created by a successful submit.
    pub async fn completed(&self) -> Option<i64> {
        self.state.read().await.completed
    }

    /// Whether a remote call is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Record what the user typed into an input.
    pub async fn set_input(&self, field: Field, value: impl Into<String>) {
        self.state.write().await.screen.set(field, value);
    }

    /// Reformat a typed expiration as `MM/YY` and put it on screen.
    pub async fn format_expiration_input(&self, raw: &str) -> String {
        let formatted = review::format_expiration_input(raw);
        self.state
            .write()
            .await
            .screen
            .set(Field::ExpirationDate, formatted.clone());
        formatted
    }

    /// Copy the on-screen values of `step` into the saved data.
    pub async fn save_step_data(&self, step: Step) {
        let mut state = self.state.write().await;
        let WizardState { form, screen, .. } = &mut *state;
        form.merge_step(step, screen);
    }

    /// The view for the current step.
    pub async fn render(&self) -> StepView {
        let state = self.state.read().await;
        render_step(state.current, &state.form, &state.errors)
    }

    /// Validate the current step remotely and move forward if it passes.
    ///
    /// Validation errors keep the wizard on the current step with the errors
    /// displayed. A transport failure leaves every part of the state as it
    /// was, including unsaved input and displayed errors.
    pub async fn advance(&self) -> Result<StepView, WizardError> {
        let _guard = self.begin()?;

        let (from, staged) = {
            let state = self.state.read().await;
            if let Some(user_id) = state.completed {
                return Err(WizardError::Completed { user_id });
            }
            let mut staged = state.form.clone();
            staged.merge_step(state.current, &state.screen);
            (state.current, staged)
        };

        let result = self
            .transport
            .validate_step(from.index() as i64, &staged)
            .await
            .inspect_err(|e| warn!(step = %from, error = %e, "Step validation call failed"))?;

        let mut state = self.state.write().await;
        state.form = staged;
        if result.is_empty() {
            state.errors = ValidationResult::new();
            if let Some(next) = next_step(from, state.form.subscription()) {
                debug!(from = %from, to = %next, "Advanced");
                state.current = next;
            }
        } else {
            debug!(step = %from, fields = ?result.fields().collect::<Vec<_>>(), "Step rejected");
            state.errors = result;
        }
        Ok(render_step(state.current, &state.form, &state.errors))
    }

    /// Save the current step and move back without remote validation.
    ///
    /// A no-op on the first step. Refused while a call is outstanding so a
    /// pending advance cannot land relative to a step the user already left.
    pub async fn retreat(&self) -> Result<StepView, WizardError> {
        let _guard = self.begin()?;

        let mut state = self.state.write().await;
        if let Some(user_id) = state.completed {
            return Err(WizardError::Completed { user_id });
        }
        let current = state.current;
        let WizardState { form, screen, .. } = &mut *state;
        form.merge_step(current, screen);

        if let Some(prev) = prev_step(current, state.form.subscription()) {
            debug!(from = %current, to = %prev, "Retreated");
            state.current = prev;
            state.errors = ValidationResult::new();
        }
        Ok(render_step(state.current, &state.form, &state.errors))
    }

    /// Send the saved data for creation. Only allowed from the review step.
    ///
    /// On success the wizard is discarded: saved and on-screen data are
    /// cleared and further navigation reports completion.
    pub async fn submit(&self) -> Result<SubmitOutcome, WizardError> {
        let _guard = self.begin()?;

        let data = {
            let state = self.state.read().await;
            if let Some(user_id) = state.completed {
                return Err(WizardError::Completed { user_id });
            }
            if state.current != Step::Review {
                return Err(WizardError::NotAtReview);
            }
            state.form.clone()
        };

        let response = self
            .transport
            .create(&data)
            .await
            .inspect_err(|e| warn!(error = %e, "Create call failed"))?;

        let mut state = self.state.write().await;
        match response {
            CreateResponse::Created { user_id } => {
                info!(user_id, "Wizard submitted");
                state.form = WizardData::default();
                state.screen = WizardData::default();
                state.errors = ValidationResult::new();
                state.completed = Some(user_id);
                Ok(SubmitOutcome::Created { user_id })
            }
            CreateResponse::Invalid(errors) => {
                debug!(fields = ?errors.fields().collect::<Vec<_>>(), "Submission rejected");
                state.errors = errors.clone();
                Ok(SubmitOutcome::Rejected(errors))
            }
            CreateResponse::Forbidden => {
                warn!("Submission refused: anti-forgery token rejected");
                Err(WizardError::Forbidden)
            }
        }
    }

    fn begin(&self) -> Result<InFlight<'_>, WizardError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(&self.in_flight))
            .map_err(|_| WizardError::Busy)
    }
}
