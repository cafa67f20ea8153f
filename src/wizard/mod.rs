//! Onboarding wizard: identity, address, optional payment, then review.
//!
//! The server side validates one step at a time and, on final confirmation,
//! re-validates everything before creating the user, address and payment
//! records in one transaction. The client side drives the steps and skips
//! payment for free subscriptions.

pub mod client;
pub mod machine;
pub mod model;
pub mod navigation;
pub mod review;
pub mod routes;
pub mod rules;
pub mod steps;
pub mod submission;

pub use client::HttpTransport;
pub use machine::{CreateResponse, StepView, SubmitOutcome, WizardStateMachine, WizardTransport};
pub use model::{Field, Step, SubscriptionType, ValidationResult, WizardData};
pub use review::{ReviewSummary, mask_card_number};
pub use routes::{OnboardingState, onboarding_routes};
pub use rules::{Entity, FieldValidator};
pub use steps::StepValidator;
pub use submission::{SubmissionOutcome, SubmissionService};
