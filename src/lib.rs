//! Onboarding Wizard — multi-step signup with server-side validation.

pub mod config;
pub mod csrf;
pub mod error;
pub mod store;
pub mod wizard;
