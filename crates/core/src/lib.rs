//! Shared building blocks for the HRMS front-end services.
//!
//! - [`validation`] -- the declarative form validation engine used by every
//!   form (login, onboarding, leave requests, settings, company
//!   registration).
//! - [`roles`] -- the closed role set carried in session tokens.

pub mod error;
pub mod roles;
pub mod types;
pub mod validation;
