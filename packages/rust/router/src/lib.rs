//! Psychographic classification and program routing.
//!
//! This crate provides:
//! - [`Classifier`]: questionnaire responses → [`PsychographicProfile`]
//! - [`select_modules`]: profile + library snapshot → [`SelectedProgram`]
//!
//! Both are pure and read-only with respect to the library, so they can be
//! shared across concurrent requests without locking.
//!
//! [`PsychographicProfile`]: tiercast_shared::PsychographicProfile

pub mod classifier;
pub mod selection;

pub use classifier::{Classifier, Responses};
pub use selection::{SelectedProgram, select_modules};
