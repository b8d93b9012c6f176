//! Questionnaire portal: risk triage and the stores behind it.
//!
//! The stores run on top of [`db::Database`] and work unchanged on the
//! embedded and networked engines.

pub mod config;
pub mod risk;
pub mod store;
