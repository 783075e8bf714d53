//! # typestudy common library
//!
//! Shared code for the typing-study collection service:
//! - Participant counter model and sequential ID allocation
//! - Tracking sheet (CSV) rows
//! - Configuration loading
//! - Error types

pub mod config;
pub mod counter;
pub mod error;
pub mod tracking;

pub use counter::{CounterRecord, ParticipantData, PersonSlot};
pub use error::{Error, Result};
