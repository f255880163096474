//! Domain model for the publishing pipeline.

pub mod entities;
pub mod error;
pub mod types;
