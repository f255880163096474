//! Outpost: scheduled multi-platform publishing and metrics sync.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
