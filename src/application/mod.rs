//! Application services: the pipeline logic between HTTP/cron triggers and storage.

pub mod adapters;
pub mod calendar;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod sync;
pub mod vault;
