//! Cron-triggered dispatch worker.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::application::dispatch::Dispatcher;
use crate::application::error::PipelineError;

/// Marker struct for the cron-triggered dispatch pass.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron.
#[derive(Default, Debug, Clone)]
pub struct DispatchTick;

impl From<chrono::DateTime<chrono::Utc>> for DispatchTick {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct DispatchWorkerContext {
    pub dispatcher: Arc<Dispatcher>,
}

/// Run one dispatch pass. Errors are logged, never bubbled: the next tick
/// retries whatever is still due.
pub async fn process_dispatch_tick(
    _tick: DispatchTick,
    ctx: Data<DispatchWorkerContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.dispatcher.run().await {
        Ok(outcome) if outcome.processed > 0 => {
            tracing::info!(
                published = outcome.published,
                failed = outcome.failed,
                "dispatch tick completed"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "dispatch tick failed");
        }
        _ => {}
    }
    Ok(())
}

/// Parse the configured dispatch cadence into a cron schedule.
pub fn dispatch_schedule(expr: &str) -> Result<Schedule, PipelineError> {
    Schedule::from_str(expr).map_err(|err| {
        PipelineError::configuration(format!("invalid dispatch cron expression `{expr}`: {err}"))
    })
}
