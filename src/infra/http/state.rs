use std::sync::Arc;

use crate::application::calendar::CalendarService;
use crate::application::credentials::ConnectionService;
use crate::application::dispatch::Dispatcher;
use crate::application::sync::SyncEngine;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub calendar: Arc<CalendarService>,
    pub dispatcher: Arc<Dispatcher>,
    pub sync: Arc<SyncEngine>,
    pub connections: Arc<ConnectionService>,
    /// Absent only in tests that run the router without a database.
    pub db: Option<Arc<PostgresRepositories>>,
    pub service_token: Option<Arc<str>>,
}
