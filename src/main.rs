use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use outpost::{
    application::{
        adapters::AdapterRegistry,
        calendar::CalendarService,
        credentials::ConnectionService,
        dispatch::Dispatcher,
        error::{AppError, PipelineError},
        jobs::{DispatchWorkerContext, dispatch_schedule, process_dispatch_tick},
        sync::SyncEngine,
        vault::CredentialVault,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::DispatchOnce(_) => run_dispatch_once(settings).await,
    }
}

/// Everything the serve and one-shot paths share: database, vault, adapters,
/// and the services built on them.
struct Runtime {
    db: Arc<PostgresRepositories>,
    dispatcher: Arc<Dispatcher>,
    calendar: Arc<CalendarService>,
    sync: Arc<SyncEngine>,
    connections: Arc<ConnectionService>,
}

async fn init_runtime(settings: &config::Settings) -> Result<Runtime, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration("database.url is not configured"))
    })?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(format!("failed to connect: {err}")))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(format!("failed to run migrations: {err}")))?;
    let db = Arc::new(PostgresRepositories::new(pool));

    let vault = Arc::new(
        CredentialVault::from_base64_key(&settings.vault.key).map_err(PipelineError::from)?,
    );
    let registry = Arc::new(AdapterRegistry::from_settings(
        &settings.platforms,
        reqwest::Client::new(),
    ));

    let connections = Arc::new(ConnectionService::new(db.clone(), vault));
    let dispatcher = Arc::new(Dispatcher::new(
        db.clone(),
        connections.clone(),
        registry.clone(),
        settings.dispatch.concurrency.get() as usize,
        settings.dispatch.batch_size.get(),
    ));
    let calendar = Arc::new(CalendarService::new(db.clone()));
    let sync = Arc::new(SyncEngine::new(
        db.clone(),
        connections.clone(),
        registry,
        settings.sync.clone(),
    ));

    Ok(Runtime {
        db,
        dispatcher,
        calendar,
        sync,
        connections,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let runtime = init_runtime(&settings).await?;

    let monitor_handle = spawn_dispatch_monitor(runtime.dispatcher.clone(), &settings)?;

    let state = ApiState {
        calendar: runtime.calendar,
        dispatcher: runtime.dispatcher,
        sync: runtime.sync,
        connections: runtime.connections,
        db: Some(runtime.db),
        service_token: settings.api.service_token.as_deref().map(Arc::from),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "listening");

    let graceful = settings.server.graceful_shutdown;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    let result = tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(graceful).await;
        } => {
            warn!("graceful shutdown window elapsed, exiting");
            Ok(())
        }
    };

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_dispatch_once(settings: config::Settings) -> Result<(), AppError> {
    let runtime = init_runtime(&settings).await?;
    let outcome = runtime.dispatcher.run().await?;
    info!(
        processed = outcome.processed,
        published = outcome.published,
        failed = outcome.failed,
        "dispatch pass finished"
    );
    Ok(())
}

fn spawn_dispatch_monitor(
    dispatcher: Arc<Dispatcher>,
    settings: &config::Settings,
) -> Result<tokio::task::JoinHandle<()>, AppError> {
    let schedule = dispatch_schedule(&settings.dispatch.cron)?;
    let context = DispatchWorkerContext { dispatcher };

    let dispatch_worker = WorkerBuilder::new("dispatch-worker")
        .data(context)
        .backend(CronStream::new(schedule))
        .build_fn(process_dispatch_tick);

    let monitor = Monitor::new().register(dispatch_worker);

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "dispatch monitor stopped");
        }
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
