//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::HashMap, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "outpost";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DISPATCH_CRON: &str = "0 * * * * *";
const DEFAULT_DISPATCH_CONCURRENCY: u32 = 4;
const DEFAULT_DISPATCH_BATCH_SIZE: u32 = 50;
const DEFAULT_SYNC_COOLDOWN_SECS: u64 = 900;
const DEFAULT_SYNC_LOOKBACK_DAYS: u32 = 30;
const DEFAULT_X_BASE_URL: &str = "https://api.x.com";
const DEFAULT_FACEBOOK_BASE_URL: &str = "https://graph.facebook.com/v21.0";
const DEFAULT_INSTAGRAM_BASE_URL: &str = "https://graph.instagram.com";
const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Command-line arguments for the Outpost binary.
#[derive(Debug, Parser)]
#[command(name = "outpost", version, about = "Outpost publishing pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "OUTPOST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API and the cron dispatch worker.
    Serve(Box<ServeArgs>),
    /// Run a single dispatch pass and exit.
    #[command(name = "dispatch")]
    DispatchOnce(DispatchOnceArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct DispatchOnceArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Maximum number of posts published concurrently.
    #[arg(long, value_name = "COUNT")]
    pub concurrency: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the dispatch cron expression.
    #[arg(long = "dispatch-cron", value_name = "EXPR")]
    pub dispatch_cron: Option<String>,

    /// Override the dispatch publish concurrency.
    #[arg(long = "dispatch-concurrency", value_name = "COUNT")]
    pub dispatch_concurrency: Option<u32>,

    /// Override the maximum posts drained per dispatch pass.
    #[arg(long = "dispatch-batch-size", value_name = "COUNT")]
    pub dispatch_batch_size: Option<u32>,

    /// Override the default sync cooldown window.
    #[arg(long = "sync-cooldown-seconds", value_name = "SECONDS")]
    pub sync_cooldown_seconds: Option<u64>,

    /// Override how far back metric fetches reach.
    #[arg(long = "sync-lookback-days", value_name = "DAYS")]
    pub sync_lookback_days: Option<u32>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub vault: VaultSettings,
    pub dispatch: DispatchSettings,
    pub sync: SyncSettings,
    pub platforms: PlatformsSettings,
    pub api: ApiSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// The vault key never appears in Debug output.
#[derive(Clone)]
pub struct VaultSettings {
    pub key: String,
}

impl std::fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSettings")
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub cron: String,
    pub concurrency: NonZeroU32,
    pub batch_size: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub cooldown_secs: u64,
    /// Per-report-type overrides keyed by report type, e.g. `youtube_metrics`.
    pub cooldown_overrides: HashMap<String, u64>,
    pub lookback_days: u32,
}

#[derive(Debug, Clone)]
pub struct PlatformsSettings {
    pub x: PlatformEndpoint,
    pub facebook: PlatformEndpoint,
    pub instagram: PlatformEndpoint,
    pub youtube: PlatformEndpoint,
}

#[derive(Debug, Clone)]
pub struct PlatformEndpoint {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Bearer token required on every API request; `None` disables auth,
    /// intended only for local development.
    pub service_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("OUTPOST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::DispatchOnce(args)) => raw.apply_dispatch_once_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    vault: RawVaultSettings,
    dispatch: RawDispatchSettings,
    sync: RawSyncSettings,
    platforms: RawPlatformsSettings,
    api: RawApiSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(cron) = overrides.dispatch_cron.as_ref() {
            self.dispatch.cron = Some(cron.clone());
        }
        if let Some(value) = overrides.dispatch_concurrency {
            self.dispatch.concurrency = Some(value);
        }
        if let Some(value) = overrides.dispatch_batch_size {
            self.dispatch.batch_size = Some(value);
        }
        if let Some(value) = overrides.sync_cooldown_seconds {
            self.sync.cooldown_seconds = Some(value);
        }
        if let Some(value) = overrides.sync_lookback_days {
            self.sync.lookback_days = Some(value);
        }
    }

    fn apply_dispatch_once_overrides(&mut self, args: &DispatchOnceArgs) {
        if let Some(url) = args.database.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(value) = args.concurrency {
            self.dispatch.concurrency = Some(value);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            vault,
            dispatch,
            sync,
            platforms,
            api,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            vault: build_vault_settings(vault)?,
            dispatch: build_dispatch_settings(dispatch)?,
            sync: build_sync_settings(sync)?,
            platforms: build_platforms_settings(platforms)?,
            api: build_api_settings(api),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_vault_settings(vault: RawVaultSettings) -> Result<VaultSettings, LoadError> {
    let key = vault
        .key
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("vault.key", "vault key must be configured"))?;
    Ok(VaultSettings { key })
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let cron = dispatch
        .cron
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DISPATCH_CRON.to_string());

    let concurrency = dispatch.concurrency.unwrap_or(DEFAULT_DISPATCH_CONCURRENCY);
    let batch_size = dispatch.batch_size.unwrap_or(DEFAULT_DISPATCH_BATCH_SIZE);

    Ok(DispatchSettings {
        cron,
        concurrency: non_zero_u32(concurrency.into(), "dispatch.concurrency")?,
        batch_size: non_zero_u32(batch_size.into(), "dispatch.batch_size")?,
    })
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let cooldown_secs = sync.cooldown_seconds.unwrap_or(DEFAULT_SYNC_COOLDOWN_SECS);
    if cooldown_secs == 0 {
        return Err(LoadError::invalid(
            "sync.cooldown_seconds",
            "must be greater than zero",
        ));
    }

    for (report_type, secs) in &sync.cooldown_overrides {
        if *secs == 0 {
            return Err(LoadError::invalid(
                "sync.cooldown_overrides",
                format!("override for `{report_type}` must be greater than zero"),
            ));
        }
    }

    let lookback_days = sync.lookback_days.unwrap_or(DEFAULT_SYNC_LOOKBACK_DAYS);
    if lookback_days == 0 {
        return Err(LoadError::invalid(
            "sync.lookback_days",
            "must be greater than zero",
        ));
    }

    Ok(SyncSettings {
        cooldown_secs,
        cooldown_overrides: sync.cooldown_overrides,
        lookback_days,
    })
}

fn build_platforms_settings(
    platforms: RawPlatformsSettings,
) -> Result<PlatformsSettings, LoadError> {
    Ok(PlatformsSettings {
        x: build_endpoint(platforms.x, DEFAULT_X_BASE_URL, "platforms.x.base_url")?,
        facebook: build_endpoint(
            platforms.facebook,
            DEFAULT_FACEBOOK_BASE_URL,
            "platforms.facebook.base_url",
        )?,
        instagram: build_endpoint(
            platforms.instagram,
            DEFAULT_INSTAGRAM_BASE_URL,
            "platforms.instagram.base_url",
        )?,
        youtube: build_endpoint(
            platforms.youtube,
            DEFAULT_YOUTUBE_BASE_URL,
            "platforms.youtube.base_url",
        )?,
    })
}

fn build_endpoint(
    raw: RawPlatformEndpoint,
    default: &str,
    key: &'static str,
) -> Result<PlatformEndpoint, LoadError> {
    let base_url = raw
        .base_url
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string());
    if base_url.is_empty() {
        return Err(LoadError::invalid(key, "base url must not be empty"));
    }
    Ok(PlatformEndpoint { base_url })
}

fn build_api_settings(api: RawApiSettings) -> ApiSettings {
    let service_token = api
        .service_token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    ApiSettings { service_token }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawVaultSettings {
    key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    cron: Option<String>,
    concurrency: Option<u32>,
    batch_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    cooldown_seconds: Option<u64>,
    cooldown_overrides: HashMap<String, u64>,
    lookback_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformsSettings {
    x: RawPlatformEndpoint,
    facebook: RawPlatformEndpoint,
    instagram: RawPlatformEndpoint,
    youtube: RawPlatformEndpoint,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformEndpoint {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    service_token: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_key() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.vault.key = Some("dGVzdC1rZXk".to_string());
        raw
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_key();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn missing_vault_key_is_rejected() {
        let raw = RawSettings::default();
        let result = Settings::from_raw(raw);
        assert!(matches!(
            result,
            Err(LoadError::Invalid { key: "vault.key", .. })
        ));
    }

    #[test]
    fn dispatch_defaults_apply() {
        let settings = Settings::from_raw(raw_with_key()).expect("valid settings");
        assert_eq!(settings.dispatch.cron, DEFAULT_DISPATCH_CRON);
        assert_eq!(settings.dispatch.concurrency.get(), 4);
        assert_eq!(settings.dispatch.batch_size.get(), 50);
    }

    #[test]
    fn zero_cooldown_override_is_rejected() {
        let mut raw = raw_with_key();
        raw.sync
            .cooldown_overrides
            .insert("youtube_metrics".to_string(), 0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn platform_base_urls_are_trimmed() {
        let mut raw = raw_with_key();
        raw.platforms.x.base_url = Some("https://example.test/api/".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.platforms.x.base_url, "https://example.test/api");
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = raw_with_key();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["outpost"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_dispatch_once_arguments() {
        let args = CliArgs::parse_from([
            "outpost",
            "dispatch",
            "--database-url",
            "postgres://example",
            "--concurrency",
            "2",
        ]);

        match args.command.expect("dispatch command") {
            Command::DispatchOnce(dispatch) => {
                assert_eq!(
                    dispatch.database.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert_eq!(dispatch.concurrency, Some(2));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "outpost",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--dispatch-cron",
            "0 */5 * * * *",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.dispatch_cron.as_deref(),
                    Some("0 */5 * * * *")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
