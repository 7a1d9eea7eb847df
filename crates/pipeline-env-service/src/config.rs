use crate::db::error::DBError;
use clap::builder::BoolishValueParser;
use clap::Parser;
use log::LevelFilter;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use serde::{de::Error as _, Deserialize, Deserializer};
use std::fmt::{self, Display};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error as ThisError;

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigError> {
    LevelFilter::from_str(level).map_err(|e| ConfigError::InvalidValue {
        key: "log.level",
        value: level.to_string(),
        reason: e.to_string(),
    })
}

fn default_environment() -> String {
    "local".to_string()
}

fn default_http_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_http_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Address of the diagnostics server when running in developer mode.
fn default_developer_diagnose_http_address() -> String {
    "127.0.0.1:0".to_string()
}

fn default_wit_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_wit_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_user() -> String {
    "postgres".to_string()
}

fn default_postgres_database() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "mysecretpassword".to_string()
}

fn default_postgres_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_postgres_connection_retry_sleep() -> Duration {
    Duration::from_secs(1)
}

fn default_postgres_transaction_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Connection pool limits use -1 to select the pool default.
fn default_postgres_connection_limit() -> i32 {
    -1
}

/// Parses a duration such as `500ms`, `1s`, `5m` or `2h`.
/// A bare number is interpreted as seconds.
pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, unit_ms) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1_000)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60_000)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600_000)
    } else {
        (s, 1_000)
    };
    let number: u64 = number.parse().map_err(|e| {
        format!("Invalid duration '{s}', valid examples: `500ms`, `1s`, `5m`, `2h`, `30`: {e}")
    })?;
    number
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration '{s}' is too large"))
}

/// Postgres `sslmode`, with the same names as libpq.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PgSslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl Display for PgSslMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PgSslMode::Disable => write!(f, "disable"),
            PgSslMode::Allow => write!(f, "allow"),
            PgSslMode::Prefer => write!(f, "prefer"),
            PgSslMode::Require => write!(f, "require"),
            PgSslMode::VerifyCa => write!(f, "verify-ca"),
            PgSslMode::VerifyFull => write!(f, "verify-full"),
        }
    }
}

/// Command-line arguments of the service.
///
/// Every setting can also be provided through its `F8_` environment variable.
/// Settings which are given neither way are taken from the configuration file,
/// and otherwise from the built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct ServiceArgs {
    /// Path to the YAML configuration file.
    #[arg(long, env = "BUILD_CONFIG_FILE_PATH")]
    pub config_file: Option<String>,

    /// Write the OpenAPI specification to `openapi.json` and exit.
    #[arg(long)]
    pub dump_openapi: bool,

    /// Enables developer mode, which relaxes the defaults of the log format
    /// and the diagnostics server.
    #[arg(long, env = "F8_DEVELOPER_MODE_ENABLED", value_parser = BoolishValueParser::new())]
    pub developer_mode_enabled: Option<bool>,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`). Default: `info`.
    #[arg(long, env = "F8_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Whether to log in JSON format.
    /// Default: `false` in developer mode, `true` otherwise.
    #[arg(long, env = "F8_LOG_JSON", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Name of the deployment environment. Default: `local`.
    #[arg(long, env = "F8_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Address on which the HTTP server binds. Default: `0.0.0.0:8080`.
    #[arg(long, env = "F8_HTTP_ADDRESS")]
    pub http_address: Option<String>,

    /// Address on which `/metrics` is served. Default: `0.0.0.0:8080`.
    #[arg(long, env = "F8_METRICS_HTTP_ADDRESS")]
    pub metrics_http_address: Option<String>,

    /// Address of the diagnostics server. Empty disables it.
    /// Default: `127.0.0.1:0` in developer mode, disabled otherwise.
    #[arg(long, env = "F8_DIAGNOSE_HTTP_ADDRESS")]
    pub diagnose_http_address: Option<String>,

    #[arg(long, env = "F8_POSTGRES_HOST")]
    pub postgres_host: Option<String>,

    #[arg(long, env = "F8_POSTGRES_PORT")]
    pub postgres_port: Option<u16>,

    #[arg(long, env = "F8_POSTGRES_USER")]
    pub postgres_user: Option<String>,

    #[arg(long, env = "F8_POSTGRES_PASSWORD")]
    pub postgres_password: Option<String>,

    #[arg(long, env = "F8_POSTGRES_DATABASE")]
    pub postgres_database: Option<String>,

    #[arg(long, env = "F8_POSTGRES_SSLMODE", value_enum)]
    pub postgres_sslmode: Option<PgSslMode>,

    /// Timeout for establishing a database connection.
    #[arg(long, env = "F8_POSTGRES_CONNECTION_TIMEOUT", value_parser = parse_duration)]
    pub postgres_connection_timeout: Option<Duration>,

    /// Pause between attempts to establish the initial database connection.
    #[arg(long, env = "F8_POSTGRES_CONNECTION_RETRYSLEEP", value_parser = parse_duration)]
    pub postgres_connection_retry_sleep: Option<Duration>,

    /// Maximum number of idle connections (-1 uses the pool default).
    #[arg(
        long,
        env = "F8_POSTGRES_CONNECTION_MAXIDLE",
        allow_negative_numbers = true
    )]
    pub postgres_connection_max_idle: Option<i32>,

    /// Maximum number of open connections (-1 uses the pool default).
    #[arg(
        long,
        env = "F8_POSTGRES_CONNECTION_MAXOPEN",
        allow_negative_numbers = true
    )]
    pub postgres_connection_max_open: Option<i32>,

    /// Upper bound on the duration of a single database transaction.
    #[arg(long, env = "F8_POSTGRES_TRANSACTION_TIMEOUT", value_parser = parse_duration)]
    pub postgres_transaction_timeout: Option<Duration>,

    /// Base URL of the space lookup service.
    #[arg(long, env = "F8_WIT_URL")]
    pub wit_url: Option<String>,

    /// Upper bound on the duration of a space lookup.
    #[arg(long, env = "F8_WIT_TIMEOUT", value_parser = parse_duration)]
    pub wit_timeout: Option<Duration>,

    /// PEM-encoded RSA public key used to verify bearer tokens.
    /// Without it no request carries an identity.
    #[arg(long, env = "F8_AUTH_PUBLIC_KEY")]
    pub auth_public_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawDuration> = Option::deserialize(deserializer)?;
    raw.map(|raw| match raw {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    })
    .transpose()
}

/// Contents of the YAML configuration file. All keys are optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub developer: FileDeveloper,
    pub log: FileLog,
    pub environment: Option<String>,
    pub http: FileHttp,
    pub metrics: FileNestedHttp,
    pub diagnose: FileNestedHttp,
    pub postgres: FilePostgres,
    pub wit: FileWit,
    pub auth: FileAuth,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileDeveloper {
    pub mode: FileDeveloperMode,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileDeveloperMode {
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileLog {
    pub level: Option<String>,
    pub json: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileHttp {
    pub address: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileNestedHttp {
    pub http: FileHttp,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilePostgres {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub sslmode: Option<PgSslMode>,
    pub connection: FilePostgresConnection,
    pub transaction: FilePostgresTransaction,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilePostgresConnection {
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub retrysleep: Option<Duration>,
    pub maxidle: Option<i32>,
    pub maxopen: Option<i32>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilePostgresTransaction {
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileWit {
    pub url: Option<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileAuth {
    pub public_key: Option<String>,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid, empty configuration.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&yaml).map_err(|e| ConfigError::ParseFile {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not read configuration file {path} due to: {error}")]
    ReadFile { path: String, error: String },
    #[error("configuration file {path} is not valid YAML configuration: {error}")]
    ParseFile { path: String, error: String },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub sslmode: PgSslMode,
    pub connection_timeout: Duration,
    pub connection_retry_sleep: Duration,
    pub connection_max_idle: i32,
    pub connection_max_open: i32,
    pub transaction_timeout: Duration,
}

impl PostgresConfig {
    /// Connection string in the libpq key/value format.
    pub fn config_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={} connect_timeout={}",
            self.host,
            self.port,
            self.user,
            self.password,
            self.database,
            self.sslmode,
            self.connection_timeout.as_secs()
        )
    }

    pub(crate) fn tokio_postgres_config(&self) -> tokio_postgres::Config {
        use tokio_postgres::config::SslMode;
        let ssl_mode = match self.sslmode {
            PgSslMode::Disable => SslMode::Disable,
            PgSslMode::Allow | PgSslMode::Prefer => SslMode::Prefer,
            PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull => SslMode::Require,
        };
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database)
            .ssl_mode(ssl_mode)
            .connect_timeout(self.connection_timeout);
        config
    }

    /// Whether an idle connection limit is set, which the pool cannot honor.
    pub fn ignores_max_idle(&self) -> bool {
        self.connection_max_idle >= 0
    }

    /// Maximum size of the connection pool, `None` for the pool default.
    pub fn max_pool_size(&self) -> Option<usize> {
        usize::try_from(self.connection_max_open)
            .ok()
            .filter(|size| *size > 0)
    }

    /// TLS connector for the modes which may use TLS, `None` for `disable`.
    pub(crate) fn tls_connector(&self) -> Result<Option<MakeTlsConnector>, DBError> {
        if self.sslmode == PgSslMode::Disable {
            return Ok(None);
        }
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|e| DBError::TlsConnection {
                hint: "Unable to build TLS Connector to connect to PostgreSQL".to_string(),
                openssl_error: Some(e),
            })?;

        // Like libpq, only the `verify-*` modes check the server certificate.
        if !matches!(self.sslmode, PgSslMode::VerifyCa | PgSslMode::VerifyFull) {
            builder.set_verify(SslVerifyMode::NONE);
        }
        let mut connector = MakeTlsConnector::new(builder.build());

        if self.sslmode != PgSslMode::VerifyFull {
            connector.set_callback(|ctx, _| {
                ctx.set_verify_hostname(false);
                Ok(())
            });
        }

        Ok(Some(connector))
    }
}

/// Resolved configuration of the service.
///
/// Built once at startup and handed to each component that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub developer_mode_enabled: bool,
    pub log_level: LevelFilter,
    log_json: Option<bool>,
    pub environment: String,
    pub http_address: String,
    pub metrics_http_address: String,
    diagnose_http_address: Option<String>,
    pub postgres: PostgresConfig,
    pub wit_url: String,
    pub wit_timeout: Duration,
    pub auth_public_key: Option<String>,
}

impl ServiceConfig {
    /// Resolves the configuration from the arguments and the configuration
    /// file they point to, if any.
    pub fn load(args: ServiceArgs) -> Result<Self, ConfigError> {
        let file = match &args.config_file {
            Some(path) => FileConfig::read(Path::new(path))?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Resolves each setting with precedence: argument or environment
    /// variable, then configuration file, then built-in default.
    pub fn resolve(args: ServiceArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let log_level = match args.log_level.or(file.log.level) {
            Some(level) => parse_log_level(&level)?,
            None => default_log_level(),
        };
        let postgres = PostgresConfig {
            host: args
                .postgres_host
                .or(file.postgres.host)
                .unwrap_or_else(default_postgres_host),
            port: args
                .postgres_port
                .or(file.postgres.port)
                .unwrap_or_else(default_postgres_port),
            user: args
                .postgres_user
                .or(file.postgres.user)
                .unwrap_or_else(default_postgres_user),
            password: args
                .postgres_password
                .or(file.postgres.password)
                .unwrap_or_else(default_postgres_password),
            database: args
                .postgres_database
                .or(file.postgres.database)
                .unwrap_or_else(default_postgres_database),
            sslmode: args
                .postgres_sslmode
                .or(file.postgres.sslmode)
                .unwrap_or_default(),
            connection_timeout: args
                .postgres_connection_timeout
                .or(file.postgres.connection.timeout)
                .unwrap_or_else(default_postgres_connection_timeout),
            connection_retry_sleep: args
                .postgres_connection_retry_sleep
                .or(file.postgres.connection.retrysleep)
                .unwrap_or_else(default_postgres_connection_retry_sleep),
            connection_max_idle: args
                .postgres_connection_max_idle
                .or(file.postgres.connection.maxidle)
                .unwrap_or_else(default_postgres_connection_limit),
            connection_max_open: args
                .postgres_connection_max_open
                .or(file.postgres.connection.maxopen)
                .unwrap_or_else(default_postgres_connection_limit),
            transaction_timeout: args
                .postgres_transaction_timeout
                .or(file.postgres.transaction.timeout)
                .unwrap_or_else(default_postgres_transaction_timeout),
        };
        Ok(Self {
            developer_mode_enabled: args
                .developer_mode_enabled
                .or(file.developer.mode.enabled)
                .unwrap_or(false),
            log_level,
            log_json: args.log_json.or(file.log.json),
            environment: args
                .environment
                .or(file.environment)
                .unwrap_or_else(default_environment),
            http_address: args
                .http_address
                .or(file.http.address)
                .unwrap_or_else(default_http_address),
            metrics_http_address: args
                .metrics_http_address
                .or(file.metrics.http.address)
                .unwrap_or_else(default_metrics_http_address),
            diagnose_http_address: args.diagnose_http_address.or(file.diagnose.http.address),
            postgres,
            wit_url: args.wit_url.or(file.wit.url).unwrap_or_else(default_wit_url),
            wit_timeout: args
                .wit_timeout
                .or(file.wit.timeout)
                .unwrap_or_else(default_wit_timeout),
            auth_public_key: args
                .auth_public_key
                .or(file.auth.public_key)
                .filter(|key| !key.trim().is_empty()),
        })
    }

    /// Whether logs are written as JSON lines.
    /// Unless set explicitly, developer mode logs in text, otherwise in JSON.
    pub fn log_json(&self) -> bool {
        self.log_json.unwrap_or(!self.developer_mode_enabled)
    }

    /// Address of the diagnostics server, `None` when it is disabled.
    /// Unless set explicitly, only developer mode enables it.
    pub fn diagnose_http_address(&self) -> Option<String> {
        let address = match &self.diagnose_http_address {
            Some(address) => address.clone(),
            None if self.developer_mode_enabled => default_developer_diagnose_http_address(),
            None => String::new(),
        };
        if address.is_empty() {
            None
        } else {
            Some(address)
        }
    }

    /// Whether `/metrics` is served by the main HTTP server.
    pub fn metrics_on_http_address(&self) -> bool {
        self.metrics_http_address == self.http_address
    }

    #[cfg(test)]
    pub(crate) fn test_config() -> Self {
        Self::resolve(ServiceArgs::default(), FileConfig::default())
            .expect("default configuration is valid")
    }
}
