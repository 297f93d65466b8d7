use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub public_dir: PathBuf,
    pub database_url: String,
    /// Label recorded as the acting database user in audit entries.
    pub db_user: String,
    pub max_connections: u32,
    pub max_upload_bytes: usize,
    /// Take the requester IP from `X-Forwarded-For` (one trusted hop).
    /// Enable only behind a reverse proxy that sets the header.
    pub trust_proxy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            upload_dir: PathBuf::from("./uploads"),
            public_dir: PathBuf::from("./public"),
            database_url: "sqlite://./data/upload_audit.db".into(),
            db_user: "upload_audit".into(),
            max_connections: 5,
            max_upload_bytes: 100 * 1024 * 1024,
            trust_proxy: false,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File upload service with a database audit trail")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_AUDIT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_AUDIT_PORT / APP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded files are written (overrides UPLOAD_AUDIT_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Directory with the browser frontend (overrides UPLOAD_AUDIT_PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Database URL (overrides UPLOAD_AUDIT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Database user recorded in the audit log (overrides UPLOAD_AUDIT_DB_USER)
    #[arg(long)]
    pub db_user: Option<String>,

    /// Connection pool size (overrides UPLOAD_AUDIT_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Maximum accepted request body for uploads, in bytes
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Trust the right-most X-Forwarded-For entry as the requester IP
    #[arg(long)]
    pub trust_proxy: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args) -> Result<Self> {
        let defaults = Self::default();

        let env_port = match env_parsed::<u16>("UPLOAD_AUDIT_PORT")? {
            Some(port) => Some(port),
            None => env_parsed::<u16>("APP_PORT")?,
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| env_string("UPLOAD_AUDIT_HOST"))
                .unwrap_or(defaults.host),
            port: args.port.or(env_port).unwrap_or(defaults.port),
            upload_dir: args
                .upload_dir
                .or_else(|| env_string("UPLOAD_AUDIT_UPLOAD_DIR").map(PathBuf::from))
                .unwrap_or(defaults.upload_dir),
            public_dir: args
                .public_dir
                .or_else(|| env_string("UPLOAD_AUDIT_PUBLIC_DIR").map(PathBuf::from))
                .unwrap_or(defaults.public_dir),
            database_url: args
                .database_url
                .or_else(|| env_string("UPLOAD_AUDIT_DATABASE_URL"))
                .unwrap_or(defaults.database_url),
            db_user: args
                .db_user
                .or_else(|| env_string("UPLOAD_AUDIT_DB_USER"))
                .unwrap_or(defaults.db_user),
            max_connections: args
                .max_connections
                .or(env_parsed("UPLOAD_AUDIT_MAX_CONNECTIONS")?)
                .unwrap_or(defaults.max_connections),
            max_upload_bytes: args
                .max_upload_bytes
                .or(env_parsed("UPLOAD_AUDIT_MAX_UPLOAD_BYTES")?)
                .unwrap_or(defaults.max_upload_bytes),
            trust_proxy: args.trust_proxy
                || env_parsed::<bool>("UPLOAD_AUDIT_TRUST_PROXY")?.unwrap_or(defaults.trust_proxy),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Read and parse an optional environment variable, reporting bad values.
fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
