use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::with_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/pulse";
const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_ALLOWED_MIME_TYPES: &str = "image/jpeg,image/png,image/jpg,application/pdf";
pub const DEFAULT_REFERENCE_PREFIX: &str = "PULSE";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Where customers send their bank transfer. Returned on every new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub swift_code: String,
    pub instructions: String,
}

impl Default for BankDetails {
    fn default() -> Self {
        Self {
            bank_name: "Example Bank".to_string(),
            account_number: "1234567890".to_string(),
            account_name: "Pulse Productions".to_string(),
            swift_code: "SWIFT123".to_string(),
            instructions: "Please include the reference code in your bank transfer memo/notes."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: split_list(DEFAULT_ALLOWED_MIME_TYPES),
        }
    }
}

/// Outgoing mail server. Only built when host, user and password are all set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// `From` mailbox, e.g. `Pulse Tickets <tickets@example.com>`.
    pub from: String,
}

impl SmtpConfig {
    fn from_env() -> Option<Self> {
        let host = non_empty("SMTP_HOST")?;
        let username = non_empty("SMTP_USER")?;
        let password = non_empty("SMTP_PASS")?;
        Some(Self {
            host,
            port: parsed("SMTP_PORT").unwrap_or(DEFAULT_SMTP_PORT),
            from: non_empty("SMTP_FROM").unwrap_or_else(|| username.clone()),
            username,
            password,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub upload: UploadConfig,
    pub reference_prefix: String,
    pub bank: BankDetails,
    /// Bearer token for admin routes. `None` disables them.
    #[serde(skip_serializing)]
    pub admin_token: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub production: bool,
    /// `None` logs notifications instead of mailing them.
    pub smtp: Option<SmtpConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: 5,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            upload: UploadConfig::default(),
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            bank: BankDetails::default(),
            admin_token: None,
            cors_allowed_origins: split_list(DEFAULT_ALLOWED_ORIGINS),
            production: false,
            smtp: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let bank_defaults = defaults.bank.clone();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            bind_addr: parsed("BIND_ADDR").unwrap_or(defaults.bind_addr),
            upload: UploadConfig {
                dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.dir),
                max_file_size: parsed("MAX_FILE_SIZE").unwrap_or(defaults.upload.max_file_size),
                allowed_mime_types: env::var("ALLOWED_MIME_TYPES")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.upload.allowed_mime_types),
            },
            reference_prefix: env::var("REFERENCE_PREFIX")
                .ok()
                .map(|v| v.trim().to_ascii_uppercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.reference_prefix),
            bank: BankDetails {
                bank_name: env::var("BANK_NAME").unwrap_or(bank_defaults.bank_name),
                account_number: env::var("BANK_ACCOUNT_NUMBER")
                    .unwrap_or(bank_defaults.account_number),
                account_name: env::var("BANK_ACCOUNT_NAME").unwrap_or(bank_defaults.account_name),
                swift_code: env::var("BANK_SWIFT_CODE").unwrap_or(bank_defaults.swift_code),
                instructions: bank_defaults.instructions,
            },
            admin_token: env::var("ADMIN_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.cors_allowed_origins),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            smtp: SmtpConfig::from_env(),
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
