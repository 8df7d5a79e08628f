//! Configuration surface (§6.1 / C13): a TOML file, loaded via a `--config`
//! CLI flag, deserializing into the same knobs the builders expose
//! programmatically. Every field has a default so an empty file is valid.

use std::{fs::read_to_string, str::FromStr};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

use nprpc_service::{Lifespan, ObjectIdPolicy};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Ssl {
    pub private_key: String,
    pub certificate_chain: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Mirrors the Rpc builder's option table (§6): which listeners to open and
/// the identity advertised in outgoing ObjectIds.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RpcConfig {
    #[serde(default = "RpcConfig::hostname")]
    pub hostname: String,
    #[serde(default)]
    pub tcp_port: Option<u16>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub quic_port: Option<u16>,
    #[serde(default)]
    pub udp_port: Option<u16>,
    #[serde(default)]
    pub ssl: Option<Ssl>,
    #[serde(default)]
    pub enable_http3: bool,
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default = "RpcConfig::max_message_size")]
    pub max_message_size: usize,
}

impl RpcConfig {
    fn hostname() -> String {
        "127.0.0.1".to_string()
    }

    fn max_message_size() -> usize {
        16 * 1024 * 1024
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            hostname: Self::hostname(),
            tcp_port: None,
            http_port: None,
            quic_port: None,
            udp_port: None,
            ssl: None,
            enable_http3: false,
            root_dir: None,
            max_message_size: Self::max_message_size(),
        }
    }
}

/// Mirrors the POA builder's option table (§6).
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PoaConfig {
    #[serde(default = "PoaConfig::max_objects")]
    pub max_objects: usize,
    #[serde(default)]
    pub object_id_policy: ObjectIdPolicyConfig,
    #[serde(default)]
    pub lifespan: LifespanConfig,
}

impl PoaConfig {
    fn max_objects() -> usize {
        1024
    }
}

impl Default for PoaConfig {
    fn default() -> Self {
        Self {
            max_objects: Self::max_objects(),
            object_id_policy: ObjectIdPolicyConfig::default(),
            lifespan: LifespanConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectIdPolicyConfig {
    #[default]
    System,
    UserSupplied,
}

impl From<ObjectIdPolicyConfig> for ObjectIdPolicy {
    fn from(value: ObjectIdPolicyConfig) -> Self {
        match value {
            ObjectIdPolicyConfig::System => ObjectIdPolicy::System,
            ObjectIdPolicyConfig::UserSupplied => ObjectIdPolicy::UserSupplied,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LifespanConfig {
    #[default]
    Transient,
    Persistent,
}

impl From<LifespanConfig> for Lifespan {
    fn from(value: LifespanConfig) -> Self {
        match value {
            LifespanConfig::Transient => Lifespan::Transient,
            LifespanConfig::Persistent => Lifespan::Persistent,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub poa: PoaConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// Path to a TOML configuration file. An empty/absent file falls back
    /// to every builder default.
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match Cli::parse().config {
            Some(path) => Ok(toml::from_str(&read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }
}
