//! Server configuration and CLI argument parsing
//!
//! This module handles all server configuration through a flexible system that supports:
//! - Command-line arguments
//! - Environment variables (with TURNSTILE_ prefix)
//!
//! # Configuration Priority
//!
//! The configuration system follows this precedence order:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! turnstile --port 9090 --auth-capacity 10
//!
//! # Using environment variables
//! export TURNSTILE_PORT=8080
//! export TURNSTILE_STORE_IDLE_TIMEOUT=300
//! turnstile
//!
//! # Mixed (CLI overrides env)
//! export TURNSTILE_PORT=8080
//! turnstile --port 9090  # Uses port 9090
//! ```

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;
use turnstile::classify::{
    DEFAULT_ANONYMOUS_PRINCIPAL, DEFAULT_AUTH_PREFIX, DEFAULT_BYPASS_PREFIXES,
};
use turnstile::{Classifier, QuotaPolicy, QuotaTable};

/// Main configuration structure for the server
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    pub http: HttpConfig,
    /// Bucket store configuration
    pub store: StoreConfig,
    /// Per-class quotas
    pub quotas: QuotaConfig,
    /// Classification rules
    pub rules: RulesConfig,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Bucket store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Ceiling on live buckets
    pub max_entries: usize,
    /// Idle window before a bucket is evicted (seconds)
    pub idle_timeout: u64,
    /// Interval between idle sweeps (seconds)
    pub cleanup_interval: u64,
    /// Number of shards, 0 picks one from the CPU count
    pub shards: usize,
}

/// Capacity and refill period of one class
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub capacity: u64,
    /// Refill period (seconds)
    pub period: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    pub auth: PolicyConfig,
    pub api: PolicyConfig,
    pub public: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    pub bypass_prefixes: Vec<String>,
    pub auth_prefix: String,
    pub anonymous_principal: String,
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// TURNSTILE_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "turnstile",
    about = "Per-class admission control service",
    long_about = "Per-class token bucket admission control.\n\nServes POST /admit for gateways, plus /actuator/health and /actuator/prometheus.\n\nEnvironment variables with TURNSTILE_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP listener
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "TURNSTILE_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "TURNSTILE_PORT"
    )]
    pub port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "N",
        help = "Maximum number of live buckets",
        default_value_t = 100_000,
        env = "TURNSTILE_STORE_MAX_ENTRIES"
    )]
    pub store_max_entries: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Evict buckets idle for longer than this (seconds)",
        default_value_t = 600,
        env = "TURNSTILE_STORE_IDLE_TIMEOUT"
    )]
    pub store_idle_timeout: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between idle sweeps (seconds)",
        default_value_t = 60,
        env = "TURNSTILE_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Number of store shards (0 = 4 per CPU)",
        default_value_t = 0,
        env = "TURNSTILE_STORE_SHARDS"
    )]
    pub store_shards: usize,

    // Quotas
    #[arg(
        long,
        value_name = "N",
        help = "Token capacity for authentication endpoints",
        default_value_t = 5,
        env = "TURNSTILE_AUTH_CAPACITY"
    )]
    pub auth_capacity: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Refill period for authentication endpoints (seconds)",
        default_value_t = 60,
        env = "TURNSTILE_AUTH_PERIOD"
    )]
    pub auth_period: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Token capacity for authenticated callers",
        default_value_t = 100,
        env = "TURNSTILE_API_CAPACITY"
    )]
    pub api_capacity: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Refill period for authenticated callers (seconds)",
        default_value_t = 60,
        env = "TURNSTILE_API_PERIOD"
    )]
    pub api_period: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Token capacity for anonymous callers",
        default_value_t = 20,
        env = "TURNSTILE_PUBLIC_CAPACITY"
    )]
    pub public_capacity: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Refill period for anonymous callers (seconds)",
        default_value_t = 60,
        env = "TURNSTILE_PUBLIC_PERIOD"
    )]
    pub public_period: u64,

    // Classification rules
    #[arg(
        long,
        value_name = "PREFIXES",
        help = "Comma-separated path prefixes exempt from admission",
        value_delimiter = ',',
        default_values = DEFAULT_BYPASS_PREFIXES,
        env = "TURNSTILE_BYPASS_PREFIXES"
    )]
    pub bypass_prefixes: Vec<String>,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Path prefix of the authentication endpoints",
        default_value = DEFAULT_AUTH_PREFIX,
        env = "TURNSTILE_AUTH_PREFIX"
    )]
    pub auth_prefix: String,
    #[arg(
        long,
        value_name = "NAME",
        help = "Principal name that denotes an unauthenticated caller",
        default_value = DEFAULT_ANONYMOUS_PRINCIPAL,
        env = "TURNSTILE_ANONYMOUS_PRINCIPAL"
    )]
    pub anonymous_principal: String,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "TURNSTILE_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if any quota, store bound or interval is zero.
    pub fn from_env_and_args() -> Result<Self> {
        // Clap handles the CLI > env > default precedence
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Config {
            http: HttpConfig {
                host: args.host,
                port: args.port,
            },
            store: StoreConfig {
                max_entries: args.store_max_entries,
                idle_timeout: args.store_idle_timeout,
                cleanup_interval: args.store_cleanup_interval,
                shards: args.store_shards,
            },
            quotas: QuotaConfig {
                auth: PolicyConfig {
                    capacity: args.auth_capacity,
                    period: args.auth_period,
                },
                api: PolicyConfig {
                    capacity: args.api_capacity,
                    period: args.api_period,
                },
                public: PolicyConfig {
                    capacity: args.public_capacity,
                    period: args.public_period,
                },
            },
            rules: RulesConfig {
                bypass_prefixes: args
                    .bypass_prefixes
                    .into_iter()
                    .map(|prefix| prefix.trim().to_string())
                    .filter(|prefix| !prefix.is_empty())
                    .collect(),
                auth_prefix: args.auth_prefix,
                anonymous_principal: args.anonymous_principal,
            },
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> Result<()> {
        self.quota_table()?;

        if self.store.max_entries == 0 {
            return Err(anyhow!("store max entries must be greater than zero"));
        }
        if self.store.idle_timeout == 0 {
            return Err(anyhow!("store idle timeout must be greater than zero"));
        }
        if self.store.cleanup_interval == 0 {
            return Err(anyhow!("store cleanup interval must be greater than zero"));
        }
        if self.rules.auth_prefix.is_empty() {
            return Err(anyhow!(
                "auth prefix must not be empty, it would classify every request as AUTH"
            ));
        }

        Ok(())
    }

    /// Quota table built from the per-class settings
    pub fn quota_table(&self) -> Result<QuotaTable> {
        let policy = |name: &str, p: PolicyConfig| {
            QuotaPolicy::new(p.capacity, Duration::from_secs(p.period))
                .with_context(|| format!("invalid {name} quota"))
        };

        Ok(QuotaTable::new(
            policy("auth", self.quotas.auth)?,
            policy("api", self.quotas.api)?,
            policy("public", self.quotas.public)?,
        ))
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(
            self.rules.bypass_prefixes.clone(),
            self.rules.auth_prefix.clone(),
            self.rules.anonymous_principal.clone(),
        )
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Turnstile Environment Variables");
        println!("===============================");
        println!();
        println!("All environment variables use the TURNSTILE_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("HTTP Configuration:");
        println!("  TURNSTILE_HOST=<host>                      HTTP host [default: 127.0.0.1]");
        println!("  TURNSTILE_PORT=<port>                      HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!(
            "  TURNSTILE_STORE_MAX_ENTRIES=<n>            Maximum live buckets [default: 100000]"
        );
        println!(
            "  TURNSTILE_STORE_IDLE_TIMEOUT=<secs>        Idle eviction window [default: 600]"
        );
        println!(
            "  TURNSTILE_STORE_CLEANUP_INTERVAL=<secs>    Idle sweep interval [default: 60]"
        );
        println!(
            "  TURNSTILE_STORE_SHARDS=<n>                 Store shards, 0 = 4 per CPU [default: 0]"
        );
        println!();

        println!("Quota Configuration:");
        println!("  TURNSTILE_AUTH_CAPACITY=<n>                [default: 5]");
        println!("  TURNSTILE_AUTH_PERIOD=<secs>               [default: 60]");
        println!("  TURNSTILE_API_CAPACITY=<n>                 [default: 100]");
        println!("  TURNSTILE_API_PERIOD=<secs>                [default: 60]");
        println!("  TURNSTILE_PUBLIC_CAPACITY=<n>              [default: 20]");
        println!("  TURNSTILE_PUBLIC_PERIOD=<secs>             [default: 60]");
        println!();

        println!("Classification Rules:");
        println!(
            "  TURNSTILE_BYPASS_PREFIXES=<list>           Comma-separated exempt path prefixes"
        );
        println!(
            "  TURNSTILE_AUTH_PREFIX=<prefix>             Authentication endpoints [default: /api/auth/]"
        );
        println!(
            "  TURNSTILE_ANONYMOUS_PRINCIPAL=<name>       Unauthenticated principal [default: anonymousUser]"
        );
        println!();

        println!("General Configuration:");
        println!(
            "  TURNSTILE_LOG_LEVEL=<level>                Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Tighter login budget");
        println!("  export TURNSTILE_AUTH_CAPACITY=3");
        println!("  export TURNSTILE_AUTH_PERIOD=120");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  turnstile --port 9090");
    }
}
