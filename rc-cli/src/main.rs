//! `rc`: send one command to a remote-command server and print the reply.
//!
//! Connection settings come from `SZ_RC_CLIENT_*` environment variables and
//! can be overridden with flags. Log output goes to stderr and is filtered
//! by `RC_LOG` (or `-v`).
//!
//! ```bash
//! SZ_RC_CLIENT_HOST=10.0.0.5 SZ_RC_CLIENT_KEY_NAME=ops rc status
//! rc restart -o service=nginx -o graceful=true --retry 2
//! rc deploy --json '{"release": "v42", "canary": {"percent": 5}}'
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use rc_client::{Client, ClientConfig, ClientError, ProtocolError};
use serde_json::{Map, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding log filter directives.
const LOG_ENV: &str = "RC_LOG";

/// Send a command to a remote-command server
#[derive(Parser, Debug)]
#[command(name = "rc")]
#[command(version, about = "Send a command to a remote-command server")]
struct Cli {
    /// Command name
    command: String,

    /// Command option as key=value; the value is parsed as JSON if possible
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, Value)>,

    /// Command options as a JSON object (merged before -o)
    #[arg(long, value_name = "OBJECT", value_parser = parse_json_object)]
    json: Option<Map<String, Value>>,

    /// Server host [env: SZ_RC_CLIENT_HOST]
    #[arg(long)]
    host: Option<String>,

    /// Server port [env: SZ_RC_CLIENT_PORT]
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding key files [env: SZ_RC_CLIENT_KEY_DIR]
    #[arg(long)]
    key_dir: Option<PathBuf>,

    /// Signing key name [env: SZ_RC_CLIENT_KEY_NAME]
    #[arg(long)]
    key_name: Option<String>,

    /// Extra connection attempts when the socket fails to open [env: SZ_RC_CLIENT_RETRY]
    #[arg(long)]
    retry: Option<u32>,

    /// Give up on a connection attempt after this many seconds
    #[arg(long, value_name = "SECS")]
    connect_timeout_secs: Option<u64>,

    /// Reject server certificates that cannot be verified
    #[arg(long)]
    verify_tls: bool,

    /// Use ws:// instead of wss:// (local development only)
    #[arg(long)]
    insecure_dev: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Apply flag overrides on top of `base`.
    fn config(&self, base: ClientConfig) -> ClientConfig {
        let mut config = base;
        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(dir) = &self.key_dir {
            config = config.with_key_dir(dir.clone());
        }
        if let Some(name) = &self.key_name {
            config = config.with_key_name(name.clone());
        }
        if let Some(retry) = self.retry {
            config = config.with_retry(retry);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if self.verify_tls {
            config = config.with_verified_tls();
        }
        if self.insecure_dev {
            config = config.with_insecure_dev();
        }
        config
    }

    /// Options object sent with the command.
    fn command_options(&self) -> Map<String, Value> {
        let mut options = self.json.clone().unwrap_or_default();
        for (key, value) in &self.options {
            options.insert(key.clone(), value.clone());
        }
        options
    }
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty option name in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

/// Default filter for a `-v` count, used when `RC_LOG` is unset.
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<String, ClientError> {
    let config = cli.config(ClientConfig::from_env()?);
    let client = Client::new(config);
    let response = client.send(&cli.command, cli.command_options()).await?;
    let output = serde_json::to_string_pretty(&Value::Object(response.into_fields()))
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(output)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!(command = %cli.command, error = ?e, "command failed");
            eprintln!("rc: {e}");
            ExitCode::FAILURE
        }
    }
}
