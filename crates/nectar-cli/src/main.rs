//! Operator CLI for the nectar sensor.
//!
//! `validate` loads and compiles a rules directory the same way the sensor
//! does at startup (and exits non-zero on the same failures), `parse` dumps
//! the parsed AST of one rule file, and `eval` replays captured request
//! samples against a rule set, printing the canonical event log records.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use nectar_eval::{
    Engine, Event, Flow, HttpRequest, SensorConfig, SessionRegistry, project,
};
use nectar_rules::{Layer, parse_rules_file};

#[derive(Parser)]
#[command(name = "nectar")]
#[command(about = "Validate, inspect, and replay nectar sensor rules")]
#[command(version)]
struct Cli {
    /// Log format: json or pretty
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and compile a rules directory exactly as the sensor would
    ///
    /// Exits non-zero on any load-time failure: YAML syntax errors, unknown
    /// selectors, uncompilable regexes, malformed patterns.
    Validate {
        /// Path to the rules root directory
        rules: PathBuf,

        /// Sensor configuration file (active layers, budgets)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a single rule file and print the AST as JSON
    Parse {
        /// Path to a .yml rule file
        path: PathBuf,
    },

    /// Replay HTTP request samples against a rule set
    ///
    /// Samples are JSON objects, one per line on stdin (or a single one via
    /// --event). Each evaluated event prints as one canonical log record.
    Eval {
        /// Path to the rules root directory
        #[arg(short, long)]
        rules: PathBuf,

        /// Sensor configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// A single request sample as a JSON string
        #[arg(short, long)]
        event: Option<String>,
    },
}

/// An HTTP request sample for offline replay.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestSample {
    #[serde(default = "default_verb")]
    verb: String,
    #[serde(default = "default_proto")]
    proto: String,
    uri: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// UTF-8 body text; use `body_base64` for binary bodies.
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    body_base64: Option<String>,
    #[serde(default)]
    is_tls: bool,
    #[serde(default = "default_src_ip")]
    src_ip: String,
    #[serde(default)]
    src_port: u16,
    #[serde(default = "default_dst_ip")]
    dst_ip: String,
    #[serde(default = "default_dst_port")]
    dst_port: u16,
}

fn default_verb() -> String {
    "GET".into()
}
fn default_proto() -> String {
    "HTTP/1.1".into()
}
fn default_src_ip() -> String {
    "127.0.0.1".into()
}
fn default_dst_ip() -> String {
    "127.0.0.1".into()
}
fn default_dst_port() -> u16 {
    80
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    let result = match cli.command {
        Commands::Validate { rules, config } => cmd_validate(rules, config),
        Commands::Parse { path } => cmd_parse(path),
        Commands::Eval {
            rules,
            config,
            event,
        } => cmd_eval(rules, config, event),
    };

    if let Err(e) = result {
        error!("{e:#}");
        process::exit(1);
    }
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SensorConfig> {
    match path {
        Some(path) => SensorConfig::load(&path)
            .with_context(|| format!("reading configuration from {}", path.display())),
        None => Ok(SensorConfig::default()),
    }
}

/// Build the engine from a rules directory, the same path the sensor takes
/// at startup.
fn build_engine(rules_dir: &PathBuf, config: &SensorConfig) -> Result<Engine> {
    let index = nectar_rules::load_dir(rules_dir, &config.active_layers)
        .with_context(|| format!("loading rules from {}", rules_dir.display()))?;
    let engine = Engine::new(&index, config.engine_options()).context("compiling rules")?;
    Ok(engine)
}

fn cmd_validate(rules: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let engine = build_engine(&rules, &config)?;
    println!("ok: {} rules compiled", engine.rule_count());
    for layer in Layer::ALL {
        let count = engine.rules_for(layer).len();
        if count > 0 {
            println!("  {layer}: {count}");
        }
    }
    Ok(())
}

fn cmd_parse(path: PathBuf) -> Result<()> {
    let rules =
        parse_rules_file(&path).with_context(|| format!("parsing {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn cmd_eval(rules: PathBuf, config: Option<PathBuf>, event: Option<String>) -> Result<()> {
    let config = load_config(config)?;
    let engine = build_engine(&rules, &config)?;
    let sessions = SessionRegistry::new(config.eviction_policy());

    match event {
        Some(json) => {
            eval_sample(&engine, &sessions, &config, &json)?;
        }
        None => {
            for line in io::stdin().lock().lines() {
                let line = line.context("reading stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                eval_sample(&engine, &sessions, &config, &line)?;
            }
        }
    }
    Ok(())
}

fn eval_sample(
    engine: &Engine,
    sessions: &SessionRegistry,
    config: &SensorConfig,
    json: &str,
) -> Result<()> {
    let sample: RequestSample =
        serde_json::from_str(json).context("parsing request sample")?;

    let body = match (&sample.body, &sample.body_base64) {
        (Some(text), _) => text.clone().into_bytes(),
        (None, Some(b64)) => BASE64.decode(b64).context("decoding body_base64")?,
        (None, None) => Vec::new(),
    };

    let request = HttpRequest {
        verb: sample.verb,
        proto: sample.proto,
        uri: sample.uri,
        headers: sample.headers.into_iter().collect(),
        body,
        is_tls: sample.is_tls,
        remote_addr: None,
        host: None,
    };
    let flow = Flow {
        src_ip: sample.src_ip,
        dst_ip: sample.dst_ip,
        src_port: sample.src_port,
        dst_port: sample.dst_port,
    };

    let mut event = Event::from_reassembled_http(request, &flow, sessions, config.max_body_bytes);
    engine.evaluate(&mut event);
    println!("{}", serde_json::to_string(&project(&event))?);
    Ok(())
}
