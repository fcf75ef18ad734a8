use crate::config::engine::{EngineConfig, TimeoutOutputPolicy};
use crate::observability::audit::init_audit_logger;
use crate::runtime::engine::ExecutionEngine;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Exit status of `execute-code` when the request was rejected before running.
pub const EXIT_VALIDATION: i32 = 2;
/// Exit status of `execute-code` when the code faulted or timed out.
pub const EXIT_FAILED: i32 = 1;

#[derive(Parser)]
#[command(author, version, about = "Bounded, isolated Python snippet execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds an engine.
#[derive(Args, Clone, Debug)]
struct EngineArgs {
    /// JSON engine configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Wall-clock budget per execution in seconds (fractions allowed)
    #[arg(long, value_parser = parse_seconds)]
    timeout: Option<Duration>,
    /// Interpreter executable (overrides the config file)
    #[arg(long, value_name = "PATH")]
    interpreter: Option<PathBuf>,
    /// Report output captured before a timeout instead of discarding it
    #[arg(long)]
    partial_output: bool,
    /// Append audit events to this file as JSON lines
    #[arg(long, value_name = "FILE")]
    audit_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP execution server
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 5000)]
        port: u16,
        /// Maximum number of concurrently running executions
        #[arg(long)]
        max_units: Option<usize>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Execute code directly and print the result as JSON
    ExecuteCode {
        /// Programming language (python)
        #[arg(long, default_value = "python")]
        language: String,
        /// Source code as string
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        /// Read source code from a file
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Check that the interpreter is installed and runs
    CheckDeps {
        /// Show the interpreter path and version
        #[arg(long)]
        verbose: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn parse_seconds(raw: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|_| format!("not a number of seconds: {}", raw))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

impl EngineArgs {
    fn build_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout.as_millis().max(1) as u64;
        }
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if self.partial_output {
            config.timeout_output = TimeoutOutputPolicy::Partial;
        }
        Ok(config)
    }

    fn init_audit(&self) -> Result<()> {
        if let Some(path) = &self.audit_log {
            init_audit_logger(path).context("initializing audit log")?;
        }
        Ok(())
    }
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_units,
            engine,
        } => {
            engine.init_audit()?;
            let mut config = engine.build_config()?;
            if let Some(max_units) = max_units {
                config.max_concurrent_units = max_units;
            }
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;

            log::info!(
                "Starting server: timeout {:?}, up to {} concurrent executions",
                config.timeout(),
                config.max_concurrent_units
            );
            let engine = Arc::new(ExecutionEngine::new(config)?);
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(crate::server::serve(engine, addr))?;
            Ok(())
        }
        Commands::ExecuteCode {
            language,
            code,
            file,
            engine,
        } => {
            engine.init_audit()?;
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => String::new(),
            };
            let engine = ExecutionEngine::new(engine.build_config()?)?;

            match engine.execute(&code, &language) {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    if !result.success {
                        std::process::exit(EXIT_FAILED);
                    }
                    Ok(())
                }
                Err(e) if e.is_client_error() => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "error": e.to_string(),
                            "success": false,
                        }))?
                    );
                    std::process::exit(EXIT_VALIDATION);
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::CheckDeps { verbose, engine } => {
            let engine = ExecutionEngine::new(engine.build_config()?)?;
            let report = engine.check_dependencies();

            if report.available {
                println!("Python - OK");
                if verbose {
                    println!("  {} -> {}", report.interpreter, report.version.unwrap_or_default());
                }
                Ok(())
            } else {
                println!("Python - MISSING");
                if verbose {
                    println!("  {} -> NOT FOUND", report.interpreter);
                }
                println!();
                println!("Install python3 or point \"interpreter\" in the config file at it.");
                std::process::exit(1);
            }
        }
    }
}
