use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use agent_reach::{
    config, criteria, init_telemetry, validation_metrics, AgentReachConfig, EnvSecretResolver,
    OperationTimer, ProbeRegistry, SecretResolver, StaticSecretResolver, ValidationCache,
    ValidationRequest, ValidationResult, ValidationRunner,
};

#[derive(Parser)]
#[command(name = "agent-reach")]
#[command(about = "Check that remote agents can reach the endpoints a task depends on")]
#[command(long_about = "agent-reach extracts the external dependencies of a task, probes them from \
                       the agent's point of view and caches the verdicts so a dispatcher can pick \
                       a capable agent. Requests are JSON documents read from a file or stdin.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the criteria a request depends on
    Criteria {
        /// JSON request file, stdin when omitted
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Probe every criterion of a request and print the verdicts
    Validate {
        /// JSON request file, stdin when omitted
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Agent id to validate for, overriding the request (default: this host)
        #[arg(long)]
        agent: Option<String>,
        /// Inline secret as NAME=VALUE; when none are given secrets come from
        /// AGENT_REACH_SECRET_* environment variables
        #[arg(long = "secret", value_name = "NAME=VALUE")]
        secrets: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    AgentReachConfig::load_env_file()?;
    let config = config()?;
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Criteria { file, json } => criteria_command(file, json),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Validate {
            file,
            agent,
            secrets,
            json,
        } => {
            let all_validated = tokio::runtime::Runtime::new()?
                .block_on(async { validate_command(config, file, agent, secrets, json).await })?;
            if config.observability.metrics_enabled {
                validation_metrics().log_stats();
            }
            if !all_validated {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn read_request(file: Option<PathBuf>) -> Result<ValidationRequest> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read request from {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read request from stdin")?,
    };
    serde_json::from_str(&raw).context("Request is not a valid validation request document")
}

fn criteria_command(file: Option<PathBuf>, json: bool) -> Result<()> {
    let request = read_request(file)?;
    let extracted = criteria::criteria_strings(&criteria::extract(&request)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&extracted)?);
    } else {
        for criterion in extracted {
            println!("{criterion}");
        }
    }
    Ok(())
}

fn secret_resolver(inline: &[String]) -> Result<Arc<dyn SecretResolver>> {
    if inline.is_empty() {
        return Ok(Arc::new(EnvSecretResolver::new()));
    }

    let mut resolver = StaticSecretResolver::new();
    for pair in inline {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("Secret '{pair}' must look like NAME=VALUE"))?;
        resolver = resolver.with_secret(name.trim(), value);
    }
    Ok(Arc::new(resolver))
}

fn local_agent_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

async fn validate_command(
    config: &AgentReachConfig,
    file: Option<PathBuf>,
    agent: Option<String>,
    secrets: Vec<String>,
    json: bool,
) -> Result<bool> {
    let mut request = read_request(file)?;
    if let Some(agent_id) = agent {
        request = request.for_agent(agent_id);
    } else if request.agent_id().is_empty() {
        request = request.for_agent(local_agent_id());
    }

    let registry = ProbeRegistry::with_defaults(&config.probes)?;
    let runner = ValidationRunner::new(
        Arc::new(registry),
        ValidationCache::in_memory(&config.cache),
        secret_resolver(&secrets)?,
        &config.runner,
    )?;

    let timer = OperationTimer::new("validate");
    let results = runner.validate(request).await?;
    timer.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(results.iter().all(|result| result.validated))
}

fn print_results(results: &[ValidationResult]) {
    for result in results {
        let mark = if result.validated { "✅" } else { "❌" };
        println!(
            "{mark} {} ({}ms) agent={} account={}",
            result.criteria, result.duration_ms, result.agent_id, result.account_id
        );
    }
}
