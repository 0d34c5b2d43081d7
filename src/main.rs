//! Nexus command line surface.
//!
//! Thin shell over the library: loads the registry config, wires the
//! dispatcher, and exposes the operations an operator needs day to day:
//! - `nexus ask` - route one prompt through scan/route/dispatch
//! - `nexus scan` - run the content firewall only, nothing leaves the box
//! - `nexus providers` - show the current provider fleet
//! - `nexus traces` / `nexus trace <id>` - inspect the audit trail

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use nexus::firewall::Scan;
use nexus::{
    ContentScanner, DispatchPolicy, Dispatcher, NexusConfig, NexusError, ProviderRegistry,
    Request, RequestType, TraceRecorder, TraceStore,
};

/// Nexus - request routing core for LLM providers
#[derive(Parser)]
#[command(name = "nexus")]
#[command(version)]
#[command(about = "Scan, route, and dispatch prompts across LLM providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the registry config file
    #[arg(long, global = true, default_value = "nexus.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one prompt through the full pipeline
    Ask {
        /// The prompt text
        prompt: String,

        /// Request type: chat, generation, complex_architecture,
        /// verification, image_generation
        #[arg(long, default_value = "chat")]
        request_type: String,

        /// Provider to try first
        #[arg(long)]
        provider: Option<String>,

        /// Model key or id overriding the provider default
        #[arg(long)]
        model: Option<String>,
    },

    /// Scan a prompt without dispatching it anywhere
    Scan {
        /// The text to scan
        text: String,
    },

    /// Show the configured provider fleet
    Providers,

    /// List recent audit traces
    Traces {
        /// How many traces to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one audit trace by id
    Trace {
        /// Trace identifier
        trace_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            prompt,
            request_type,
            provider,
            model,
        } => {
            let request_type = RequestType::from_id(&request_type)?;
            let mut request = Request::new(prompt, request_type)?;
            if let Some(provider) = provider {
                request = request.with_preferred_provider(provider);
            }
            if let Some(model) = model {
                request = request.with_model_override(model);
            }

            let dispatcher = build_dispatcher(&cli.config)?;

            // Ctrl-C cancels the dispatch and seals the trace instead of
            // killing the process mid-attempt.
            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal_token.cancel();
                }
            });

            match dispatcher.dispatch(&request, cancel).await {
                Ok(response) => {
                    println!("{}", response.content);
                    eprintln!();
                    eprintln!(
                        "provider: {}  model: {}  tokens: {}+{}  cost: ${:.6}  trace: {}",
                        response.provider,
                        response.model,
                        response.token_usage.input_tokens,
                        response.token_usage.output_tokens,
                        response.cost,
                        response.trace_id
                    );
                }
                Err(err) => {
                    report_dispatch_error(&err);
                    std::process::exit(1);
                }
            }
        }

        Commands::Scan { text } => {
            let result = ContentScanner::new().scan(&text);
            if result.is_clean() {
                println!("clean");
            } else {
                println!("flagged: {}", result.summary());
            }
        }

        Commands::Providers => {
            let config = NexusConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            if config.providers.is_empty() {
                println!("no providers configured in {}", cli.config.display());
                return Ok(());
            }
            println!(
                "{:<16} {:<8} {:>8}  {:<5} {:<5}  {}",
                "NAME", "KIND", "PRIORITY", "CHAT", "AGENT", "DEFAULT MODEL"
            );
            for provider in &config.providers {
                println!(
                    "{:<16} {:<8} {:>8}  {:<5} {:<5}  {}",
                    provider.name,
                    format!("{:?}", provider.kind).to_lowercase(),
                    provider.priority,
                    provider.chat_active,
                    provider.agent_active,
                    provider.default_model
                );
            }
        }

        Commands::Traces { limit } => {
            let recorder = build_recorder(&cli.config)?;
            let traces = recorder.recent(limit);
            if traces.is_empty() {
                println!("no traces recorded");
                return Ok(());
            }
            for trace in traces {
                println!(
                    "{}  {:<9}  firewall={:<7}  provider={}  attempts={}",
                    trace.trace_id,
                    trace.status.as_str(),
                    trace.firewall_status.as_str(),
                    trace.provider_used.as_deref().unwrap_or("-"),
                    trace.attempts.len()
                );
            }
        }

        Commands::Trace { trace_id } => {
            let recorder = build_recorder(&cli.config)?;
            let trace = recorder
                .get(&trace_id)
                .with_context(|| format!("no trace with id {trace_id}"))?;
            println!("trace:     {}", trace.trace_id);
            println!("status:    {}", trace.status.as_str());
            println!("firewall:  {}", trace.firewall_status.as_str());
            if let Some(decision) = trace.routing_decision {
                println!("route:     {}", decision.as_str());
            }
            if let Some(provider) = &trace.provider_used {
                println!("provider:  {provider}");
            }
            if let Some(model) = &trace.model_used {
                println!("model:     {model}");
            }
            for flag in &trace.flags {
                println!("flag:      {flag:?}");
            }
            for record in &trace.attempts {
                let detail = if record.detail.is_empty() {
                    String::new()
                } else {
                    format!("  ({})", record.detail)
                };
                println!(
                    "attempt:   {} #{} {:?}{}",
                    record.provider, record.attempt, record.outcome, detail
                );
            }
            if let Some(error) = &trace.error {
                println!("error:     {error}");
            }
        }
    }

    Ok(())
}

fn build_dispatcher(config_path: &PathBuf) -> Result<Dispatcher> {
    let config = NexusConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let policy = DispatchPolicy::from(&config);
    let recorder = recorder_for(&config)?;
    let registry = ProviderRegistry::from_file(config_path)?;
    Ok(Dispatcher::new(
        Arc::new(ContentScanner::new()),
        Arc::new(registry),
        Arc::new(recorder),
        policy,
    ))
}

fn build_recorder(config_path: &PathBuf) -> Result<TraceRecorder> {
    let config = NexusConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    recorder_for(&config)
}

fn recorder_for(config: &NexusConfig) -> Result<TraceRecorder> {
    match &config.trace_db {
        Some(path) => Ok(TraceRecorder::with_store(TraceStore::new(path)?)),
        None => Ok(TraceRecorder::new()),
    }
}

fn report_dispatch_error(err: &NexusError) {
    match err.code() {
        Some(code) => eprintln!("error [{code}]: {err}"),
        None => eprintln!("error: {err}"),
    }
    if let Some(trace_id) = err.trace_id() {
        eprintln!("inspect with: nexus trace {trace_id}");
    }
}
