mod repl;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::backend::{Backend, CloudAnthropicBackend, CloudOpenAiBackend, LocalChatBackend, LocalGenerateBackend};
use switchboard_core::circuit_breaker::CircuitBreaker;
use switchboard_core::confirmation::{ConfirmationMiddleware, NullConfirmationSender};
use switchboard_core::config::AppConfig;
use switchboard_core::context::ContextManager;
use switchboard_core::event_bus::EventBus;
use switchboard_core::model_registry::ModelRegistry;
use switchboard_core::orchestrator::{AgentOrchestrator, OrchestratorSettings};
use switchboard_core::prompt_manager::PromptManager;
use switchboard_core::tool_registry::ToolRegistry;
use tracing_subscriber::EnvFilter;

const FALLBACK_DEFAULT_TEMPLATE: &str =
    "You are switchboard, an interface-agnostic assistant. Interface: {interface}. Verbosity: {verbosity}. Available tools: {toolsSummary}. Current time: {now}.";

#[derive(Parser)]
#[command(name = "switchboard", about = "An interface-agnostic LLM agent orchestrator", version, author)]
struct Cli {
    /// Path to config file (default: ~/.config/switchboard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of system prompt templates
    #[arg(long, global = true, default_value = "templates")]
    templates_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat {
        /// Chat id to create or resume
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start the HTTP/WebSocket server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "switchboard=info,warn".into()))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Some(Commands::Config { action }) => {
            return handle_config_command(action, &config);
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
        }
        _ => {}
    }

    let orchestrator = build_orchestrator(&config, &cli.templates_dir)?;
    let orchestrator = Arc::new(orchestrator);

    tracing::info!(tools = orchestrator.tool_registry().len(), "switchboard ready");

    match cli.command {
        Some(Commands::Serve { .. }) => {
            switchboard_server::serve(config, orchestrator).await?;
        }
        Some(Commands::Chat { session }) => {
            repl::run(orchestrator, session).await?;
        }
        Some(Commands::Config { .. }) => unreachable!("handled above"),
        None => {
            repl::run(orchestrator, None).await?;
        }
    }

    Ok(())
}

/// Wire every component named in spec.md §4 from `config`, the composition
/// root's one job.
fn build_orchestrator(config: &AppConfig, templates_dir: &std::path::Path) -> Result<AgentOrchestrator> {
    let model_registry = ModelRegistry::new();
    for entry in &config.models {
        model_registry.register(entry.into());
    }

    let backends = build_backends(config);
    if backends.is_empty() {
        tracing::warn!("no backends configured; every generation request will fail over to ALL_MODELS_FAILED");
    }

    let circuit_breaker = CircuitBreaker::new(
        config.circuit_breaker.failure_threshold,
        Duration::from_secs(config.circuit_breaker.open_duration_secs),
    );

    let context_manager = ContextManager::new(config.context.max_messages);
    let event_bus = EventBus::new();

    let prompt_manager = match PromptManager::load(templates_dir) {
        Ok(pm) => pm,
        Err(e) => {
            tracing::warn!(error = %e, dir = %templates_dir.display(), "falling back to built-in default template");
            PromptManager::from_templates(FALLBACK_DEFAULT_TEMPLATE)
        }
    };

    let mut tool_registry = ToolRegistry::new();
    switchboard_tools::register_all(&mut tool_registry, config);

    // No interface adapter has registered an out-of-band confirmation
    // channel here; HTTP/WS consumers learn of a pending confirmation from
    // the TOOL_CONFIRMATION_REQUESTED event and resolve it via
    // /v1/confirmations/:id/approve|deny.
    let confirmation_middleware = ConfirmationMiddleware::new(Arc::new(NullConfirmationSender), event_bus.clone())
        .with_default_timeout_ms(config.confirmation.default_timeout_ms);
    confirmation_middleware.spawn_sweeper();

    let settings = OrchestratorSettings {
        routing_strategy: config.routing.strategy,
        model_preferences: config.routing.model_preferences.clone(),
        generate_timeout: Duration::from_secs(config.execution.generate_timeout_secs),
        max_tokens: config.execution.max_tokens,
        temperature: config.execution.temperature,
        max_cost: config.routing.max_cost,
    };

    Ok(AgentOrchestrator::new(
        model_registry,
        backends,
        circuit_breaker,
        context_manager,
        event_bus,
        prompt_manager,
        tool_registry,
        Some(confirmation_middleware),
        settings,
    ))
}

/// Construct one backend adapter per distinct `backend_id` referenced by
/// `config.models`, skipping any whose prerequisites (base URL / API key)
/// aren't satisfied rather than failing startup (spec.md §6: "an absent key
/// disables the adapter").
fn build_backends(config: &AppConfig) -> HashMap<String, Box<dyn Backend>> {
    let timeout = Duration::from_secs(config.execution.generate_timeout_secs);
    let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();

    let referenced: std::collections::HashSet<&str> =
        config.models.iter().map(|m| m.backend_id.as_str()).collect();

    if referenced.contains("ollama") {
        let base = config
            .backends
            .ollama_base_url
            .clone()
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        backends.insert("ollama".to_string(), Box::new(LocalGenerateBackend::new(base, timeout)));
    }

    if referenced.contains("lmstudio") {
        let base = config
            .backends
            .lmstudio_base_url
            .clone()
            .or_else(|| std::env::var("LMSTUDIO_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:1234/v1".to_string());
        backends.insert("lmstudio".to_string(), Box::new(LocalChatBackend::new(base, timeout)));
    }

    if config.backends.enable_openai || referenced.contains("openai") {
        match CloudOpenAiBackend::from_env("OPENAI_API_KEY", timeout) {
            Ok(backend) => {
                backends.insert("openai".to_string(), Box::new(backend));
            }
            Err(e) => tracing::warn!(error = %e, "openai backend not available"),
        }
    }

    if config.backends.enable_anthropic || referenced.contains("anthropic") {
        match CloudAnthropicBackend::from_env("ANTHROPIC_API_KEY", timeout) {
            Ok(backend) => {
                backends.insert("anthropic".to_string(), Box::new(backend));
            }
            Err(e) => tracing::warn!(error = %e, "anthropic backend not available"),
        }
    }

    backends
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save().context("failed to write default config")?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
