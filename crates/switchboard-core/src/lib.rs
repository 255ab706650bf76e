pub mod backend;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod confirmation;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod execution_engine;
pub mod model_registry;
pub mod orchestrator;
pub mod prompt_manager;
pub mod router;
pub mod tool_registry;
pub mod types;

pub use config::AppConfig;
pub use confirmation::{ConfirmationMiddleware, ConfirmationRequest, ConfirmationSender};
pub use context::ContextManager;
pub use error::AgentError;
pub use event_bus::{Event, EventBus, EventType};
pub use model_registry::ModelRegistry;
pub use orchestrator::{AgentOrchestrator, HealthReport, OrchestratorSettings, ProcessingResult, StatsSnapshot};
pub use prompt_manager::PromptManager;
pub use tool_registry::{Tool, ToolRegistry};
pub use types::{ErrorKind, InterfaceTag, Message, Role, UserContext};
