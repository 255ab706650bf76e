pub mod env_detect;
pub mod file_ops;
pub mod python_exec;
pub mod sandbox;
pub mod shell_exec;
pub mod web_fetch;

use std::sync::Arc;
use switchboard_core::config::AppConfig;
use switchboard_core::tool_registry::ToolRegistry;

/// Register all built-in tools into the registry. Called once at startup
/// from the composition root (`switchboard-tools` plays the role of
/// `agent-tools` in the source repo).
pub fn register_all(registry: &mut ToolRegistry, config: &AppConfig) {
    let executor = Arc::new(sandbox::SandboxExecutor::new(config));

    registry.register(Box::new(shell_exec::ShellExecTool::new(executor.clone())));
    registry.register(Box::new(python_exec::PythonExecTool::new(executor)));
    registry.register(Box::new(file_ops::FileReadTool));
    registry.register(Box::new(file_ops::FileWriteTool));
    registry.register(Box::new(file_ops::FileListTool));
    registry.register(Box::new(web_fetch::WebFetchTool::new()));
    registry.register(Box::new(env_detect::EnvDetectTool::new()));
}
