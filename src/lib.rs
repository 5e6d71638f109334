//! Unity MCP Bridge
//!
//! A Model Context Protocol (MCP) server for Unity projects, plus the in-editor
//! agent it talks to. The two sides exchange commands through a file mailbox:
//! the server writes a request, the agent polls for it on every editor tick,
//! dispatches it against the scene and writes the result back.

pub mod logging;

pub mod bridge_agent;
pub mod bridge_client;
pub mod bridge_command;
pub mod bridge_dispatcher;
pub mod bridge_mailbox;
pub mod config;
pub mod deferred_scheduler;
pub mod editor_host;
pub mod in_memory_editor;
pub mod mcp_server;
pub mod refresh_escalation;
pub mod refresh_trigger;
pub mod source_watcher;
pub mod unity_project_inspector;
pub mod unity_script_tools;

#[cfg(test)]
mod test_utils;

pub use bridge_agent::{BridgeAgent, TickReport};
pub use bridge_client::{BridgeClient, BridgeClientError};
pub use bridge_command::{Command, CommandError};
pub use bridge_dispatcher::CommandDispatcher;
pub use bridge_mailbox::{BridgeState, BridgeStatus, MailboxChannel, MailboxError};
pub use config::{BridgeConfig, ConfigError};
pub use editor_host::{EditorHost, HostError, RefreshHost, SceneHost};
pub use in_memory_editor::InMemoryEditor;
pub use mcp_server::UnityBridgeMcpServer;
pub use refresh_escalation::{EscalationChain, RefreshStrategy};
pub use refresh_trigger::DebouncedTrigger;
pub use unity_project_inspector::UnityProjectInspector;

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    logging::init_logging();
}
