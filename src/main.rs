use std::time::Instant;

use anyhow::Context;
use rmcp::{ServiceExt, transport::stdio};
use unity_mcp_bridge::logging::init_logging;
use unity_mcp_bridge::source_watcher::SourceWatcher;
use unity_mcp_bridge::{BridgeAgent, BridgeConfig, InMemoryEditor, UnityBridgeMcpServer, UnityProjectInspector};
use unity_mcp_bridge::{error_log, info_log, warn_log};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = BridgeConfig::load().context("Failed to load bridge configuration")?;

    match std::env::args().nth(1).as_deref() {
        Some("host") => run_host(config).await,
        Some(other) => {
            error_log!("Unknown argument: {}", other);
            anyhow::bail!("Unknown argument '{}', expected no argument or 'host'", other)
        }
        None => run_server(config).await,
    }
}

/// Serve MCP over stdio until the client disconnects
async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    info_log!("Starting Unity MCP Bridge server");

    let service = UnityBridgeMcpServer::new(config)
        .serve(stdio())
        .await
        .inspect_err(|e| error_log!("Failed to start MCP server: {}", e))?;

    service.waiting().await?;
    info_log!("MCP server stopped");
    Ok(())
}

/// Run the editor-side agent against an in-memory scene until Ctrl-C
async fn run_host(config: BridgeConfig) -> anyhow::Result<()> {
    let project_root = match config.project_path.clone() {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            UnityProjectInspector::find_project_root(&cwd).unwrap_or(cwd)
        }
    };
    info_log!("Hosting bridge agent for {}", project_root.display());

    let mut agent = BridgeAgent::from_config(InMemoryEditor::new(), &config, &project_root, Instant::now());

    let assets = project_root.join("Assets");
    if assets.is_dir() {
        match SourceWatcher::new(&assets, &config.watched_extensions) {
            Ok(watcher) => agent = agent.with_watcher(watcher),
            Err(e) => warn_log!("Source watching disabled: {}", e),
        }
    }

    agent.run_until(config.tick_interval(), tokio::signal::ctrl_c()).await;
    Ok(())
}
