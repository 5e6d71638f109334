use crate::bridge_client::{BridgeClient, BridgeClientError};
use crate::bridge_command::{Command, is_error_result};
use crate::config::BridgeConfig;
use crate::unity_project_inspector::UnityProjectInspector;
use crate::unity_script_tools::{self, ScriptError};
use log::{info, warn};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router,
    service::RequestContext,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as TokioMutex;

const PROJECT_INFO_URI: &str = "unity://project-info";
const SCRIPTS_URI: &str = "unity://scripts";
const SCENES_URI: &str = "unity://scenes";

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ReadScriptRequest {
    #[schemars(description = "Path to the script file, relative to the project root, e.g. `Assets/Scripts/Player.cs`")]
    pub script_path: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct CreateScriptRequest {
    #[schemars(description = "Name of the new script (without .cs extension), must be a valid C# class name")]
    pub script_name: String,
    #[schemars(description = "Folder path relative to Assets (default: Scripts)")]
    pub folder_path: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ForceRefreshRequest {
    #[schemars(description = "Optional reason for the refresh")]
    pub reason: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct BridgeCommandRequest {
    #[schemars(
        description = "Editor action: ping, create_gameobject, delete_gameobject, find_gameobject, list_gameobjects, set_property, screenshot or refresh"
    )]
    pub action: String,
    #[schemars(
        description = "Positional arguments, e.g. [\"Player\", \"position\", \"(1,2,3)\"] for set_property. Most scene actions accept a trailing delay in seconds to run the action later."
    )]
    pub args: Option<Vec<String>>,
}

/// MCP server exposing Unity project data and the in-editor bridge
#[derive(Clone)]
pub struct UnityBridgeMcpServer {
    config: Arc<BridgeConfig>,
    project_path: Arc<Mutex<Option<PathBuf>>>,
    bridge_client: Arc<TokioMutex<Option<BridgeClient>>>,
    tool_router: ToolRouter<UnityBridgeMcpServer>,
}

fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn error_text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {}", e), None))
}

/// Turn a `file://` root URI into a local path
fn path_from_file_uri(uri: &str) -> Option<PathBuf> {
    let path = uri.strip_prefix("file://")?;
    if cfg!(windows) {
        // file:///C:/Projects/Game -> C:\Projects\Game
        Some(PathBuf::from(path.trim_start_matches('/').replace('/', "\\")))
    } else {
        Some(PathBuf::from(path))
    }
}

#[tool_router]
impl UnityBridgeMcpServer {
    /// Create a new server
    ///
    /// The project comes from the config, or failing that from the current directory
    /// and its ancestors; client roots may supply it later.
    pub fn new(config: BridgeConfig) -> Self {
        let validated_path = config
            .project_path
            .clone()
            .and_then(|path| {
                if UnityProjectInspector::is_unity_project_path(&path) {
                    Some(path)
                } else {
                    warn!("Configured project path is not a valid Unity project: {}", path.display());
                    None
                }
            })
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .and_then(UnityProjectInspector::find_project_root)
            });

        if let Some(path) = &validated_path {
            info!("Using Unity project at {}", path.display());
        }

        Self {
            config: Arc::new(config),
            project_path: Arc::new(Mutex::new(validated_path)),
            bridge_client: Arc::new(TokioMutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    /// Check if a Unity project path is available
    pub fn has_project_path(&self) -> bool {
        self.current_project_path().is_some()
    }

    fn current_project_path(&self) -> Option<PathBuf> {
        self.project_path.lock().ok().and_then(|guard| guard.clone())
    }

    /// Get the current project path, or an error telling the user how to provide one
    fn get_project_path(&self) -> Result<PathBuf, McpError> {
        self.current_project_path().ok_or_else(|| {
            McpError::internal_error(
                "No Unity project path available. Please ensure roots are set or UNITY_PROJECT_PATH environment variable is configured.".to_string(),
                None,
            )
        })
    }

    /// Set the project path (used when roots are detected)
    pub fn set_project_path(&self, path: PathBuf) {
        if UnityProjectInspector::is_unity_project_path(&path) {
            if let Ok(mut guard) = self.project_path.lock() {
                *guard = Some(path);
            }
        } else {
            warn!("Attempted to set invalid Unity project path: {}", path.display());
        }
    }

    fn inspector(&self) -> Result<UnityProjectInspector, McpError> {
        let path = self.get_project_path()?;
        UnityProjectInspector::new(&path).map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    /// Try to detect the Unity project from client roots during initialization
    async fn try_detect_from_roots_if_needed(&self, context: &RequestContext<RoleServer>) -> Result<(), McpError> {
        if self.has_project_path() {
            return Ok(());
        }

        match context.peer.list_roots().await {
            Ok(roots_result) => {
                info!("Received {} roots from client", roots_result.roots.len());

                for root in &roots_result.roots {
                    if let Some(path) = path_from_file_uri(&root.uri) {
                        if let Some(project) = UnityProjectInspector::find_project_root(&path) {
                            info!("Found Unity project at: {}", project.display());
                            self.set_project_path(project);
                            return Ok(());
                        }
                    }
                }

                warn!("No Unity project found in the provided roots");
            }
            Err(e) => {
                info!("Client does not support roots capability or error occurred: {}", e);
            }
        }

        Ok(())
    }

    /// Get the bridge client, creating it once the project is known
    async fn ensure_bridge_client(&self) -> Result<BridgeClient, McpError> {
        let mut client_guard = self.bridge_client.lock().await;
        if client_guard.is_none() {
            let project_path = self.get_project_path()?;
            let client = BridgeClient::from_config(&self.config, &project_path);
            info!("Bridge mailbox at {}", client.mailbox().request_path().display());
            *client_guard = Some(client);
        }
        client_guard
            .clone()
            .ok_or_else(|| McpError::internal_error("Bridge client unavailable".to_string(), None))
    }

    fn script_error(error: ScriptError) -> Result<CallToolResult, McpError> {
        match error {
            ScriptError::Io(e) => Err(McpError::internal_error(format!("IO error: {}", e), None)),
            other => Ok(error_text_result(other.to_string())),
        }
    }

    /// Read the content of a Unity C# script
    #[tool(description = "Read the content of a Unity C# script")]
    async fn unity_read_script(
        &self,
        Parameters(ReadScriptRequest { script_path }): Parameters<ReadScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_path = self.get_project_path()?;
        match unity_script_tools::read_script(&project_path, &script_path).await {
            Ok(content) => Ok(text_result(content)),
            Err(e) => Self::script_error(e),
        }
    }

    /// Create a new MonoBehaviour script and make Unity pick it up
    #[tool(description = "Create a new C# MonoBehaviour script in the Unity project and force Unity to refresh")]
    async fn unity_create_script(
        &self,
        Parameters(CreateScriptRequest {
            script_name,
            folder_path,
        }): Parameters<CreateScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_path = self.get_project_path()?;
        match unity_script_tools::create_script(&project_path, &script_name, folder_path.as_deref()).await {
            Ok(created) => Ok(text_result(to_pretty_json(&created)?)),
            Err(e) => Self::script_error(e),
        }
    }

    /// Force Unity to refresh and recompile
    #[tool(description = "Force Unity to refresh and recompile immediately")]
    async fn unity_force_refresh(
        &self,
        Parameters(ForceRefreshRequest { reason }): Parameters<ForceRefreshRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_path = self.get_project_path()?;
        let reason = reason.unwrap_or_else(|| "Manual refresh request".to_string());
        match unity_script_tools::force_refresh(&project_path, &reason).await {
            Ok(receipt) => Ok(text_result(to_pretty_json(&receipt)?)),
            Err(e) => Self::script_error(e),
        }
    }

    /// Run an editor command through the bridge mailbox
    #[tool(
        description = "Run a command inside the Unity Editor through the bridge (create/delete/find GameObjects, set transform properties, capture screenshots, refresh). Requires the bridge to be active in the editor; check with unity_bridge_status."
    )]
    async fn unity_bridge_command(
        &self,
        Parameters(BridgeCommandRequest { action, args }): Parameters<BridgeCommandRequest>,
    ) -> Result<CallToolResult, McpError> {
        if action.trim().is_empty() {
            return Err(McpError::invalid_params("action cannot be empty", None));
        }
        let client = self.ensure_bridge_client().await?;
        let command = Command::new(action.trim(), args.unwrap_or_default());

        match client.execute(&command).await {
            Ok(result) if is_error_result(&result) => Ok(error_text_result(result)),
            Ok(result) => Ok(text_result(result)),
            Err(e @ BridgeClientError::Timeout(_)) => Ok(error_text_result(e.to_string())),
            Err(e) => Err(McpError::internal_error(
                format!("Failed to talk to the Unity bridge: {}", e),
                None,
            )),
        }
    }

    /// Report whether the in-editor bridge is serving commands
    #[tool(description = "Report whether the Unity Editor bridge is active and whether an editor has the project open")]
    async fn unity_bridge_status(&self) -> Result<CallToolResult, McpError> {
        let inspector = self.inspector()?;
        let client = self.ensure_bridge_client().await?;

        let status = client
            .status()
            .map_err(|e| McpError::internal_error(format!("Failed to read bridge status: {}", e), None))?;
        let response = json!({
            "editor_running": inspector.editor_process_id().is_ok(),
            "bridge_state": status.as_ref().map(|s| s.state),
            "bridge_updated_at": status.as_ref().map(|s| s.updated_at.to_rfc3339()),
            "mailbox": client.mailbox().request_path().parent().map(|dir| dir.display().to_string()),
        });
        Ok(text_result(response.to_string()))
    }
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name.to_string());
    raw.description = Some(description.to_string());
    raw.mime_type = Some("application/json".to_string());
    raw.no_annotation()
}

#[tool_handler]
impl ServerHandler for UnityBridgeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("Unity MCP Bridge: Unity project inspection and Unity Editor control".into()),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = if self.has_project_path() {
            vec![
                resource(PROJECT_INFO_URI, "Unity Project Information", "Basic Unity project information"),
                resource(SCRIPTS_URI, "Unity Scripts", "List of C# scripts in the project"),
                resource(SCENES_URI, "Unity Scenes", "List of scenes in the project"),
            ]
        } else {
            Vec::new()
        };
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let inspector = self.inspector()?;
        let uri = request.uri;
        let text = match uri.as_str() {
            PROJECT_INFO_URI => to_pretty_json(&inspector.project_info())?,
            SCRIPTS_URI => to_pretty_json(&inspector.list_scripts())?,
            SCENES_URI => to_pretty_json(&inspector.list_scenes())?,
            _ => {
                return Err(McpError::resource_not_found(
                    format!("Unknown resource: {}", uri),
                    Some(json!({ "uri": uri })),
                ));
            }
        };
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Client connected, server initialized successfully");

        // Detect the project from roots in the background so initialization is not delayed
        let server_clone = self.clone();
        let context_clone = context.clone();
        tokio::spawn(async move {
            if let Err(e) = server_clone.try_detect_from_roots_if_needed(&context_clone).await {
                warn!("Failed to detect Unity project from roots: {}", e);
            }
        });

        Ok(self.get_info())
    }
}
