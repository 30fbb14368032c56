//! MCP server exposing drawing automation tools.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: `initialize` request, then the
//!    `notifications/initialized` notification
//! 2. **Operation**: `tools/list`, `tools/call` and `ping`
//! 3. **Shutdown**: end of stdin or a termination signal
//!
//! Tool results are a single text item holding pretty-printed JSON. Results
//! that carry an `error` key are flagged with `isError`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::cad::draw::{CreationReport, Status};
use crate::cad::entities::DeletionReport;
use crate::cad::service::StructureRequest;
use crate::cad::{CadError, CadResult, ColorSpec, DrawingService, EntityFilter, Point3, Shape};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, OutgoingMessage, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::StdioTransport;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities. The tool list is fixed for the session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: &'static str,
    /// Server version.
    pub version: &'static str,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the text of the first content item.
    #[must_use]
    pub fn text_content(&self) -> &str {
        self.content
            .first()
            .map_or("", |ToolContent::Text { text }| text.as_str())
    }

    /// Parses the text content as JSON, or `Null` if it is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_str(self.text_content()).unwrap_or(Value::Null)
    }
}

/// The MCP server.
#[derive(Debug)]
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Drawing operations behind the tools.
    service: DrawingService,
}

impl McpServer {
    /// Creates a server that runs every tool through `service`.
    #[must_use]
    pub const fn new(service: DrawingService) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            service,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the MCP server main loop over stdio with graceful shutdown
    /// handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::new();
        self.run_with_shutdown(&mut transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        transport: &mut StdioTransport,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("stdin closed");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if let Some(reply) = self.handle_line(&line) {
            transport.write_message(&reply).await?;
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one line from the client and returns the reply, if any.
    ///
    /// Blank lines and notifications produce no reply.
    pub fn handle_line(&mut self, line: &str) -> Option<OutgoingMessage> {
        if line.trim().is_empty() {
            return None;
        }

        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => Some(self.handle_request(&req).into()),
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                None
            }
            Err(error) => Some(error.into()),
        }
    }

    /// Handles an incoming request.
    fn handle_request(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        tracing::debug!(id = %req.id, method = %req.method, "Request");
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised");
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::rejected(
                req.id.clone(),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req.params_as("initialize")?;
        tracing::info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = %params.protocol_version,
            "Initialising"
        );

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities {
                tools: ToolCapabilities::default(),
            },
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": Self::tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    fn handle_tools_call(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req.params_as("tool call")?;
        let result = self.call_tool(&params.name, &params.arguments);

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::rejected(id.clone(), "Server not initialised"));
        }
        Ok(())
    }

    /// Runs one tool.
    ///
    /// Unknown tools and failed calls produce an error result holding
    /// `{"error": ...}`; they never fail the JSON-RPC request.
    pub fn call_tool(&mut self, name: &str, arguments: &Value) -> ToolCallResult {
        let outcome = match name {
            // Queries
            "get_drawing_info" => self.call_get_drawing_info(),
            "get_entities" => self.call_get_entities(arguments),
            // Layers
            "create_or_get_layer" => self.call_create_or_get_layer(arguments),
            "set_current_layer" => self.call_set_current_layer(arguments),
            // Creation
            "create_structure" => self.call_create_structure(arguments),
            "create_line" => self.call_create_line(arguments),
            "create_circle" => self.call_create_circle(arguments),
            "create_rectangle" => self.call_create_rectangle(arguments),
            "create_arc" => self.call_create_arc(arguments),
            "create_text" => self.call_create_text(arguments),
            // Deletion
            "delete_entity_by_handle" => self.call_delete_entity_by_handle(arguments),
            "delete_entities_by_handles" => self.call_delete_entities_by_handles(arguments),
            "delete_entities_by_type" => self.call_delete_entities_by_type(arguments),
            "delete_entities_by_layer" => self.call_delete_entities_by_layer(arguments),
            "delete_entities_by_color" => self.call_delete_entities_by_color(arguments),
            "delete_entities_by_type_and_color" => {
                self.call_delete_entities_by_type_and_color(arguments)
            }
            "delete_last_entities" => self.call_delete_last_entities(arguments),
            "delete_all_entities" => self.call_delete_all_entities(arguments),
            // Editing and view
            "undo_last_operation" => self.call_undo_last_operation(),
            "change_entity_color" => self.call_change_entity_color(arguments),
            "zoom_extents" => self.call_zoom_extents(),
            _ => {
                return json_error(&json!({ "error": format!("Unknown tool: {name}") }));
            }
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(tool = name, error = %e, "Tool call failed");
            json_error(&json!({ "error": e.to_string() }))
        })
    }

    /// Returns the list of available tools.
    #[allow(clippy::too_many_lines)]
    #[must_use]
    pub fn tool_definitions() -> Vec<ToolDefinition> {
        let color_schema = |description: &str, default: &str| {
            json!({
                "type": ["string", "integer"],
                "description": description,
                "default": default
            })
        };
        let thickness_schema = |description: &str| {
            json!({
                "type": "number",
                "description": description,
                "default": 0.0,
                "minimum": 0
            })
        };
        let point_schema = |description: &str| {
            json!({
                "type": "array",
                "items": {"type": "number"},
                "minItems": 2,
                "maxItems": 3,
                "description": description
            })
        };
        let no_arguments = || json!({"type": "object", "properties": {}, "required": []});
        let color_filter = json!({
            "type": ["string", "integer"],
            "description": "Color name (red, blue, green, etc.) or ACI number"
        });
        let entity_type = json!({
            "type": "string",
            "description": "Entity type (e.g. AcDbLine, AcDbCircle, AcDbText, AcDbArc)"
        });

        vec![
            // === Queries ===
            ToolDefinition {
                name: "get_drawing_info",
                description: "Get information about the current drawing, including its layers.",
                input_schema: no_arguments(),
            },
            ToolDefinition {
                name: "get_entities",
                description: "List the entities in model space with their properties, grouped \
                              by layer. Each entity carries its handle for later edits.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "max_entities": {
                            "type": "integer",
                            "description": "Maximum number of entities to return (default: all)",
                            "minimum": 1
                        }
                    },
                    "required": []
                }),
            },
            // === Layers ===
            ToolDefinition {
                name: "create_or_get_layer",
                description: "Create a layer, or leave an existing layer with that name unchanged.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "layer_name": {"type": "string", "description": "Name of the layer"},
                        "color": color_schema("Layer color name or ACI number", "white"),
                        "description": {
                            "type": "string",
                            "description": "Layer description",
                            "default": ""
                        }
                    },
                    "required": ["layer_name"]
                }),
            },
            ToolDefinition {
                name: "set_current_layer",
                description: "Make a layer the active layer for new entities.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "layer_name": {
                            "type": "string",
                            "description": "Name of the layer to make active"
                        }
                    },
                    "required": ["layer_name"]
                }),
            },
            // === Structures ===
            ToolDefinition {
                name: "create_structure",
                description: "Create a building element (wall, door, window, room, furniture, \
                              fixtures, ...) on its classified layer, with an optional label on \
                              the ANNOTATION layer. The active layer is restored afterwards.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "structure_type": {
                            "type": "string",
                            "description": "Type of structure, e.g. wall, door, window, room, \
                                            kitchen_chair, outlet, sink, duct, beam, tree"
                        },
                        "geometry_data": {
                            "type": "object",
                            "description": "Geometry: start/end for walls, doors (optional \
                                            width for the swing), windows and lines; \
                                            corner1/corner2 for rooms and rectangles; \
                                            center/radius for circles; add start_angle/end_angle \
                                            for arcs"
                        },
                        "color": {
                            "type": ["string", "integer"],
                            "description": "Color name or ACI number (default: the layer's color)"
                        },
                        "thickness": thickness_schema("Stroke thickness (walls default to 0.1)"),
                        "custom_layer": {
                            "type": "string",
                            "description": "Layer to use instead of the classified one"
                        },
                        "label": {
                            "type": "string",
                            "description": "Text label placed at the structure"
                        }
                    },
                    "required": ["structure_type", "geometry_data"]
                }),
            },
            // === Primitives ===
            ToolDefinition {
                name: "create_line",
                description: "Create a line. A thickness draws a parallel line joined by end caps.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "start": point_schema("Start point [x, y] or [x, y, z]"),
                        "end": point_schema("End point [x, y] or [x, y, z]"),
                        "color": color_schema(
                            "Color name (red, yellow, green, cyan, blue, magenta, white, gray, \
                             light_gray, black, bylayer, byblock) or ACI number",
                            "white"
                        ),
                        "thickness": thickness_schema("Line thickness (creates a parallel line)")
                    },
                    "required": ["start", "end"]
                }),
            },
            ToolDefinition {
                name: "create_circle",
                description: "Create a circle. A thickness adds concentric outer and inner circles.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "center": point_schema("Center point [x, y] or [x, y, z]"),
                        "radius": {"type": "number", "description": "Circle radius", "exclusiveMinimum": 0},
                        "color": color_schema("Color name or ACI number", "white"),
                        "thickness": thickness_schema("Circle thickness (creates concentric circles)")
                    },
                    "required": ["center", "radius"]
                }),
            },
            ToolDefinition {
                name: "create_rectangle",
                description: "Create an axis-aligned rectangle from two opposite corners, as four lines.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "corner1": point_schema("First corner [x, y]"),
                        "corner2": point_schema("Opposite corner [x, y]"),
                        "color": color_schema("Color name or ACI number", "white"),
                        "thickness": thickness_schema("Edge thickness")
                    },
                    "required": ["corner1", "corner2"]
                }),
            },
            ToolDefinition {
                name: "create_arc",
                description: "Create an arc, counter-clockwise from start_angle to end_angle. \
                              A thickness adds inner and outer arcs.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "center": point_schema("Center point [x, y] or [x, y, z]"),
                        "radius": {"type": "number", "description": "Arc radius", "exclusiveMinimum": 0},
                        "start_angle": {
                            "type": "number",
                            "description": "Start angle in degrees (0 = positive X axis)"
                        },
                        "end_angle": {"type": "number", "description": "End angle in degrees"},
                        "color": color_schema("Color name or ACI number", "white"),
                        "thickness": thickness_schema("Arc thickness (creates parallel arcs)")
                    },
                    "required": ["center", "radius", "start_angle", "end_angle"]
                }),
            },
            ToolDefinition {
                name: "create_text",
                description: "Create single-line text.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "position": point_schema("Insertion point [x, y] or [x, y, z]"),
                        "text": {"type": "string", "description": "Text content"},
                        "height": {
                            "type": "number",
                            "description": "Text height",
                            "default": 1.0,
                            "exclusiveMinimum": 0
                        },
                        "color": color_schema("Color name or ACI number", "white")
                    },
                    "required": ["position", "text"]
                }),
            },
            // === Deletion ===
            ToolDefinition {
                name: "delete_entity_by_handle",
                description: "Delete one entity by its handle (see get_entities).",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "handle": {"type": "string", "description": "Entity handle"}
                    },
                    "required": ["handle"]
                }),
            },
            ToolDefinition {
                name: "delete_entities_by_handles",
                description: "Delete several entities by handle. Handles that match nothing are \
                              reported as not found.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "handles": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Entity handles"
                        }
                    },
                    "required": ["handles"]
                }),
            },
            ToolDefinition {
                name: "delete_entities_by_type",
                description: "Delete every entity of one type (exact match, e.g. AcDbLine).",
                input_schema: json!({
                    "type": "object",
                    "properties": {"entity_type": entity_type.clone()},
                    "required": ["entity_type"]
                }),
            },
            ToolDefinition {
                name: "delete_entities_by_layer",
                description: "Delete every entity on one layer.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "layer_name": {
                            "type": "string",
                            "description": "Layer name (e.g. '0', 'WALLS', 'DOORS')"
                        }
                    },
                    "required": ["layer_name"]
                }),
            },
            ToolDefinition {
                name: "delete_entities_by_color",
                description: "Delete every entity with one color.",
                input_schema: json!({
                    "type": "object",
                    "properties": {"color": color_filter.clone()},
                    "required": ["color"]
                }),
            },
            ToolDefinition {
                name: "delete_entities_by_type_and_color",
                description: "Delete the entities of one type that also have one color \
                              (e.g. only green text).",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "entity_type": entity_type,
                        "color": color_filter
                    },
                    "required": ["entity_type", "color"]
                }),
            },
            ToolDefinition {
                name: "delete_last_entities",
                description: "Delete the most recently created entities, newest first.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "count": {
                            "type": "integer",
                            "description": "Number of entities to delete",
                            "default": 1,
                            "minimum": 1
                        }
                    },
                    "required": []
                }),
            },
            ToolDefinition {
                name: "delete_all_entities",
                description: "Delete every entity in model space. Refused unless confirm is true.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "confirm": {
                            "type": "boolean",
                            "description": "Must be true to delete all entities",
                            "default": false
                        }
                    },
                    "required": ["confirm"]
                }),
            },
            // === Editing and view ===
            ToolDefinition {
                name: "undo_last_operation",
                description: "Undo the last operation in the drawing.",
                input_schema: no_arguments(),
            },
            ToolDefinition {
                name: "change_entity_color",
                description: "Change the color of an entity by its handle.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "handle": {"type": "string", "description": "Entity handle"},
                        "color": {
                            "type": ["string", "integer"],
                            "description": "New color name or ACI number"
                        }
                    },
                    "required": ["handle", "color"]
                }),
            },
            ToolDefinition {
                name: "zoom_extents",
                description: "Zoom the view to show every object in the drawing.",
                input_schema: no_arguments(),
            },
        ]
    }

    // ==================== Queries ====================

    fn call_get_drawing_info(&mut self) -> CadResult<ToolCallResult> {
        let info = self.service.drawing_info()?;
        Ok(json_result(&info))
    }

    fn call_get_entities(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let max_entities = optional_count(arguments, "max_entities")?;
        let listing = self.service.entities(max_entities)?;
        Ok(json_result(&listing))
    }

    // ==================== Layers ====================

    fn call_create_or_get_layer(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let layer_name = required_str(arguments, "layer_name")?;
        let color = color_or(arguments, "color", "white")?;
        let description = optional_str(arguments, "description")?.unwrap_or_default();

        let created = self
            .service
            .create_or_get_layer(layer_name, &color, description)?;

        Ok(json_result(&json!({
            "success": true,
            "layer_name": layer_name,
            "created": created,
        })))
    }

    /// Any failure, an unknown layer included, is reported as
    /// `success: false` rather than as a tool error.
    fn call_set_current_layer(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let layer_name = required_str(arguments, "layer_name")?;

        match self.service.set_current_layer(layer_name) {
            Ok(()) => Ok(json_result(&json!({
                "success": true,
                "layer_name": layer_name,
            }))),
            Err(e @ CadError::NotConnected { .. }) => Err(e),
            Err(e) => Ok(json_result(&json!({
                "success": false,
                "layer_name": layer_name,
                "message": e.to_string(),
            }))),
        }
    }

    // ==================== Creation ====================

    fn call_create_structure(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let structure_type = required_str(arguments, "structure_type")?;
        let Some(geometry_data) = arguments.get("geometry_data").filter(|g| !g.is_null()) else {
            return Err(CadError::missing_parameter("geometry_data"));
        };

        let request = StructureRequest {
            structure_type: structure_type.to_string(),
            shape: Shape::for_structure(structure_type, geometry_data)?,
            color: optional_color(arguments, "color")?,
            thickness: thickness(arguments)?,
            custom_layer: optional_str(arguments, "custom_layer")?.map(str::to_string),
            label: optional_str(arguments, "label")?.map(str::to_string),
        };

        let outcome = self.service.create_structure(&request)?;

        let mut details = Map::new();
        details.insert("structure_type".into(), json!(structure_type));
        details.insert("shape".into(), json!(request.shape.kind()));
        details.insert("layer".into(), json!(outcome.layer));
        details.insert("color".into(), json!(outcome.color.to_string()));
        details.insert("thickness".into(), json!(request.thickness));
        if outcome.labelled {
            details.insert("label".into(), json!(request.label));
        }
        if !outcome.warnings.is_empty() {
            details.insert("layer_warnings".into(), json!(outcome.warnings));
        }

        let mut message = format!("{structure_type} created on layer {}", outcome.layer);
        if let Some(label) = request.label.as_deref().filter(|_| outcome.labelled) {
            message.push_str(&format!(" with label '{label}'"));
        }

        Ok(creation_result(&outcome.report, details, message))
    }

    fn call_create_line(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let start = required_point(arguments, "start")?;
        let end = required_point(arguments, "end")?;
        let shape = Shape::Line { start, end };
        self.create_shape(arguments, &shape, format!("Line created from {start} to {end}"))
    }

    fn call_create_circle(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let center = required_point(arguments, "center")?;
        let radius = required_positive(arguments, "radius")?;
        let shape = Shape::Circle { center, radius };
        self.create_shape(
            arguments,
            &shape,
            format!("Circle created at {center} with radius {radius}"),
        )
    }

    fn call_create_rectangle(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let corner1 = required_point(arguments, "corner1")?;
        let corner2 = required_point(arguments, "corner2")?;
        let shape = Shape::Rectangle { corner1, corner2 };
        self.create_shape(
            arguments,
            &shape,
            format!("Rectangle created from {corner1} to {corner2}"),
        )
    }

    fn call_create_arc(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let center = required_point(arguments, "center")?;
        let radius = required_positive(arguments, "radius")?;
        let start_angle = required_number(arguments, "start_angle")?;
        let end_angle = required_number(arguments, "end_angle")?;
        let shape = Shape::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        };
        self.create_shape(
            arguments,
            &shape,
            format!("Arc created at {center} with radius {radius} from {start_angle}° to {end_angle}°"),
        )
    }

    /// Draws a primitive shape with the `color` and `thickness` arguments.
    fn create_shape(
        &mut self,
        arguments: &Value,
        shape: &Shape,
        message: String,
    ) -> CadResult<ToolCallResult> {
        let color = color_or(arguments, "color", "white")?;
        let thickness = thickness(arguments)?;

        let report = self.service.create_shape(shape, &color, thickness)?;

        let mut details = Map::new();
        details.insert("type".into(), json!(shape.kind()));
        details.insert("color".into(), json!(color.to_string()));
        details.insert("color_index".into(), json!(color.resolve()));
        details.insert("thickness".into(), json!(thickness));

        Ok(creation_result(&report, details, message))
    }

    fn call_create_text(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let position = required_point(arguments, "position")?;
        let text = required_str(arguments, "text")?;
        let height = match arguments.get("height").filter(|h| !h.is_null()) {
            Some(_) => required_positive(arguments, "height")?,
            None => 1.0,
        };
        let color = color_or(arguments, "color", "white")?;

        let report = self.service.create_text(position, text, height, &color)?;

        let mut details = Map::new();
        if let Some(handle) = report.created.first() {
            details.insert("handle".into(), json!(handle));
        }
        details.insert("type".into(), json!("Text"));
        details.insert("color".into(), json!(color.to_string()));
        details.insert("color_index".into(), json!(color.resolve()));
        details.insert("height".into(), json!(height));

        Ok(creation_result(
            &report,
            details,
            format!("Text '{text}' created at {position} with height {height}"),
        ))
    }

    // ==================== Deletion ====================

    fn call_delete_entity_by_handle(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let handle = required_str(arguments, "handle")?;
        self.service.delete_entity(handle)?;
        Ok(json_result(&json!({
            "success": true,
            "handle": handle,
            "message": format!("Entity {handle} deleted"),
        })))
    }

    fn call_delete_entities_by_handles(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let Some(values) = arguments.get("handles").filter(|h| !h.is_null()) else {
            return Err(CadError::missing_parameter("handles"));
        };
        let handles: Option<Vec<String>> = values.as_array().and_then(|items| {
            items
                .iter()
                .map(|h| h.as_str().map(str::to_string))
                .collect()
        });
        let Some(handles) = handles else {
            return Err(CadError::invalid_parameter(
                "handles",
                "expected an array of handle strings",
            ));
        };

        let requested = handles.len();
        let report = self.service.delete_matching(&EntityFilter::Handles(handles))?;
        let message = format!(
            "Deleted {} of {requested} requested entities",
            report.deleted_count
        );
        Ok(deletion_result(&report, message))
    }

    fn call_delete_entities_by_type(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let entity_type = required_str(arguments, "entity_type")?;
        let report = self
            .service
            .delete_matching(&EntityFilter::Type(entity_type.to_string()))?;
        let message = format!("Deleted {} {entity_type} entities", report.deleted_count);
        Ok(deletion_result(&report, message))
    }

    fn call_delete_entities_by_layer(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let layer_name = required_str(arguments, "layer_name")?;
        let report = self
            .service
            .delete_matching(&EntityFilter::Layer(layer_name.to_string()))?;
        let message = format!(
            "Deleted {} entities from layer {layer_name}",
            report.deleted_count
        );
        Ok(deletion_result(&report, message))
    }

    fn call_delete_entities_by_color(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let color = required_color(arguments, "color")?;
        let report = self
            .service
            .delete_matching(&EntityFilter::Color(color.resolve()))?;
        let message = format!(
            "Deleted {} entities with color {color} (ACI {})",
            report.deleted_count,
            color.resolve()
        );
        Ok(deletion_result(&report, message))
    }

    fn call_delete_entities_by_type_and_color(
        &mut self,
        arguments: &Value,
    ) -> CadResult<ToolCallResult> {
        let entity_type = required_str(arguments, "entity_type")?;
        let color = required_color(arguments, "color")?;
        let report = self.service.delete_matching(&EntityFilter::TypeAndColor {
            entity_type: entity_type.to_string(),
            color: color.resolve(),
        })?;
        let message = format!(
            "Deleted {} {entity_type} entities with color {color}",
            report.deleted_count
        );
        Ok(deletion_result(&report, message))
    }

    fn call_delete_last_entities(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let count = optional_count(arguments, "count")?.unwrap_or(1);
        let report = self.service.delete_matching(&EntityFilter::LastN(count))?;
        let message = format!("Deleted the last {} entities", report.deleted_count);
        Ok(deletion_result(&report, message))
    }

    fn call_delete_all_entities(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let confirm = match arguments.get("confirm") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(CadError::invalid_parameter("confirm", "expected a boolean"));
            }
        };
        let report = self.service.delete_all(confirm)?;
        let message = format!("Deleted all {} entities", report.deleted_count);
        Ok(deletion_result(&report, message))
    }

    // ==================== Editing and view ====================

    fn call_undo_last_operation(&mut self) -> CadResult<ToolCallResult> {
        self.service.undo()?;
        Ok(json_result(&json!({
            "success": true,
            "message": "Last operation undone",
        })))
    }

    fn call_change_entity_color(&mut self, arguments: &Value) -> CadResult<ToolCallResult> {
        let handle = required_str(arguments, "handle")?;
        let color = required_color(arguments, "color")?;
        let index = self.service.change_entity_color(handle, &color)?;
        Ok(json_result(&json!({
            "success": true,
            "handle": handle,
            "color": color.to_string(),
            "color_index": index,
            "message": format!("Entity {handle} color changed to {color}"),
        })))
    }

    fn call_zoom_extents(&mut self) -> CadResult<ToolCallResult> {
        self.service.zoom_extents()?;
        Ok(json_result(&json!({
            "success": true,
            "message": "Zoomed to drawing extents",
        })))
    }
}

// ==================== Result Formatting ====================

fn pretty(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialise tool output");
        json!({ "error": "failed to serialise result" }).to_string()
    })
}

fn json_result(value: &impl Serialize) -> ToolCallResult {
    ToolCallResult::text(pretty(value))
}

fn json_error(value: &impl Serialize) -> ToolCallResult {
    ToolCallResult::error(pretty(value))
}

/// Renders a creation report. Anything created counts as success; failures
/// are listed next to the handles. A report with nothing created is an error.
fn creation_result(
    report: &CreationReport,
    details: Map<String, Value>,
    message: String,
) -> ToolCallResult {
    let mut body = Map::new();
    body.insert("success".into(), json!(report.succeeded()));
    body.insert("status".into(), json!(report.status()));
    body.insert("handles".into(), json!(report.created));
    body.extend(details);
    if !report.failed.is_empty() {
        body.insert("failed".into(), json!(report.failed));
    }
    if report.skipped > 0 {
        body.insert("skipped".into(), json!(report.skipped));
    }

    if !report.succeeded() {
        let error = report.first_error().unwrap_or("No entities were created");
        body.insert("error".into(), json!(error));
        return json_error(&body);
    }

    if let Some(warning) = report.warning() {
        body.insert("warning".into(), json!(warning));
    }
    body.insert("message".into(), Value::String(message));
    json_result(&body)
}

/// Renders a deletion report. Matching nothing is not an error.
fn deletion_result(report: &DeletionReport, message: String) -> ToolCallResult {
    let status = report.status();
    let mut body = json!({
        "success": status != Status::Failed,
        "status": status,
        "deleted_count": report.deleted_count,
        "matched_count": report.matched_count,
        "deleted_handles": report.deleted,
    });
    body["message"] = Value::String(message);
    if !report.failed.is_empty() {
        body["failed"] = json!(report.failed);
    }
    if !report.not_found.is_empty() {
        body["not_found"] = json!(report.not_found);
    }

    if status == Status::Failed {
        body["error"] = json!(report
            .failed
            .first()
            .map_or("Deletion failed", |f| f.error.as_str()));
        return json_error(&body);
    }
    json_result(&body)
}

// ==================== Argument Parsing ====================

/// Returns the argument, treating an explicit `null` as absent.
fn argument<'a>(arguments: &'a Value, name: &str) -> Option<&'a Value> {
    arguments.get(name).filter(|v| !v.is_null())
}

fn required<'a>(arguments: &'a Value, name: &str) -> CadResult<&'a Value> {
    argument(arguments, name).ok_or_else(|| CadError::missing_parameter(name))
}

fn required_str<'a>(arguments: &'a Value, name: &str) -> CadResult<&'a str> {
    required(arguments, name)?
        .as_str()
        .ok_or_else(|| CadError::invalid_parameter(name, "expected a string"))
}

fn optional_str<'a>(arguments: &'a Value, name: &str) -> CadResult<Option<&'a str>> {
    argument(arguments, name)
        .map(|v| {
            v.as_str()
                .ok_or_else(|| CadError::invalid_parameter(name, "expected a string"))
        })
        .transpose()
}

fn required_point(arguments: &Value, name: &str) -> CadResult<Point3> {
    Point3::from_json(required(arguments, name)?, name)
}

fn required_number(arguments: &Value, name: &str) -> CadResult<f64> {
    required(arguments, name)?
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CadError::invalid_parameter(name, "expected a number"))
}

fn required_positive(arguments: &Value, name: &str) -> CadResult<f64> {
    let value = required_number(arguments, name)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(CadError::invalid_parameter(name, "must be greater than 0"))
    }
}

/// The `thickness` argument: absent means 0, negative values are rejected.
fn thickness(arguments: &Value) -> CadResult<f64> {
    if argument(arguments, "thickness").is_none() {
        return Ok(0.0);
    }
    let value = required_number(arguments, "thickness")?;
    if value < 0.0 {
        return Err(CadError::invalid_parameter(
            "thickness",
            "must not be negative",
        ));
    }
    Ok(value)
}

/// A positive integer argument.
fn optional_count(arguments: &Value, name: &str) -> CadResult<Option<usize>> {
    argument(arguments, name)
        .map(|v| {
            v.as_u64()
                .filter(|&n| n >= 1)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| CadError::invalid_parameter(name, "expected an integer of at least 1"))
        })
        .transpose()
}

fn optional_color(arguments: &Value, name: &str) -> CadResult<Option<ColorSpec>> {
    argument(arguments, name).map(ColorSpec::from_json).transpose()
}

fn color_or(arguments: &Value, name: &str, default: &str) -> CadResult<ColorSpec> {
    Ok(optional_color(arguments, name)?.unwrap_or_else(|| ColorSpec::named(default)))
}

fn required_color(arguments: &Value, name: &str) -> CadResult<ColorSpec> {
    ColorSpec::from_json(required(arguments, name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::{DetachedConnector, Executor, MemoryConnector, MemoryHost, ScanPacing};

    fn running(connector: Box<dyn crate::cad::Connector>) -> McpServer {
        let mut server = McpServer::new(DrawingService::new(
            connector,
            Executor::immediate(),
            ScanPacing::default(),
        ));
        server.state = ServerState::Running;
        server
    }

    fn memory_server() -> (MemoryHost, McpServer) {
        let host = MemoryHost::new();
        let server = running(Box::new(MemoryConnector::new(host.clone())));
        (host, server)
    }

    #[test]
    fn server_initial_state() {
        let server = McpServer::new(DrawingService::new(
            Box::new(DetachedConnector),
            Executor::immediate(),
            ScanPacing::default(),
        ));
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = McpServer::tool_definitions();
        assert_eq!(tools.len(), 21);

        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
            assert_eq!(tool.input_schema["type"], "object");
        }

        let mut names: Vec<_> = tools.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 21, "tool names must be unique");
    }

    #[test]
    fn every_listed_tool_is_dispatched() {
        let mut server = running(Box::new(DetachedConnector));
        for tool in McpServer::tool_definitions() {
            let result = server.call_tool(tool.name, &json!({}));
            let text = result.text_content();
            assert!(!text.contains("Unknown tool"), "{} is not dispatched", tool.name);
        }
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "Hello, world!");
    }

    #[test]
    fn tool_call_result_error_serialises_flag() {
        let result = ToolCallResult::error("Something went wrong");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["type"], "text");

        let ok = serde_json::to_value(ToolCallResult::text("fine")).unwrap();
        assert!(ok.get("isError").is_none());
    }

    #[test]
    fn detached_tools_report_not_connected() {
        let mut server = running(Box::new(DetachedConnector));
        let result = server.call_tool("get_drawing_info", &json!({}));
        assert!(result.is_error);
        assert_eq!(result.json(), json!({"error": "Not connected to AutoCAD"}));
    }

    #[test]
    fn unknown_tool_is_an_error_result() {
        let (_host, mut server) = memory_server();
        let result = server.call_tool("explode", &json!({}));
        assert!(result.is_error);
        assert_eq!(result.json()["error"], "Unknown tool: explode");
    }

    #[test]
    fn missing_parameter_is_named() {
        let (_host, mut server) = memory_server();
        let result = server.call_tool("create_line", &json!({"start": [0, 0]}));
        assert!(result.is_error);
        assert_eq!(result.json()["error"], "Missing required parameter: end");
    }

    #[test]
    fn create_line_reports_handles_and_color() {
        let (host, mut server) = memory_server();
        let result = server.call_tool(
            "create_line",
            &json!({"start": [0, 0], "end": [10, 0], "color": "red"}),
        );

        assert!(!result.is_error);
        let body = result.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "complete");
        assert_eq!(body["handles"].as_array().unwrap().len(), 1);
        assert_eq!(body["color_index"], 1);
        assert_eq!(host.entities()[0].color, 1);
    }

    #[test]
    fn negative_thickness_is_rejected() {
        let (host, mut server) = memory_server();
        let result = server.call_tool(
            "create_circle",
            &json!({"center": [0, 0], "radius": 1, "thickness": -1}),
        );
        assert!(result.is_error);
        assert!(host.entities().is_empty());
    }

    #[test]
    fn create_text_returns_single_handle() {
        let (_host, mut server) = memory_server();
        let result = server.call_tool(
            "create_text",
            &json!({"position": [1, 2], "text": "Kitchen", "color": 3}),
        );
        let body = result.json();
        assert_eq!(body["handle"], body["handles"][0]);
        assert_eq!(body["height"], 1.0);
        assert_eq!(body["color_index"], 3);
    }

    #[test]
    fn set_unknown_layer_is_unsuccessful_not_an_error() {
        let (_host, mut server) = memory_server();
        let result = server.call_tool("set_current_layer", &json!({"layer_name": "NOPE"}));
        assert!(!result.is_error);
        assert_eq!(result.json()["success"], false);
    }

    #[test]
    fn delete_all_without_confirm_is_refused() {
        let (host, mut server) = memory_server();
        server.call_tool("create_line", &json!({"start": [0, 0], "end": [1, 1]}));

        let result = server.call_tool("delete_all_entities", &json!({"confirm": false}));
        assert!(result.is_error);
        assert_eq!(host.entities().len(), 1);
    }
}
