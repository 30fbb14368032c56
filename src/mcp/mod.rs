//! Model Context Protocol (MCP) server.
//!
//! Exposes the drawing operations of [`crate::cad`] as MCP tools over the
//! stdio transport, using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   line    ┌──────────────┐  tools/call  ┌────────────────┐
//! │  Transport   │──────────▶│    Server    │─────────────▶│ DrawingService │
//! │   (stdio)    │◀──────────│  (lifecycle) │◀─────────────│   (cad layer)  │
//! └──────────────┘   reply   └──────────────┘    report    └────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ToolCallResult};
pub use transport::StdioTransport;
