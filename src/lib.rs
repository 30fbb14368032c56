//! autocad-mcp: MCP server for AI-assisted drafting in AutoCAD
//!
//! This library exposes a drafting application's automation object model as
//! MCP tools: query the drawing, create primitives with color and thickness
//! conventions, compose building structures onto classified layers, and
//! delete entities by handle, type, layer or color.
//!
//! # Architecture
//!
//! The host application is reached through the [`cad::Automation`] trait.
//! Connections are produced by a [`cad::Connector`]; every tool call checks
//! the live session first and reconnects once if it stopped answering.
//! Multi-step operations never roll back: they report which primitives were
//! created and which failed.
//!
//! # Modules
//!
//! - [`cad`] - Drawing operations and the host contract
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Start-up error types
//! - [`mcp`] - MCP protocol implementation

pub mod cad;
pub mod config;
pub mod error;
pub mod mcp;
