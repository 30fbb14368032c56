//! Drafting-application automation.
//!
//! This module drives a CAD host through its automation object model:
//!
//! - [`color`]: symbolic color names to color indices
//! - [`layers`]: structure classification and the layer registry
//! - [`geometry`]: pure synthesis of primitives and building structures
//! - [`executor`]: paced, single-attempt host calls
//! - [`host`]: the automation contract and connectors
//! - [`session`]: connection, health check and reconnection
//! - [`draw`]: drawing synthesised strokes with partial-success reports
//! - [`entities`]: entity scans, filters and deletion
//! - [`service`]: the coordinator behind every tool
//! - [`memory`]: an in-process host for tests and dry runs
//! - [`com`]: the automation object model over `IDispatch`

pub mod color;
pub mod com;
pub mod draw;
pub mod entities;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod host;
pub mod layers;
pub mod memory;
pub mod service;
pub mod session;

pub use color::ColorSpec;
pub use entities::{EntityFilter, ScanPacing};
pub use error::{CadError, CadResult};
pub use executor::Executor;
pub use geometry::{Point3, Shape};
pub use host::{Automation, Connector, DetachedConnector};
pub use memory::{MemoryConnector, MemoryHost};
pub use service::{DrawingService, StructureRequest};
