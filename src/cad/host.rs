//! The host application's automation contract.
//!
//! The drafting application is driven through its automation object model:
//! a document with a layer table, an active layer, a model-space entity
//! collection, primitive constructors and view operations. [`Automation`]
//! mirrors the subset of that object model this server calls. A [`Connector`]
//! produces live sessions and is asked again whenever a session stops
//! answering.
//!
//! Entity properties are read one at a time through [`Automation::entity_property`]
//! because any single property read may fail on the host side without the
//! entity itself being unusable.

use std::fmt;

use serde::Serialize;

use crate::cad::error::{CadError, CadResult};
use crate::cad::geometry::Point3;

/// An entity handle as reported by the host (hexadecimal string).
pub type Handle = String;

/// Entity type name of a line.
pub const LINE_TYPE: &str = "AcDbLine";
/// Entity type name of a circle.
pub const CIRCLE_TYPE: &str = "AcDbCircle";
/// Entity type name of an arc.
pub const ARC_TYPE: &str = "AcDbArc";
/// Entity type name of single-line text.
pub const TEXT_TYPE: &str = "AcDbText";

/// A layer as listed in the drawing's layer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    /// Layer name.
    pub name: String,
    /// Layer color (ACI).
    pub color: i32,
    /// Whether the layer is frozen.
    pub frozen: bool,
    /// Whether the layer is locked.
    pub locked: bool,
}

/// Entity properties readable through the automation interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityProperty {
    /// `ObjectName`, the entity type (e.g. `AcDbLine`).
    ObjectName,
    /// `Layer`.
    Layer,
    /// `Handle`.
    Handle,
    /// `Color`.
    Color,
    /// `Visible`.
    Visible,
    /// `StartPoint` of a line.
    StartPoint,
    /// `EndPoint` of a line.
    EndPoint,
    /// `Center` of a circle or arc.
    Center,
    /// `Radius` of a circle or arc.
    Radius,
    /// `InsertionPoint` of text.
    InsertionPoint,
    /// `TextString` of text.
    TextString,
    /// `Height` of text.
    Height,
}

impl EntityProperty {
    /// Returns the host-side property name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ObjectName => "ObjectName",
            Self::Layer => "Layer",
            Self::Handle => "Handle",
            Self::Color => "Color",
            Self::Visible => "Visible",
            Self::StartPoint => "StartPoint",
            Self::EndPoint => "EndPoint",
            Self::Center => "Center",
            Self::Radius => "Radius",
            Self::InsertionPoint => "InsertionPoint",
            Self::TextString => "TextString",
            Self::Height => "Height",
        }
    }
}

impl fmt::Display for EntityProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property value read back from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// String property.
    Text(String),
    /// Integer property.
    Int(i32),
    /// Real property.
    Real(f64),
    /// Boolean property.
    Bool(bool),
    /// 3D point property.
    Point(Point3),
}

impl PropertyValue {
    /// Converts into a string, or reports the property as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has a different type.
    pub fn into_text(self, index: usize, property: EntityProperty) -> CadResult<String> {
        match self {
            Self::Text(s) => Ok(s),
            _ => Err(unavailable(index, property)),
        }
    }

    /// Converts into an integer, or reports the property as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has a different type.
    pub fn into_int(self, index: usize, property: EntityProperty) -> CadResult<i32> {
        match self {
            Self::Int(v) => Ok(v),
            _ => Err(unavailable(index, property)),
        }
    }

    /// Converts into a real number, or reports the property as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has a different type.
    pub fn into_real(self, index: usize, property: EntityProperty) -> CadResult<f64> {
        match self {
            Self::Real(v) => Ok(v),
            Self::Int(v) => Ok(f64::from(v)),
            _ => Err(unavailable(index, property)),
        }
    }

    /// Converts into a boolean, or reports the property as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has a different type.
    pub fn into_bool(self, index: usize, property: EntityProperty) -> CadResult<bool> {
        match self {
            Self::Bool(v) => Ok(v),
            _ => Err(unavailable(index, property)),
        }
    }

    /// Converts into a point, or reports the property as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has a different type.
    pub fn into_point(self, index: usize, property: EntityProperty) -> CadResult<Point3> {
        match self {
            Self::Point(p) => Ok(p),
            _ => Err(unavailable(index, property)),
        }
    }
}

const fn unavailable(index: usize, property: EntityProperty) -> CadError {
    CadError::PropertyUnavailable {
        index,
        property: property.name(),
    }
}

/// A live session with the host application's active document.
///
/// Every method maps to a single call into the automation object model.
/// Implementations report host failures as [`CadError::Automation`], marking
/// them retryable when the host was merely busy.
pub trait Automation {
    /// Reads the document name. Used as the connection health check.
    ///
    /// # Errors
    ///
    /// Returns an error if the document no longer answers.
    fn document_name(&self) -> CadResult<String>;

    /// Reads the document path (`None` for a drawing that was never saved).
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be read.
    fn document_path(&self) -> CadResult<Option<String>>;

    /// Reads whether the document has unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be read.
    fn is_saved(&self) -> CadResult<bool>;

    /// Reads the name of the active layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be read.
    fn active_layer(&self) -> CadResult<String>;

    /// Makes the named layer active.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::LayerNotFound`] if the layer does not exist.
    fn set_active_layer(&mut self, name: &str) -> CadResult<()>;

    /// Returns the number of layers in the layer table.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer table cannot be read.
    fn layer_count(&self) -> CadResult<usize>;

    /// Reads the layer at `index` in the layer table.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be read.
    fn layer_at(&self, index: usize) -> CadResult<LayerInfo>;

    /// Looks a layer up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer table cannot be queried.
    fn find_layer(&self, name: &str) -> CadResult<Option<LayerInfo>>;

    /// Adds a layer with the given color.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the layer.
    fn add_layer(&mut self, name: &str, color: i32) -> CadResult<()>;

    /// Sets a layer's description. Not every host version supports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be written.
    fn set_layer_description(&mut self, name: &str, description: &str) -> CadResult<()>;

    /// Returns the number of entities in model space.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    fn entity_count(&self) -> CadResult<usize>;

    /// Reads one property of the entity at `index` in model space.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity or the property is not readable.
    fn entity_property(&self, index: usize, property: EntityProperty) -> CadResult<PropertyValue>;

    /// Adds a line to model space and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the call.
    fn add_line(&mut self, start: Point3, end: Point3) -> CadResult<Handle>;

    /// Adds a circle to model space and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the call.
    fn add_circle(&mut self, center: Point3, radius: f64) -> CadResult<Handle>;

    /// Adds an arc to model space and returns its handle. Angles are radians.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the call.
    fn add_arc(
        &mut self,
        center: Point3,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    ) -> CadResult<Handle>;

    /// Adds single-line text to model space and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the call.
    fn add_text(&mut self, text: &str, position: Point3, height: f64) -> CadResult<Handle>;

    /// Sets the color of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is gone or the host rejects the value.
    fn set_entity_color(&mut self, handle: &str, color: i32) -> CadResult<()>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is gone or cannot be erased.
    fn delete_entity(&mut self, handle: &str) -> CadResult<()>;

    /// Regenerates the active viewport.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is busy.
    fn regen(&mut self) -> CadResult<()>;

    /// Zooms the active viewport to the drawing extents.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is busy.
    fn zoom_extents(&mut self) -> CadResult<()>;

    /// Undoes the most recent operation.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to undo or the host is busy.
    fn undo(&mut self) -> CadResult<()>;
}

/// Produces automation sessions.
pub trait Connector {
    /// Attaches to the running application's active document.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if no application is reachable.
    fn connect(&self) -> CadResult<Box<dyn Automation>>;
}

/// A connector for builds without a reachable host application.
///
/// Every connection attempt fails, so each tool reports that it is not
/// connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedConnector;

impl Connector for DetachedConnector {
    fn connect(&self) -> CadResult<Box<dyn Automation>> {
        Err(CadError::not_connected(
            "no automation host is configured for this server",
        ))
    }
}
