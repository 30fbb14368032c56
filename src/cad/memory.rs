//! In-process drawing that satisfies the [`Automation`] contract.
//!
//! [`MemoryHost`] stands in for the running application: it owns one drawing
//! (layer table, active layer, model-space entities, undo history) and hands
//! out [`MemorySession`]s through [`MemoryConnector`]. It records primitives
//! and their attributes only; there is no geometry kernel behind it.
//!
//! It is used by the test-suite and for dry runs of tool scripts. Faults can
//! be injected per host call ([`MemoryHost::fail_next`]) or per entity
//! property ([`MemoryHost::fail_property`]), and the application can be
//! "crashed" and restarted to exercise reconnection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cad::color::BYLAYER;
use crate::cad::error::{CadError, CadResult};
use crate::cad::geometry::Point3;
use crate::cad::host::{
    Automation, Connector, EntityProperty, Handle, LayerInfo, PropertyValue, ARC_TYPE,
    CIRCLE_TYPE, LINE_TYPE, TEXT_TYPE,
};
use crate::cad::layers::DEFAULT_LAYER;

/// First handle issued to a new entity.
const FIRST_HANDLE: u64 = 0x2A;

/// Host calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    /// `ModelSpace.AddLine`.
    AddLine,
    /// `ModelSpace.AddCircle`.
    AddCircle,
    /// `ModelSpace.AddArc`.
    AddArc,
    /// `ModelSpace.AddText`.
    AddText,
    /// `Layers.Add`.
    AddLayer,
    /// `Layer.Description`.
    SetLayerDescription,
    /// `Document.ActiveLayer`.
    SetActiveLayer,
    /// `Entity.Color`.
    SetEntityColor,
    /// `Entity.Delete`.
    DeleteEntity,
    /// `Document.Regen`.
    Regen,
    /// `Application.ZoomExtents`.
    ZoomExtents,
    /// Undo.
    Undo,
}

impl HostOp {
    /// Returns the host-side name of the call.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddLine => "AddLine",
            Self::AddCircle => "AddCircle",
            Self::AddArc => "AddArc",
            Self::AddText => "AddText",
            Self::AddLayer => "Layers.Add",
            Self::SetLayerDescription => "Layer.Description",
            Self::SetActiveLayer => "ActiveLayer",
            Self::SetEntityColor => "Color",
            Self::DeleteEntity => "Delete",
            Self::Regen => "Regen",
            Self::ZoomExtents => "ZoomExtents",
            Self::Undo => "Undo",
        }
    }
}

/// Geometry of an entity held by the in-process drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryGeometry {
    /// A line.
    Line {
        /// Start point.
        start: Point3,
        /// End point.
        end: Point3,
    },
    /// A circle.
    Circle {
        /// Center point.
        center: Point3,
        /// Radius.
        radius: f64,
    },
    /// An arc with angles in radians.
    Arc {
        /// Center point.
        center: Point3,
        /// Radius.
        radius: f64,
        /// Start angle in radians.
        start_angle: f64,
        /// End angle in radians.
        end_angle: f64,
    },
    /// Single-line text.
    Text {
        /// Insertion point.
        position: Point3,
        /// Content.
        content: String,
        /// Height.
        height: f64,
    },
}

impl MemoryGeometry {
    /// Returns the entity type name.
    #[must_use]
    pub const fn object_name(&self) -> &'static str {
        match self {
            Self::Line { .. } => LINE_TYPE,
            Self::Circle { .. } => CIRCLE_TYPE,
            Self::Arc { .. } => ARC_TYPE,
            Self::Text { .. } => TEXT_TYPE,
        }
    }
}

/// An entity in the in-process drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntity {
    /// Entity handle.
    pub handle: Handle,
    /// Layer the entity was created on.
    pub layer: String,
    /// Color (ACI). New entities are `BYLAYER`.
    pub color: i32,
    /// Visibility.
    pub visible: bool,
    /// Geometry.
    pub geometry: MemoryGeometry,
}

/// A layer in the in-process drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayer {
    /// Layer name.
    pub name: String,
    /// Color (ACI).
    pub color: i32,
    /// Description, if one was set.
    pub description: Option<String>,
    /// Whether the layer is frozen.
    pub frozen: bool,
    /// Whether the layer is locked.
    pub locked: bool,
}

impl MemoryLayer {
    fn new(name: impl Into<String>, color: i32) -> Self {
        Self {
            name: name.into(),
            color,
            description: None,
            frozen: false,
            locked: false,
        }
    }

    fn info(&self) -> LayerInfo {
        LayerInfo {
            name: self.name.clone(),
            color: self.color,
            frozen: self.frozen,
            locked: self.locked,
        }
    }
}

/// How to reverse one mutation.
#[derive(Debug, Clone)]
enum Inverse {
    RemoveEntity(Handle),
    RestoreEntity { position: usize, entity: MemoryEntity },
    Recolor { handle: Handle, color: i32 },
    DropLayer(String),
}

#[derive(Debug)]
struct DrawingState {
    name: String,
    path: Option<String>,
    saved: bool,
    layers: Vec<MemoryLayer>,
    active_layer: String,
    entities: Vec<MemoryEntity>,
    next_handle: u64,
    history: Vec<Inverse>,
    online: bool,
    generation: u64,
    connects: usize,
    regens: usize,
    zooms: usize,
    faults: HashMap<HostOp, usize>,
    failing_properties: HashSet<EntityProperty>,
}

impl DrawingState {
    fn new() -> Self {
        Self {
            name: "Drawing1.dwg".to_string(),
            path: None,
            saved: true,
            layers: vec![MemoryLayer::new(DEFAULT_LAYER, 7)],
            active_layer: DEFAULT_LAYER.to_string(),
            entities: Vec::new(),
            next_handle: FIRST_HANDLE,
            history: Vec::new(),
            online: true,
            generation: 0,
            connects: 0,
            regens: 0,
            zooms: 0,
            faults: HashMap::new(),
            failing_properties: HashSet::new(),
        }
    }

    fn take_fault(&mut self, op: HostOp) -> CadResult<()> {
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(CadError::transient(op.name(), "call was rejected by callee"))
            }
            _ => Ok(()),
        }
    }

    fn record(&mut self, inverse: Inverse) {
        self.history.push(inverse);
        self.saved = false;
    }

    fn revert(&mut self, inverse: Inverse) {
        match inverse {
            Inverse::RemoveEntity(handle) => self.entities.retain(|e| e.handle != handle),
            Inverse::RestoreEntity { position, entity } => {
                let position = position.min(self.entities.len());
                self.entities.insert(position, entity);
            }
            Inverse::Recolor { handle, color } => {
                if let Some(entity) = self.entities.iter_mut().find(|e| e.handle == handle) {
                    entity.color = color;
                }
            }
            Inverse::DropLayer(name) => {
                self.layers.retain(|l| l.name != name);
                if self.active_layer == name {
                    self.active_layer = DEFAULT_LAYER.to_string();
                }
            }
        }
    }

    fn add_entity(&mut self, op: HostOp, geometry: MemoryGeometry) -> CadResult<Handle> {
        self.take_fault(op)?;

        let handle = format!("{:X}", self.next_handle);
        self.next_handle += 1;
        self.record(Inverse::RemoveEntity(handle.clone()));
        self.entities.push(MemoryEntity {
            handle: handle.clone(),
            layer: self.active_layer.clone(),
            color: BYLAYER,
            visible: true,
            geometry,
        });
        Ok(handle)
    }

    fn entity_mut(&mut self, handle: &str) -> CadResult<&mut MemoryEntity> {
        self.entities
            .iter_mut()
            .find(|e| e.handle == handle)
            .ok_or_else(|| CadError::entity_not_found(handle))
    }
}

/// The in-process application with its single open drawing.
///
/// Cloning yields another handle to the same drawing.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<DrawingState>>,
}

impl MemoryHost {
    /// Creates an application with an empty drawing holding only layer `0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DrawingState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DrawingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a session on the drawing, as a successful connect would.
    #[must_use]
    pub fn session(&self) -> MemorySession {
        let mut state = self.state();
        state.connects += 1;
        MemorySession {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }
    }

    /// Makes the next `times` calls of `op` fail with a retryable error.
    pub fn fail_next(&self, op: HostOp, times: usize) {
        *self.state().faults.entry(op).or_insert(0) += times;
    }

    /// Makes every read of `property` fail.
    pub fn fail_property(&self, property: EntityProperty) {
        self.state().failing_properties.insert(property);
    }

    /// Stops the application. Existing sessions stop answering and new
    /// connections are refused until [`Self::restart`].
    pub fn crash(&self) {
        let mut state = self.state();
        state.online = false;
        state.generation += 1;
    }

    /// Starts the application again with the same drawing.
    pub fn restart(&self) {
        self.state().online = true;
    }

    /// Returns a copy of the model-space entities.
    #[must_use]
    pub fn entities(&self) -> Vec<MemoryEntity> {
        self.state().entities.clone()
    }

    /// Returns a copy of the layer table.
    #[must_use]
    pub fn layers(&self) -> Vec<MemoryLayer> {
        self.state().layers.clone()
    }

    /// Returns the name of the active layer.
    #[must_use]
    pub fn active_layer_name(&self) -> String {
        self.state().active_layer.clone()
    }

    /// Returns how many sessions have been opened.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Returns how many regenerations were requested.
    #[must_use]
    pub fn regen_count(&self) -> usize {
        self.state().regens
    }

    /// Returns how many zoom-extents calls were made.
    #[must_use]
    pub fn zoom_count(&self) -> usize {
        self.state().zooms
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// A session on a [`MemoryHost`] drawing.
///
/// A session stops answering once the host crashes, even after a restart;
/// a new session must be opened.
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<DrawingState>>,
    generation: u64,
}

impl MemorySession {
    fn live(&self) -> CadResult<MutexGuard<'_, DrawingState>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.online || state.generation != self.generation {
            return Err(CadError::not_connected("the application is no longer running"));
        }
        Ok(state)
    }
}

impl Automation for MemorySession {
    fn document_name(&self) -> CadResult<String> {
        Ok(self.live()?.name.clone())
    }

    fn document_path(&self) -> CadResult<Option<String>> {
        Ok(self.live()?.path.clone())
    }

    fn is_saved(&self) -> CadResult<bool> {
        Ok(self.live()?.saved)
    }

    fn active_layer(&self) -> CadResult<String> {
        Ok(self.live()?.active_layer.clone())
    }

    fn set_active_layer(&mut self, name: &str) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::SetActiveLayer)?;
        if !state.layers.iter().any(|l| l.name == name) {
            return Err(CadError::layer_not_found(name));
        }
        state.active_layer = name.to_string();
        Ok(())
    }

    fn layer_count(&self) -> CadResult<usize> {
        Ok(self.live()?.layers.len())
    }

    fn layer_at(&self, index: usize) -> CadResult<LayerInfo> {
        self.live()?
            .layers
            .get(index)
            .map(MemoryLayer::info)
            .ok_or_else(|| CadError::rejected("Layers.Item", format!("index {index} out of range")))
    }

    fn find_layer(&self, name: &str) -> CadResult<Option<LayerInfo>> {
        Ok(self
            .live()?
            .layers
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(MemoryLayer::info))
    }

    fn add_layer(&mut self, name: &str, color: i32) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::AddLayer)?;
        if name.trim().is_empty() {
            return Err(CadError::rejected("Layers.Add", "layer name is empty"));
        }
        if state.layers.iter().any(|l| l.name.eq_ignore_ascii_case(name)) {
            return Err(CadError::rejected("Layers.Add", "duplicate layer name"));
        }
        state.record(Inverse::DropLayer(name.to_string()));
        state.layers.push(MemoryLayer::new(name, color));
        Ok(())
    }

    fn set_layer_description(&mut self, name: &str, description: &str) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::SetLayerDescription)?;
        let layer = state
            .layers
            .iter_mut()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CadError::layer_not_found(name))?;
        layer.description = Some(description.to_string());
        Ok(())
    }

    fn entity_count(&self) -> CadResult<usize> {
        Ok(self.live()?.entities.len())
    }

    fn entity_property(&self, index: usize, property: EntityProperty) -> CadResult<PropertyValue> {
        let state = self.live()?;
        let entity = state.entities.get(index).ok_or_else(|| {
            CadError::rejected("ModelSpace.Item", format!("index {index} out of range"))
        })?;

        if state.failing_properties.contains(&property) {
            return Err(CadError::transient(
                property.name(),
                "property read was rejected by callee",
            ));
        }

        let unavailable = || CadError::PropertyUnavailable {
            index,
            property: property.name(),
        };

        let value = match (property, &entity.geometry) {
            (EntityProperty::ObjectName, geometry) => {
                PropertyValue::Text(geometry.object_name().to_string())
            }
            (EntityProperty::Layer, _) => PropertyValue::Text(entity.layer.clone()),
            (EntityProperty::Handle, _) => PropertyValue::Text(entity.handle.clone()),
            (EntityProperty::Color, _) => PropertyValue::Int(entity.color),
            (EntityProperty::Visible, _) => PropertyValue::Bool(entity.visible),
            (EntityProperty::StartPoint, MemoryGeometry::Line { start, .. }) => {
                PropertyValue::Point(*start)
            }
            (EntityProperty::EndPoint, MemoryGeometry::Line { end, .. }) => {
                PropertyValue::Point(*end)
            }
            (
                EntityProperty::Center,
                MemoryGeometry::Circle { center, .. } | MemoryGeometry::Arc { center, .. },
            ) => PropertyValue::Point(*center),
            (
                EntityProperty::Radius,
                MemoryGeometry::Circle { radius, .. } | MemoryGeometry::Arc { radius, .. },
            ) => PropertyValue::Real(*radius),
            (EntityProperty::InsertionPoint, MemoryGeometry::Text { position, .. }) => {
                PropertyValue::Point(*position)
            }
            (EntityProperty::TextString, MemoryGeometry::Text { content, .. }) => {
                PropertyValue::Text(content.clone())
            }
            (EntityProperty::Height, MemoryGeometry::Text { height, .. }) => {
                PropertyValue::Real(*height)
            }
            _ => return Err(unavailable()),
        };
        Ok(value)
    }

    fn add_line(&mut self, start: Point3, end: Point3) -> CadResult<Handle> {
        self.live()?
            .add_entity(HostOp::AddLine, MemoryGeometry::Line { start, end })
    }

    fn add_circle(&mut self, center: Point3, radius: f64) -> CadResult<Handle> {
        let mut state = self.live()?;
        if radius <= 0.0 {
            return Err(CadError::rejected("AddCircle", "radius must be positive"));
        }
        state.add_entity(HostOp::AddCircle, MemoryGeometry::Circle { center, radius })
    }

    fn add_arc(
        &mut self,
        center: Point3,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    ) -> CadResult<Handle> {
        let mut state = self.live()?;
        if radius <= 0.0 {
            return Err(CadError::rejected("AddArc", "radius must be positive"));
        }
        state.add_entity(
            HostOp::AddArc,
            MemoryGeometry::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            },
        )
    }

    fn add_text(&mut self, text: &str, position: Point3, height: f64) -> CadResult<Handle> {
        let mut state = self.live()?;
        if height <= 0.0 {
            return Err(CadError::rejected("AddText", "height must be positive"));
        }
        state.add_entity(
            HostOp::AddText,
            MemoryGeometry::Text {
                position,
                content: text.to_string(),
                height,
            },
        )
    }

    fn set_entity_color(&mut self, handle: &str, color: i32) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::SetEntityColor)?;
        if !(0..=BYLAYER).contains(&color) {
            return Err(CadError::rejected("Color", format!("{color} is not a valid ACI")));
        }
        let entity = state.entity_mut(handle)?;
        let previous = std::mem::replace(&mut entity.color, color);
        state.record(Inverse::Recolor {
            handle: handle.to_string(),
            color: previous,
        });
        Ok(())
    }

    fn delete_entity(&mut self, handle: &str) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::DeleteEntity)?;
        let position = state
            .entities
            .iter()
            .position(|e| e.handle == handle)
            .ok_or_else(|| CadError::entity_not_found(handle))?;
        let entity = state.entities.remove(position);
        state.record(Inverse::RestoreEntity { position, entity });
        Ok(())
    }

    fn regen(&mut self) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::Regen)?;
        state.regens += 1;
        Ok(())
    }

    fn zoom_extents(&mut self) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::ZoomExtents)?;
        state.zooms += 1;
        Ok(())
    }

    fn undo(&mut self) -> CadResult<()> {
        let mut state = self.live()?;
        state.take_fault(HostOp::Undo)?;
        let inverse = state
            .history
            .pop()
            .ok_or_else(|| CadError::rejected("Undo", "nothing to undo"))?;
        state.revert(inverse);
        Ok(())
    }
}

/// Connects to a [`MemoryHost`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    host: MemoryHost,
}

impl MemoryConnector {
    /// Creates a connector for the given host.
    #[must_use]
    pub const fn new(host: MemoryHost) -> Self {
        Self { host }
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> CadResult<Box<dyn Automation>> {
        if !self.host.state().online {
            return Err(CadError::not_connected("the application is not running"));
        }
        Ok(Box::new(self.host.session()))
    }
}
