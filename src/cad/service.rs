//! The drawing service: one coordinator that owns the host session and
//! implements every drawing operation exposed as a tool.
//!
//! Each operation first makes sure a live session exists (health check, then at most
//! one reconnect). Host failures are returned as [`CadError`]s; multi-step
//! operations return reports that distinguish complete, partial and failed
//! outcomes instead of rolling back.

use serde::Serialize;

use crate::cad::color::{ColorSpec, BYLAYER, DEFAULT_COLOR_INDEX};
use crate::cad::draw::{self, CreationReport};
use crate::cad::entities::{self, DeletionReport, EntityFilter, EntityListing, ScanPacing};
use crate::cad::error::{CadError, CadResult};
use crate::cad::executor::Executor;
use crate::cad::geometry::{self, Point3, Primitive, Shape, Stroke};
use crate::cad::host::{Automation, Connector, LayerInfo};
use crate::cad::layers::{self, ActiveLayerScope, ANNOTATION_LAYER};
use crate::cad::session::Session;

/// Summary of the active drawing.
///
/// Fields that cannot be read keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawingInfo {
    /// Document name.
    pub filename: String,
    /// Full path, or `"Not saved"` for a new drawing.
    pub path: String,
    /// Number of model-space entities.
    pub entity_count: usize,
    /// Whether there are no unsaved changes.
    pub saved: bool,
    /// Active layer name.
    pub current_layer: String,
    /// Number of layers.
    pub total_layers: usize,
    /// Every layer with its color and state.
    pub available_layers: Vec<LayerInfo>,
}

impl Default for DrawingInfo {
    fn default() -> Self {
        Self {
            filename: "Unknown".to_string(),
            path: "Unknown".to_string(),
            entity_count: 0,
            saved: false,
            current_layer: "Unknown".to_string(),
            total_layers: 0,
            available_layers: Vec::new(),
        }
    }
}

/// A request to create a building structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRequest {
    /// Free-text structure type, used for layer classification.
    pub structure_type: String,
    /// Shape to draw.
    pub shape: Shape,
    /// Explicit color. Defaults to the layer's predefined color.
    pub color: Option<ColorSpec>,
    /// Simulated stroke thickness.
    pub thickness: f64,
    /// Layer to use instead of the classified one.
    pub custom_layer: Option<String>,
    /// Text placed next to the structure on the annotation layer.
    pub label: Option<String>,
}

/// Outcome of a structure creation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureOutcome {
    /// Layer the structure was drawn on.
    pub layer: String,
    /// Color applied to the structure.
    pub color: ColorSpec,
    /// Created and failed primitives, label included.
    pub report: CreationReport,
    /// Whether the label was created.
    pub labelled: bool,
    /// Layer switching problems. The structure may be on another layer.
    pub warnings: Vec<String>,
}

/// Coordinates all drawing operations against one host session.
#[derive(Debug)]
pub struct DrawingService {
    session: Session,
    exec: Executor,
    pacing: ScanPacing,
}

impl DrawingService {
    /// Creates a service that connects through `connector` on first use.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>, exec: Executor, pacing: ScanPacing) -> Self {
        Self {
            session: Session::new(connector),
            exec,
            pacing,
        }
    }

    /// Returns `true` if a live session is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    fn host(&mut self) -> CadResult<&mut dyn Automation> {
        self.session.ensure_connected(&self.exec)
    }

    // ==================== Queries ====================

    /// Reads the drawing summary.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn drawing_info(&mut self) -> CadResult<DrawingInfo> {
        let host = self.host()?;
        let mut info = DrawingInfo::default();

        if let Ok(name) = host.document_name() {
            info.filename = name;
        }
        if let Ok(path) = host.document_path() {
            info.path = path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "Not saved".to_string());
        }
        if let Ok(saved) = host.is_saved() {
            info.saved = saved;
        }
        if let Ok(layer) = host.active_layer() {
            info.current_layer = layer;
        }
        if let Ok(count) = host.entity_count() {
            info.entity_count = count;
        }
        if let Ok(count) = host.layer_count() {
            info.total_layers = count;
            info.available_layers = (0..count)
                .filter_map(|index| host.layer_at(index).ok())
                .collect();
        }

        Ok(info)
    }

    /// Lists model-space entities, grouped by layer.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn entities(&mut self, max_entities: Option<usize>) -> CadResult<EntityListing> {
        let pacing = self.pacing;
        let exec = self.exec;
        let host = self.host()?;
        Ok(entities::scan(host, &exec, max_entities, &pacing).into())
    }

    // ==================== Layers ====================

    /// Creates a layer unless it exists. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unreachable or rejects the layer.
    pub fn create_or_get_layer(
        &mut self,
        name: &str,
        color: &ColorSpec,
        description: &str,
    ) -> CadResult<bool> {
        let exec = self.exec;
        let host = self.host()?;
        layers::ensure_layer(host, &exec, name, color, description)
    }

    /// Makes a layer active.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unreachable or the layer is unknown.
    pub fn set_current_layer(&mut self, name: &str) -> CadResult<()> {
        let exec = self.exec;
        let host = self.host()?;
        layers::set_active_layer(host, &exec, name)
    }

    // ==================== Creation ====================

    /// Draws a shape on the active layer.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn create_shape(
        &mut self,
        shape: &Shape,
        color: &ColorSpec,
        thickness: f64,
    ) -> CadResult<CreationReport> {
        let exec = self.exec;
        let host = self.host()?;
        let report = draw::draw_strokes(host, &exec, &shape.strokes(thickness), color.resolve());
        tracing::info!(
            shape = shape.kind(),
            created = report.created.len(),
            failed = report.failed.len(),
            "Drew shape"
        );
        Ok(report)
    }

    /// Places single-line text on the active layer.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn create_text(
        &mut self,
        position: Point3,
        text: &str,
        height: f64,
        color: &ColorSpec,
    ) -> CadResult<CreationReport> {
        let exec = self.exec;
        let host = self.host()?;
        let stroke = Stroke::single(Primitive::Text {
            position,
            content: text.to_string(),
            height,
        });
        Ok(draw::draw_strokes(host, &exec, &[stroke], color.resolve()))
    }

    /// Draws a building structure on its layer, with an optional label.
    ///
    /// The target layer is the custom layer (created if needed) or the one
    /// the structure type classifies to. It is active only while the
    /// structure is drawn. The label goes on the annotation layer and is only
    /// added when part of the structure was created.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn create_structure(&mut self, request: &StructureRequest) -> CadResult<StructureOutcome> {
        let exec = self.exec;
        let host = self.host()?;
        let mut warnings = Vec::new();

        let layer = match request.custom_layer.as_deref().filter(|l| !l.is_empty()) {
            Some(custom) => {
                let color = request.color.clone().unwrap_or_default();
                let description = format!("Custom layer for {}", request.structure_type);
                if let Err(e) = layers::ensure_layer(host, &exec, custom, &color, &description) {
                    tracing::warn!(layer = custom, error = %e, "Could not create custom layer");
                    warnings.push(format!("could not create layer {custom}: {e}"));
                }
                custom.to_string()
            }
            None => layers::classify(&request.structure_type).to_string(),
        };

        let color = request.color.clone().unwrap_or_else(|| {
            layers::definition_for_layer(&layer).map_or_else(
                || ColorSpec::Index(BYLAYER),
                |def| ColorSpec::named(def.color),
            )
        });

        let scope = ActiveLayerScope::enter(host, &exec, &layer, &mut warnings);
        let mut report = draw::draw_strokes(
            host,
            &exec,
            &request.shape.strokes(request.thickness),
            color.resolve(),
        );

        let mut labelled = false;
        if let Some(text) = request.label.as_deref().filter(|t| !t.is_empty()) {
            if report.succeeded() {
                let label = Stroke::single(geometry::label(request.shape.label_anchor(), text));
                let label_scope = ActiveLayerScope::enter(host, &exec, ANNOTATION_LAYER, &mut warnings);
                let label_report = draw::draw_strokes(host, &exec, &[label], DEFAULT_COLOR_INDEX);
                label_scope.restore(host, &exec, &mut warnings);
                labelled = label_report.succeeded();
                report.merge(label_report);
            }
        }

        scope.restore(host, &exec, &mut warnings);

        tracing::info!(
            structure = %request.structure_type,
            layer = %layer,
            created = report.created.len(),
            failed = report.failed.len(),
            "Created structure"
        );

        Ok(StructureOutcome {
            layer,
            color,
            report,
            labelled,
            warnings,
        })
    }

    // ==================== Deletion ====================

    /// Deletes one entity by handle.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::EntityNotFound`] if no entity has the handle, or the
    /// host error if the deletion is rejected.
    pub fn delete_entity(&mut self, handle: &str) -> CadResult<()> {
        let exec = self.exec;
        let host = self.host()?;
        entities::find(host, handle)?;
        exec.run("Delete", || host.delete_entity(handle))?;
        draw::regen(host, &exec);
        tracing::info!(handle, "Deleted entity");
        Ok(())
    }

    /// Deletes every entity the filter selects.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host is unreachable.
    pub fn delete_matching(&mut self, filter: &EntityFilter) -> CadResult<DeletionReport> {
        let exec = self.exec;
        let pacing = self.pacing;
        let host = self.host()?;
        Ok(entities::delete_matching(host, &exec, &pacing, filter))
    }

    /// Deletes every entity in model space, only when `confirm` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::InvalidParameter`] without touching the drawing when
    /// `confirm` is false.
    pub fn delete_all(&mut self, confirm: bool) -> CadResult<DeletionReport> {
        if !confirm {
            return Err(CadError::invalid_parameter(
                "confirm",
                "Deleting all entities requires confirm=true",
            ));
        }
        self.delete_matching(&EntityFilter::All)
    }

    // ==================== Editing and view ====================

    /// Undoes the last operation in the drawing.
    ///
    /// # Errors
    ///
    /// Returns the host error if there is nothing to undo.
    pub fn undo(&mut self) -> CadResult<()> {
        let exec = self.exec;
        let host = self.host()?;
        exec.run("Undo", || host.undo())?;
        draw::regen(host, &exec);
        Ok(())
    }

    /// Changes the color of one entity. Returns the applied color index.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::EntityNotFound`] if no entity has the handle, or the
    /// host error if the color is rejected.
    pub fn change_entity_color(&mut self, handle: &str, color: &ColorSpec) -> CadResult<i32> {
        let exec = self.exec;
        let host = self.host()?;
        entities::find(host, handle)?;
        let index = color.resolve();
        exec.run("Color", || host.set_entity_color(handle, index))?;
        draw::regen(host, &exec);
        Ok(index)
    }

    /// Zooms to the drawing extents.
    ///
    /// # Errors
    ///
    /// Returns the host error if the view cannot be changed.
    pub fn zoom_extents(&mut self) -> CadResult<()> {
        let exec = self.exec;
        let host = self.host()?;
        exec.run("ZoomExtents", || host.zoom_extents())
    }
}
