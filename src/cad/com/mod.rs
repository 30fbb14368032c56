//! Automation over the host application's COM object model.
//!
//! [`ComSession`] maps every [`Automation`] call onto the late-bound object
//! model (`Application`, `ActiveDocument`, `Layers`, `ModelSpace`, entity
//! objects). It is written against the small [`Dispatch`] trait so the
//! mapping is the same whatever implements the calls. On Windows,
//! [`ComConnector`] supplies objects backed by `IDispatch`.
//!
//! ```text
//! Application ── ActiveDocument ─┬─ Layers ── Item(name | index)
//!      │                         ├─ ModelSpace ── Item(index), AddLine, ...
//!      └─ ZoomExtents()          └─ HandleToObject(handle), Regen, SendCommand
//! ```

#[cfg(windows)]
mod dispatch;

#[cfg(windows)]
pub use dispatch::{ComConnector, ComObject};

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::cad::error::{CadError, CadResult};
use crate::cad::geometry::Point3;
use crate::cad::host::{Automation, EntityProperty, Handle, LayerInfo, PropertyValue};

/// Programmatic identifier of the host application.
pub const DEFAULT_PROG_ID: &str = "AutoCAD.Application";

/// `acActiveViewport`, the argument of `Document.Regen`.
pub const ACTIVE_VIEWPORT: i32 = 0;

/// Command line that undoes the last operation.
pub const UNDO_COMMAND: &str = "_U ";

/// A value crossing the late-bound interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant<O> {
    /// No value (`VT_EMPTY`).
    Empty,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i32),
    /// Double.
    Real(f64),
    /// String.
    Text(String),
    /// Three doubles, the object model's point representation.
    Point(Point3),
    /// Another automation object.
    Object(O),
}

impl<O> Variant<O> {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Real(_) => "double",
            Self::Text(_) => "string",
            Self::Point(_) => "point",
            Self::Object(_) => "object",
        }
    }

    fn unexpected(&self, member: &str, expected: &str) -> CadError {
        CadError::rejected(member, format!("expected {expected}, got {}", self.kind()))
    }

    fn into_object(self, member: &str) -> CadResult<O> {
        match self {
            Self::Object(object) => Ok(object),
            other => Err(other.unexpected(member, "an object")),
        }
    }

    fn into_text(self, member: &str) -> CadResult<String> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(other.unexpected(member, "a string")),
        }
    }

    fn into_int(self, member: &str) -> CadResult<i32> {
        match self {
            Self::Int(value) => Ok(value),
            other => Err(other.unexpected(member, "an integer")),
        }
    }

    fn into_bool(self, member: &str) -> CadResult<bool> {
        match self {
            Self::Bool(value) => Ok(value),
            Self::Int(value) => Ok(value != 0),
            other => Err(other.unexpected(member, "a boolean")),
        }
    }

    fn into_count(self, member: &str) -> CadResult<usize> {
        let count = self.into_int(member)?;
        usize::try_from(count)
            .map_err(|_| CadError::rejected(member, format!("negative count {count}")))
    }
}

/// Late-bound access to one automation object.
///
/// Member names are the object model's property and method names. Failures
/// are [`CadError::Automation`], retryable when the host was busy.
pub trait Dispatch: Sized {
    /// Reads a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is unknown or the host refuses the read.
    fn get(&self, member: &str) -> CadResult<Variant<Self>>;

    /// Writes a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is unknown or the host refuses the value.
    fn put(&self, member: &str, value: Variant<Self>) -> CadResult<()>;

    /// Calls a method with positional arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is unknown or the call fails.
    fn call(&self, member: &str, args: Vec<Variant<Self>>) -> CadResult<Variant<Self>>;
}

/// A session with one document of the host application.
pub struct ComSession<D> {
    application: D,
    document: D,
}

impl<D: Dispatch> ComSession<D> {
    /// Attaches to the application's active document and brings the
    /// application to the foreground.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if there is no active document or it
    /// does not answer.
    pub fn attach(application: D) -> CadResult<Self> {
        show(&application);
        let document = application
            .get("ActiveDocument")
            .and_then(|v| v.into_object("ActiveDocument"))
            .map_err(|e| CadError::not_connected(format!("no active document: {e}")))?;
        Self::checked(application, document)
    }

    /// Opens a new document in a freshly started application, after giving
    /// the application `startup` to initialise.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if no document can be added.
    pub fn launch(application: D, startup: Duration) -> CadResult<Self> {
        show(&application);
        if !startup.is_zero() {
            thread::sleep(startup);
        }
        let document = application
            .get("Documents")
            .and_then(|v| v.into_object("Documents"))
            .and_then(|documents| documents.call("Add", Vec::new()))
            .and_then(|v| v.into_object("Documents.Add"))
            .map_err(|e| CadError::not_connected(format!("cannot add a document: {e}")))?;
        Self::checked(application, document)
    }

    fn checked(application: D, document: D) -> CadResult<Self> {
        let session = Self {
            application,
            document,
        };
        session
            .document_name()
            .map_err(|e| CadError::not_connected(format!("document does not answer: {e}")))?;
        Ok(session)
    }

    fn document_object(&self, member: &str) -> CadResult<D> {
        self.document.get(member)?.into_object(member)
    }

    fn layer(&self, name: &str) -> CadResult<D> {
        let layers = self.document_object("Layers")?;
        match layers.call("Item", vec![Variant::Text(name.to_string())]) {
            Ok(layer) => layer.into_object("Layers.Item"),
            Err(e) if e.is_retryable() => Err(e),
            Err(_) => Err(CadError::layer_not_found(name)),
        }
    }

    fn entity_at(&self, index: usize) -> CadResult<D> {
        let index = i32::try_from(index)
            .map_err(|_| CadError::rejected("ModelSpace.Item", "index out of range"))?;
        self.document_object("ModelSpace")?
            .call("Item", vec![Variant::Int(index)])?
            .into_object("ModelSpace.Item")
    }

    fn entity(&self, handle: &str) -> CadResult<D> {
        match self
            .document
            .call("HandleToObject", vec![Variant::Text(handle.to_string())])
        {
            Ok(entity) => entity.into_object("HandleToObject"),
            Err(e) if e.is_retryable() => Err(e),
            Err(_) => Err(CadError::entity_not_found(handle)),
        }
    }

    fn add(&self, method: &str, args: Vec<Variant<D>>) -> CadResult<Handle> {
        let entity = self
            .document_object("ModelSpace")?
            .call(method, args)?
            .into_object(method)?;
        entity.get("Handle")?.into_text("Handle")
    }
}

/// Makes the application window visible. Hosts that refuse still work.
fn show<D: Dispatch>(application: &D) {
    if let Err(e) = application.put("Visible", Variant::Bool(true)) {
        tracing::debug!(error = %e, "Could not make the host application visible");
    }
}

fn layer_info<D: Dispatch>(layer: &D) -> CadResult<LayerInfo> {
    Ok(LayerInfo {
        name: layer.get("Name")?.into_text("Name")?,
        color: layer.get("Color")?.into_int("Color")?,
        frozen: layer.get("Freeze")?.into_bool("Freeze")?,
        locked: layer.get("Lock")?.into_bool("Lock")?,
    })
}

impl<D: Dispatch> Automation for ComSession<D> {
    fn document_name(&self) -> CadResult<String> {
        self.document.get("Name")?.into_text("Name")
    }

    fn document_path(&self) -> CadResult<Option<String>> {
        let path = self.document.get("Path")?.into_text("Path")?;
        Ok(Some(path).filter(|p| !p.is_empty()))
    }

    fn is_saved(&self) -> CadResult<bool> {
        self.document.get("Saved")?.into_bool("Saved")
    }

    fn active_layer(&self) -> CadResult<String> {
        self.document_object("ActiveLayer")?
            .get("Name")?
            .into_text("Name")
    }

    fn set_active_layer(&mut self, name: &str) -> CadResult<()> {
        let layer = self.layer(name)?;
        self.document.put("ActiveLayer", Variant::Object(layer))
    }

    fn layer_count(&self) -> CadResult<usize> {
        self.document_object("Layers")?
            .get("Count")?
            .into_count("Layers.Count")
    }

    fn layer_at(&self, index: usize) -> CadResult<LayerInfo> {
        let index = i32::try_from(index)
            .map_err(|_| CadError::rejected("Layers.Item", "index out of range"))?;
        let layer = self
            .document_object("Layers")?
            .call("Item", vec![Variant::Int(index)])?
            .into_object("Layers.Item")?;
        layer_info(&layer)
    }

    fn find_layer(&self, name: &str) -> CadResult<Option<LayerInfo>> {
        match self.layer(name) {
            Ok(layer) => layer_info(&layer).map(Some),
            Err(CadError::LayerNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn add_layer(&mut self, name: &str, color: i32) -> CadResult<()> {
        let layer = self
            .document_object("Layers")?
            .call("Add", vec![Variant::Text(name.to_string())])?
            .into_object("Layers.Add")?;
        layer.put("Color", Variant::Int(color))
    }

    fn set_layer_description(&mut self, name: &str, description: &str) -> CadResult<()> {
        self.layer(name)?
            .put("Description", Variant::Text(description.to_string()))
    }

    fn entity_count(&self) -> CadResult<usize> {
        self.document_object("ModelSpace")?
            .get("Count")?
            .into_count("ModelSpace.Count")
    }

    fn entity_property(&self, index: usize, property: EntityProperty) -> CadResult<PropertyValue> {
        let value = self.entity_at(index)?.get(property.name())?;
        match value {
            Variant::Text(s) => Ok(PropertyValue::Text(s)),
            Variant::Int(v) => Ok(PropertyValue::Int(v)),
            Variant::Real(v) => Ok(PropertyValue::Real(v)),
            Variant::Bool(v) => Ok(PropertyValue::Bool(v)),
            Variant::Point(p) => Ok(PropertyValue::Point(p)),
            Variant::Empty | Variant::Object(_) => Err(CadError::PropertyUnavailable {
                index,
                property: property.name(),
            }),
        }
    }

    fn add_line(&mut self, start: Point3, end: Point3) -> CadResult<Handle> {
        self.add("AddLine", vec![Variant::Point(start), Variant::Point(end)])
    }

    fn add_circle(&mut self, center: Point3, radius: f64) -> CadResult<Handle> {
        self.add("AddCircle", vec![Variant::Point(center), Variant::Real(radius)])
    }

    fn add_arc(
        &mut self,
        center: Point3,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    ) -> CadResult<Handle> {
        self.add(
            "AddArc",
            vec![
                Variant::Point(center),
                Variant::Real(radius),
                Variant::Real(start_angle),
                Variant::Real(end_angle),
            ],
        )
    }

    fn add_text(&mut self, text: &str, position: Point3, height: f64) -> CadResult<Handle> {
        self.add(
            "AddText",
            vec![
                Variant::Text(text.to_string()),
                Variant::Point(position),
                Variant::Real(height),
            ],
        )
    }

    fn set_entity_color(&mut self, handle: &str, color: i32) -> CadResult<()> {
        self.entity(handle)?.put("Color", Variant::Int(color))
    }

    fn delete_entity(&mut self, handle: &str) -> CadResult<()> {
        self.entity(handle)?.call("Delete", Vec::new()).map(drop)
    }

    fn regen(&mut self) -> CadResult<()> {
        self.document
            .call("Regen", vec![Variant::Int(ACTIVE_VIEWPORT)])
            .map(drop)
    }

    fn zoom_extents(&mut self) -> CadResult<()> {
        self.application.call("ZoomExtents", Vec::new()).map(drop)
    }

    fn undo(&mut self) -> CadResult<()> {
        self.document
            .call("SendCommand", vec![Variant::Text(UNDO_COMMAND.to_string())])
            .map(drop)
    }
}

impl<D> fmt::Debug for ComSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComSession").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Model {
        documents: usize,
        visible: bool,
        path: String,
        layers: Vec<(String, i32, Option<String>)>,
        active_layer: String,
        entities: Vec<(String, &'static str, i32, Point3)>,
        calls: Vec<String>,
        busy: bool,
    }

    #[derive(Debug, Clone)]
    enum Node {
        Application,
        Documents,
        Document,
        Layers,
        Layer(String),
        ModelSpace,
        Entity(String),
    }

    /// An object in a scripted object model.
    #[derive(Debug, Clone)]
    struct Fake {
        node: Node,
        model: Rc<RefCell<Model>>,
    }

    impl Fake {
        fn application(model: &Rc<RefCell<Model>>) -> Self {
            Self {
                node: Node::Application,
                model: Rc::clone(model),
            }
        }

        fn child(&self, node: Node) -> Variant<Self> {
            Variant::Object(Self {
                node,
                model: Rc::clone(&self.model),
            })
        }

        fn missing(member: &str) -> CadError {
            CadError::rejected(member, "Unknown name")
        }
    }

    impl Dispatch for Fake {
        fn get(&self, member: &str) -> CadResult<Variant<Self>> {
            let model = self.model.borrow();
            if model.busy {
                return Err(CadError::transient(member, "Call was rejected by callee"));
            }
            Ok(match (&self.node, member) {
                (Node::Application, "ActiveDocument") if model.documents > 0 => {
                    self.child(Node::Document)
                }
                (Node::Application, "Documents") => self.child(Node::Documents),
                (Node::Document, "Name") => Variant::Text("Plan.dwg".to_string()),
                (Node::Document, "Path") => Variant::Text(model.path.clone()),
                (Node::Document, "Saved") => Variant::Bool(false),
                (Node::Document, "Layers") => self.child(Node::Layers),
                (Node::Document, "ModelSpace") => self.child(Node::ModelSpace),
                (Node::Document, "ActiveLayer") => {
                    self.child(Node::Layer(model.active_layer.clone()))
                }
                (Node::Layers, "Count") => Variant::Int(i32::try_from(model.layers.len()).unwrap()),
                (Node::ModelSpace, "Count") => Variant::Int(i32::try_from(model.entities.len()).unwrap()),
                (Node::Layer(name), "Name") => Variant::Text(name.clone()),
                (Node::Layer(name), "Color") => {
                    let layer = model.layers.iter().find(|l| l.0 == *name);
                    Variant::Int(layer.map_or(7, |l| l.1))
                }
                (Node::Layer(_), "Freeze" | "Lock") => Variant::Bool(false),
                (Node::Entity(handle), property) => {
                    let entity = model
                        .entities
                        .iter()
                        .find(|e| e.0 == *handle)
                        .ok_or_else(|| Self::missing(property))?;
                    match property {
                        "Handle" => Variant::Text(entity.0.clone()),
                        "ObjectName" => Variant::Text(entity.1.to_string()),
                        "Color" => Variant::Int(entity.2),
                        "StartPoint" => Variant::Point(entity.3),
                        _ => Variant::Empty,
                    }
                }
                _ => return Err(Self::missing(member)),
            })
        }

        fn put(&self, member: &str, value: Variant<Self>) -> CadResult<()> {
            let mut model = self.model.borrow_mut();
            match (&self.node, member, value) {
                (Node::Application, "Visible", Variant::Bool(visible)) => model.visible = visible,
                (Node::Document, "ActiveLayer", Variant::Object(layer)) => {
                    let Node::Layer(name) = layer.node else {
                        return Err(Self::missing(member));
                    };
                    model.active_layer = name;
                }
                (Node::Layer(name), "Color", Variant::Int(color)) => {
                    if let Some(layer) = model.layers.iter_mut().find(|l| l.0 == *name) {
                        layer.1 = color;
                    }
                }
                (Node::Layer(name), "Description", Variant::Text(text)) => {
                    if let Some(layer) = model.layers.iter_mut().find(|l| l.0 == *name) {
                        layer.2 = Some(text);
                    }
                }
                (Node::Entity(handle), "Color", Variant::Int(color)) => {
                    if let Some(entity) = model.entities.iter_mut().find(|e| e.0 == *handle) {
                        entity.2 = color;
                    }
                }
                _ => return Err(Self::missing(member)),
            }
            Ok(())
        }

        fn call(&self, member: &str, args: Vec<Variant<Self>>) -> CadResult<Variant<Self>> {
            let mut model = self.model.borrow_mut();
            model.calls.push(format!("{member}/{}", args.len()));
            match (&self.node, member, args.as_slice()) {
                (Node::Documents, "Add", []) => {
                    model.documents += 1;
                    Ok(self.child(Node::Document))
                }
                (Node::Layers, "Item", [Variant::Text(name)]) => model
                    .layers
                    .iter()
                    .find(|l| l.0.eq_ignore_ascii_case(name))
                    .map(|l| self.child(Node::Layer(l.0.clone())))
                    .ok_or_else(|| Self::missing("Item")),
                (Node::Layers, "Item", [Variant::Int(index)]) => model
                    .layers
                    .get(usize::try_from(*index).unwrap())
                    .map(|l| self.child(Node::Layer(l.0.clone())))
                    .ok_or_else(|| Self::missing("Item")),
                (Node::Layers, "Add", [Variant::Text(name)]) => {
                    model.layers.push((name.clone(), 7, None));
                    Ok(self.child(Node::Layer(name.clone())))
                }
                (Node::ModelSpace, "Item", [Variant::Int(index)]) => model
                    .entities
                    .get(usize::try_from(*index).unwrap())
                    .map(|e| self.child(Node::Entity(e.0.clone())))
                    .ok_or_else(|| Self::missing("Item")),
                (Node::ModelSpace, "AddLine", [Variant::Point(start), Variant::Point(_)]) => {
                    let handle = format!("{:X}", 0x30 + model.entities.len());
                    model.entities.push((handle.clone(), "AcDbLine", 256, *start));
                    Ok(self.child(Node::Entity(handle)))
                }
                (Node::Document, "HandleToObject", [Variant::Text(handle)]) => {
                    if model.entities.iter().any(|e| e.0 == *handle) {
                        Ok(self.child(Node::Entity(handle.clone())))
                    } else {
                        Err(Self::missing("HandleToObject"))
                    }
                }
                (Node::Entity(handle), "Delete", []) => {
                    let handle = handle.clone();
                    model.entities.retain(|e| e.0 != handle);
                    Ok(Variant::Empty)
                }
                (Node::Document, "Regen", [Variant::Int(ACTIVE_VIEWPORT)])
                | (Node::Application, "ZoomExtents", []) => Ok(Variant::Empty),
                (Node::Document, "SendCommand", [Variant::Text(command)])
                    if command == UNDO_COMMAND =>
                {
                    Ok(Variant::Empty)
                }
                _ => Err(Self::missing(member)),
            }
        }
    }

    fn model() -> Rc<RefCell<Model>> {
        Rc::new(RefCell::new(Model {
            documents: 1,
            layers: vec![("0".to_string(), 7, None)],
            active_layer: "0".to_string(),
            ..Model::default()
        }))
    }

    fn attached(model: &Rc<RefCell<Model>>) -> ComSession<Fake> {
        ComSession::attach(Fake::application(model)).unwrap()
    }

    #[test]
    fn attach_shows_application_and_reads_document() {
        let model = model();
        let session = attached(&model);
        assert!(model.borrow().visible);
        assert_eq!(session.document_name().unwrap(), "Plan.dwg");
        assert_eq!(session.document_path().unwrap(), None);
        assert!(!session.is_saved().unwrap());
    }

    #[test]
    fn attach_without_document_is_not_connected() {
        let model = model();
        model.borrow_mut().documents = 0;
        let err = ComSession::attach(Fake::application(&model)).unwrap_err();
        assert!(matches!(err, CadError::NotConnected { .. }));
    }

    #[test]
    fn launch_adds_a_document() {
        let model = model();
        model.borrow_mut().documents = 0;
        let session = ComSession::launch(Fake::application(&model), Duration::ZERO).unwrap();
        assert_eq!(session.document_name().unwrap(), "Plan.dwg");
        assert_eq!(model.borrow().documents, 1);
        assert!(model.borrow().visible);
    }

    #[test]
    fn layers_are_created_found_and_activated() {
        let model = model();
        let mut session = attached(&model);

        assert_eq!(session.find_layer("WALLS").unwrap(), None);
        session.add_layer("WALLS", 7).unwrap();
        session.set_layer_description("WALLS", "Walls").unwrap();
        session.set_active_layer("walls").unwrap();

        assert_eq!(session.active_layer().unwrap(), "WALLS");
        assert_eq!(session.layer_count().unwrap(), 2);
        assert_eq!(session.layer_at(1).unwrap().name, "WALLS");
        assert_eq!(
            model.borrow().layers[1].2.as_deref(),
            Some("Walls")
        );
    }

    #[test]
    fn unknown_layer_is_layer_not_found() {
        let model = model();
        let mut session = attached(&model);
        let err = session.set_active_layer("NOPE").unwrap_err();
        assert!(matches!(err, CadError::LayerNotFound { .. }));
    }

    #[test]
    fn entities_round_trip_through_handles() {
        let model = model();
        let mut session = attached(&model);

        let handle = session
            .add_line(Point3::new(1.0, 2.0, 0.0), Point3::xy(3.0, 4.0))
            .unwrap();
        assert_eq!(session.entity_count().unwrap(), 1);
        assert_eq!(
            session.entity_property(0, EntityProperty::ObjectName).unwrap(),
            PropertyValue::Text("AcDbLine".to_string())
        );
        assert_eq!(
            session.entity_property(0, EntityProperty::StartPoint).unwrap(),
            PropertyValue::Point(Point3::new(1.0, 2.0, 0.0))
        );
        assert!(matches!(
            session.entity_property(0, EntityProperty::Radius),
            Err(CadError::PropertyUnavailable { index: 0, .. })
        ));

        session.set_entity_color(&handle, 1).unwrap();
        assert_eq!(model.borrow().entities[0].2, 1);

        session.delete_entity(&handle).unwrap();
        assert_eq!(session.entity_count().unwrap(), 0);
        assert!(matches!(
            session.delete_entity(&handle),
            Err(CadError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn view_and_undo_calls() {
        let model = model();
        let mut session = attached(&model);
        session.regen().unwrap();
        session.zoom_extents().unwrap();
        session.undo().unwrap();
        assert_eq!(
            model.borrow().calls,
            vec!["Regen/1", "ZoomExtents/0", "SendCommand/1"]
        );
    }

    #[test]
    fn busy_host_errors_stay_retryable() {
        let model = model();
        let mut session = attached(&model);
        model.borrow_mut().busy = true;

        let err = session.set_active_layer("0").unwrap_err();
        assert!(err.is_retryable());
        assert!(!matches!(err, CadError::LayerNotFound { .. }));
    }
}
