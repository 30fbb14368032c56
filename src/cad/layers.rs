//! Layer classification and the layer registry.
//!
//! Structures are grouped onto a fixed set of named layers. A free-text
//! structure type (`"kitchen_chair"`, `"garage_door"`) is classified by
//! scanning [`STRUCTURE_KEYWORDS`] in order and taking the first keyword that
//! occurs in the lower-cased type. The table order is part of the contract:
//! `"garage_door"` lands on `DOORS` because `door` is declared before any other
//! matching keyword.

use std::fmt;

use crate::cad::color::ColorSpec;
use crate::cad::error::CadResult;
use crate::cad::executor::Executor;
use crate::cad::host::Automation;

/// The layer used when no keyword matches.
pub const DEFAULT_LAYER: &str = "0";

/// The layer structure labels are placed on.
pub const ANNOTATION_LAYER: &str = "ANNOTATION";

/// Semantic structure categories, each with its own layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerCategory {
    /// Building walls and partitions.
    Walls,
    /// Door openings and frames.
    Doors,
    /// Window openings and frames.
    Windows,
    /// Furniture and fixtures.
    Furniture,
    /// Electrical fixtures and outlets.
    Electrical,
    /// Plumbing fixtures and pipes.
    Plumbing,
    /// HVAC ducts and equipment.
    Hvac,
    /// Structural elements.
    Structure,
    /// Text and dimensions.
    Annotation,
    /// Site elements and landscaping.
    Site,
    /// Utility lines and equipment.
    Utilities,
}

impl LayerCategory {
    /// Returns the predefined layer for this category.
    #[must_use]
    pub fn definition(self) -> &'static LayerDefinition {
        LAYER_DEFINITIONS
            .iter()
            .find(|def| def.category == self)
            .unwrap_or(&LAYER_DEFINITIONS[0])
    }
}

impl fmt::Display for LayerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Self::Walls => "walls",
            Self::Doors => "doors",
            Self::Windows => "windows",
            Self::Furniture => "furniture",
            Self::Electrical => "electrical",
            Self::Plumbing => "plumbing",
            Self::Hvac => "hvac",
            Self::Structure => "structure",
            Self::Annotation => "annotation",
            Self::Site => "site",
            Self::Utilities => "utilities",
        };
        f.write_str(key)
    }
}

/// A predefined layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerDefinition {
    /// Category the layer holds.
    pub category: LayerCategory,
    /// Layer name in the drawing.
    pub name: &'static str,
    /// Default color name.
    pub color: &'static str,
    /// Layer description.
    pub description: &'static str,
}

const fn def(
    category: LayerCategory,
    name: &'static str,
    color: &'static str,
    description: &'static str,
) -> LayerDefinition {
    LayerDefinition {
        category,
        name,
        color,
        description,
    }
}

/// The predefined structure layers, ensured on every connection.
pub const LAYER_DEFINITIONS: [LayerDefinition; 11] = [
    def(LayerCategory::Walls, "WALLS", "white", "Building walls and partitions"),
    def(LayerCategory::Doors, "DOORS", "green", "Door openings and frames"),
    def(LayerCategory::Windows, "WINDOWS", "cyan", "Window openings and frames"),
    def(LayerCategory::Furniture, "FURNITURE", "yellow", "Furniture and fixtures"),
    def(LayerCategory::Electrical, "ELECTRICAL", "red", "Electrical fixtures and outlets"),
    def(LayerCategory::Plumbing, "PLUMBING", "blue", "Plumbing fixtures and pipes"),
    def(LayerCategory::Hvac, "HVAC", "magenta", "HVAC ducts and equipment"),
    def(LayerCategory::Structure, "STRUCTURE", "gray", "Structural elements"),
    def(LayerCategory::Annotation, "ANNOTATION", "white", "Text and dimensions"),
    def(LayerCategory::Site, "SITE", "green", "Site elements and landscaping"),
    def(LayerCategory::Utilities, "UTILITIES", "red", "Utility lines and equipment"),
];

/// Structure keywords in match order. First match wins.
pub const STRUCTURE_KEYWORDS: &[(&str, LayerCategory)] = &[
    ("wall", LayerCategory::Walls),
    ("door", LayerCategory::Doors),
    ("window", LayerCategory::Windows),
    ("furniture", LayerCategory::Furniture),
    ("chair", LayerCategory::Furniture),
    ("table", LayerCategory::Furniture),
    ("bed", LayerCategory::Furniture),
    ("electrical", LayerCategory::Electrical),
    ("outlet", LayerCategory::Electrical),
    ("switch", LayerCategory::Electrical),
    ("light", LayerCategory::Electrical),
    ("plumbing", LayerCategory::Plumbing),
    ("toilet", LayerCategory::Plumbing),
    ("sink", LayerCategory::Plumbing),
    ("hvac", LayerCategory::Hvac),
    ("vent", LayerCategory::Hvac),
    ("duct", LayerCategory::Hvac),
    ("structure", LayerCategory::Structure),
    ("beam", LayerCategory::Structure),
    ("column", LayerCategory::Structure),
    ("text", LayerCategory::Annotation),
    ("dimension", LayerCategory::Annotation),
    ("site", LayerCategory::Site),
    ("tree", LayerCategory::Site),
    ("utility", LayerCategory::Utilities),
];

/// Returns the category of a structure type, if any keyword matches.
#[must_use]
pub fn categorize(structure_type: &str) -> Option<LayerCategory> {
    let lower = structure_type.to_lowercase();
    STRUCTURE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|&(_, category)| category)
}

/// Returns the layer name for a structure type, or [`DEFAULT_LAYER`].
#[must_use]
pub fn classify(structure_type: &str) -> &'static str {
    categorize(structure_type).map_or(DEFAULT_LAYER, |category| category.definition().name)
}

/// Returns the predefined definition of a layer name.
#[must_use]
pub fn definition_for_layer(name: &str) -> Option<&'static LayerDefinition> {
    LAYER_DEFINITIONS.iter().find(|def| def.name == name)
}

/// Creates a layer unless it already exists.
///
/// Existing layers are left untouched. A failure to set the description is
/// tolerated, since older host versions do not expose it.
///
/// Returns `true` if the layer was created.
///
/// # Errors
///
/// Returns an error if the layer table cannot be queried or the layer cannot
/// be added.
pub fn ensure_layer(
    host: &mut dyn Automation,
    exec: &Executor,
    name: &str,
    color: &ColorSpec,
    description: &str,
) -> CadResult<bool> {
    if host.find_layer(name)?.is_some() {
        tracing::debug!(layer = name, "Layer already exists");
        return Ok(false);
    }

    let color_index = color.resolve();
    exec.run("Layers.Add", || host.add_layer(name, color_index))?;

    if !description.is_empty() {
        if let Err(e) = exec.run("Layer.Description", || {
            host.set_layer_description(name, description)
        }) {
            tracing::debug!(layer = name, error = %e, "Layer description not set");
        }
    }

    tracing::info!(layer = name, color = color_index, "Created layer");
    Ok(true)
}

/// Makes a layer active.
///
/// # Errors
///
/// Returns an error if the layer does not exist or the host rejects the call.
pub fn set_active_layer(host: &mut dyn Automation, exec: &Executor, name: &str) -> CadResult<()> {
    exec.run("ActiveLayer", || host.set_active_layer(name))
}

/// Ensures every predefined structure layer exists.
///
/// Failures are logged and skipped. Returns the number of layers created.
pub fn ensure_structure_layers(host: &mut dyn Automation, exec: &Executor) -> usize {
    let mut created = 0;
    for def in &LAYER_DEFINITIONS {
        match ensure_layer(host, exec, def.name, &ColorSpec::named(def.color), def.description) {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(layer = def.name, error = %e, "Could not ensure structure layer");
            }
        }
    }
    created
}

/// Switches the active layer for the duration of an operation.
///
/// Switching and restoring are best-effort: failures are logged and recorded
/// as warnings, and the operation proceeds on whatever layer is active.
#[derive(Debug)]
pub struct ActiveLayerScope {
    previous: Option<String>,
}

impl ActiveLayerScope {
    /// Remembers the active layer and switches to `layer`.
    pub fn enter(
        host: &mut dyn Automation,
        exec: &Executor,
        layer: &str,
        warnings: &mut Vec<String>,
    ) -> Self {
        let previous = match host.active_layer() {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read the active layer");
                None
            }
        };

        if previous.as_deref() != Some(layer) {
            if let Err(e) = set_active_layer(host, exec, layer) {
                tracing::warn!(layer, error = %e, "Could not switch the active layer");
                warnings.push(format!("could not activate layer {layer}: {e}"));
            }
        }

        Self { previous }
    }

    /// Restores the layer that was active before [`Self::enter`].
    pub fn restore(self, host: &mut dyn Automation, exec: &Executor, warnings: &mut Vec<String>) {
        let Some(previous) = self.previous else {
            return;
        };

        if host.active_layer().ok().as_deref() == Some(previous.as_str()) {
            return;
        }

        if let Err(e) = set_active_layer(host, exec, &previous) {
            tracing::warn!(layer = %previous, error = %e, "Could not restore the active layer");
            warnings.push(format!("could not restore layer {previous}: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::memory::MemoryHost;

    #[test]
    fn every_keyword_classifies_to_its_layer() {
        for &(keyword, category) in STRUCTURE_KEYWORDS {
            // A keyword can be shadowed by an earlier one it contains.
            let expected = categorize(keyword).unwrap_or(category);
            assert_eq!(classify(keyword), expected.definition().name);
            assert_eq!(classify(&format!("my_{keyword}_2")), expected.definition().name);
        }
    }

    #[test]
    fn unknown_type_uses_default_layer() {
        assert_eq!(classify("unrecognized_xyz"), "0");
        assert_eq!(classify(""), DEFAULT_LAYER);
    }

    #[test]
    fn classification_examples() {
        assert_eq!(classify("kitchen_chair"), "FURNITURE");
        assert_eq!(classify("garage_door"), "DOORS");
        assert_eq!(classify("Wall"), "WALLS");
        assert_eq!(classify("CEILING_LIGHT"), "ELECTRICAL");
        assert_eq!(classify("oak tree"), "SITE");
    }

    #[test]
    fn earlier_keyword_wins() {
        // "door" precedes "window" in the table.
        assert_eq!(classify("window_door"), "DOORS");
        // "table" precedes "light".
        assert_eq!(classify("light_table"), "FURNITURE");
        // "wall" precedes "outlet".
        assert_eq!(classify("outlet_wall"), "WALLS");
    }

    #[test]
    fn definitions_cover_every_category_once() {
        for (i, def) in LAYER_DEFINITIONS.iter().enumerate() {
            assert_eq!(def.category.definition(), def);
            assert!(LAYER_DEFINITIONS[i + 1..].iter().all(|d| d.name != def.name));
        }
        assert_eq!(definition_for_layer("HVAC").unwrap().color, "magenta");
        assert!(definition_for_layer("0").is_none());
    }

    #[test]
    fn ensure_layer_is_get_or_create() {
        let host = MemoryHost::new();
        let mut session = host.session();
        let exec = Executor::immediate();

        let created = ensure_layer(
            &mut session,
            &exec,
            "CUSTOM",
            &ColorSpec::named("red"),
            "first",
        )
        .unwrap();
        assert!(created);

        let created_again = ensure_layer(
            &mut session,
            &exec,
            "CUSTOM",
            &ColorSpec::named("blue"),
            "second",
        )
        .unwrap();
        assert!(!created_again);

        let layers = host.layers();
        let custom: Vec<_> = layers.iter().filter(|l| l.name == "CUSTOM").collect();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].color, 1);
        assert_eq!(custom[0].description.as_deref(), Some("first"));
    }

    #[test]
    fn ensure_structure_layers_creates_all_then_none() {
        let host = MemoryHost::new();
        let mut session = host.session();
        let exec = Executor::immediate();

        assert_eq!(ensure_structure_layers(&mut session, &exec), 11);
        assert_eq!(ensure_structure_layers(&mut session, &exec), 0);
        assert_eq!(host.layers().len(), 12);
    }

    #[test]
    fn active_layer_scope_restores_previous() {
        let host = MemoryHost::new();
        let mut session = host.session();
        let exec = Executor::immediate();
        ensure_structure_layers(&mut session, &exec);

        let mut warnings = Vec::new();
        let scope = ActiveLayerScope::enter(&mut session, &exec, "WALLS", &mut warnings);
        assert_eq!(session.active_layer().unwrap(), "WALLS");
        scope.restore(&mut session, &exec, &mut warnings);
        assert_eq!(session.active_layer().unwrap(), "0");
        assert!(warnings.is_empty());
    }

    #[test]
    fn active_layer_scope_tolerates_missing_layer() {
        let host = MemoryHost::new();
        let mut session = host.session();
        let exec = Executor::immediate();

        let mut warnings = Vec::new();
        let scope = ActiveLayerScope::enter(&mut session, &exec, "NOPE", &mut warnings);
        assert_eq!(session.active_layer().unwrap(), "0");
        scope.restore(&mut session, &exec, &mut warnings);
        assert_eq!(warnings.len(), 1);
    }
}
