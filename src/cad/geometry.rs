//! Geometry synthesis for primitives and building structures.
//!
//! Everything here is pure: a [`Shape`] plus a thickness is turned into a list
//! of [`Stroke`]s, each an ordered group of [`Primitive`]s that the drawing
//! layer hands to the host one call at a time.
//!
//! # Thickness
//!
//! The host's primitives have no stroke width, so thickness is simulated with
//! offset geometry:
//!
//! ```text
//! line     main ─────────────── + parallel offset by t/2 + two end caps
//! circle   main ◯  + outer r+t/2  + inner max(0.1, r-t/2)
//! arc      main ◠  + inner max(0.1, r-t/2) + outer r+t/2   (no end caps)
//! ```
//!
//! Rectangles forward the thickness to each edge independently, so corners
//! are not mitred.

use serde::Serialize;
use serde_json::Value;

use crate::cad::error::{CadError, CadResult};

/// Smallest radius an inner ring may shrink to.
pub const MIN_INNER_RADIUS: f64 = 0.1;

/// Thickness applied to walls created without an explicit thickness.
pub const DEFAULT_WALL_THICKNESS: f64 = 0.1;

/// Perpendicular distance between a window opening and its sill line.
pub const WINDOW_SILL_OFFSET: f64 = 0.05;

/// Text height of structure labels.
pub const LABEL_HEIGHT: f64 = 0.2;

/// Start angle of a door swing, in degrees.
pub const DOOR_SWING_START: f64 = 0.0;

/// End angle of a door swing, in degrees.
pub const DOOR_SWING_END: f64 = 90.0;

/// A point in drawing coordinates.
///
/// Serialises as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(into = "[f64; 3]")]
pub struct Point3 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

impl Point3 {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a point on the XY plane.
    #[must_use]
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Returns the midpoint between two points.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new(
            (self.x + other.x) / 2.0,
            (self.y + other.y) / 2.0,
            (self.z + other.z) / 2.0,
        )
    }

    /// Returns this point moved by `(dx, dy)` in the XY plane.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z)
    }

    /// Returns the planar distance to another point.
    #[must_use]
    pub fn distance_xy(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Parses a point from `[x, y]` or `[x, y, z]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an array of two or three numbers.
    pub fn from_json(value: &Value, field: &str) -> CadResult<Self> {
        let coords: Option<Vec<f64>> = value
            .as_array()
            .and_then(|items| items.iter().map(Value::as_f64).collect());

        match coords.as_deref() {
            Some(&[x, y]) => Ok(Self::xy(x, y)),
            Some(&[x, y, z]) => Ok(Self::new(x, y, z)),
            _ => Err(CadError::invalid_parameter(
                field,
                "expected a point [x, y] or [x, y, z]",
            )),
        }
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A single host primitive to create.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// A straight segment.
    Line {
        /// Start point.
        start: Point3,
        /// End point.
        end: Point3,
    },
    /// A full circle.
    Circle {
        /// Center point.
        center: Point3,
        /// Radius.
        radius: f64,
    },
    /// A circular arc, counter-clockwise from `start_angle` to `end_angle`.
    Arc {
        /// Center point.
        center: Point3,
        /// Radius.
        radius: f64,
        /// Start angle in degrees (0° = +X axis).
        start_angle: f64,
        /// End angle in degrees.
        end_angle: f64,
    },
    /// Single-line text.
    Text {
        /// Insertion point.
        position: Point3,
        /// Text content.
        content: String,
        /// Text height.
        height: f64,
    },
}

impl Primitive {
    /// Returns a short human-readable description, used in failure reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Line { start, end } => format!("line {start} -> {end}"),
            Self::Circle { center, radius } => format!("circle at {center} r={radius}"),
            Self::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => format!("arc at {center} r={radius} {start_angle}°..{end_angle}°"),
            Self::Text {
                position, content, ..
            } => format!("text '{content}' at {position}"),
        }
    }
}

/// An ordered group of primitives drawn together.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    /// Primitives in creation order.
    pub primitives: Vec<Primitive>,
    /// When set, the primitives after the first are only drawn if the first
    /// one was created.
    pub anchored: bool,
}

impl Stroke {
    /// A stroke made of a single primitive.
    #[must_use]
    pub fn single(primitive: Primitive) -> Self {
        Self {
            primitives: vec![primitive],
            anchored: false,
        }
    }

    /// Returns the number of primitives in the stroke.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Returns `true` if the stroke has no primitives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// Returns the segment offset from `start -> end` by `distance` along the
/// left-hand unit normal `(-dy, dx) / len`.
///
/// A zero-length segment is returned unchanged.
#[must_use]
pub fn parallel_offset(start: Point3, end: Point3, distance: f64) -> (Point3, Point3) {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length = dx.hypot(dy);

    if length == 0.0 {
        return (start, end);
    }

    let perp_x = -dy / length * distance;
    let perp_y = dx / length * distance;

    (start.offset(perp_x, perp_y), end.offset(perp_x, perp_y))
}

/// A line, thickened with a parallel offset and two end caps when
/// `thickness > 0`.
#[must_use]
pub fn line(start: Point3, end: Point3, thickness: f64) -> Stroke {
    let mut primitives = vec![Primitive::Line { start, end }];

    if thickness > 0.0 {
        let (start_parallel, end_parallel) = parallel_offset(start, end, thickness / 2.0);
        primitives.push(Primitive::Line {
            start: start_parallel,
            end: end_parallel,
        });
        primitives.push(Primitive::Line {
            start,
            end: start_parallel,
        });
        primitives.push(Primitive::Line {
            start: end,
            end: end_parallel,
        });
    }

    Stroke {
        primitives,
        anchored: true,
    }
}

/// Inner radius of a thickened ring.
#[must_use]
pub fn inner_radius(radius: f64, thickness: f64) -> f64 {
    (radius - thickness / 2.0).max(MIN_INNER_RADIUS)
}

/// Outer radius of a thickened ring.
#[must_use]
pub fn outer_radius(radius: f64, thickness: f64) -> f64 {
    radius + thickness / 2.0
}

/// A circle, thickened with outer and inner concentric circles.
#[must_use]
pub fn circle(center: Point3, radius: f64, thickness: f64) -> Stroke {
    let mut primitives = vec![Primitive::Circle { center, radius }];

    if thickness > 0.0 {
        primitives.push(Primitive::Circle {
            center,
            radius: outer_radius(radius, thickness),
        });
        primitives.push(Primitive::Circle {
            center,
            radius: inner_radius(radius, thickness),
        });
    }

    Stroke {
        primitives,
        anchored: false,
    }
}

/// An arc, thickened with inner and outer concentric arcs over the same
/// angle range. No radial caps are added.
#[must_use]
pub fn arc(center: Point3, radius: f64, start_angle: f64, end_angle: f64, thickness: f64) -> Stroke {
    let mut primitives = vec![Primitive::Arc {
        center,
        radius,
        start_angle,
        end_angle,
    }];

    if thickness > 0.0 {
        for ring_radius in [
            inner_radius(radius, thickness),
            outer_radius(radius, thickness),
        ] {
            primitives.push(Primitive::Arc {
                center,
                radius: ring_radius,
                start_angle,
                end_angle,
            });
        }
    }

    Stroke {
        primitives,
        anchored: false,
    }
}

/// The four edges between two opposite corners: bottom, right, top, left.
#[must_use]
pub fn rectangle_edges(corner1: Point3, corner2: Point3) -> [(Point3, Point3); 4] {
    let (x1, y1) = (corner1.x, corner1.y);
    let (x2, y2) = (corner2.x, corner2.y);

    [
        (Point3::xy(x1, y1), Point3::xy(x2, y1)),
        (Point3::xy(x2, y1), Point3::xy(x2, y2)),
        (Point3::xy(x2, y2), Point3::xy(x1, y2)),
        (Point3::xy(x1, y2), Point3::xy(x1, y1)),
    ]
}

/// A rectangle as four independent line strokes.
#[must_use]
pub fn rectangle(corner1: Point3, corner2: Point3, thickness: f64) -> Vec<Stroke> {
    rectangle_edges(corner1, corner2)
        .into_iter()
        .map(|(start, end)| line(start, end, thickness))
        .collect()
}

/// A wall: a thick line, defaulting to [`DEFAULT_WALL_THICKNESS`].
#[must_use]
pub fn wall(start: Point3, end: Point3, thickness: f64) -> Vec<Stroke> {
    let thickness = if thickness > 0.0 {
        thickness
    } else {
        DEFAULT_WALL_THICKNESS
    };
    vec![line(start, end, thickness)]
}

/// A door: the opening plus, when a width is known, a quarter-circle swing
/// at the start point.
#[must_use]
pub fn door(start: Point3, end: Point3, width: Option<f64>, thickness: f64) -> Vec<Stroke> {
    let mut strokes = vec![line(start, end, thickness)];
    if let Some(width) = width {
        strokes.push(arc(start, width, DOOR_SWING_START, DOOR_SWING_END, 0.0));
    }
    strokes
}

/// A window: the opening plus a sill line at [`WINDOW_SILL_OFFSET`].
///
/// The sill is skipped for zero-length openings.
#[must_use]
pub fn window(start: Point3, end: Point3, thickness: f64) -> Vec<Stroke> {
    let mut strokes = vec![line(start, end, thickness)];
    if start.distance_xy(end) > 0.0 {
        let (sill_start, sill_end) = parallel_offset(start, end, WINDOW_SILL_OFFSET);
        strokes.push(line(sill_start, sill_end, 0.0));
    }
    strokes
}

/// A room footprint: a rectangle with walls of the given thickness.
#[must_use]
pub fn room(corner1: Point3, corner2: Point3, thickness: f64) -> Vec<Stroke> {
    rectangle(corner1, corner2, thickness)
}

/// The text primitive of a structure label.
#[must_use]
pub fn label(anchor: Point3, text: &str) -> Primitive {
    Primitive::Text {
        position: anchor,
        content: text.to_string(),
        height: LABEL_HEIGHT,
    }
}

/// A drawable shape, either a raw primitive or a building structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A line segment.
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
    /// An axis-aligned rectangle.
    Rectangle {
        /// First corner.
        corner1: Point3,
        /// Opposite corner.
        corner2: Point3,
    },
    /// A circular arc (angles in degrees).
    Arc {
        /// Center point.
        center: Point3,
        /// Radius.
        radius: f64,
        /// Start angle in degrees.
        start_angle: f64,
        /// End angle in degrees.
        end_angle: f64,
    },
    /// A wall segment.
    Wall {
        /// Start point.
        start: Point3,
        /// End point.
        end: Point3,
    },
    /// A door opening with an optional swing radius.
    Door {
        /// Hinge side of the opening.
        start: Point3,
        /// Other side of the opening.
        end: Point3,
        /// Swing radius.
        width: Option<f64>,
    },
    /// A window opening.
    Window {
        /// Start of the opening.
        start: Point3,
        /// End of the opening.
        end: Point3,
    },
    /// A room footprint.
    Room {
        /// First corner.
        corner1: Point3,
        /// Opposite corner.
        corner2: Point3,
    },
}

impl Shape {
    /// Builds the shape for a structure from its loose geometry data.
    ///
    /// `wall`/`partition`, `door`/`opening`, `window` and `room` select a
    /// structure shape. Any other type is drawn from whichever fields are
    /// present: start/end, center/radius with angles, center/radius, or
    /// corner1/corner2, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields needed for the shape are missing or
    /// malformed.
    pub fn for_structure(structure_type: &str, geometry: &Value) -> CadResult<Self> {
        match structure_type.to_lowercase().as_str() {
            "wall" | "partition" => {
                let (start, end) = endpoints(geometry, "Wall requires start and end points")?;
                Ok(Self::Wall { start, end })
            }
            "door" | "opening" => {
                let (start, end) = endpoints(geometry, "Door requires start and end points")?;
                let width = optional_positive(geometry, "width")?;
                Ok(Self::Door { start, end, width })
            }
            "window" => {
                let (start, end) = endpoints(geometry, "Window requires start and end points")?;
                Ok(Self::Window { start, end })
            }
            "room" => {
                let (corner1, corner2) =
                    corners(geometry, "Room requires corner1 and corner2 points")?;
                Ok(Self::Room { corner1, corner2 })
            }
            _ => Self::from_fields(geometry).ok_or_else(|| {
                CadError::invalid_geometry(format!(
                    "Unsupported geometry data for structure type: {structure_type}"
                ))
            })?,
        }
    }

    /// Picks a raw shape from the fields present in `geometry`.
    fn from_fields(geometry: &Value) -> Option<CadResult<Self>> {
        let has = |key: &str| geometry.get(key).is_some();

        if has("start") && has("end") {
            return Some(
                endpoints(geometry, "").map(|(start, end)| Self::Line { start, end }),
            );
        }
        if has("center") && has("radius") {
            return Some(Self::circular(geometry));
        }
        if has("corner1") && has("corner2") {
            return Some(
                corners(geometry, "").map(|(corner1, corner2)| Self::Rectangle { corner1, corner2 }),
            );
        }
        None
    }

    /// A circle, or an arc when both angles are present.
    fn circular(geometry: &Value) -> CadResult<Self> {
        let center = Point3::from_json(&geometry["center"], "center")?;
        let radius = required_positive(geometry, "radius")?;

        if geometry.get("start_angle").is_some() && geometry.get("end_angle").is_some() {
            Ok(Self::Arc {
                center,
                radius,
                start_angle: required_number(geometry, "start_angle")?,
                end_angle: required_number(geometry, "end_angle")?,
            })
        } else {
            Ok(Self::Circle { center, radius })
        }
    }

    /// Returns the shape's name as reported in results.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Line { .. } => "Line",
            Self::Circle { .. } => "Circle",
            Self::Rectangle { .. } => "Rectangle",
            Self::Arc { .. } => "Arc",
            Self::Wall { .. } => "Wall",
            Self::Door { .. } => "Door",
            Self::Window { .. } => "Window",
            Self::Room { .. } => "Room",
        }
    }

    /// Synthesises the strokes that draw this shape.
    #[must_use]
    pub fn strokes(&self, thickness: f64) -> Vec<Stroke> {
        match *self {
            Self::Line { start, end } => vec![line(start, end, thickness)],
            Self::Circle { center, radius } => vec![circle(center, radius, thickness)],
            Self::Rectangle { corner1, corner2 } => rectangle(corner1, corner2, thickness),
            Self::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => vec![arc(center, radius, start_angle, end_angle, thickness)],
            Self::Wall { start, end } => wall(start, end, thickness),
            Self::Door { start, end, width } => door(start, end, width, thickness),
            Self::Window { start, end } => window(start, end, thickness),
            Self::Room { corner1, corner2 } => room(corner1, corner2, thickness),
        }
    }

    /// Where a label for this shape is placed.
    #[must_use]
    pub fn label_anchor(&self) -> Point3 {
        match *self {
            Self::Circle { center, .. } | Self::Arc { center, .. } => center,
            Self::Line { start, end }
            | Self::Wall { start, end }
            | Self::Door { start, end, .. }
            | Self::Window { start, end } => start.midpoint(end),
            Self::Rectangle { corner1, corner2 } | Self::Room { corner1, corner2 } => {
                Point3::xy(
                    (corner1.x + corner2.x) / 2.0,
                    (corner1.y + corner2.y) / 2.0,
                )
            }
        }
    }
}

fn endpoints(geometry: &Value, missing: &str) -> CadResult<(Point3, Point3)> {
    match (geometry.get("start"), geometry.get("end")) {
        (Some(start), Some(end)) => Ok((
            Point3::from_json(start, "start")?,
            Point3::from_json(end, "end")?,
        )),
        _ => Err(CadError::invalid_geometry(missing)),
    }
}

fn corners(geometry: &Value, missing: &str) -> CadResult<(Point3, Point3)> {
    match (geometry.get("corner1"), geometry.get("corner2")) {
        (Some(c1), Some(c2)) => Ok((
            Point3::from_json(c1, "corner1")?,
            Point3::from_json(c2, "corner2")?,
        )),
        _ => Err(CadError::invalid_geometry(missing)),
    }
}

fn required_number(geometry: &Value, field: &str) -> CadResult<f64> {
    geometry
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| CadError::invalid_parameter(field, "expected a number"))
}

fn required_positive(geometry: &Value, field: &str) -> CadResult<f64> {
    let value = required_number(geometry, field)?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(CadError::invalid_parameter(field, "must be a positive number"))
    }
}

fn optional_positive(geometry: &Value, field: &str) -> CadResult<Option<f64>> {
    if geometry.get(field).is_none() {
        return Ok(None);
    }
    required_positive(geometry, field).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Planar distance from `p` to the infinite line through `a` and `b`.
    fn distance_to_line(p: Point3, a: Point3, b: Point3) -> f64 {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / dx.hypot(dy)
    }

    fn lines(stroke: &Stroke) -> Vec<(Point3, Point3)> {
        stroke
            .primitives
            .iter()
            .map(|p| match p {
                Primitive::Line { start, end } => (*start, *end),
                other => panic!("expected line, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn thin_line_is_one_segment() {
        let stroke = line(Point3::xy(0.0, 0.0), Point3::xy(5.0, 0.0), 0.0);
        assert_eq!(stroke.len(), 1);
        assert!(stroke.anchored);
    }

    #[test]
    fn thick_line_offset_is_half_thickness() {
        let start = Point3::xy(1.0, 2.0);
        let end = Point3::xy(7.0, -3.0);
        for thickness in [0.1, 0.5, 2.0] {
            let stroke = line(start, end, thickness);
            assert_eq!(stroke.len(), 4);

            let segments = lines(&stroke);
            assert_eq!(segments[0], (start, end));

            let (ps, pe) = segments[1];
            assert!((distance_to_line(ps, start, end) - thickness / 2.0).abs() < 1e-9);
            assert!((distance_to_line(pe, start, end) - thickness / 2.0).abs() < 1e-9);

            // Caps join the original endpoints to the offset endpoints.
            assert_eq!(segments[2], (start, ps));
            assert_eq!(segments[3], (end, pe));
        }
    }

    #[test]
    fn offset_uses_left_hand_normal() {
        let (s, e) = parallel_offset(Point3::xy(0.0, 0.0), Point3::xy(10.0, 0.0), 0.05);
        assert!((s.y - 0.05).abs() < 1e-12);
        assert!((e.y - 0.05).abs() < 1e-12);
        assert!((s.x - 0.0).abs() < 1e-12);
        assert!((e.x - 10.0).abs() < 1e-12);
    }

    #[test]
    fn zero_length_offset_is_unchanged() {
        let p = Point3::xy(3.0, 3.0);
        assert_eq!(parallel_offset(p, p, 1.0), (p, p));
        assert_eq!(line(p, p, 1.0).len(), 4);
    }

    #[test]
    fn thick_circle_radii() {
        let stroke = circle(Point3::xy(0.0, 0.0), 5.0, 1.0);
        let radii: Vec<f64> = stroke
            .primitives
            .iter()
            .map(|p| match p {
                Primitive::Circle { radius, .. } => *radius,
                other => panic!("expected circle, got {other:?}"),
            })
            .collect();
        assert_eq!(radii, vec![5.0, 5.5, 4.5]);
    }

    #[test]
    fn inner_radius_never_below_floor() {
        for radius in [0.01, 0.1, 0.2, 0.5, 1.0, 3.0] {
            for thickness in [0.1, 0.4, 1.0, 5.0, 100.0] {
                let inner = inner_radius(radius, thickness);
                assert!(inner >= MIN_INNER_RADIUS);
                if radius - thickness / 2.0 < MIN_INNER_RADIUS {
                    assert!((inner - MIN_INNER_RADIUS).abs() < f64::EPSILON);
                }
            }
        }
    }

    #[test]
    fn thick_arc_has_no_caps() {
        let stroke = arc(Point3::xy(0.0, 0.0), 2.0, 0.0, 180.0, 0.4);
        assert_eq!(stroke.len(), 3);
        let radii: Vec<f64> = stroke
            .primitives
            .iter()
            .map(|p| match p {
                Primitive::Arc {
                    radius,
                    start_angle,
                    end_angle,
                    ..
                } => {
                    assert!((*start_angle - 0.0).abs() < f64::EPSILON);
                    assert!((*end_angle - 180.0).abs() < f64::EPSILON);
                    *radius
                }
                other => panic!("expected arc, got {other:?}"),
            })
            .collect();
        assert!((radii[1] - 1.8).abs() < 1e-12);
        assert!((radii[2] - 2.2).abs() < 1e-12);
    }

    #[test]
    fn rectangle_is_closed_loop_over_corner_product() {
        let c1 = Point3::xy(-1.0, 2.0);
        let c2 = Point3::xy(4.0, 7.5);
        let strokes = rectangle(c1, c2, 0.0);
        assert_eq!(strokes.len(), 4);

        let edges: Vec<(Point3, Point3)> = strokes.iter().flat_map(lines).collect();
        for i in 0..4 {
            assert_eq!(edges[i].1, edges[(i + 1) % 4].0, "edge {i} must meet the next");
        }

        let mut corners: Vec<(f64, f64)> = edges.iter().map(|(s, _)| (s.x, s.y)).collect();
        corners.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut expected = vec![(-1.0, 2.0), (-1.0, 7.5), (4.0, 2.0), (4.0, 7.5)];
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(corners, expected);
    }

    #[test]
    fn rectangle_edge_order_is_bottom_right_top_left() {
        let edges = rectangle_edges(Point3::xy(0.0, 0.0), Point3::xy(2.0, 1.0));
        assert_eq!(edges[0], (Point3::xy(0.0, 0.0), Point3::xy(2.0, 0.0)));
        assert_eq!(edges[1], (Point3::xy(2.0, 0.0), Point3::xy(2.0, 1.0)));
        assert_eq!(edges[2], (Point3::xy(2.0, 1.0), Point3::xy(0.0, 1.0)));
        assert_eq!(edges[3], (Point3::xy(0.0, 1.0), Point3::xy(0.0, 0.0)));
    }

    #[test]
    fn thick_rectangle_thickens_each_edge() {
        let strokes = rectangle(Point3::xy(0.0, 0.0), Point3::xy(3.0, 3.0), 0.2);
        assert!(strokes.iter().all(|s| s.len() == 4));
    }

    #[test]
    fn wall_defaults_thickness() {
        let strokes = wall(Point3::xy(0.0, 0.0), Point3::xy(10.0, 0.0), 0.0);
        assert_eq!(strokes.len(), 1);
        let segments = lines(&strokes[0]);
        assert_eq!(segments.len(), 4);
        assert!((segments[1].0.y - DEFAULT_WALL_THICKNESS / 2.0).abs() < 1e-12);
    }

    #[test]
    fn door_adds_quarter_swing_at_start() {
        let start = Point3::xy(1.0, 1.0);
        let strokes = door(start, Point3::xy(2.0, 1.0), Some(0.9), 0.0);
        assert_eq!(strokes.len(), 2);
        assert_eq!(
            strokes[1].primitives,
            vec![Primitive::Arc {
                center: start,
                radius: 0.9,
                start_angle: 0.0,
                end_angle: 90.0,
            }]
        );

        let no_swing = door(start, Point3::xy(2.0, 1.0), None, 0.0);
        assert_eq!(no_swing.len(), 1);
    }

    #[test]
    fn window_sill_is_offset_and_skipped_when_degenerate() {
        let strokes = window(Point3::xy(0.0, 0.0), Point3::xy(0.0, 4.0), 0.0);
        assert_eq!(strokes.len(), 2);
        let sill = lines(&strokes[1]);
        assert_eq!(sill.len(), 1);
        assert!((sill[0].0.x + WINDOW_SILL_OFFSET).abs() < 1e-12);

        let p = Point3::xy(1.0, 1.0);
        assert_eq!(window(p, p, 0.0).len(), 1);
    }

    #[test]
    fn label_anchor_per_shape() {
        let circle = Shape::Circle {
            center: Point3::xy(3.0, 4.0),
            radius: 1.0,
        };
        assert_eq!(circle.label_anchor(), Point3::xy(3.0, 4.0));

        let wall = Shape::Wall {
            start: Point3::xy(0.0, 0.0),
            end: Point3::xy(10.0, 2.0),
        };
        assert_eq!(wall.label_anchor(), Point3::xy(5.0, 1.0));

        let room = Shape::Room {
            corner1: Point3::xy(0.0, 0.0),
            corner2: Point3::xy(6.0, 4.0),
        };
        assert_eq!(room.label_anchor(), Point3::xy(3.0, 2.0));
    }

    #[test]
    fn structure_shapes_from_type() {
        let data = json!({"start": [0, 0], "end": [10, 0]});
        assert!(matches!(
            Shape::for_structure("Partition", &data).unwrap(),
            Shape::Wall { .. }
        ));
        assert!(matches!(
            Shape::for_structure("opening", &data).unwrap(),
            Shape::Door { width: None, .. }
        ));
        assert!(matches!(
            Shape::for_structure("kitchen_chair", &data).unwrap(),
            Shape::Line { .. }
        ));
    }

    #[test]
    fn generic_shapes_from_fields() {
        let circle = json!({"center": [1, 1, 0], "radius": 2});
        assert!(matches!(
            Shape::for_structure("table", &circle).unwrap(),
            Shape::Circle { .. }
        ));

        let arc = json!({"center": [0, 0], "radius": 2, "start_angle": 0, "end_angle": 45});
        assert!(matches!(
            Shape::for_structure("vent", &arc).unwrap(),
            Shape::Arc { .. }
        ));

        let rect = json!({"corner1": [0, 0], "corner2": [2, 1]});
        assert!(matches!(
            Shape::for_structure("bed", &rect).unwrap(),
            Shape::Rectangle { .. }
        ));
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = Shape::for_structure("wall", &json!({"start": [0, 0]})).unwrap_err();
        assert_eq!(err.to_string(), "Wall requires start and end points");

        let err = Shape::for_structure("room", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Room requires corner1 and corner2 points");

        let err = Shape::for_structure("lamp", &json!({"foo": 1})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported geometry data for structure type: lamp"
        );

        assert!(Shape::for_structure("door", &json!({"start": [0, 0], "end": [1, 0], "width": -1}))
            .is_err());
    }

    #[test]
    fn point_parsing() {
        assert_eq!(
            Point3::from_json(&json!([1, 2]), "p").unwrap(),
            Point3::xy(1.0, 2.0)
        );
        assert_eq!(
            Point3::from_json(&json!([1.5, 2, 3]), "p").unwrap(),
            Point3::new(1.5, 2.0, 3.0)
        );
        assert!(Point3::from_json(&json!([1]), "p").is_err());
        assert!(Point3::from_json(&json!([1, "a"]), "p").is_err());
        assert!(Point3::from_json(&json!({"x": 1}), "p").is_err());
    }

    #[test]
    fn point_serialises_as_array() {
        let json = serde_json::to_string(&Point3::new(1.0, 2.0, 0.0)).unwrap();
        assert_eq!(json, "[1.0,2.0,0.0]");
    }
}
