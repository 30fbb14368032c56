//! End-to-end drawing scenarios against the in-process host.
//!
//! These cover structure placement on classified layers, labels, partial
//! failures and reconnection through the public drawing service.

use std::f64::consts::FRAC_PI_2;

use autocad_mcp::cad::draw::Status;
use autocad_mcp::cad::memory::{HostOp, MemoryGeometry};
use autocad_mcp::cad::service::StructureOutcome;
use autocad_mcp::cad::{
    CadError, ColorSpec, DetachedConnector, DrawingService, Executor, MemoryConnector, MemoryHost,
    Point3, ScanPacing, Shape, StructureRequest,
};
use serde_json::json;

fn service() -> (MemoryHost, DrawingService) {
    let host = MemoryHost::new();
    let service = DrawingService::new(
        Box::new(MemoryConnector::new(host.clone())),
        Executor::immediate(),
        ScanPacing::default(),
    );
    (host, service)
}

fn structure(structure_type: &str, geometry: &serde_json::Value) -> StructureRequest {
    StructureRequest {
        structure_type: structure_type.to_string(),
        shape: Shape::for_structure(structure_type, geometry).unwrap(),
        color: None,
        thickness: 0.0,
        custom_layer: None,
        label: None,
    }
}

fn create(service: &mut DrawingService, request: &StructureRequest) -> StructureOutcome {
    service.create_structure(request).unwrap()
}

// =============================================================================
// Structures
// =============================================================================

#[test]
fn wall_is_a_thick_line_on_walls_layer() {
    let (host, mut service) = service();
    let outcome = create(
        &mut service,
        &structure("wall", &json!({"start": [0, 0], "end": [10, 0]})),
    );

    assert_eq!(outcome.layer, "WALLS");
    assert_eq!(outcome.report.status(), Status::Complete);
    assert_eq!(outcome.report.created.len(), 4);

    let entities = host.entities();
    assert_eq!(entities.len(), 4);
    for entity in &entities {
        assert_eq!(entity.layer, "WALLS");
        assert_eq!(entity.color, 7);
    }

    // The default wall thickness offsets the second line by half of 0.1.
    let MemoryGeometry::Line { start, end } = &entities[1].geometry else {
        panic!("expected the offset line");
    };
    assert!((start.y - 0.05).abs() < 1e-12);
    assert!((end.y - 0.05).abs() < 1e-12);

    assert_eq!(host.active_layer_name(), "0");
}

#[test]
fn structures_are_classified_by_keyword() {
    let (host, mut service) = service();

    let chair = create(
        &mut service,
        &structure("kitchen_chair", &json!({"center": [1, 1], "radius": 0.3})),
    );
    assert_eq!(chair.layer, "FURNITURE");
    assert_eq!(chair.color, ColorSpec::named("yellow"));

    let garage = create(
        &mut service,
        &structure("garage_door", &json!({"start": [0, 0], "end": [3, 0]})),
    );
    assert_eq!(garage.layer, "DOORS");

    let entities = host.entities();
    assert_eq!(entities[0].layer, "FURNITURE");
    assert_eq!(entities[0].color, 2);
    assert_eq!(entities[1].layer, "DOORS");
    assert_eq!(entities[1].color, 3);
}

#[test]
fn door_with_width_adds_quarter_swing() {
    let (host, mut service) = service();
    create(
        &mut service,
        &structure("door", &json!({"start": [0, 0], "end": [0.9, 0], "width": 0.9})),
    );

    let entities = host.entities();
    assert_eq!(entities.len(), 2);
    let MemoryGeometry::Arc {
        radius,
        start_angle,
        end_angle,
        ..
    } = entities[1].geometry
    else {
        panic!("expected the door swing");
    };
    assert!((radius - 0.9).abs() < 1e-12);
    assert!(start_angle.abs() < 1e-12);
    assert!((end_angle - FRAC_PI_2).abs() < 1e-12);
}

#[test]
fn label_goes_on_annotation_layer() {
    let (host, mut service) = service();
    let mut request = structure("room", &json!({"corner1": [0, 0], "corner2": [4, 3]}));
    request.label = Some("Bedroom".to_string());

    let outcome = create(&mut service, &request);
    assert!(outcome.labelled);
    assert_eq!(outcome.report.created.len(), 5);

    let label = host.entities().pop().unwrap();
    assert_eq!(label.layer, "ANNOTATION");
    assert_eq!(label.color, 7);
    let MemoryGeometry::Text {
        position,
        content,
        height,
    } = label.geometry
    else {
        panic!("expected the label text");
    };
    assert_eq!(content, "Bedroom");
    assert_eq!(position, Point3::xy(2.0, 1.5));
    assert!((height - 0.2).abs() < 1e-12);
    assert_eq!(host.active_layer_name(), "0");
}

#[test]
fn custom_layer_is_created_with_requested_color() {
    let (host, mut service) = service();
    let mut request = structure("tree", &json!({"center": [5, 5], "radius": 1}));
    request.custom_layer = Some("LANDSCAPE".to_string());
    request.color = Some(ColorSpec::named("green"));

    let outcome = create(&mut service, &request);
    assert_eq!(outcome.layer, "LANDSCAPE");

    let layer = host
        .layers()
        .into_iter()
        .find(|l| l.name == "LANDSCAPE")
        .unwrap();
    assert_eq!(layer.color, 3);
    assert_eq!(layer.description.as_deref(), Some("Custom layer for tree"));
    assert_eq!(host.entities()[0].layer, "LANDSCAPE");
}

#[test]
fn explicit_color_overrides_layer_color() {
    let (host, mut service) = service();
    let mut request = structure("window", &json!({"start": [0, 0], "end": [2, 0]}));
    request.color = Some(ColorSpec::Index(30));

    create(&mut service, &request);
    let entities = host.entities();
    assert_eq!(entities.len(), 2, "opening and sill");
    assert!(entities.iter().all(|e| e.color == 30 && e.layer == "WINDOWS"));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn failed_edge_gives_partial_report() {
    let (host, mut service) = service();
    host.fail_next(HostOp::AddLine, 1);

    let report = service
        .create_shape(
            &Shape::Rectangle {
                corner1: Point3::xy(0.0, 0.0),
                corner2: Point3::xy(2.0, 1.0),
            },
            &ColorSpec::default(),
            0.0,
        )
        .unwrap();

    assert_eq!(report.status(), Status::Partial);
    assert_eq!(report.created.len(), 3);
    assert!(report.failed[0].retryable);
    let warning = report.warning().unwrap();
    assert!(warning.starts_with("1 of 4 primitives failed"), "{warning}");
}

#[test]
fn failed_structure_gets_no_label() {
    let (host, mut service) = service();
    host.fail_next(HostOp::AddLine, 1);

    let mut request = structure("wall", &json!({"start": [0, 0], "end": [5, 0]}));
    request.label = Some("Ghost".to_string());
    let outcome = create(&mut service, &request);

    assert_eq!(outcome.report.status(), Status::Failed);
    assert_eq!(outcome.report.skipped, 3);
    assert!(!outcome.labelled);
    assert!(host.entities().is_empty());
    assert_eq!(host.active_layer_name(), "0");
}

#[test]
fn color_failure_keeps_the_entity() {
    let (host, mut service) = service();
    host.fail_next(HostOp::SetEntityColor, 1);

    let report = service
        .create_shape(
            &Shape::Circle {
                center: Point3::xy(0.0, 0.0),
                radius: 1.0,
            },
            &ColorSpec::named("red"),
            0.0,
        )
        .unwrap();

    assert_eq!(report.status(), Status::Complete);
    assert_eq!(host.entities()[0].color, 256);
}

#[test]
fn layer_switch_failure_is_a_warning() {
    let (host, mut service) = service();
    // Connect first so the fault hits the structure's layer switch.
    service.drawing_info().unwrap();
    host.fail_next(HostOp::SetActiveLayer, 1);

    let outcome = create(
        &mut service,
        &structure("sink", &json!({"center": [0, 0], "radius": 0.4})),
    );

    assert_eq!(outcome.layer, "PLUMBING");
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("PLUMBING"));
    // Drawn on whatever layer was active.
    assert_eq!(host.entities()[0].layer, "0");
}

#[test]
fn arc_angles_reach_the_host_in_radians() {
    let (host, mut service) = service();
    service
        .create_shape(
            &Shape::Arc {
                center: Point3::xy(0.0, 0.0),
                radius: 2.0,
                start_angle: 0.0,
                end_angle: 90.0,
            },
            &ColorSpec::default(),
            0.0,
        )
        .unwrap();

    let MemoryGeometry::Arc { end_angle, .. } = host.entities()[0].geometry else {
        panic!("expected an arc");
    };
    assert!((end_angle - FRAC_PI_2).abs() < 1e-12);
}

// =============================================================================
// Connection
// =============================================================================

#[test]
fn restarted_host_is_reconnected_once() {
    let (host, mut service) = service();
    service.drawing_info().unwrap();
    assert_eq!(host.connect_count(), 1);

    host.crash();
    host.restart();

    let info = service.drawing_info().unwrap();
    assert_eq!(info.filename, "Drawing1.dwg");
    assert_eq!(host.connect_count(), 2);
}

#[test]
fn crashed_host_is_not_connected() {
    let (host, mut service) = service();
    service.drawing_info().unwrap();
    host.crash();

    let err = service.entities(None).unwrap_err();
    assert!(matches!(err, CadError::NotConnected { .. }));
    assert!(!service.is_connected());
}

#[test]
fn ensure_layer_is_idempotent() {
    let (host, mut service) = service();
    let color = ColorSpec::named("cyan");

    assert!(service.create_or_get_layer("GRID", &color, "Grid lines").unwrap());
    let count = host.layers().len();
    assert!(!service
        .create_or_get_layer("GRID", &ColorSpec::named("red"), "")
        .unwrap());
    assert_eq!(host.layers().len(), count);

    let grid = host.layers().into_iter().find(|l| l.name == "GRID").unwrap();
    assert_eq!(grid.color, 4);
    assert_eq!(grid.description.as_deref(), Some("Grid lines"));
}

#[test]
fn delete_all_is_refused_before_connecting() {
    let mut service = DrawingService::new(
        Box::new(DetachedConnector),
        Executor::immediate(),
        ScanPacing::default(),
    );
    let err = service.delete_all(false).unwrap_err();
    assert!(matches!(err, CadError::InvalidParameter { .. }));
}
