//! Drawing synthesised strokes through the host.
//!
//! Each primitive is created with one paced host call, then colored. Failures
//! never abort the remaining strokes; they are collected in a
//! [`CreationReport`] so callers can tell a complete result from a partial
//! one. Nothing already created is rolled back.

use serde::Serialize;

use crate::cad::error::CadResult;
use crate::cad::executor::Executor;
use crate::cad::geometry::{Primitive, Stroke};
use crate::cad::host::{Automation, Handle};

/// Overall outcome of a multi-step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every step succeeded.
    Complete,
    /// Some steps succeeded.
    Partial,
    /// Nothing was achieved.
    Failed,
}

/// A primitive the host refused to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPrimitive {
    /// What was being drawn.
    pub primitive: String,
    /// Host error message.
    pub error: String,
    /// Whether a later attempt may succeed.
    pub retryable: bool,
}

/// Handles created and primitives that failed during one drawing operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationReport {
    /// Handles of created entities, in creation order.
    pub created: Vec<Handle>,
    /// Primitives the host rejected.
    pub failed: Vec<FailedPrimitive>,
    /// Primitives not attempted because their stroke's anchor failed.
    pub skipped: usize,
}

impl CreationReport {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> Status {
        match (self.created.is_empty(), self.failed.is_empty() && self.skipped == 0) {
            (false, true) => Status::Complete,
            (false, false) => Status::Partial,
            (true, _) => Status::Failed,
        }
    }

    /// Returns `true` if at least one entity was created.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.created.is_empty()
    }

    /// Summarises the failures, if any.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }

        let details: Vec<String> = self
            .failed
            .iter()
            .map(|f| format!("{}: {}", f.primitive, f.error))
            .collect();
        let attempted = self.created.len() + self.failed.len();
        Some(format!(
            "{} of {attempted} primitives failed ({})",
            self.failed.len(),
            details.join("; ")
        ))
    }

    /// Returns the first host error message.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.failed.first().map(|f| f.error.as_str())
    }

    /// Appends another report's outcome.
    pub fn merge(&mut self, other: Self) {
        self.created.extend(other.created);
        self.failed.extend(other.failed);
        self.skipped += other.skipped;
    }
}

/// Creates one primitive. Arc angles are converted to radians here.
///
/// # Errors
///
/// Returns the host error if the primitive is rejected.
pub fn draw_primitive(
    host: &mut dyn Automation,
    exec: &Executor,
    primitive: &Primitive,
) -> CadResult<Handle> {
    match primitive {
        Primitive::Line { start, end } => exec.run("AddLine", || host.add_line(*start, *end)),
        Primitive::Circle { center, radius } => {
            exec.run("AddCircle", || host.add_circle(*center, *radius))
        }
        Primitive::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => exec.run("AddArc", || {
            host.add_arc(
                *center,
                *radius,
                start_angle.to_radians(),
                end_angle.to_radians(),
            )
        }),
        Primitive::Text {
            position,
            content,
            height,
        } => exec.run("AddText", || host.add_text(content, *position, *height)),
    }
}

/// Draws strokes in order, coloring every created entity, then regenerates.
///
/// When an anchored stroke's first primitive fails, the rest of that stroke
/// is skipped. Color and regen failures are logged and ignored.
pub fn draw_strokes(
    host: &mut dyn Automation,
    exec: &Executor,
    strokes: &[Stroke],
    color: i32,
) -> CreationReport {
    let mut report = CreationReport::default();

    for stroke in strokes {
        for (position, primitive) in stroke.primitives.iter().enumerate() {
            match draw_primitive(host, exec, primitive) {
                Ok(handle) => {
                    apply_color(host, exec, &handle, color);
                    report.created.push(handle);
                }
                Err(e) => {
                    report.failed.push(FailedPrimitive {
                        primitive: primitive.describe(),
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                    if position == 0 && stroke.anchored {
                        report.skipped += stroke.len() - 1;
                        break;
                    }
                }
            }
        }
    }

    if report.succeeded() {
        regen(host, exec);
    }

    report
}

/// Sets an entity's color, tolerating failure.
pub fn apply_color(host: &mut dyn Automation, exec: &Executor, handle: &str, color: i32) {
    if let Err(e) = exec.run("Color", || host.set_entity_color(handle, color)) {
        tracing::debug!(handle, color, error = %e, "Entity color not applied");
    }
}

/// Regenerates the viewport, tolerating failure.
pub fn regen(host: &mut dyn Automation, exec: &Executor) {
    if let Err(e) = exec.run("Regen", || host.regen()) {
        tracing::debug!(error = %e, "Regen skipped");
    }
}
