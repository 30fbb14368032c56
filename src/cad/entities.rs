//! Entity enumeration, filtering and deletion.
//!
//! The model-space collection is scanned linearly by index. Scans run in
//! fixed-size batches with a short pause at regular intervals so large
//! drawings do not flood the automation channel. A record needs its type,
//! layer, handle and color; any other property that cannot be read is left
//! out of the record.
//!
//! Deletions are not transactional: matching entities are deleted one at a
//! time and a failure part-way leaves the earlier deletions in place.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::cad::draw::{self, Status};
use crate::cad::error::{CadError, CadResult};
use crate::cad::executor::Executor;
use crate::cad::geometry::Point3;
use crate::cad::host::{Automation, EntityProperty, Handle, CIRCLE_TYPE, LINE_TYPE, TEXT_TYPE};

/// Pacing of entity scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPacing {
    /// Entities read per batch.
    pub batch_size: usize,
    /// Pause after this many entities have been read.
    pub pause_every: usize,
    /// Length of each pause.
    pub pause: Duration,
}

impl Default for ScanPacing {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pause_every: 500,
            pause: Duration::from_millis(100),
        }
    }
}

/// One model-space entity as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    /// Position in the model-space collection.
    pub index: usize,
    /// Entity type, e.g. `AcDbLine`.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Layer name.
    pub layer: String,
    /// Entity handle.
    pub handle: Handle,
    /// Color (ACI).
    pub color: i32,
    /// Visibility, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Line start point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_point: Option<Point3>,
    /// Line end point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_point: Option<Point3>,
    /// Circle center.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Point3>,
    /// Circle radius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Text insertion point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point3>,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_string: Option<String>,
    /// Text height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl EntityRecord {
    /// Reads the record of the entity at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required property cannot be read.
    pub fn read(host: &dyn Automation, index: usize) -> CadResult<Self> {
        let text = |property| {
            host.entity_property(index, property)
                .and_then(|v| v.into_text(index, property))
        };
        let point = |property| {
            host.entity_property(index, property)
                .and_then(|v| v.into_point(index, property))
                .ok()
        };
        let real = |property| {
            host.entity_property(index, property)
                .and_then(|v| v.into_real(index, property))
                .ok()
        };

        let entity_type = text(EntityProperty::ObjectName)?;
        let layer = text(EntityProperty::Layer)?;
        let handle = text(EntityProperty::Handle)?;
        let color = host
            .entity_property(index, EntityProperty::Color)
            .and_then(|v| v.into_int(index, EntityProperty::Color))?;

        let mut record = Self {
            index,
            entity_type,
            layer,
            handle,
            color,
            visible: host
                .entity_property(index, EntityProperty::Visible)
                .and_then(|v| v.into_bool(index, EntityProperty::Visible))
                .ok(),
            start_point: None,
            end_point: None,
            center: None,
            radius: None,
            position: None,
            text_string: None,
            height: None,
        };

        match record.entity_type.as_str() {
            LINE_TYPE => {
                record.start_point = point(EntityProperty::StartPoint);
                record.end_point = point(EntityProperty::EndPoint);
            }
            CIRCLE_TYPE => {
                record.center = point(EntityProperty::Center);
                record.radius = real(EntityProperty::Radius);
            }
            TEXT_TYPE => {
                record.position = point(EntityProperty::InsertionPoint);
                record.text_string = text(EntityProperty::TextString).ok();
                record.height = real(EntityProperty::Height);
            }
            _ => {}
        }

        Ok(record)
    }
}

/// Result of a model-space scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scan {
    /// Number of entities in model space.
    pub total_count: usize,
    /// Records that could be read.
    pub entities: Vec<EntityRecord>,
}

/// Reads up to `limit` entities from model space.
///
/// Entities whose required properties cannot be read are skipped.
pub fn scan(
    host: &dyn Automation,
    exec: &Executor,
    limit: Option<usize>,
    pacing: &ScanPacing,
) -> Scan {
    let total_count = host.entity_count().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not count model-space entities");
        0
    });
    let count = limit.map_or(total_count, |limit| limit.min(total_count));
    let batch_size = pacing.batch_size.max(1);
    let pause_every = pacing.pause_every.max(1);

    let mut entities = Vec::with_capacity(count);
    let mut processed = 0;

    while processed < count {
        let batch_end = (processed + batch_size).min(count);

        for index in processed..batch_end {
            match EntityRecord::read(host, index) {
                Ok(record) => entities.push(record),
                Err(e) => tracing::debug!(index, error = %e, "Skipping unreadable entity"),
            }
        }

        let crossed_pause = batch_end / pause_every > processed / pause_every;
        processed = batch_end;

        if crossed_pause && processed < count {
            tracing::trace!(processed, "Pausing scan");
            exec.pause(pacing.pause);
        }
    }

    tracing::debug!(total = total_count, read = entities.len(), "Scanned model space");
    Scan {
        total_count,
        entities,
    }
}

/// Finds the model-space index of an entity by handle.
///
/// Only the handle of each entity is read.
///
/// # Errors
///
/// Returns [`CadError::EntityNotFound`] if no entity has the handle, or the
/// host error if the collection cannot be counted.
pub fn find(host: &dyn Automation, handle: &str) -> CadResult<usize> {
    let count = host.entity_count()?;
    (0..count)
        .find(|&index| {
            host.entity_property(index, EntityProperty::Handle)
                .and_then(|v| v.into_text(index, EntityProperty::Handle))
                .is_ok_and(|h| h == handle)
        })
        .ok_or_else(|| CadError::entity_not_found(handle))
}

/// Selects entities for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    /// One entity by handle.
    Handle(String),
    /// Several entities by handle.
    Handles(Vec<String>),
    /// Entities of one type, compared exactly (`AcDbLine`).
    Type(String),
    /// Entities on one layer.
    Layer(String),
    /// Entities of one color index.
    Color(i32),
    /// Entities of one type and one color index.
    TypeAndColor {
        /// Entity type.
        entity_type: String,
        /// Color index.
        color: i32,
    },
    /// The `n` most recently created entities.
    LastN(usize),
    /// Every entity.
    All,
}

impl EntityFilter {
    /// Returns `true` if the record is selected. Positional filters select
    /// every record.
    #[must_use]
    pub fn matches(&self, record: &EntityRecord) -> bool {
        match self {
            Self::Handle(handle) => record.handle == *handle,
            Self::Handles(handles) => handles.iter().any(|h| *h == record.handle),
            Self::Type(entity_type) => record.entity_type == *entity_type,
            Self::Layer(layer) => record.layer == *layer,
            Self::Color(color) => record.color == *color,
            Self::TypeAndColor { entity_type, color } => {
                record.entity_type == *entity_type && record.color == *color
            }
            Self::LastN(_) | Self::All => true,
        }
    }

    /// Returns the handles selected from `records`, in deletion order.
    ///
    /// `LastN` selects the highest indices, newest first.
    #[must_use]
    pub fn select(&self, records: &[EntityRecord]) -> Vec<Handle> {
        match self {
            Self::LastN(n) => records
                .iter()
                .rev()
                .take(*n)
                .map(|r| r.handle.clone())
                .collect(),
            _ => records
                .iter()
                .filter(|r| self.matches(r))
                .map(|r| r.handle.clone())
                .collect(),
        }
    }
}

/// A deletion the host refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDeletion {
    /// Entity handle.
    pub handle: Handle,
    /// Host error message.
    pub error: String,
}

/// Outcome of a filtered deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Handles deleted, in deletion order.
    pub deleted: Vec<Handle>,
    /// Deletions that failed.
    pub failed: Vec<FailedDeletion>,
    /// Requested handles that matched no entity.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<Handle>,
    /// Number of entities the filter selected.
    pub matched_count: usize,
    /// Number of entities deleted.
    pub deleted_count: usize,
}

impl DeletionReport {
    /// Returns the overall status. A filter that matched nothing is complete.
    #[must_use]
    pub fn status(&self) -> Status {
        if self.failed.is_empty() {
            Status::Complete
        } else if self.deleted.is_empty() {
            Status::Failed
        } else {
            Status::Partial
        }
    }
}

/// Deletes every entity selected by `filter`.
///
/// The drawing is regenerated once if anything was deleted.
pub fn delete_matching(
    host: &mut dyn Automation,
    exec: &Executor,
    pacing: &ScanPacing,
    filter: &EntityFilter,
) -> DeletionReport {
    let scanned = scan(host, exec, None, pacing);
    let targets = filter.select(&scanned.entities);

    let not_found = match filter {
        EntityFilter::Handles(handles) => handles
            .iter()
            .filter(|h| !targets.contains(h))
            .cloned()
            .collect(),
        _ => Vec::new(),
    };

    let mut report = DeletionReport {
        matched_count: targets.len(),
        not_found,
        ..DeletionReport::default()
    };

    for handle in targets {
        match exec.run("Delete", || host.delete_entity(&handle)) {
            Ok(()) => report.deleted.push(handle),
            Err(e) => report.failed.push(FailedDeletion {
                handle,
                error: e.to_string(),
            }),
        }
    }
    report.deleted_count = report.deleted.len();

    if report.deleted_count > 0 {
        draw::regen(host, exec);
    }

    tracing::info!(
        filter = ?filter,
        matched = report.matched_count,
        deleted = report.deleted_count,
        failed = report.failed.len(),
        "Deleted entities"
    );
    report
}

/// Entities grouped for the listing tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityListing {
    /// All records, in model-space order.
    pub entities: Vec<EntityRecord>,
    /// Records grouped by layer, layers in first-seen order.
    pub entities_by_layer: IndexMap<String, Vec<EntityRecord>>,
    /// Number of model-space entities.
    pub total_count: usize,
    /// Number of records returned.
    pub returned_count: usize,
    /// Record count per layer.
    pub layer_summary: IndexMap<String, usize>,
}

impl From<Scan> for EntityListing {
    fn from(scan: Scan) -> Self {
        let mut entities_by_layer: IndexMap<String, Vec<EntityRecord>> = IndexMap::new();
        for record in &scan.entities {
            entities_by_layer
                .entry(record.layer.clone())
                .or_default()
                .push(record.clone());
        }

        let layer_summary = entities_by_layer
            .iter()
            .map(|(layer, records)| (layer.clone(), records.len()))
            .collect();

        Self {
            returned_count: scan.entities.len(),
            total_count: scan.total_count,
            entities: scan.entities,
            entities_by_layer,
            layer_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::memory::{MemoryHost, MemorySession};

    fn populated() -> (MemoryHost, MemorySession) {
        let host = MemoryHost::new();
        let mut session = host.session();
        session
            .add_line(Point3::xy(0.0, 0.0), Point3::xy(1.0, 0.0))
            .unwrap();
        session.add_circle(Point3::xy(2.0, 2.0), 0.5).unwrap();
        session.add_text("A", Point3::xy(3.0, 3.0), 0.2).unwrap();
        (host, session)
    }

    #[test]
    fn scan_reads_type_specific_geometry() {
        let (_host, session) = populated();
        let scan = scan(&session, &Executor::immediate(), None, &ScanPacing::default());

        assert_eq!(scan.total_count, 3);
        let line = &scan.entities[0];
        assert_eq!(line.entity_type, "AcDbLine");
        assert_eq!(line.end_point, Some(Point3::xy(1.0, 0.0)));
        assert_eq!(scan.entities[1].radius, Some(0.5));
        assert_eq!(scan.entities[2].text_string.as_deref(), Some("A"));
        assert!(line.radius.is_none());
    }

    #[test]
    fn scan_respects_limit() {
        let (_host, session) = populated();
        let scan = scan(&session, &Executor::immediate(), Some(2), &ScanPacing::default());
        assert_eq!(scan.total_count, 3);
        assert_eq!(scan.entities.len(), 2);
    }

    #[test]
    fn unreadable_optional_property_is_omitted() {
        let (host, session) = populated();
        host.fail_property(EntityProperty::Visible);
        let scan = scan(&session, &Executor::immediate(), None, &ScanPacing::default());
        assert_eq!(scan.entities.len(), 3);
        assert!(scan.entities.iter().all(|r| r.visible.is_none()));
    }

    #[test]
    fn unreadable_required_property_skips_entity() {
        let (host, session) = populated();
        host.fail_property(EntityProperty::Layer);
        let scan = scan(&session, &Executor::immediate(), None, &ScanPacing::default());
        assert_eq!(scan.total_count, 3);
        assert!(scan.entities.is_empty());
    }

    #[test]
    fn small_batches_cover_every_entity() {
        let (_host, session) = populated();
        let pacing = ScanPacing {
            batch_size: 1,
            pause_every: 2,
            pause: Duration::ZERO,
        };
        let scan = scan(&session, &Executor::immediate(), None, &pacing);
        assert_eq!(scan.entities.len(), 3);
    }

    #[test]
    fn last_n_selects_newest_first() {
        let (_host, session) = populated();
        let scan = scan(&session, &Executor::immediate(), None, &ScanPacing::default());
        assert_eq!(EntityFilter::LastN(2).select(&scan.entities), vec!["2C", "2B"]);
        assert_eq!(EntityFilter::LastN(10).select(&scan.entities).len(), 3);
    }

    #[test]
    fn find_locates_handle() {
        let (_host, session) = populated();
        assert_eq!(find(&session, "2B").unwrap(), 1);
        assert_eq!(
            find(&session, "FFFF").unwrap_err(),
            CadError::entity_not_found("FFFF")
        );
    }

    #[test]
    fn listing_groups_by_layer_in_first_seen_order() {
        let (_host, mut session) = populated();
        session.add_layer("B", 1).unwrap();
        session.set_active_layer("B").unwrap();
        session.add_circle(Point3::xy(0.0, 0.0), 1.0).unwrap();

        let listing = EntityListing::from(scan(
            &session,
            &Executor::immediate(),
            None,
            &ScanPacing::default(),
        ));
        let layers: Vec<_> = listing.layer_summary.keys().cloned().collect();
        assert_eq!(layers, vec!["0", "B"]);
        assert_eq!(listing.layer_summary["0"], 3);
        assert_eq!(listing.returned_count, 4);
    }

    #[test]
    fn handles_filter_reports_missing() {
        let (host, mut session) = populated();
        let filter = EntityFilter::Handles(vec!["2A".to_string(), "ZZ".to_string()]);
        let report = delete_matching(
            &mut session,
            &Executor::immediate(),
            &ScanPacing::default(),
            &filter,
        );
        assert_eq!(report.deleted, vec!["2A"]);
        assert_eq!(report.not_found, vec!["ZZ"]);
        assert_eq!(report.status(), Status::Complete);
        assert_eq!(host.entities().len(), 2);
    }
}
