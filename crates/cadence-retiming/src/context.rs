//! Collaborators the retiming core calls into, and the context that bundles
//! them for a single operation.

use tracing::{error, info, warn};

use crate::editing::{Editing, Scene};
use crate::mapping;
use crate::strip::{Strip, StripId};

/// Cache of rendered strip frames, owned by the host editor.
pub trait StripCache {
    /// Drop frames decoded from the strip's source.
    fn invalidate_raw(&mut self, strip: StripId);
    /// Drop frames after per-strip processing (retiming included).
    fn invalidate_preprocessed(&mut self, strip: StripId);
}

/// Resolves strips that overlap after a length change.
pub trait OverlapResolver {
    /// Whether `strip` overlaps another strip on its channel.
    fn test_overlap(&self, scene: &Scene, strips: &[Strip], strip: StripId) -> bool {
        let Some(target) = strips.iter().find(|s| s.id == strip) else {
            return false;
        };
        strips
            .iter()
            .any(|other| other.id != strip && mapping::strips_overlap(scene, target, other))
    }

    /// Move `strip` (or its neighbours) until nothing overlaps.
    fn shuffle(&mut self, scene: &Scene, strips: &mut [Strip], strip: StripId);
}

/// Severity of a user-visible report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// Destination for messages shown to the user.
pub trait ReportSink {
    fn report(&mut self, level: ReportLevel, message: &str);
}

/// Report sink that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReports;

impl ReportSink for LogReports {
    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Info => info!("{message}"),
            ReportLevel::Warning => warn!("{message}"),
            ReportLevel::Error => error!("{message}"),
        }
    }
}

/// Cache that does nothing, for hosts without frame caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl StripCache for NoCache {
    fn invalidate_raw(&mut self, _strip: StripId) {}
    fn invalidate_preprocessed(&mut self, _strip: StripId) {}
}

/// Everything one retiming operation may read or touch.
pub struct EditingContext<'a> {
    pub scene: &'a Scene,
    pub editing: &'a mut Editing,
    pub cache: &'a mut dyn StripCache,
    pub overlap: &'a mut dyn OverlapResolver,
    pub reports: &'a mut dyn ReportSink,
}

impl<'a> EditingContext<'a> {
    /// Bundle the collaborators.
    pub fn new(
        scene: &'a Scene,
        editing: &'a mut Editing,
        cache: &'a mut dyn StripCache,
        overlap: &'a mut dyn OverlapResolver,
        reports: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            scene,
            editing,
            cache,
            overlap,
            reports,
        }
    }

    /// Invalidate everything cached for a retimed strip.
    pub fn invalidate(&mut self, strip: StripId) {
        self.cache.invalidate_raw(strip);
        self.cache.invalidate_preprocessed(strip);
    }

    /// Shuffle `strip` away from its neighbours if it now overlaps one.
    pub fn resolve_overlap(&mut self, strip: StripId) {
        if self.overlap.test_overlap(self.scene, &self.editing.strips, strip) {
            warn!(strip = %strip, "retimed strip overlaps, shuffling");
            self.overlap.shuffle(self.scene, &mut self.editing.strips, strip);
        }
    }

    /// Show a warning to the user.
    pub fn warn(&mut self, message: &str) {
        self.reports.report(ReportLevel::Warning, message);
    }
}
