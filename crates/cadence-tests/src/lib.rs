//! Integration test crate for Cadence.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the retiming engine the way an editor would: through an
//! `EditingContext` with recording collaborators.

use cadence_retiming::{
    CommandStatus, Editing, EditingContext, OverlapResolver, ReportLevel, ReportSink,
    RetimingCommand, Scene, Strip, StripCache, StripId,
};
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collaborators that record what the engine asked of them.
#[derive(Debug, Default)]
pub struct Recorder {
    pub raw_invalidations: Vec<StripId>,
    pub preprocessed_invalidations: Vec<StripId>,
    pub shuffles: Vec<StripId>,
    pub reports: Vec<(ReportLevel, String)>,
}

impl StripCache for Recorder {
    fn invalidate_raw(&mut self, strip: StripId) {
        self.raw_invalidations.push(strip);
    }

    fn invalidate_preprocessed(&mut self, strip: StripId) {
        self.preprocessed_invalidations.push(strip);
    }
}

impl ReportSink for Recorder {
    fn report(&mut self, level: ReportLevel, message: &str) {
        self.reports.push((level, message.to_string()));
    }
}

/// Overlap resolver that moves the offending strip up one channel.
#[derive(Debug, Default)]
pub struct BumpChannel {
    pub shuffled: Vec<StripId>,
}

impl OverlapResolver for BumpChannel {
    fn shuffle(&mut self, _scene: &Scene, strips: &mut [Strip], strip: StripId) {
        self.shuffled.push(strip);
        if let Some(s) = strips.iter_mut().find(|s| s.id == strip) {
            s.channel += 1;
        }
    }
}

/// A scene, a container and the recording collaborators.
pub struct Harness {
    pub scene: Scene,
    pub editing: Editing,
    pub recorder: Recorder,
    pub overlap: BumpChannel,
}

impl Harness {
    pub fn new(scene: Scene) -> Self {
        init_tracing();
        Self {
            scene,
            editing: Editing::new(),
            recorder: Recorder::default(),
            overlap: BumpChannel::default(),
        }
    }

    /// Add a strip and make it active.
    pub fn add_active(&mut self, strip: Strip) -> StripId {
        let id = self.editing.add_strip(strip);
        self.editing.set_active_strip(Some(id));
        id
    }

    /// Run `f` with a context over the harness state.
    pub fn with_ctx<R>(&mut self, f: impl FnOnce(&mut EditingContext<'_>) -> R) -> R {
        let mut cache = std::mem::take(&mut self.recorder);
        let mut reports = Recorder::default();
        let result = {
            let mut ctx = EditingContext::new(
                &self.scene,
                &mut self.editing,
                &mut cache,
                &mut self.overlap,
                &mut reports,
            );
            f(&mut ctx)
        };
        cache.reports.extend(reports.reports);
        self.recorder = cache;
        result
    }

    pub fn run(&mut self, command: RetimingCommand) -> CommandStatus {
        self.with_ctx(|ctx| command.execute(ctx))
    }

    pub fn strip(&self, id: StripId) -> &Strip {
        self.editing
            .strip(id)
            .unwrap_or_else(|| panic!("strip {id} missing"))
    }

    /// Warnings reported so far.
    pub fn warnings(&self) -> Vec<&str> {
        self.recorder
            .reports
            .iter()
            .filter(|(level, _)| *level == ReportLevel::Warning)
            .map(|(_, message)| message.as_str())
            .collect()
    }
}


#[cfg(test)]
mod retiming;

#[cfg(test)]
mod selection;
