use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::align::{align_frames_with_progress, Registration};
use crate::cache::{CacheKey, ResultCache, StageKey};
use crate::color::{normalize_sequence, RawFrame};
use crate::consts::MIN_FUSION_FRAMES;
use crate::error::Result;
use crate::frame::{Frame, Mask};
use crate::fusion::{
    average, fuse_with_average, FusionOutput, FusionPrimitives, MergeStatus, ReferencePrimitives,
};
use crate::store::{FrameSet, FrameStore};

use super::config::{AlignmentConfig, EngineConfig, MergeConfig};
use super::types::{LoadReport, MergeStage, NoOpReporter, ProgressReporter};

/// Owns the frame store and every cached intermediate result.
///
/// All mutation goes through `&mut self`, so nothing can change the frames
/// while a merge reads them.
pub struct MergeSession {
    engine: EngineConfig,
    store: FrameStore,
    registrations: ResultCache<Arc<Registration>>,
    averages: ResultCache<Option<Arc<Frame>>>,
    outputs: ResultCache<Arc<FusionOutput>>,
    primitives: Arc<dyn FusionPrimitives>,
}

impl MergeSession {
    pub fn new(engine: EngineConfig) -> Self {
        Self::with_primitives(engine, Arc::new(ReferencePrimitives))
    }

    pub fn with_primitives(engine: EngineConfig, primitives: Arc<dyn FusionPrimitives>) -> Self {
        Self {
            engine,
            store: FrameStore::new(),
            registrations: ResultCache::new(),
            averages: ResultCache::new(),
            outputs: ResultCache::new(),
            primitives,
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Number of cached registrations, averages and outputs.
    pub fn cached_entries(&self) -> usize {
        self.registrations.len() + self.averages.len() + self.outputs.len()
    }

    fn clear_caches(&mut self) {
        self.registrations.clear();
        self.averages.clear();
        self.outputs.clear();
    }

    /// Normalizes and stores a new frame sequence, replacing the previous
    /// one. With fewer than two usable frames the store is left empty.
    pub fn load(&mut self, raws: &[RawFrame]) -> LoadReport {
        self.load_reported(raws, &NoOpReporter)
    }

    pub fn load_reported(&mut self, raws: &[RawFrame], reporter: &dyn ProgressReporter) -> LoadReport {
        reporter.begin_stage(MergeStage::Loading, Some(raws.len()));
        let frames = normalize_sequence(raws, self.engine.depth);
        let decoded = frames.len();
        self.clear_caches();

        if decoded >= MIN_FUSION_FRAMES {
            self.store.replace(frames, self.engine.preview_max_dim);
        } else {
            warn!(decoded, "Not enough usable frames, store left empty");
            self.store.clear();
        }
        reporter.advance(raws.len());
        reporter.finish_stage();

        LoadReport {
            decoded,
            skipped: raws.len() - decoded,
            generation: self.store.generation(),
        }
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.clear_caches();
    }

    /// Replaces the mask and drops every result computed with the old one.
    pub fn set_mask(&mut self, mask: Mask) -> Result<()> {
        self.store.set_mask(mask)?;
        self.invalidate_mask_dependent();
        Ok(())
    }

    pub fn clear_mask(&mut self) {
        if self.store.clear_mask() {
            self.invalidate_mask_dependent();
        }
    }

    fn invalidate_mask_dependent(&mut self) {
        let dropped = self.registrations.invalidate_mask_dependent()
            + self.averages.invalidate_mask_dependent()
            + self.outputs.invalidate_mask_dependent();
        info!(dropped, version = self.store.mask_version(), "Mask changed");
    }

    fn mask_version_for(&self, use_mask: bool) -> Option<u64> {
        (use_mask && self.store.has_mask()).then(|| self.store.mask_version())
    }

    /// Registers the frames of `set` to frame 0, reusing a cached result
    /// when the same registration was already computed.
    pub fn align(
        &mut self,
        set: FrameSet,
        use_mask: bool,
        config: &AlignmentConfig,
    ) -> Arc<Registration> {
        self.align_reported(set, use_mask, config, &NoOpReporter)
    }

    fn align_reported(
        &mut self,
        set: FrameSet,
        use_mask: bool,
        config: &AlignmentConfig,
        reporter: &dyn ProgressReporter,
    ) -> Arc<Registration> {
        let mask_version = self.mask_version_for(use_mask);
        let key = CacheKey::new(set, StageKey::Aligned(config.clone()), mask_version);
        let store = &self.store;
        self.registrations.get_or_compute(key, || {
            let frames = store.frames(set);
            let mask = if use_mask { store.mask(set) } else { None };
            reporter.begin_stage(MergeStage::Aligning, Some(frames.len()));
            let start = Instant::now();
            let registration =
                align_frames_with_progress(frames, mask, config, |done| reporter.advance(done));
            reporter.finish_stage();
            info!(
                set = %set,
                aligned = registration.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Registration computed"
            );
            Arc::new(registration)
        })
    }

    /// Runs a merge request against one frame set.
    pub fn merge(&mut self, set: FrameSet, config: &MergeConfig) -> Arc<FusionOutput> {
        self.merge_reported(set, config, &NoOpReporter)
    }

    pub fn merge_reported(
        &mut self,
        set: FrameSet,
        config: &MergeConfig,
        reporter: &dyn ProgressReporter,
    ) -> Arc<FusionOutput> {
        let policy = &config.policy;
        let frame_count = self.store.frames(set).len();
        if frame_count < policy.min_frames() {
            warn!(policy = %policy, frames = frame_count, "Not enough images");
            return Arc::new(FusionOutput::failed(MergeStatus::NotEnoughImages, policy.label()));
        }

        let needs_alignment = config.needs_alignment();
        let aligned = needs_alignment.then(|| config.alignment.clone());
        let mask_version = if needs_alignment {
            self.mask_version_for(config.use_mask)
        } else {
            None
        };
        let key = CacheKey::new(
            set,
            StageKey::Fused {
                policy: policy.clone(),
                aligned: aligned.clone(),
            },
            mask_version,
        );
        if let Some(hit) = self.outputs.get(&key) {
            info!(policy = %policy, "Using cached merge result");
            return hit;
        }

        let registration = if needs_alignment {
            let reg = self.align_reported(set, config.use_mask, &config.alignment, reporter);
            if !reg.is_aligned() {
                warn!(aligned = reg.len(), "Failed to align images");
                let out = Arc::new(FusionOutput::failed(MergeStatus::AlignmentFailed, policy.label()));
                return self.outputs.get_or_compute(key, || out);
            }
            Some(reg)
        } else {
            None
        };

        let frames: &[Frame] = match &registration {
            Some(reg) => &reg.frames,
            None => self.store.frames(set),
        };

        let avg = if policy.uses_average() {
            let avg_key = CacheKey::new(set, StageKey::Average { aligned }, mask_version);
            self.averages.get_or_compute(avg_key, || {
                reporter.begin_stage(MergeStage::Averaging, None);
                let a = average(frames).map(Arc::new);
                reporter.finish_stage();
                a
            })
        } else {
            None
        };

        let primitives = Arc::clone(&self.primitives);
        self.outputs.get_or_compute(key, || {
            reporter.begin_stage(MergeStage::Fusing, None);
            let out = fuse_with_average(frames, policy, primitives.as_ref(), avg.as_deref());
            reporter.finish_stage();
            Arc::new(out)
        })
    }
}

impl Default for MergeSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

