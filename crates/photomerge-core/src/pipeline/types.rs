use crate::consts::MIN_FUSION_FRAMES;

/// Processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStage {
    Loading,
    Aligning,
    Averaging,
    Fusing,
}

impl std::fmt::Display for MergeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading frames"),
            Self::Aligning => write!(f, "Aligning frames"),
            Self::Averaging => write!(f, "Averaging"),
            Self::Fusing => write!(f, "Merging"),
        }
    }
}

/// Thread-safe progress reporting for merges.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. frame count), if known.
    fn begin_stage(&self, _stage: MergeStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Outcome of loading a batch of decoded frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadReport {
    /// Frames that survived normalization.
    pub decoded: usize,
    /// Frames that were rejected.
    pub skipped: usize,
    pub generation: u64,
}

impl LoadReport {
    /// Whether the store now holds enough frames to merge.
    pub fn is_usable(&self) -> bool {
        self.decoded >= MIN_FUSION_FRAMES
    }
}
