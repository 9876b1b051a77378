use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Raw buffer holds {actual} samples, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Unsupported pixel layout: {channels} channel(s) at {bits} bit(s)")]
    UnsupportedLayout { channels: usize, bits: u8 },

    #[error("Frame {index} does not match the reference geometry")]
    GeometryMismatch { index: usize },

    #[error("Mask is {mask_width}x{mask_height}, reference frame is {width}x{height}")]
    MaskMismatch {
        mask_width: usize,
        mask_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Not enough frames: {required} required, {provided} provided")]
    NotEnoughFrames { required: usize, provided: usize },

    #[error("Too few feature matches: {found} (need {required})")]
    TooFewMatches { found: usize, required: usize },

    #[error("Degenerate transform: {0}")]
    DegenerateTransform(String),

    #[error("Warp produced an empty image")]
    EmptyWarp,

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Merge worker is no longer running")]
    WorkerDisconnected,
}

pub type Result<T> = std::result::Result<T, MergeError>;
