pub mod luma;
pub mod normalize;

pub use luma::{luma_f32, normalized_gray};
pub use normalize::{
    convert_depth, normalize_frame, normalize_sequence, unify_depth, PixelLayout, RawFrame,
    WorkingDepth,
};
