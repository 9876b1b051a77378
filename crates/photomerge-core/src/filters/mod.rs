pub mod gaussian_blur;
pub mod pyramid;
pub mod resize;
pub mod sample;
