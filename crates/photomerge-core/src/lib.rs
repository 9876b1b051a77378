pub mod align;
pub mod cache;
pub mod color;
pub mod consts;
pub mod error;
pub mod filters;
pub mod frame;
pub mod fusion;
pub mod pipeline;
pub mod store;
