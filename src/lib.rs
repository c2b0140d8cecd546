mod config;
mod error;
mod framebuffer;
mod geometry;
mod mirror;
mod model;

#[cfg(feature = "dispmanx")]
mod dispmanx;

pub use config::*;
pub use error::*;
pub use framebuffer::*;
pub use geometry::*;
pub use mirror::*;
pub use model::*;

#[cfg(feature = "dispmanx")]
pub use dispmanx::*;
