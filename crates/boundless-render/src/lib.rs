//! Boundless Render Library
//!
//! Renderer abstraction and frame planning for the Boundless infinite canvas.
//! The default implementation uses Vello for GPU-accelerated rendering.

pub mod navigation;
mod renderer;
pub mod visible;

#[cfg(feature = "vello-renderer")]
mod vello_impl;

pub use navigation::NavigationTracker;
pub use renderer::{FrameStats, RenderContext, Renderer};
pub use visible::{VisiblePlan, plan_visible};

#[cfg(feature = "vello-renderer")]
pub use vello_impl::VelloRenderer;
