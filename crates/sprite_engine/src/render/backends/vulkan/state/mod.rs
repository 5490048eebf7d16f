//! Frame synchronization and the swapchain

pub mod swapchain;
pub mod sync;

pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, AcquireOutcome, PresentOutcome,
    SurfaceSwapchain,
};
pub use sync::{Fence, FrameSync, ImageFenceMap, Semaphore};
