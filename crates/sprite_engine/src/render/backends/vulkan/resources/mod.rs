//! Vulkan resource management
//!
//! Buffers, images, views, and samplers backed by allocator memory, plus the
//! format and layout tables they rely on.

/// Buffers in device-local or host-visible memory
pub mod buffer;

/// File-to-pixels decoding with placeholder fallback
pub mod decoder;

/// Format to aspect classification
pub mod format;

/// Images with tracked layouts
pub mod image;

/// Image view wrapper
pub mod image_view;

/// Sampler wrapper
pub mod sampler;

/// Layout transition table and barrier recording
pub mod transition;

pub use buffer::{GpuBuffer, MappingOwner, MemoryClass};
pub use decoder::{decode_with_fallback, DecodeError, DecodedImage, FileImageDecoder, ImageDecoder};
pub use format::{aspect_for_format, is_depth_format};
pub use image::{GpuImage, TEXTURE_FORMAT};
pub use image_view::ImageView;
pub use sampler::Sampler;
pub use transition::{record_layout_barrier, transition_masks, TransitionMasks};
