//! Sprite batching and the Vulkan sprite renderer

pub mod batch;
pub mod push;
pub mod queue;
pub mod registry;
pub mod renderer;

pub use batch::{record_batch, SpriteBatch, SpriteTarget};
pub use push::{normalized_source, QuadVertex, ScreenSizeUniform, SpritePushConstants};
pub use queue::{DrawCommand, DrawQueue};
pub use registry::{RegisteredTexture, TextureHandle, TextureRegistry};
pub use renderer::{SpriteBatchRenderer, Texture};
