//! Sprite batching
//!
//! [`SpriteBatch`] holds the texture registry and the frame's draw queue and
//! turns the queue into draws against a [`SpriteTarget`]. It knows nothing
//! about Vulkan; the renderer supplies a target that records into the frame's
//! command buffer.

use super::push::{normalized_source, SpritePushConstants};
use super::queue::{DrawCommand, DrawQueue};
use super::registry::{TextureHandle, TextureRegistry};
use crate::render::backends::vulkan::VulkanResult;

/// Where batched sprites are drawn
pub trait SpriteTarget {
    /// Per-texture resource the target binds for a draw
    type Texture;

    /// Write the current screen size into this frame slot's uniform
    fn update_screen_size(&mut self) -> VulkanResult<()>;

    /// Bind the pipeline, shared quad, and per-frame set once per batch
    fn bind_shared(&mut self);

    /// Bind `texture` and issue one indexed draw with `push`
    fn draw_sprite(&mut self, texture: &Self::Texture, push: &SpritePushConstants);
}

/// Textures plus the draws queued for the next frame
#[derive(Debug)]
pub struct SpriteBatch<T> {
    textures: TextureRegistry<T>,
    queue: DrawQueue,
}

impl<T> SpriteBatch<T> {
    /// Empty batch
    pub fn new() -> Self {
        Self {
            textures: TextureRegistry::new(),
            queue: DrawQueue::new(),
        }
    }

    /// Register a texture of `width` x `height` pixels
    pub fn add_texture(&mut self, texture: T, width: u32, height: u32) -> TextureHandle {
        self.textures.insert(texture, width, height)
    }

    /// Pixel size of a live texture
    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.size(handle)
    }

    /// Queue a draw. Nothing touches the GPU until [`flush`](Self::flush).
    pub fn queue(&mut self, command: DrawCommand) {
        self.queue.push(command);
    }

    /// Number of draws waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Draw the queue into `target`, or discard it when the frame was skipped.
    ///
    /// The queue is empty afterwards either way. Returns the number of draws
    /// issued.
    pub fn flush<S>(&mut self, target: Option<&mut S>) -> VulkanResult<usize>
    where
        S: SpriteTarget<Texture = T>,
    {
        let result = match target {
            Some(target) => record_batch(target, &self.queue, &self.textures),
            None => Ok(0),
        };
        self.queue.clear();
        result
    }

    /// Drop queued draws without drawing them
    pub fn discard_pending(&mut self) {
        self.queue.clear();
    }

    /// Drop every texture
    pub fn clear_textures(&mut self) {
        self.textures.clear();
    }
}

impl<T> Default for SpriteBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Issue one draw per queued command whose texture is live, in queue order
pub fn record_batch<S: SpriteTarget>(
    target: &mut S,
    queue: &DrawQueue,
    textures: &TextureRegistry<S::Texture>,
) -> VulkanResult<usize> {
    target.update_screen_size()?;
    target.bind_shared();

    let mut drawn = 0;
    for command in queue.iter() {
        let Some(texture) = textures.get(command.texture) else {
            log::debug!("Skipping draw with unknown texture handle {}", command.texture.raw());
            continue;
        };

        let push = SpritePushConstants {
            src_rect: normalized_source(&command.src, texture.width, texture.height),
            dst_rect: command.dst.to_array(),
            rotation: command.rotation,
            _padding: [0.0; 3],
            color: command.color.to_array(),
        };
        target.draw_sprite(&texture.resource, &push);
        drawn += 1;
    }
    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Color, Rect};

    #[derive(Default)]
    struct RecordingTarget {
        screen_updates: usize,
        binds: usize,
        draws: Vec<(&'static str, SpritePushConstants)>,
    }

    impl SpriteTarget for RecordingTarget {
        type Texture = &'static str;

        fn update_screen_size(&mut self) -> VulkanResult<()> {
            self.screen_updates += 1;
            Ok(())
        }

        fn bind_shared(&mut self) {
            self.binds += 1;
        }

        fn draw_sprite(&mut self, texture: &Self::Texture, push: &SpritePushConstants) {
            self.draws.push((*texture, *push));
        }
    }

    fn draw(texture: TextureHandle, src: Rect, dst: Rect) -> DrawCommand {
        DrawCommand {
            texture,
            src,
            dst,
            rotation: 0.0,
            color: Color::WHITE,
        }
    }

    #[test]
    fn test_full_texture_draw_scenario() {
        let mut batch = SpriteBatch::new();
        let a = batch.add_texture("A", 64, 64);
        batch.queue(draw(a, Rect::ZERO, Rect::new(0.0, 0.0, 32.0, 32.0)));

        let mut target = RecordingTarget::default();
        assert_eq!(batch.flush(Some(&mut target)).unwrap(), 1);

        let (texture, push) = target.draws[0];
        assert_eq!(texture, "A");
        assert_eq!(push.src_rect, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(push.dst_rect, [0.0, 0.0, 32.0, 32.0]);
        assert_eq!(push.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!((target.screen_updates, target.binds), (1, 1));
    }

    #[test]
    fn test_unknown_handle_draws_nothing() {
        let mut batch: SpriteBatch<&'static str> = SpriteBatch::new();
        batch.queue(draw(TextureHandle::from_raw(999), Rect::ZERO, Rect::new(0.0, 0.0, 8.0, 8.0)));

        let mut target = RecordingTarget::default();
        assert_eq!(batch.flush(Some(&mut target)).unwrap(), 0);
        assert!(target.draws.is_empty());
    }

    #[test]
    fn test_fifo_order_with_stale_handles_skipped() {
        let mut batch = SpriteBatch::new();
        let a = batch.add_texture("A", 16, 16);
        let b = batch.add_texture("B", 16, 16);
        let dst = Rect::new(0.0, 0.0, 4.0, 4.0);
        batch.queue(draw(b, Rect::ZERO, dst));
        batch.queue(draw(TextureHandle::INVALID, Rect::ZERO, dst));
        batch.queue(draw(a, Rect::ZERO, dst));
        batch.queue(draw(TextureHandle::from_raw(77), Rect::ZERO, dst));
        batch.queue(draw(b, Rect::ZERO, dst));

        let mut target = RecordingTarget::default();
        assert_eq!(batch.flush(Some(&mut target)).unwrap(), 3);
        let order: Vec<&str> = target.draws.iter().map(|(texture, _)| *texture).collect();
        assert_eq!(order, vec!["B", "A", "B"]);
    }

    #[test]
    fn test_source_rect_normalized_per_texture() {
        let mut batch = SpriteBatch::new();
        let sheet = batch.add_texture("sheet", 128, 64);
        batch.queue(draw(sheet, Rect::new(32.0, 16.0, 32.0, 32.0), Rect::new(10.0, 20.0, 64.0, 64.0)));

        let mut target = RecordingTarget::default();
        batch.flush(Some(&mut target)).unwrap();
        assert_eq!(target.draws[0].1.src_rect, [0.25, 0.25, 0.25, 0.5]);
        assert_eq!(target.draws[0].1.dst_rect, [10.0, 20.0, 64.0, 64.0]);
    }

    #[test]
    fn test_queue_cleared_after_every_flush() {
        let mut batch = SpriteBatch::new();
        let a = batch.add_texture("A", 8, 8);
        let mut target = RecordingTarget::default();

        batch.queue(draw(a, Rect::ZERO, Rect::new(0.0, 0.0, 1.0, 1.0)));
        batch.flush(Some(&mut target)).unwrap();
        assert_eq!(batch.pending(), 0);
        batch.flush(Some(&mut target)).unwrap();
        assert_eq!(target.draws.len(), 1);
    }

    #[test]
    fn test_skipped_frames_do_not_accumulate() {
        let mut batch = SpriteBatch::new();
        let a = batch.add_texture("A", 8, 8);

        // Every frame is skipped, as while the swapchain keeps reporting out of date
        for _ in 0..100 {
            for _ in 0..3 {
                batch.queue(draw(a, Rect::ZERO, Rect::new(0.0, 0.0, 1.0, 1.0)));
            }
            assert!(batch.pending() <= 3);
            assert_eq!(batch.flush::<RecordingTarget>(None).unwrap(), 0);
            assert_eq!(batch.pending(), 0);
        }
    }
}
