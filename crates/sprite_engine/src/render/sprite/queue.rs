//! Queued sprite draws

use super::registry::TextureHandle;
use crate::foundation::math::{Color, Rect};

/// One sprite draw request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Texture to sample
    pub texture: TextureHandle,
    /// Source region in texture pixels; zero area means the whole texture
    pub src: Rect,
    /// Destination in screen pixels
    pub dst: Rect,
    /// Rotation around the destination center, in radians
    pub rotation: f32,
    /// Tint multiplied with the sampled color
    pub color: Color,
}

/// Draw requests for the current frame, in submission order
#[derive(Debug, Default)]
pub struct DrawQueue {
    commands: Vec<DrawCommand>,
}

impl DrawQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a draw
    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Queued draws, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter()
    }

    /// Number of queued draws
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every queued draw, keeping the allocation
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(raw: u32) -> DrawCommand {
        DrawCommand {
            texture: TextureHandle::from_raw(raw),
            src: Rect::ZERO,
            dst: Rect::new(0.0, 0.0, 10.0, 10.0),
            rotation: 0.0,
            color: Color::WHITE,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = DrawQueue::new();
        for raw in [3, 1, 2] {
            queue.push(command(raw));
        }
        let order: Vec<u32> = queue.iter().map(|c| c.texture.raw()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_clear() {
        let mut queue = DrawQueue::new();
        queue.push(command(1));
        queue.clear();
        assert!(queue.is_empty());
    }
}
