//! Texture handles
//!
//! Handles are issued from a counter that starts at 1 and never goes back, so
//! a handle is never reused within a run and 0 always means "no texture".

use std::collections::HashMap;

/// Opaque reference to a texture created by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    /// Never issued
    pub const INVALID: Self = Self(0);

    /// Wrap a raw value. Values never issued by a registry resolve to nothing.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved invalid handle
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

/// A registered texture resource and its pixel size
#[derive(Debug)]
pub struct RegisteredTexture<T> {
    /// The backing resource
    pub resource: T,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Maps handles to texture resources
#[derive(Debug)]
pub struct TextureRegistry<T> {
    textures: HashMap<TextureHandle, RegisteredTexture<T>>,
    next: u32,
}

impl<T> TextureRegistry<T> {
    /// Empty registry; the first handle issued is 1
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next: 1,
        }
    }

    /// Register `resource` and issue a fresh handle
    pub fn insert(&mut self, resource: T, width: u32, height: u32) -> TextureHandle {
        let handle = TextureHandle(self.next);
        self.next = self
            .next
            .checked_add(1)
            .unwrap_or_else(|| panic!("texture handle space exhausted"));
        self.textures.insert(
            handle,
            RegisteredTexture {
                resource,
                width,
                height,
            },
        );
        handle
    }

    /// Look up a live texture
    pub fn get(&self, handle: TextureHandle) -> Option<&RegisteredTexture<T>> {
        self.textures.get(&handle)
    }

    /// Pixel size of a live texture
    pub fn size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.get(handle).map(|texture| (texture.width, texture.height))
    }

    /// Number of live textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no textures are live
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Drop every texture; issued handles stay retired
    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

impl<T> Default for TextureRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_strictly_increasing_and_nonzero() {
        let mut registry = TextureRegistry::new();
        let mut previous = TextureHandle::INVALID;
        for i in 0..50 {
            let handle = registry.insert(i, 1, 1);
            assert!(!handle.is_invalid());
            assert!(handle > previous);
            previous = handle;
        }
        assert_eq!(registry.len(), 50);
    }

    #[test]
    fn test_handles_not_reused_after_clear() {
        let mut registry = TextureRegistry::new();
        let a = registry.insert("a", 4, 4);
        let b = registry.insert("b", 4, 4);

        registry.clear();
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_none());
        let c = registry.insert("c", 4, 4);
        assert!(c > b);
        assert!(registry.get(a).is_none());
    }

    #[test]
    fn test_unknown_handle_resolves_to_nothing() {
        let mut registry = TextureRegistry::new();
        registry.insert((), 64, 32);
        assert!(registry.get(TextureHandle::from_raw(999)).is_none());
        assert!(registry.get(TextureHandle::INVALID).is_none());
        assert_eq!(registry.size(TextureHandle::from_raw(1)), Some((64, 32)));
    }
}
