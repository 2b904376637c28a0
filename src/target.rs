//! Resizable 2D render targets.

use crate::renderer::{Renderer, TargetDescriptor, TargetId, TextureId};

/// An off-screen pixel buffer with optional depth/stencil attachments.
///
/// A target is exclusively owned by whichever component created it — the
/// composer for the ping-pong pair, or an individual pass for private
/// intermediate buffers. The owner resizes and disposes it through the
/// renderer that allocated it.
#[derive(Debug)]
pub struct RenderTarget {
    pub id: TargetId,
    width: u32,
    height: u32,
    depth: bool,
    stencil: bool,
    depth_texture: Option<TextureId>,
}

impl RenderTarget {
    pub fn new(renderer: &mut dyn Renderer, desc: &TargetDescriptor) -> Self {
        let width = desc.width.max(1);
        let height = desc.height.max(1);
        let desc = TargetDescriptor {
            width,
            height,
            ..desc.clone()
        };
        let id = renderer.create_target(&desc);
        Self {
            id,
            width,
            height,
            depth: desc.depth,
            stencil: desc.stencil,
            depth_texture: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_depth(&self) -> bool {
        self.depth
    }

    pub fn has_stencil(&self) -> bool {
        self.stencil
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth_texture
    }

    pub fn resize(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        renderer.resize_target(self.id, width, height);
    }

    /// Attach or detach a shared depth texture.
    pub fn set_depth_texture(&mut self, renderer: &mut dyn Renderer, texture: Option<TextureId>) {
        if self.depth_texture == texture {
            return;
        }
        self.depth_texture = texture;
        renderer.attach_depth_texture(self.id, texture);
    }

    /// Release the backend allocation. Using the target afterwards is a
    /// programming error.
    pub fn dispose(&self, renderer: &mut dyn Renderer) {
        renderer.destroy_target(self.id);
    }
}
