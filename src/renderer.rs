//! Abstract rendering backend interface.
//!
//! The compositing pipeline never talks to a graphics API directly. A backend
//! supplies the one primitive the pipeline needs — "draw a full-screen
//! triangle with program Y into target X, sampling input buffer Z" — plus
//! resource lifecycle for targets, programs and depth textures. Everything
//! else (bind groups, command encoding, swapchains) stays on the backend's
//! side of this trait.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::uniform::UniformValue;

/// Handle to an off-screen render target owned by the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// Handle to a compiled shader program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// Handle to a standalone texture (currently only depth textures).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

/// Color storage format for render targets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    #[default]
    Rgba8,
    Rgba16Float,
}

/// How depth values are stored in a depth texture.
///
/// `Rgba` packs the depth value into the four 8-bit channels of a color
/// texture for backends without native depth sampling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthPacking {
    #[default]
    Basic,
    Rgba,
}

impl DepthPacking {
    /// Integer value pushed to the `depthPacking` shader uniform.
    pub fn shader_value(self) -> i32 {
        match self {
            DepthPacking::Basic => 0,
            DepthPacking::Rgba => 1,
        }
    }
}

/// Creation parameters for a render target.
#[derive(Clone, Debug)]
pub struct TargetDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: bool,
    pub stencil: bool,
    pub format: ColorFormat,
}

/// Stencil behavior for a single draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StencilMode {
    /// No stencil test or write.
    Disabled,
    /// Write `reference` into the stencil buffer wherever fragments land.
    Write { reference: u8 },
    /// Draw only where the stencil buffer equals `reference`.
    TestEqual { reference: u8 },
    /// Draw only where the stencil buffer differs from `reference`.
    TestNotEqual { reference: u8 },
}

/// Per-draw options for [`Renderer::draw`].
#[derive(Copy, Clone, Debug)]
pub struct DrawOptions {
    pub stencil: StencilMode,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            stencil: StencilMode::Disabled,
        }
    }
}

/// Backend resource limits relevant to fused programs.
///
/// Exceeding these is a soft condition: the backend may silently ignore
/// overflowing uniforms, so the pipeline only warns about it.
#[derive(Copy, Clone, Debug)]
pub struct RendererLimits {
    pub max_fragment_uniforms: usize,
    pub max_varyings: usize,
}

impl Default for RendererLimits {
    fn default() -> Self {
        // WebGL2 guaranteed minimums.
        Self {
            max_fragment_uniforms: 224,
            max_varyings: 15,
        }
    }
}

/// Shader sources and macro definitions handed to the backend for
/// compilation. Macros become `#define NAME VALUE` lines, in map order.
#[derive(Clone, Debug, Default)]
pub struct ProgramSource {
    pub vertex_source: String,
    pub fragment_source: String,
    pub macros: BTreeMap<String, String>,
}

/// The rendering backend the compositing pipeline runs against.
///
/// All methods are synchronous from the caller's perspective; command
/// submission happens in strict call order.
pub trait Renderer {
    /// Native size of the drawing buffer, in physical pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    /// Backend resource limits.
    fn limits(&self) -> RendererLimits {
        RendererLimits::default()
    }

    /// Whether the backend's output surface carries an alpha channel.
    fn uses_alpha(&self) -> bool {
        false
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> TargetId;
    fn resize_target(&mut self, target: TargetId, width: u32, height: u32);
    fn destroy_target(&mut self, target: TargetId);

    /// Attach (or detach, with `None`) a shared depth texture to a target so
    /// the target's depth output lands in that texture.
    fn attach_depth_texture(&mut self, target: TargetId, texture: Option<TextureId>);

    fn create_depth_texture(&mut self, width: u32, height: u32, packing: DepthPacking) -> TextureId;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_program(&mut self, source: &ProgramSource) -> ProgramId;
    fn destroy_program(&mut self, program: ProgramId);

    /// Set a named uniform on a program. Unknown names are ignored by the
    /// backend (the program may have optimized them out).
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue);

    /// Clear attachments of a target (`None` clears the screen).
    fn clear(
        &mut self,
        target: Option<TargetId>,
        color: Option<[f32; 4]>,
        depth: bool,
        stencil: Option<u8>,
    );

    /// Draw one full-screen triangle with `program` into `output` (`None`
    /// draws to the screen), with `input` bound to the program's well-known
    /// `inputBuffer` sampler.
    fn draw(
        &mut self,
        program: ProgramId,
        input: Option<TargetId>,
        output: Option<TargetId>,
        options: &DrawOptions,
    );
}

/// Black-box 3D scene renderer.
///
/// The compositing pipeline only ever asks a scene to draw itself into a
/// given target; geometry, cameras and materials live entirely behind this
/// trait.
pub trait Scene {
    fn draw(&mut self, renderer: &mut dyn Renderer, target: Option<TargetId>, options: &DrawOptions);
}
