//! Real-time screen-space compositing pipeline.
//!
//! Effects authored as independent shader snippets are fused into compound
//! programs at runtime to minimize full-screen passes; a composer schedules
//! the resulting pass list across two ping-pong buffers with stencil
//! masking, shared depth-texture propagation and screen output.

pub mod blend;
pub mod composer;
pub mod effect;
pub mod effect_pass;
pub mod fusion;
pub mod pass;
pub mod renderer;
pub mod shader_text;
pub mod target;
pub mod uniform;

pub use blend::{BlendFunction, BlendMode};
pub use composer::{Composer, ComposerOptions};
pub use effect::{Effect, EffectAttributes, EffectBuilder};
pub use effect_pass::EffectPass;
pub use fusion::{fuse, CompoundProgram};
pub use pass::{ClearMaskPass, ClearPass, MaskAction, MaskPass, Pass, RenderPass, SavePass, ShaderPass};
pub use renderer::{
    ColorFormat, DepthPacking, DrawOptions, ProgramId, ProgramSource, Renderer, RendererLimits,
    Scene, StencilMode, TargetDescriptor, TargetId, TextureId,
};
pub use target::RenderTarget;
pub use uniform::UniformValue;
