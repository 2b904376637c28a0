//! Named units of screen-space shader logic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::blend::{BlendFunction, BlendMode};
use crate::renderer::{DepthPacking, Renderer, TargetId, TextureId};
use crate::uniform::UniformValue;

bitflags! {
    /// Capability flags declared by an effect.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EffectAttributes: u32 {
        /// The effect wants access to a depth texture.
        const DEPTH = 1 << 0;
        /// The effect samples neighboring texels. At most one convolution
        /// effect may participate in a fusion, and UV-remapping effects are
        /// incompatible with it.
        const CONVOLUTION = 1 << 1;
    }
}

impl EffectAttributes {
    /// Fusion ordering priority; higher priorities execute first.
    pub fn priority(self) -> u8 {
        if self.contains(EffectAttributes::CONVOLUTION) {
            2
        } else if self.contains(EffectAttributes::DEPTH) {
            1
        } else {
            0
        }
    }
}

/// Per-frame callback invoked before the owning pass draws, even when the
/// fusion currently produces no visible output. `TargetId` is the frame's
/// input buffer; the reference must not be retained across frames.
pub type UpdateHook = Box<dyn FnMut(&mut dyn Renderer, TargetId, f32) + Send>;

/// A self-contained unit of per-pixel color computation and/or UV remapping.
///
/// The fragment snippet must define at least one of the two recognized entry
/// conventions:
///
/// ```glsl
/// vec4 mainImage(const in vec4 inputColor, const in vec2 uv)
/// vec4 mainImage(const in vec4 inputColor, const in vec2 uv, const in float depth)
/// void mainUv(inout vec2 uv)
/// ```
///
/// An optional vertex snippet may define `void mainSupport(const in vec2 uv)`
/// plus `varying` declarations; a varying read by the fragment snippet must
/// be declared in both snippets under the same name.
///
/// Effects are immutable in shape after construction: only uniform *values*
/// and the blend mode may change afterwards, and blend *function* changes
/// require the owning pass to recompile.
pub struct Effect {
    name: String,
    fragment_snippet: String,
    vertex_snippet: Option<String>,
    macros: BTreeMap<String, String>,
    uniforms: BTreeMap<String, UniformValue>,
    attributes: EffectAttributes,
    extensions: BTreeSet<String>,
    blend_mode: BlendMode,
    update_hook: Option<UpdateHook>,
    depth_texture: Option<(TextureId, DepthPacking)>,
}

impl Effect {
    pub fn builder(name: impl Into<String>) -> EffectBuilder {
        EffectBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragment_snippet(&self) -> &str {
        &self.fragment_snippet
    }

    pub fn vertex_snippet(&self) -> Option<&str> {
        self.vertex_snippet.as_deref()
    }

    pub fn macros(&self) -> &BTreeMap<String, String> {
        &self.macros
    }

    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Update the value of an existing uniform. Returns false (and logs) if
    /// the effect never declared it; the uniform set is part of the effect's
    /// immutable shape.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        match self.uniforms.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                log::warn!("effect '{}' has no uniform '{}'", self.name, name);
                false
            }
        }
    }

    pub fn attributes(&self) -> EffectAttributes {
        self.attributes
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Mutable blend mode access. Opacity changes apply on the next frame;
    /// function changes only take effect after the owning pass recompiles.
    pub fn blend_mode_mut(&mut self) -> &mut BlendMode {
        &mut self.blend_mode
    }

    pub fn set_blend_opacity(&mut self, opacity: f32) {
        self.blend_mode.opacity = opacity;
    }

    /// Shared depth texture, present once the owning pass received one and
    /// this effect declares [`EffectAttributes::DEPTH`].
    pub fn depth_texture(&self) -> Option<(TextureId, DepthPacking)> {
        self.depth_texture
    }

    pub(crate) fn set_depth_texture(&mut self, texture: Option<(TextureId, DepthPacking)>) {
        self.depth_texture = texture;
    }

    /// Run the per-frame update hook, if any.
    pub fn update(&mut self, renderer: &mut dyn Renderer, input: TargetId, delta: f32) {
        if let Some(hook) = &mut self.update_hook {
            hook(renderer, input, delta);
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("blend_mode", &self.blend_mode)
            .field("uniforms", &self.uniforms.keys().collect::<Vec<_>>())
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Effect`].
pub struct EffectBuilder {
    name: String,
    fragment_snippet: String,
    vertex_snippet: Option<String>,
    macros: BTreeMap<String, String>,
    uniforms: BTreeMap<String, UniformValue>,
    attributes: EffectAttributes,
    extensions: BTreeSet<String>,
    blend_mode: BlendMode,
    update_hook: Option<UpdateHook>,
}

impl EffectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment_snippet: String::new(),
            vertex_snippet: None,
            macros: BTreeMap::new(),
            uniforms: BTreeMap::new(),
            attributes: EffectAttributes::empty(),
            extensions: BTreeSet::new(),
            blend_mode: BlendMode::default(),
            update_hook: None,
        }
    }

    /// Required color-computation snippet (`mainImage` and/or `mainUv`).
    pub fn fragment(mut self, snippet: impl Into<String>) -> Self {
        self.fragment_snippet = snippet.into();
        self
    }

    /// Optional vertex-support snippet (`mainSupport` plus varyings).
    pub fn vertex(mut self, snippet: impl Into<String>) -> Self {
        self.vertex_snippet = Some(snippet.into());
        self
    }

    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(name.into(), value.into());
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: EffectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Require a GPU feature extension (e.g. `GL_OES_standard_derivatives`).
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    pub fn blend(mut self, function: BlendFunction) -> Self {
        self.blend_mode.function = function;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.blend_mode.opacity = opacity;
        self
    }

    pub fn update_hook(mut self, hook: UpdateHook) -> Self {
        self.update_hook = Some(hook);
        self
    }

    pub fn build(self) -> Effect {
        Effect {
            name: self.name,
            fragment_snippet: self.fragment_snippet,
            vertex_snippet: self.vertex_snippet,
            macros: self.macros,
            uniforms: self.uniforms,
            attributes: self.attributes,
            extensions: self.extensions,
            blend_mode: self.blend_mode,
            update_hook: self.update_hook,
            depth_texture: None,
        }
    }
}
