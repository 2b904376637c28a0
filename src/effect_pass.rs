//! A pass executing a fused group of effects as one full-screen draw.

use crate::effect::{Effect, EffectAttributes};
use crate::fusion::{self, CompoundProgram};
use crate::pass::{copy_program_source, resolution_uniforms, stencil_for, MaskAction, Pass};
use crate::renderer::{DepthPacking, DrawOptions, ProgramId, Renderer, TextureId};
use crate::target::RenderTarget;
use crate::uniform::UniformValue;

/// Wraps the fusion engine's compound program in the pass contract.
///
/// The constituent effects are fused once at construction. Changing an
/// effect's uniform values or blend opacity needs no further action; adding
/// or removing effects, or changing an effect's macros or blend *function*,
/// requires [`EffectPass::recompile`].
pub struct EffectPass {
    name: String,
    enabled: bool,
    render_to_screen: bool,
    effects: Vec<Effect>,
    program: Option<CompoundProgram>,
    program_id: Option<ProgramId>,
    fallback_copy: Option<ProgramId>,
    swap_this_frame: bool,
    depth_texture: Option<(TextureId, DepthPacking)>,
    width: u32,
    height: u32,
    time: f32,
    initialized: bool,
    disposed: bool,
}

impl EffectPass {
    pub fn new(name: impl Into<String>, effects: Vec<Effect>) -> Self {
        let program = fusion::fuse(&effects);
        Self {
            name: name.into(),
            enabled: true,
            render_to_screen: false,
            effects,
            program,
            program_id: None,
            fallback_copy: None,
            swap_this_frame: true,
            depth_texture: None,
            width: 1,
            height: 1,
            time: 0.0,
            initialized: false,
            disposed: false,
        }
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Mutable access to the constituent effects. Shape-affecting changes
    /// (macros, blend function) must be followed by [`EffectPass::recompile`].
    pub fn effects_mut(&mut self) -> &mut [Effect] {
        &mut self.effects
    }

    /// The current fusion result; `None` when no effect survived fusion.
    pub fn compound_program(&self) -> Option<&CompoundProgram> {
        self.program.as_ref()
    }

    /// Re-fuse the effect list and rebuild the backend program.
    ///
    /// Externally visible state — current resolution, bound depth texture
    /// and packing — carries over to the new program.
    pub fn recompile(&mut self, renderer: &mut dyn Renderer) {
        if let Some(id) = self.program_id.take() {
            renderer.destroy_program(id);
        }
        self.program = fusion::fuse(&self.effects);
        if self.initialized {
            self.create_backend_program(renderer);
        }
    }

    fn create_backend_program(&mut self, renderer: &mut dyn Renderer) {
        let Some(program) = &self.program else {
            return;
        };

        let limits = renderer.limits();
        if program.uniform_count > limits.max_fragment_uniforms {
            log::warn!(
                "effect pass '{}' uses {} uniforms, backend limit is {}; some effects may be ignored",
                self.name,
                program.uniform_count,
                limits.max_fragment_uniforms
            );
        }
        if program.varying_count > limits.max_varyings {
            log::warn!(
                "effect pass '{}' uses {} varyings, backend limit is {}; some effects may be ignored",
                self.name,
                program.varying_count,
                limits.max_varyings
            );
        }

        let id = renderer.create_program(&program.source());
        for (name, value) in &program.uniforms {
            renderer.set_uniform(id, name, value);
        }
        resolution_uniforms(renderer, id, self.width, self.height);
        if let Some((texture, packing)) = self.depth_texture {
            renderer.set_uniform(id, "depthBuffer", &UniformValue::Texture(texture));
            renderer.set_uniform(id, "depthPacking", &UniformValue::Int(packing.shader_value()));
        }
        self.program_id = Some(id);
    }

    /// Push mutable per-frame state: user-mutated uniform values, blend
    /// opacities and the running time.
    fn upload_frame_uniforms(&mut self, renderer: &mut dyn Renderer, id: ProgramId) {
        if let Some(program) = &self.program {
            for binding in &program.uniform_bindings {
                if let Some(value) = self.effects[binding.effect_index].uniform(&binding.local_name)
                {
                    renderer.set_uniform(id, &binding.program_name, value);
                }
            }
            for binding in &program.opacity_bindings {
                let opacity = self.effects[binding.effect_index].blend_mode().opacity;
                renderer.set_uniform(id, &binding.program_name, &UniformValue::Float(opacity));
            }
        }
        renderer.set_uniform(id, "time", &UniformValue::Float(self.time));
    }
}

impl Pass for EffectPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn needs_swap(&self) -> bool {
        self.swap_this_frame
    }

    fn needs_depth_texture(&self) -> bool {
        self.program.as_ref().is_some_and(|p| p.needs_depth)
    }

    fn render_to_screen(&self) -> bool {
        self.render_to_screen
    }

    fn set_render_to_screen(&mut self, value: bool) {
        self.render_to_screen = value;
    }

    fn mask_action(&self) -> MaskAction {
        MaskAction::None
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer, _alpha: bool) {
        if !self.initialized {
            self.create_backend_program(renderer);
            self.initialized = true;
        }
    }

    fn set_size(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        if let Some(id) = self.program_id {
            resolution_uniforms(renderer, id, self.width, self.height);
        }
    }

    fn set_depth_texture(
        &mut self,
        renderer: &mut dyn Renderer,
        texture: Option<TextureId>,
        packing: DepthPacking,
    ) {
        self.depth_texture = texture.map(|t| (t, packing));
        // Each DEPTH-attributed effect receives the texture as well, so it
        // can use it independently during its update hook.
        for effect in &mut self.effects {
            if effect.attributes().contains(EffectAttributes::DEPTH) {
                effect.set_depth_texture(self.depth_texture);
            }
        }
        if let (Some(id), Some((texture, packing))) = (self.program_id, self.depth_texture) {
            renderer.set_uniform(id, "depthBuffer", &UniformValue::Texture(texture));
            renderer.set_uniform(id, "depthPacking", &UniformValue::Int(packing.shader_value()));
        }
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        output: &RenderTarget,
        delta: f32,
        stencil_active: bool,
    ) {
        debug_assert!(!self.disposed, "render on a disposed pass");
        self.time += delta;

        // Update hooks run unconditionally, even when the fusion currently
        // produces no visible output: effects may do off-screen side-work
        // (e.g. building buffers other effects read).
        for effect in &mut self.effects {
            effect.update(renderer, input.id, delta);
        }

        let options = DrawOptions {
            stencil: stencil_for(stencil_active),
        };

        let Some(id) = self.program_id else {
            if self.render_to_screen {
                // The designated screen pass must still present the frame.
                if self.fallback_copy.is_none() {
                    self.fallback_copy = Some(renderer.create_program(&copy_program_source()));
                }
                if let Some(copy) = self.fallback_copy {
                    renderer.set_uniform(copy, "opacity", &UniformValue::Float(1.0));
                    renderer.draw(copy, Some(input.id), None, &options);
                }
                self.swap_this_frame = true;
            } else {
                self.swap_this_frame = false;
            }
            return;
        };
        self.swap_this_frame = true;

        self.upload_frame_uniforms(renderer, id);
        let destination = if self.render_to_screen {
            None
        } else {
            Some(output.id)
        };
        renderer.draw(id, Some(input.id), destination, &options);
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(id) = self.program_id.take() {
            renderer.destroy_program(id);
        }
        if let Some(copy) = self.fallback_copy.take() {
            renderer.destroy_program(copy);
        }
        self.disposed = true;
    }
}
