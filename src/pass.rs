//! The pass scheduling contract and the stock passes.
//!
//! A pass is one GPU operation per frame under a uniform contract. The
//! composer owns the ordered pass list and the ping-pong buffers; a pass
//! must not retain the `input`/`output` references beyond a single `render`
//! call, since buffer identity changes at every swap.

use glam::Vec2;

use crate::renderer::{
    DepthPacking, DrawOptions, ProgramId, ProgramSource, Renderer, Scene, StencilMode,
    TargetDescriptor, TextureId,
};
use crate::target::RenderTarget;
use crate::uniform::UniformValue;

/// Stencil reference value written by mask passes and tested by everything
/// that renders while a mask is active.
pub(crate) const MASK_REFERENCE: u8 = 1;

/// Role a pass plays in the composer's stencil state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaskAction {
    None,
    /// Executing this pass activates stencil masking.
    Begin,
    /// Executing this pass deactivates stencil masking.
    End,
}

/// The uniform execution contract every scheduling unit implements.
pub trait Pass {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);

    /// Whether the composer should swap the ping-pong buffers after this
    /// pass ran. May change per frame (an effect pass that skipped rendering
    /// deasserts it until its next render).
    fn needs_swap(&self) -> bool;

    fn needs_depth_texture(&self) -> bool {
        false
    }

    fn render_to_screen(&self) -> bool;
    fn set_render_to_screen(&mut self, value: bool);

    fn mask_action(&self) -> MaskAction {
        MaskAction::None
    }

    /// One-time hook, called when the pass is registered with a composer.
    /// `alpha` reports whether the backend's output surface carries alpha.
    fn initialize(&mut self, _renderer: &mut dyn Renderer, _alpha: bool) {}

    /// Called with the drawing-buffer size at registration and whenever the
    /// composer is resized. Passes with private targets resize them here,
    /// typically at an internal resolution scale.
    fn set_size(&mut self, _renderer: &mut dyn Renderer, _width: u32, _height: u32) {}

    /// Called by the composer whenever the shared depth texture becomes
    /// available or is revoked.
    fn set_depth_texture(
        &mut self,
        _renderer: &mut dyn Renderer,
        _texture: Option<TextureId>,
        _packing: DepthPacking,
    ) {
    }

    /// Execute the pass for this frame. `stencil_active` is true while the
    /// composer is between a mask-begin and a mask-end pass.
    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        output: &RenderTarget,
        delta: f32,
        stencil_active: bool,
    );

    /// Release private targets and programs. Rendering after disposal is a
    /// programming error.
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}
}

/// Vertex shader shared by the copy program.
const COPY_VERTEX: &str = "\
attribute vec3 position;

varying vec2 vUv;

void main() {

\tvUv = position.xy * 0.5 + 0.5;
\tgl_Position = vec4(position.xy, 1.0, 1.0);

}
";

const COPY_FRAGMENT: &str = "\
uniform sampler2D inputBuffer;
uniform float opacity;

varying vec2 vUv;

void main() {

\tgl_FragColor = opacity * texture2D(inputBuffer, vUv);

}
";

/// Source for the plain full-screen copy program used by the composer's
/// mask-preserving copy, [`SavePass`] and skipped-to-screen effect passes.
pub fn copy_program_source() -> ProgramSource {
    ProgramSource {
        vertex_source: COPY_VERTEX.to_string(),
        fragment_source: COPY_FRAGMENT.to_string(),
        macros: Default::default(),
    }
}

pub(crate) fn stencil_for(stencil_active: bool) -> StencilMode {
    if stencil_active {
        StencilMode::TestEqual {
            reference: MASK_REFERENCE,
        }
    } else {
        StencilMode::Disabled
    }
}

pub(crate) fn resolution_uniforms(renderer: &mut dyn Renderer, program: ProgramId, width: u32, height: u32) {
    let width = width.max(1);
    let height = height.max(1);
    renderer.set_uniform(
        program,
        "resolution",
        &UniformValue::Vec2(Vec2::new(width as f32, height as f32)),
    );
    renderer.set_uniform(
        program,
        "texelSize",
        &UniformValue::Vec2(Vec2::new(1.0 / width as f32, 1.0 / height as f32)),
    );
}

/// Full-screen pass over a caller-supplied shader program.
pub struct ShaderPass {
    name: String,
    enabled: bool,
    render_to_screen: bool,
    source: ProgramSource,
    program: Option<ProgramId>,
    disposed: bool,
}

impl ShaderPass {
    pub fn new(name: impl Into<String>, source: ProgramSource) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            render_to_screen: false,
            source,
            program: None,
            disposed: false,
        }
    }

    /// Backend program handle, available after `initialize`.
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn set_uniform(&self, renderer: &mut dyn Renderer, name: &str, value: &UniformValue) {
        if let Some(program) = self.program {
            renderer.set_uniform(program, name, value);
        }
    }
}

impl Pass for ShaderPass {
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
        true
    }

    fn render_to_screen(&self) -> bool {
        self.render_to_screen
    }

    fn set_render_to_screen(&mut self, value: bool) {
        self.render_to_screen = value;
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer, _alpha: bool) {
        if self.program.is_none() {
            self.program = Some(renderer.create_program(&self.source));
        }
    }

    fn set_size(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        if let Some(program) = self.program {
            resolution_uniforms(renderer, program, width, height);
        }
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        output: &RenderTarget,
        _delta: f32,
        stencil_active: bool,
    ) {
        debug_assert!(!self.disposed, "render on a disposed pass");
        let Some(program) = self.program else {
            return;
        };
        let destination = if self.render_to_screen {
            None
        } else {
            Some(output.id)
        };
        let options = DrawOptions {
            stencil: stencil_for(stencil_active),
        };
        renderer.draw(program, Some(input.id), destination, &options);
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
        self.disposed = true;
    }
}

/// Runs the black-box 3D scene into the composer's input buffer.
///
/// Does not swap: the following pass reads the freshly rendered scene from
/// the same buffer. Conventionally the depth-producing pass of the frame.
pub struct RenderPass {
    name: String,
    enabled: bool,
    render_to_screen: bool,
    scene: Box<dyn Scene>,
    clear: bool,
}

impl RenderPass {
    pub fn new(name: impl Into<String>, scene: Box<dyn Scene>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            render_to_screen: false,
            scene,
            clear: true,
        }
    }

    pub fn set_clear(&mut self, clear: bool) {
        self.clear = clear;
    }
}

impl Pass for RenderPass {
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
        false
    }

    fn render_to_screen(&self) -> bool {
        self.render_to_screen
    }

    fn set_render_to_screen(&mut self, value: bool) {
        self.render_to_screen = value;
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        _output: &RenderTarget,
        _delta: f32,
        stencil_active: bool,
    ) {
        let target = if self.render_to_screen {
            None
        } else {
            Some(input.id)
        };
        if self.clear {
            // Stencil is left untouched so an active mask survives the
            // scene render.
            renderer.clear(target, Some([0.0, 0.0, 0.0, 0.0]), true, None);
        }
        let options = DrawOptions {
            stencil: stencil_for(stencil_active),
        };
        self.scene.draw(renderer, target, &options);
    }
}

/// Copies the input buffer into a privately owned target for later use
/// (e.g. temporal effects reading the previous frame).
pub struct SavePass {
    name: String,
    enabled: bool,
    resolution_scale: f32,
    program: Option<ProgramId>,
    target: Option<RenderTarget>,
    disposed: bool,
}

impl SavePass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            resolution_scale: 1.0,
            program: None,
            target: None,
            disposed: false,
        }
    }

    /// Scale applied to the drawing-buffer size for the private target.
    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    fn scaled(&self, width: u32, height: u32) -> (u32, u32) {
        let w = ((width as f32 * self.resolution_scale).round() as u32).max(1);
        let h = ((height as f32 * self.resolution_scale).round() as u32).max(1);
        (w, h)
    }
}

impl Pass for SavePass {
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
        false
    }

    fn render_to_screen(&self) -> bool {
        false
    }

    fn set_render_to_screen(&mut self, _value: bool) {
        // A save pass writes its private target, never the screen.
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer, _alpha: bool) {
        if self.program.is_none() {
            self.program = Some(renderer.create_program(&copy_program_source()));
        }
        if self.target.is_none() {
            let (width, height) = renderer.drawing_buffer_size();
            let (width, height) = self.scaled(width, height);
            self.target = Some(RenderTarget::new(
                renderer,
                &TargetDescriptor {
                    width,
                    height,
                    depth: false,
                    stencil: false,
                    format: Default::default(),
                },
            ));
        }
    }

    fn set_size(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        let (width, height) = self.scaled(width, height);
        if let Some(target) = &mut self.target {
            target.resize(renderer, width, height);
        }
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        _output: &RenderTarget,
        _delta: f32,
        _stencil_active: bool,
    ) {
        debug_assert!(!self.disposed, "render on a disposed pass");
        if let (Some(program), Some(target)) = (self.program, &self.target) {
            renderer.set_uniform(program, "opacity", &UniformValue::Float(1.0));
            renderer.draw(program, Some(input.id), Some(target.id), &DrawOptions::default());
        }
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
        if let Some(target) = self.target.take() {
            target.dispose(renderer);
        }
        self.disposed = true;
    }
}

/// Clears the input buffer (or the screen) at its point in the pass list.
pub struct ClearPass {
    name: String,
    enabled: bool,
    render_to_screen: bool,
    color: Option<[f32; 4]>,
    depth: bool,
    stencil: Option<u8>,
}

impl ClearPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            render_to_screen: false,
            color: Some([0.0, 0.0, 0.0, 0.0]),
            depth: true,
            stencil: None,
        }
    }

    pub fn with_color(mut self, color: Option<[f32; 4]>) -> Self {
        self.color = color;
        self
    }

    pub fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_stencil(mut self, stencil: Option<u8>) -> Self {
        self.stencil = stencil;
        self
    }
}

impl Pass for ClearPass {
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
        false
    }

    fn render_to_screen(&self) -> bool {
        self.render_to_screen
    }

    fn set_render_to_screen(&mut self, value: bool) {
        self.render_to_screen = value;
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        _output: &RenderTarget,
        _delta: f32,
        _stencil_active: bool,
    ) {
        let target = if self.render_to_screen {
            None
        } else {
            Some(input.id)
        };
        renderer.clear(target, self.color, self.depth, self.stencil);
    }
}

/// Draws a scene into the stencil buffer of both ping-pong targets,
/// activating masking for subsequent passes.
pub struct MaskPass {
    name: String,
    enabled: bool,
    scene: Box<dyn Scene>,
    inverse: bool,
}

impl MaskPass {
    pub fn new(name: impl Into<String>, scene: Box<dyn Scene>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            scene,
            inverse: false,
        }
    }

    /// Invert the mask: subsequent passes render outside the drawn region.
    pub fn set_inverse(&mut self, inverse: bool) {
        self.inverse = inverse;
    }
}

impl Pass for MaskPass {
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
        false
    }

    fn render_to_screen(&self) -> bool {
        false
    }

    fn set_render_to_screen(&mut self, _value: bool) {
        // Mask passes only touch stencil buffers.
    }

    fn mask_action(&self) -> MaskAction {
        MaskAction::Begin
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        input: &RenderTarget,
        output: &RenderTarget,
        _delta: f32,
        _stencil_active: bool,
    ) {
        let (clear_value, reference) = if self.inverse {
            (MASK_REFERENCE, 0)
        } else {
            (0, MASK_REFERENCE)
        };
        let options = DrawOptions {
            stencil: StencilMode::Write { reference },
        };
        // Both buffers carry the mask, so it survives swaps.
        for target in [input.id, output.id] {
            renderer.clear(Some(target), None, false, Some(clear_value));
            self.scene.draw(renderer, Some(target), &options);
        }
    }
}

/// Deactivates stencil masking. Purely a state-machine marker; the stencil
/// contents are overwritten by the next mask pass.
pub struct ClearMaskPass {
    name: String,
    enabled: bool,
}

impl ClearMaskPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }
}

impl Pass for ClearMaskPass {
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
        false
    }

    fn render_to_screen(&self) -> bool {
        false
    }

    fn set_render_to_screen(&mut self, _value: bool) {}

    fn mask_action(&self) -> MaskAction {
        MaskAction::End
    }

    fn render(
        &mut self,
        _renderer: &mut dyn Renderer,
        _input: &RenderTarget,
        _output: &RenderTarget,
        _delta: f32,
        _stencil_active: bool,
    ) {
    }
}
