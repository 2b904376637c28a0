//! The top-level orchestrator: ping-pong buffers and the pass list.

use crate::pass::{copy_program_source, MaskAction, Pass, MASK_REFERENCE};
use crate::renderer::{
    ColorFormat, DepthPacking, DrawOptions, ProgramId, Renderer, StencilMode, TargetDescriptor,
    TextureId,
};
use crate::target::RenderTarget;
use crate::uniform::UniformValue;

/// Construction options for [`Composer`].
#[derive(Copy, Clone, Debug)]
pub struct ComposerOptions {
    /// Give the ping-pong targets a depth attachment.
    pub depth_buffer: bool,
    /// Give the ping-pong targets a stencil attachment (required for mask
    /// passes).
    pub stencil_buffer: bool,
    pub format: ColorFormat,
    /// Packing mode used if a shared depth texture gets allocated.
    pub depth_packing: DepthPacking,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            depth_buffer: true,
            stencil_buffer: false,
            format: ColorFormat::Rgba8,
            depth_packing: DepthPacking::Basic,
        }
    }
}

/// Drives one frame by executing enabled passes in order against two
/// ping-pong targets.
///
/// The two targets are logically equivalent and interchangeable; a swap
/// flips an index, never copies data. Passes reference the targets only for
/// the duration of their `render` call.
pub struct Composer {
    options: ComposerOptions,
    targets: [RenderTarget; 2],
    input_index: usize,
    passes: Vec<Box<dyn Pass>>,
    copy_program: ProgramId,
    depth_texture: Option<TextureId>,
    auto_render_to_screen: bool,
    width: u32,
    height: u32,
    disposed: bool,
}

impl Composer {
    pub fn new(renderer: &mut dyn Renderer, options: ComposerOptions) -> Self {
        let (width, height) = renderer.drawing_buffer_size();
        let width = width.max(1);
        let height = height.max(1);
        let targets = Self::create_targets(renderer, &options, width, height);
        let copy_program = renderer.create_program(&copy_program_source());
        Self {
            options,
            targets,
            input_index: 0,
            passes: Vec::new(),
            copy_program,
            depth_texture: None,
            auto_render_to_screen: true,
            width,
            height,
            disposed: false,
        }
    }

    fn create_targets(
        renderer: &mut dyn Renderer,
        options: &ComposerOptions,
        width: u32,
        height: u32,
    ) -> [RenderTarget; 2] {
        let desc = TargetDescriptor {
            width,
            height,
            depth: options.depth_buffer,
            stencil: options.stencil_buffer,
            format: options.format,
        };
        [
            RenderTarget::new(renderer, &desc),
            RenderTarget::new(renderer, &desc),
        ]
    }

    /// The target the next pass reads from.
    pub fn input_target(&self) -> &RenderTarget {
        &self.targets[self.input_index]
    }

    /// The target the next pass writes to.
    pub fn output_target(&self) -> &RenderTarget {
        &self.targets[1 - self.input_index]
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth_texture
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn pass(&self, index: usize) -> Option<&dyn Pass> {
        self.passes.get(index).map(|p| p.as_ref())
    }

    pub fn pass_mut(&mut self, index: usize) -> Option<&mut (dyn Pass + '_)> {
        Some(self.passes.get_mut(index)?.as_mut())
    }

    /// Register a pass at the end of the list.
    pub fn add_pass(&mut self, renderer: &mut dyn Renderer, pass: Box<dyn Pass>) {
        let index = self.passes.len();
        self.insert_pass(renderer, index, pass);
    }

    /// Register a pass at `index`.
    ///
    /// The pass is sized to the current drawing-buffer size and initialized
    /// before insertion. If it is the first pass needing a depth texture, a
    /// shared depth attachment is allocated on both ping-pong targets and
    /// propagated to every already-registered pass; later depth consumers
    /// receive the existing texture.
    pub fn insert_pass(&mut self, renderer: &mut dyn Renderer, index: usize, mut pass: Box<dyn Pass>) {
        debug_assert!(!self.disposed, "insert_pass on a disposed composer");
        let alpha = renderer.uses_alpha();
        pass.initialize(renderer, alpha);
        pass.set_size(renderer, self.width, self.height);

        if pass.render_to_screen() {
            // A pass that opted into screen output itself permanently
            // disables automatic tracking.
            self.auto_render_to_screen = false;
        }

        if pass.needs_depth_texture() && self.depth_texture.is_none() {
            self.allocate_depth_texture(renderer);
        }
        if let Some(texture) = self.depth_texture {
            pass.set_depth_texture(renderer, Some(texture), self.options.depth_packing);
        }

        self.passes.insert(index, pass);
        self.refresh_render_to_screen();
    }

    /// Remove and return the pass at `index`. If no remaining pass needs the
    /// shared depth texture, it is disposed and detached everywhere.
    pub fn remove_pass(&mut self, renderer: &mut dyn Renderer, index: usize) -> Box<dyn Pass> {
        let mut pass = self.passes.remove(index);
        if self.auto_render_to_screen {
            pass.set_render_to_screen(false);
        }
        self.refresh_render_to_screen();

        if self.depth_texture.is_some() && !self.passes.iter().any(|p| p.needs_depth_texture()) {
            pass.set_depth_texture(renderer, None, self.options.depth_packing);
            self.revoke_depth_texture(renderer);
        }
        pass
    }

    fn refresh_render_to_screen(&mut self) {
        if !self.auto_render_to_screen {
            return;
        }
        let last = self.passes.len().checked_sub(1);
        for (i, pass) in self.passes.iter_mut().enumerate() {
            pass.set_render_to_screen(Some(i) == last);
        }
    }

    fn allocate_depth_texture(&mut self, renderer: &mut dyn Renderer) {
        let texture =
            renderer.create_depth_texture(self.width, self.height, self.options.depth_packing);
        log::debug!("composer allocated shared depth texture {:?}", texture);
        self.depth_texture = Some(texture);
        for target in &mut self.targets {
            target.set_depth_texture(renderer, Some(texture));
        }
        for pass in &mut self.passes {
            pass.set_depth_texture(renderer, Some(texture), self.options.depth_packing);
        }
    }

    fn revoke_depth_texture(&mut self, renderer: &mut dyn Renderer) {
        let Some(texture) = self.depth_texture.take() else {
            return;
        };
        log::debug!("composer released shared depth texture {:?}", texture);
        for target in &mut self.targets {
            target.set_depth_texture(renderer, None);
        }
        for pass in &mut self.passes {
            pass.set_depth_texture(renderer, None, self.options.depth_packing);
        }
        renderer.destroy_texture(texture);
    }

    /// Execute one frame: run enabled passes in list order, swapping the
    /// ping-pong buffers per pass contract.
    ///
    /// While a stencil mask is active, a pass that swaps (and is not itself
    /// a mask pass) first has its untouched, outside-the-mask pixels
    /// preserved by copying them from the input to the output buffer, so
    /// masked rendering cannot leak outside the mask as buffers alternate.
    pub fn render(&mut self, renderer: &mut dyn Renderer, delta: f32) {
        debug_assert!(!self.disposed, "render on a disposed composer");
        let mut masked = false;
        for i in 0..self.passes.len() {
            if !self.passes[i].enabled() {
                continue;
            }
            let input_id = self.targets[self.input_index].id;
            let output_id = self.targets[1 - self.input_index].id;
            self.passes[i].render(
                renderer,
                &self.targets[self.input_index],
                &self.targets[1 - self.input_index],
                delta,
                masked,
            );

            let action = self.passes[i].mask_action();
            if self.passes[i].needs_swap() {
                if masked && action == MaskAction::None {
                    renderer.set_uniform(self.copy_program, "opacity", &UniformValue::Float(1.0));
                    renderer.draw(
                        self.copy_program,
                        Some(input_id),
                        Some(output_id),
                        &DrawOptions {
                            stencil: StencilMode::TestNotEqual {
                                reference: MASK_REFERENCE,
                            },
                        },
                    );
                }
                self.input_index = 1 - self.input_index;
            }
            match action {
                MaskAction::Begin => masked = true,
                MaskAction::End => masked = false,
                MaskAction::None => {}
            }
        }
    }

    /// Resize both ping-pong targets to the drawing-buffer size, then every
    /// pass in list order.
    pub fn set_size(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        debug_assert!(!self.disposed, "set_size on a disposed composer");
        self.width = width.max(1);
        self.height = height.max(1);
        for target in &mut self.targets {
            target.resize(renderer, self.width, self.height);
        }
        // Depth textures are not resizable; recreate and repropagate.
        if self.depth_texture.is_some() {
            self.revoke_depth_texture(renderer);
            self.allocate_depth_texture(renderer);
        }
        for pass in &mut self.passes {
            pass.set_size(renderer, self.width, self.height);
        }
    }

    /// Discard all passes and reallocate the ping-pong buffers.
    pub fn reset(&mut self, renderer: &mut dyn Renderer) {
        for pass in &mut self.passes {
            pass.dispose(renderer);
        }
        self.passes.clear();
        self.revoke_depth_texture(renderer);

        let (width, height) = renderer.drawing_buffer_size();
        self.width = width.max(1);
        self.height = height.max(1);
        for target in &self.targets {
            target.dispose(renderer);
        }
        self.targets = Self::create_targets(renderer, &self.options, self.width, self.height);
        self.input_index = 0;
        self.auto_render_to_screen = true;
    }

    /// Release every pass, target and program this composer owns. Any
    /// further use is a programming error.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for pass in &mut self.passes {
            pass.dispose(renderer);
        }
        self.passes.clear();
        self.revoke_depth_texture(renderer);
        for target in &self.targets {
            target.dispose(renderer);
        }
        renderer.destroy_program(self.copy_program);
        self.disposed = true;
    }
}
