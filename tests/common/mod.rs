//! Test backend: records calls and keeps small CPU-side pixel/stencil grids
//! so composer scenarios can assert real pixel outcomes.
#![allow(dead_code)]

use std::collections::HashMap;

use postfx::{
    DepthPacking, DrawOptions, ProgramId, ProgramSource, Renderer, RendererLimits, Scene,
    StencilMode, TargetDescriptor, TargetId, TextureId, UniformValue,
};

/// Logical pixel grid per target; independent of the reported target size.
pub const GRID: usize = 4;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug)]
pub struct FakeTarget {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
    pub stencil: Vec<u8>,
    pub depth_texture: Option<TextureId>,
}

/// What a program draws when executed by the fake backend.
#[derive(Clone, Debug)]
pub enum DrawBehavior {
    /// Sample the input buffer (the default; matches copy/effect programs).
    CopyInput,
    /// Fill everything it touches with a solid color.
    Fill([f32; 4]),
    /// Cover only a sub-rectangle of the grid (for mask shapes).
    FillRect {
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
        color: [f32; 4],
    },
}

impl DrawBehavior {
    fn covers(&self, x: usize, y: usize) -> bool {
        match self {
            DrawBehavior::CopyInput | DrawBehavior::Fill(_) => true,
            DrawBehavior::FillRect { x0, y0, x1, y1, .. } => {
                x >= *x0 && x < *x1 && y >= *y0 && y < *y1
            }
        }
    }

    fn color(&self, source: [f32; 4]) -> [f32; 4] {
        match self {
            DrawBehavior::CopyInput => source,
            DrawBehavior::Fill(color) | DrawBehavior::FillRect { color, .. } => *color,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub input: Option<TargetId>,
    pub output: Option<TargetId>,
    pub stencil: StencilMode,
}

pub struct FakeRenderer {
    size: (u32, u32),
    pub limits: RendererLimits,
    next_id: u32,
    pub targets: HashMap<TargetId, FakeTarget>,
    pub programs: HashMap<ProgramId, ProgramSource>,
    pub behaviors: HashMap<ProgramId, DrawBehavior>,
    pub uniforms: HashMap<(ProgramId, String), UniformValue>,
    pub screen: Vec<[f32; 4]>,
    pub draw_log: Vec<DrawRecord>,
    pub depth_textures_alive: usize,
    pub depth_textures_created: usize,
}

impl FakeRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            limits: RendererLimits::default(),
            next_id: 1,
            targets: HashMap::new(),
            programs: HashMap::new(),
            behaviors: HashMap::new(),
            uniforms: HashMap::new(),
            screen: vec![[0.0; 4]; GRID * GRID],
            draw_log: Vec::new(),
            depth_textures_alive: 0,
            depth_textures_created: 0,
        }
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn set_behavior(&mut self, program: ProgramId, behavior: DrawBehavior) {
        self.behaviors.insert(program, behavior);
    }

    pub fn pixels(&self, target: TargetId) -> &[[f32; 4]] {
        &self.targets[&target].pixels
    }

    pub fn fill_target(&mut self, target: TargetId, color: [f32; 4]) {
        let target = self.targets.get_mut(&target).expect("unknown target");
        target.pixels.fill(color);
    }

    fn stencil_passes(mode: StencilMode, value: u8) -> bool {
        match mode {
            StencilMode::Disabled | StencilMode::Write { .. } => true,
            StencilMode::TestEqual { reference } => value == reference,
            StencilMode::TestNotEqual { reference } => value != reference,
        }
    }
}

impl Renderer for FakeRenderer {
    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn limits(&self) -> RendererLimits {
        self.limits
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> TargetId {
        let id = TargetId(self.next());
        self.targets.insert(
            id,
            FakeTarget {
                width: desc.width,
                height: desc.height,
                pixels: vec![[0.0; 4]; GRID * GRID],
                stencil: vec![0; GRID * GRID],
                depth_texture: None,
            },
        );
        id
    }

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) {
        let target = self.targets.get_mut(&target).expect("resize of unknown target");
        target.width = width;
        target.height = height;
    }

    fn destroy_target(&mut self, target: TargetId) {
        assert!(
            self.targets.remove(&target).is_some(),
            "double destroy of {target:?}"
        );
    }

    fn attach_depth_texture(&mut self, target: TargetId, texture: Option<TextureId>) {
        let target = self.targets.get_mut(&target).expect("unknown target");
        target.depth_texture = texture;
    }

    fn create_depth_texture(
        &mut self,
        _width: u32,
        _height: u32,
        _packing: DepthPacking,
    ) -> TextureId {
        self.depth_textures_created += 1;
        self.depth_textures_alive += 1;
        TextureId(self.next())
    }

    fn destroy_texture(&mut self, _texture: TextureId) {
        assert!(self.depth_textures_alive > 0, "double texture destroy");
        self.depth_textures_alive -= 1;
    }

    fn create_program(&mut self, source: &ProgramSource) -> ProgramId {
        let id = ProgramId(self.next());
        self.programs.insert(id, source.clone());
        id
    }

    fn destroy_program(&mut self, program: ProgramId) {
        assert!(
            self.programs.remove(&program).is_some(),
            "double destroy of {program:?}"
        );
        self.behaviors.remove(&program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue) {
        self.uniforms
            .insert((program, name.to_string()), value.clone());
    }

    fn clear(
        &mut self,
        target: Option<TargetId>,
        color: Option<[f32; 4]>,
        _depth: bool,
        stencil: Option<u8>,
    ) {
        match target {
            Some(id) => {
                let target = self.targets.get_mut(&id).expect("clear of unknown target");
                if let Some(color) = color {
                    target.pixels.fill(color);
                }
                if let Some(value) = stencil {
                    target.stencil.fill(value);
                }
            }
            None => {
                if let Some(color) = color {
                    self.screen.fill(color);
                }
            }
        }
    }

    fn draw(
        &mut self,
        program: ProgramId,
        input: Option<TargetId>,
        output: Option<TargetId>,
        options: &DrawOptions,
    ) {
        self.draw_log.push(DrawRecord {
            program,
            input,
            output,
            stencil: options.stencil,
        });
        assert!(
            self.programs.contains_key(&program),
            "draw with destroyed {program:?}"
        );

        let source: Vec<[f32; 4]> = match input {
            Some(id) => self.targets[&id].pixels.clone(),
            None => vec![[0.0; 4]; GRID * GRID],
        };
        let behavior = self
            .behaviors
            .get(&program)
            .cloned()
            .unwrap_or(DrawBehavior::CopyInput);

        match output {
            Some(id) => {
                let target = self.targets.get_mut(&id).expect("draw into unknown target");
                for y in 0..GRID {
                    for x in 0..GRID {
                        let idx = y * GRID + x;
                        if !behavior.covers(x, y) {
                            continue;
                        }
                        if let StencilMode::Write { reference } = options.stencil {
                            target.stencil[idx] = reference;
                            continue;
                        }
                        if Self::stencil_passes(options.stencil, target.stencil[idx]) {
                            target.pixels[idx] = behavior.color(source[idx]);
                        }
                    }
                }
            }
            None => {
                // The screen has no stencil attachment.
                for y in 0..GRID {
                    for x in 0..GRID {
                        let idx = y * GRID + x;
                        if behavior.covers(x, y) {
                            self.screen[idx] = behavior.color(source[idx]);
                        }
                    }
                }
            }
        }
    }
}

/// A scene that draws a fixed program; the program's registered behavior
/// decides what gets covered.
pub struct ProgramScene {
    pub program: ProgramId,
}

impl Scene for ProgramScene {
    fn draw(
        &mut self,
        renderer: &mut dyn Renderer,
        target: Option<TargetId>,
        options: &DrawOptions,
    ) {
        renderer.draw(self.program, None, target, options);
    }
}
