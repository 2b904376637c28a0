//! Blend functions and the static compositing catalogue.
//!
//! Each blend function maps to one fixed GLSL snippet defining
//! `vec4 blend(const in vec4 x, const in vec4 y, const in float opacity)`,
//! where `x` is the running color, `y` the effect's output, and `opacity`
//! the per-effect blend opacity. The catalogue is read-only after process
//! start; the fusion engine renames `blend` per distinct function when it
//! inserts a snippet into a compound program.

use serde::{Deserialize, Serialize};

/// Named compositing function selecting a catalogue snippet.
///
/// `Skip` marks an effect that contributes no visual output: it is excluded
/// from fusion entirely, though its per-frame update hook still runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFunction {
    Skip,
    Add,
    Alpha,
    Average,
    ColorBurn,
    ColorDodge,
    Darken,
    Difference,
    Divide,
    Exclusion,
    Lighten,
    Multiply,
    Negation,
    Normal,
    Overlay,
    Reflect,
    Screen,
    SoftLight,
    Subtract,
}

impl BlendFunction {
    /// All catalogue entries, for enumeration in tests and tooling.
    pub fn all() -> &'static [BlendFunction] {
        use BlendFunction::*;
        &[
            Skip, Add, Alpha, Average, ColorBurn, ColorDodge, Darken, Difference, Divide,
            Exclusion, Lighten, Multiply, Negation, Normal, Overlay, Reflect, Screen, SoftLight,
            Subtract,
        ]
    }

    /// Identifier-safe token, used to suffix the renamed `blend` function in
    /// compound programs (`blend_screen`, `blend_color_burn`, ...).
    pub fn token(self) -> &'static str {
        match self {
            BlendFunction::Skip => "skip",
            BlendFunction::Add => "add",
            BlendFunction::Alpha => "alpha",
            BlendFunction::Average => "average",
            BlendFunction::ColorBurn => "color_burn",
            BlendFunction::ColorDodge => "color_dodge",
            BlendFunction::Darken => "darken",
            BlendFunction::Difference => "difference",
            BlendFunction::Divide => "divide",
            BlendFunction::Exclusion => "exclusion",
            BlendFunction::Lighten => "lighten",
            BlendFunction::Multiply => "multiply",
            BlendFunction::Negation => "negation",
            BlendFunction::Normal => "normal",
            BlendFunction::Overlay => "overlay",
            BlendFunction::Reflect => "reflect",
            BlendFunction::Screen => "screen",
            BlendFunction::SoftLight => "soft_light",
            BlendFunction::Subtract => "subtract",
        }
    }

    /// Catalogue GLSL for this function; `None` for [`BlendFunction::Skip`].
    pub fn shader_source(self) -> Option<&'static str> {
        let source = match self {
            BlendFunction::Skip => return None,
            BlendFunction::Add => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = min(x + y, 1.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Alpha => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \treturn mix(x, y, opacity * y.a);\n\
                 }\n"
            }
            BlendFunction::Average => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = (x + y) * 0.5;\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::ColorBurn => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = clamp(1.0 - (1.0 - x) / max(y, vec4(1e-4)), 0.0, 1.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::ColorDodge => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = clamp(x / max(1.0 - y, vec4(1e-4)), 0.0, 1.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Darken => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = min(x, y);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Difference => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = abs(x - y);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Divide => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = clamp(x / max(y, vec4(1e-4)), 0.0, 1.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Exclusion => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = x + y - 2.0 * x * y;\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Lighten => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = max(x, y);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Multiply => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = x * y;\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Negation => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = 1.0 - abs(1.0 - x - y);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Normal => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \treturn mix(x, y, opacity);\n\
                 }\n"
            }
            BlendFunction::Overlay => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = mix(2.0 * x * y, 1.0 - 2.0 * (1.0 - x) * (1.0 - y), step(0.5, x));\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Reflect => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = clamp(x * x / max(1.0 - y, vec4(1e-4)), 0.0, 1.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Screen => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = x + y - x * y;\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::SoftLight => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = (1.0 - 2.0 * y) * x * x + 2.0 * y * x;\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
            BlendFunction::Subtract => {
                "vec4 blend(const in vec4 x, const in vec4 y, const in float opacity) {\n\
                 \tvec4 z = max(x + y - 1.0, 0.0);\n\
                 \treturn mix(x, z, opacity);\n\
                 }\n"
            }
        };
        Some(source)
    }
}

/// A compositing function plus a freely mutable opacity.
///
/// Changing `opacity` takes effect immediately; changing `function` requires
/// the owning pass to recompile its compound program.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendMode {
    pub function: BlendFunction,
    pub opacity: f32,
}

impl BlendMode {
    pub fn new(function: BlendFunction) -> Self {
        Self {
            function,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(function: BlendFunction, opacity: f32) -> Self {
        Self { function, opacity }
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::new(BlendFunction::Normal)
    }
}
