//! The effect-fusion engine.
//!
//! Merges an ordered list of [`Effect`]s into a single compound shader
//! program: effect-local symbols are renamed with a unique per-effect prefix,
//! snippets are concatenated into fixed template sections, the blend
//! catalogue snippets actually used are inserted once each, and a shared
//! depth fetch / UV-transform stage is emitted only when some effect needs
//! it.
//!
//! Fusion is pure text transformation; no renderer is involved. It is a
//! relatively expensive operation invoked only when the effect set, a macro
//! set, or a blend function changes — never for uniform value or opacity
//! changes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::blend::BlendFunction;
use crate::effect::{Effect, EffectAttributes};
use crate::renderer::ProgramSource;
use crate::shader_text;
use crate::uniform::UniformValue;

/// Uniforms always present in the fragment template:
/// `inputBuffer`, `resolution`, `texelSize`, `time`.
const BUILTIN_UNIFORMS: usize = 4;
/// `depthBuffer` and `depthPacking`, present when the fusion reads depth.
const DEPTH_UNIFORMS: usize = 2;

// `<uv>` marks the sampling-coordinate slot. It is not a valid GLSL
// identifier, so effect-declared symbols can never collide with it.
const UV_SLOT: &str = "<uv>";

const FRAGMENT_TEMPLATE: &str = "\
uniform sampler2D inputBuffer;
uniform vec2 resolution;
uniform vec2 texelSize;
uniform float time;

varying vec2 vUv;

FRAGMENT_HEAD
void main() {

FRAGMENT_MAIN_UV
\tvec4 color0 = texture2D(inputBuffer, <uv>);
\tvec4 color1 = vec4(0.0);

FRAGMENT_MAIN_IMAGE
\tgl_FragColor = color0;

}
";

const VERTEX_TEMPLATE: &str = "\
uniform vec2 resolution;
uniform vec2 texelSize;
uniform float time;

attribute vec3 position;

varying vec2 vUv;

VERTEX_HEAD
void main() {

\tvUv = position.xy * 0.5 + 0.5;

VERTEX_MAIN_SUPPORT
\tgl_Position = vec4(position.xy, 1.0, 1.0);

}
";

/// Shared depth read, inserted into the fragment head when at least one
/// surviving effect actually samples depth. All depth-consuming effects
/// share the single `depth` value fetched in `main`.
const DEPTH_READ_SNIPPET: &str = "\
uniform sampler2D depthBuffer;
uniform int depthPacking;

float unpackRGBAToDepth(const in vec4 v) {
\tconst vec4 bitShift = vec4(1.0 / (256.0 * 256.0 * 256.0), 1.0 / (256.0 * 256.0), 1.0 / 256.0, 1.0);
\treturn dot(v, bitShift);
}

float readDepth(const in vec2 uv) {
\tvec4 texel = texture2D(depthBuffer, uv);
\treturn (depthPacking == 1) ? unpackRGBAToDepth(texel) : texel.r;
}
";

/// Maps a renamed program uniform back to the effect-local uniform it came
/// from, so mutated values can be pushed each frame without re-fusing.
#[derive(Clone, Debug)]
pub struct UniformBinding {
    pub program_name: String,
    pub effect_index: usize,
    pub local_name: String,
}

/// Maps a per-effect blend-opacity uniform back to its effect.
#[derive(Clone, Debug)]
pub struct OpacityBinding {
    pub program_name: String,
    pub effect_index: usize,
}

/// A fused shader program, derived and never hand-authored.
#[derive(Clone, Debug)]
pub struct CompoundProgram {
    pub fragment_source: String,
    pub vertex_source: String,
    pub macros: BTreeMap<String, String>,
    /// Initial values for all renamed effect uniforms, including the
    /// per-effect blend-opacity uniforms.
    pub uniforms: BTreeMap<String, UniformValue>,
    pub extensions: BTreeSet<String>,
    /// Total fragment uniform slots, built-ins included.
    pub uniform_count: usize,
    /// Total varyings, `vUv` included.
    pub varying_count: usize,
    /// Some surviving effect declared the DEPTH attribute.
    pub needs_depth: bool,
    /// Some surviving effect actually samples the shared depth value.
    pub reads_depth: bool,
    /// Some surviving effect remaps UV coordinates.
    pub transformed_uv: bool,
    pub uniform_bindings: Vec<UniformBinding>,
    pub opacity_bindings: Vec<OpacityBinding>,
}

impl CompoundProgram {
    /// Sources and macros in the form the renderer consumes.
    pub fn source(&self) -> ProgramSource {
        ProgramSource {
            vertex_source: self.vertex_source.clone(),
            fragment_source: self.fragment_source.clone(),
            macros: self.macros.clone(),
        }
    }
}

/// Fuse `effects` into one compound program.
///
/// Effects execute in attribute-priority order (convolution first), stable
/// within equal priority. Malformed or conflicting effects are excluded with
/// a diagnostic; fusion proceeds with the remainder. Returns `None` when no
/// effect survives — the owning pass skips rendering that frame.
pub fn fuse(effects: &[Effect]) -> Option<CompoundProgram> {
    let mut order: Vec<usize> = (0..effects.len()).collect();
    order.sort_by_key(|&i| Reverse(effects[i].attributes().priority()));

    let mut fragment_head = String::new();
    let mut vertex_head = String::new();
    let mut uv_section = String::new();
    let mut image_section = String::new();
    let mut support_section = String::new();

    let mut macros = BTreeMap::new();
    let mut uniforms = BTreeMap::new();
    let mut extensions = BTreeSet::new();
    let mut uniform_bindings = Vec::new();
    let mut opacity_bindings = Vec::new();
    let mut blend_functions = BTreeSet::new();

    let mut convolution_present = false;
    let mut transformed_uv = false;
    let mut needs_depth = false;
    let mut reads_depth = false;
    let mut varying_count = 1; // vUv
    let mut survivors = 0usize;

    for &index in &order {
        let effect = &effects[index];
        if effect.blend_mode().function == BlendFunction::Skip {
            continue;
        }

        let fragment = effect.fragment_snippet();
        let has_image = shader_text::has_function(fragment, "mainImage");
        let has_uv = shader_text::has_function(fragment, "mainUv");

        if !has_image && !has_uv {
            log::error!(
                "effect '{}' defines neither mainImage nor mainUv; excluding it from fusion",
                effect.name()
            );
            continue;
        }
        let convolution = effect.attributes().contains(EffectAttributes::CONVOLUTION);
        if convolution && convolution_present {
            log::error!(
                "effect '{}' is a convolution effect but the fusion already contains one; excluding it",
                effect.name()
            );
            continue;
        }
        if has_uv && convolution_present {
            log::error!(
                "effect '{}' remaps UV coordinates, which is incompatible with the convolution effect in this fusion; excluding it",
                effect.name()
            );
            continue;
        }
        if convolution {
            convolution_present = true;
        }

        let prefix = format!("e{survivors}");
        let mut fragment_text = fragment.to_string();
        let mut vertex_text = effect.vertex_snippet().map(str::to_string);

        // Every locally declared symbol gets the effect prefix: entry
        // functions, helper functions, varyings, macro names, uniform names.
        let mut local_symbols: Vec<String> = Vec::new();
        let add_symbol = |symbols: &mut Vec<String>, name: String| {
            if !symbols.contains(&name) {
                symbols.push(name);
            }
        };
        for name in shader_text::function_names(&fragment_text) {
            add_symbol(&mut local_symbols, name);
        }
        // A varying may be declared in either snippet, or in both under the
        // same name; the union is renamed and counted once.
        let mut effect_varyings = shader_text::varying_names(&fragment_text);
        if let Some(vertex) = &vertex_text {
            for name in shader_text::function_names(vertex) {
                add_symbol(&mut local_symbols, name);
            }
            for name in shader_text::varying_names(vertex) {
                if !effect_varyings.contains(&name) {
                    effect_varyings.push(name);
                }
            }
        }
        for name in &effect_varyings {
            add_symbol(&mut local_symbols, name.clone());
        }
        for name in effect.macros().keys() {
            add_symbol(&mut local_symbols, name.clone());
        }
        for name in effect.uniforms().keys() {
            add_symbol(&mut local_symbols, name.clone());
        }

        let rename = |text: &str| {
            let mut text = text.to_string();
            for symbol in &local_symbols {
                text = shader_text::replace_word(&text, symbol, &format!("{prefix}_{symbol}"));
            }
            text
        };
        fragment_text = rename(&fragment_text);
        vertex_text = vertex_text.as_deref().map(|text| rename(text));

        for (name, value) in effect.macros() {
            macros.insert(format!("{prefix}_{name}"), rename(value));
        }
        for (name, value) in effect.uniforms() {
            let program_name = format!("{prefix}_{name}");
            uniforms.insert(program_name.clone(), value.clone());
            uniform_bindings.push(UniformBinding {
                program_name,
                effect_index: index,
                local_name: name.clone(),
            });
        }

        let opacity_name = format!("{prefix}_opacity");
        uniforms.insert(
            opacity_name.clone(),
            UniformValue::Float(effect.blend_mode().opacity),
        );
        opacity_bindings.push(OpacityBinding {
            program_name: opacity_name.clone(),
            effect_index: index,
        });

        fragment_head.push_str(&format!("uniform float {opacity_name};\n\n"));
        fragment_head.push_str(fragment_text.trim_end());
        fragment_head.push_str("\n\n");

        if let Some(vertex) = &vertex_text {
            vertex_head.push_str(vertex.trim_end());
            vertex_head.push_str("\n\n");
            if shader_text::has_function(vertex, &format!("{prefix}_mainSupport")) {
                support_section.push_str(&format!("\t{prefix}_mainSupport(vUv);\n"));
            }
        }
        varying_count += effect_varyings.len();

        if has_uv {
            uv_section.push_str(&format!("\t{prefix}_mainUv({UV_SLOT});\n"));
            transformed_uv = true;
        }

        // Any surviving DEPTH-attributed effect requests the shared depth
        // texture, whether or not its mainImage samples it.
        let depth_attr = effect.attributes().contains(EffectAttributes::DEPTH);
        if depth_attr {
            needs_depth = true;
        }

        if has_image {
            // Textual heuristic: the DEPTH attribute requests the texture,
            // but only a literal `depth` parameter triggers the shared fetch.
            let use_depth = depth_attr && shader_text::main_image_uses_depth(fragment);
            if use_depth {
                reads_depth = true;
                image_section.push_str(&format!(
                    "\tcolor1 = {prefix}_mainImage(color0, {UV_SLOT}, depth);\n"
                ));
            } else {
                image_section
                    .push_str(&format!("\tcolor1 = {prefix}_mainImage(color0, {UV_SLOT});\n"));
            }
            let function = effect.blend_mode().function;
            blend_functions.insert(function);
            image_section.push_str(&format!(
                "\tcolor0 = blend_{}(color0, color1, {opacity_name});\n",
                function.token()
            ));
        }

        for extension in effect.extensions() {
            extensions.insert(extension.clone());
        }

        survivors += 1;
    }

    if survivors == 0 {
        return None;
    }

    // One catalogue snippet per distinct blend function, not one per effect.
    for function in &blend_functions {
        if let Some(source) = function.shader_source() {
            let renamed =
                shader_text::replace_word(source, "blend", &format!("blend_{}", function.token()));
            fragment_head.push_str(renamed.trim_end());
            fragment_head.push_str("\n\n");
        }
    }

    if reads_depth {
        fragment_head.insert_str(0, &format!("{DEPTH_READ_SNIPPET}\n"));
        image_section.insert_str(0, &format!("\tfloat depth = readDepth({UV_SLOT});\n"));
    }

    let uv_symbol = if transformed_uv { "transformedUv" } else { "vUv" };
    if transformed_uv {
        // A local mutable copy of the screen UV, threaded through every
        // remap call and all subsequent sampling.
        uv_section.insert_str(0, "\tvec2 transformedUv = vUv;\n");
    }

    let fragment_source = FRAGMENT_TEMPLATE
        .replace("FRAGMENT_HEAD\n", &fragment_head)
        .replace("FRAGMENT_MAIN_UV\n", &uv_section)
        .replace("FRAGMENT_MAIN_IMAGE\n", &image_section)
        .replace(UV_SLOT, uv_symbol);

    let vertex_source = VERTEX_TEMPLATE
        .replace("VERTEX_HEAD\n", &vertex_head)
        .replace("VERTEX_MAIN_SUPPORT\n", &support_section);

    let uniform_count =
        uniforms.len() + BUILTIN_UNIFORMS + if reads_depth { DEPTH_UNIFORMS } else { 0 };

    Some(CompoundProgram {
        fragment_source,
        vertex_source,
        macros,
        uniforms,
        extensions,
        uniform_count,
        varying_count,
        needs_depth,
        reads_depth,
        transformed_uv,
        uniform_bindings,
        opacity_bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::BlendFunction;
    use crate::effect::{Effect, EffectAttributes};

    fn color_effect(name: &str) -> Effect {
        Effect::builder(name)
            .fragment(
                "vec4 mainImage(const in vec4 inputColor, const in vec2 uv) {\n\
                 \treturn inputColor * intensity;\n\
                 }\n",
            )
            .uniform("intensity", 1.0f32)
            .build()
    }

    fn uv_effect(name: &str) -> Effect {
        Effect::builder(name)
            .fragment("void mainUv(inout vec2 uv) { uv.y = 1.0 - uv.y; }\n")
            .build()
    }

    fn convolution_effect(name: &str) -> Effect {
        Effect::builder(name)
            .fragment(
                "vec4 mainImage(const in vec4 inputColor, const in vec2 uv) {\n\
                 \treturn 0.5 * (texture2D(inputBuffer, uv + texelSize) + inputColor);\n\
                 }\n",
            )
            .attributes(EffectAttributes::CONVOLUTION)
            .build()
    }

    fn depth_effect(name: &str) -> Effect {
        Effect::builder(name)
            .fragment(
                "vec4 mainImage(const in vec4 inputColor, const in vec2 uv, const in float depth) {\n\
                 \treturn vec4(vec3(depth), inputColor.a);\n\
                 }\n",
            )
            .attributes(EffectAttributes::DEPTH)
            .build()
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let effects = vec![color_effect("a"), uv_effect("b"), color_effect("c")];
        let first = fuse(&effects).unwrap();
        let second = fuse(&effects).unwrap();
        assert_eq!(first.fragment_source, second.fragment_source);
        assert_eq!(first.vertex_source, second.vertex_source);
        assert_eq!(first.macros, second.macros);
        assert_eq!(first.uniforms, second.uniforms);
    }

    #[test]
    fn test_symbol_isolation() {
        let effects = vec![color_effect("a"), color_effect("b")];
        let program = fuse(&effects).unwrap();
        assert!(program.uniforms.contains_key("e0_intensity"));
        assert!(program.uniforms.contains_key("e1_intensity"));
        assert!(program.fragment_source.contains("e0_mainImage"));
        assert!(program.fragment_source.contains("e1_mainImage"));
        // The bare local name must not survive anywhere.
        assert!(!shader_text::contains_word(
            &program.fragment_source,
            "intensity"
        ));
        assert!(!shader_text::contains_word(
            &program.fragment_source,
            "mainImage"
        ));
    }

    #[test]
    fn test_convolution_executes_first() {
        let effects = vec![color_effect("color"), convolution_effect("blur")];
        let program = fuse(&effects).unwrap();
        // The convolution effect takes prefix e0 despite being listed second.
        let conv_call = program.fragment_source.find("e0_mainImage(color0").unwrap();
        let color_call = program.fragment_source.find("e1_mainImage(color0").unwrap();
        assert!(conv_call < color_call);
    }

    #[test]
    fn test_second_convolution_is_excluded() {
        let effects = vec![convolution_effect("a"), convolution_effect("b")];
        let program = fuse(&effects).unwrap();
        assert!(program.fragment_source.contains("e0_mainImage"));
        assert!(!program.fragment_source.contains("e1_mainImage"));
    }

    #[test]
    fn test_uv_remap_conflicts_with_convolution() {
        let effects = vec![uv_effect("flip"), convolution_effect("blur")];
        let program = fuse(&effects).unwrap();
        // The convolution effect sorts first; the remap effect is excluded.
        assert!(!program.transformed_uv);
        assert!(!program.fragment_source.contains("mainUv"));
        assert!(program.fragment_source.contains("e0_mainImage"));
    }

    #[test]
    fn test_missing_entry_is_excluded_without_aborting() {
        let broken = Effect::builder("broken").fragment("float nothing = 1.0;").build();
        let effects = vec![broken, color_effect("ok")];
        let program = fuse(&effects).unwrap();
        assert!(program.fragment_source.contains("e0_mainImage"));
        assert!(!program.fragment_source.contains("e1_"));
    }

    #[test]
    fn test_skip_effect_contributes_no_text() {
        let mut skipped = color_effect("skipped");
        skipped.blend_mode_mut().function = BlendFunction::Skip;
        let effects = vec![skipped, color_effect("visible")];
        let program = fuse(&effects).unwrap();
        assert!(program.fragment_source.contains("e0_mainImage"));
        assert!(!program.fragment_source.contains("e1_"));
        assert_eq!(program.opacity_bindings.len(), 1);
        // The surviving binding points at the visible effect (original index 1).
        assert_eq!(program.opacity_bindings[0].effect_index, 1);
    }

    #[test]
    fn test_all_effects_skipped_yields_none() {
        let mut a = color_effect("a");
        a.blend_mode_mut().function = BlendFunction::Skip;
        assert!(fuse(&[a]).is_none());
        assert!(fuse(&[]).is_none());
    }

    #[test]
    fn test_blend_snippets_inserted_once_per_function() {
        let effects = vec![color_effect("a"), color_effect("b")];
        let program = fuse(&effects).unwrap();
        let occurrences = program
            .fragment_source
            .matches("vec4 blend_normal(const in vec4 x")
            .count();
        assert_eq!(occurrences, 1);
        // Both effects call it with their own opacity.
        assert!(program
            .fragment_source
            .contains("blend_normal(color0, color1, e0_opacity)"));
        assert!(program
            .fragment_source
            .contains("blend_normal(color0, color1, e1_opacity)"));
    }

    #[test]
    fn test_shared_depth_fetch_is_single() {
        let effects = vec![depth_effect("a"), depth_effect("b")];
        let program = fuse(&effects).unwrap();
        assert!(program.needs_depth);
        assert!(program.reads_depth);
        let fetches = program
            .fragment_source
            .matches("float depth = readDepth(")
            .count();
        assert_eq!(fetches, 1);
        assert!(program
            .fragment_source
            .contains("e0_mainImage(color0, vUv, depth)"));
        assert!(program
            .fragment_source
            .contains("e1_mainImage(color0, vUv, depth)"));
    }

    #[test]
    fn test_depth_attribute_on_uv_only_effect_requests_texture() {
        let effect = Effect::builder("warp")
            .fragment("void mainUv(inout vec2 uv) { uv.x += 0.01; }\n")
            .attributes(EffectAttributes::DEPTH)
            .build();
        let program = fuse(&[effect]).unwrap();
        assert!(program.needs_depth);
        assert!(!program.reads_depth);
        assert!(!program.fragment_source.contains("readDepth"));
    }

    #[test]
    fn test_user_symbol_named_uv_is_untouched() {
        let effect = Effect::builder("zoom")
            .fragment(
                "vec4 mainImage(const in vec4 inputColor, const in vec2 uv) {\n\
                 \tvec2 UV = uv * 0.5 + 0.25;\n\
                 \treturn texture2D(inputBuffer, UV);\n\
                 }\n",
            )
            .build();
        let program = fuse(&[effect]).unwrap();
        assert!(program.fragment_source.contains("vec2 UV = "));
        assert!(program
            .fragment_source
            .contains("texture2D(inputBuffer, vUv)"));
        assert!(!program.fragment_source.contains("<uv>"));
    }

    #[test]
    fn test_fragment_only_varyings_renamed_and_counted() {
        let snippet = "varying vec2 vShift;\n\
             vec4 mainImage(const in vec4 inputColor, const in vec2 uv) {\n\
             \treturn inputColor + vec4(vShift, 0.0, 0.0);\n\
             }\n";
        let effects = vec![
            Effect::builder("a").fragment(snippet).build(),
            Effect::builder("b").fragment(snippet).build(),
        ];
        let program = fuse(&effects).unwrap();
        assert!(shader_text::contains_word(&program.fragment_source, "e0_vShift"));
        assert!(shader_text::contains_word(&program.fragment_source, "e1_vShift"));
        assert!(!shader_text::contains_word(&program.fragment_source, "vShift"));
        // vUv plus one varying per effect.
        assert_eq!(program.varying_count, 3);
    }

    #[test]
    fn test_depth_attribute_without_textual_use_skips_fetch() {
        let effect = Effect::builder("marker")
            .fragment(
                "vec4 mainImage(const in vec4 inputColor, const in vec2 uv) { return inputColor; }",
            )
            .attributes(EffectAttributes::DEPTH)
            .build();
        let program = fuse(&[effect]).unwrap();
        assert!(program.needs_depth);
        assert!(!program.reads_depth);
        assert!(!program.fragment_source.contains("readDepth"));
    }

    #[test]
    fn test_uv_transform_threads_local_copy() {
        let effects = vec![uv_effect("flip"), color_effect("tint")];
        let program = fuse(&effects).unwrap();
        assert!(program.transformed_uv);
        assert!(program
            .fragment_source
            .contains("vec2 transformedUv = vUv;"));
        assert!(program
            .fragment_source
            .contains("texture2D(inputBuffer, transformedUv)"));
        assert!(!shader_text::contains_word(&program.fragment_source, "UV"));
    }

    #[test]
    fn test_untransformed_uv_uses_screen_uv() {
        let program = fuse(&[color_effect("a")]).unwrap();
        assert!(!program.transformed_uv);
        assert!(program
            .fragment_source
            .contains("texture2D(inputBuffer, vUv)"));
        assert!(!program.fragment_source.contains("transformedUv"));
    }

    #[test]
    fn test_macros_and_vertex_symbols_renamed_in_sync() {
        let effect = Effect::builder("grid")
            .fragment(
                "varying vec2 vOffset;\n\
                 vec4 mainImage(const in vec4 inputColor, const in vec2 uv) {\n\
                 \treturn inputColor * vec4(vec3(SCALE), 1.0) + vec4(vOffset, 0.0, 0.0);\n\
                 }\n",
            )
            .vertex(
                "varying vec2 vOffset;\n\
                 void mainSupport(const in vec2 uv) {\n\
                 \tvOffset = uv * SCALE;\n\
                 }\n",
            )
            .define("SCALE", "2.0")
            .build();
        let program = fuse(&[effect]).unwrap();
        assert!(program.macros.contains_key("e0_SCALE"));
        assert!(shader_text::contains_word(&program.fragment_source, "e0_SCALE"));
        assert!(shader_text::contains_word(&program.vertex_source, "e0_SCALE"));
        assert!(shader_text::contains_word(&program.vertex_source, "e0_vOffset"));
        assert!(shader_text::contains_word(&program.fragment_source, "e0_vOffset"));
        assert!(program.vertex_source.contains("e0_mainSupport(vUv);"));
        assert_eq!(program.varying_count, 2);
    }

    #[test]
    fn test_resource_counts() {
        let program = fuse(&[color_effect("a")]).unwrap();
        // intensity + opacity + 4 built-ins.
        assert_eq!(program.uniform_count, 6);
        assert_eq!(program.varying_count, 1);

        let program = fuse(&[depth_effect("d")]).unwrap();
        // opacity + 4 built-ins + depthBuffer + depthPacking.
        assert_eq!(program.uniform_count, 7);
    }
}
