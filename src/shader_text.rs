//! Word-boundary-safe text transforms over GLSL snippets.
//!
//! The fusion engine rewrites effect-local symbols by textual substitution.
//! All substitution goes through [`replace_word`] so partial-name collisions
//! (`blur` vs `blurRadius`) cannot occur. Scanning helpers extract the
//! locally declared names a snippet contributes: function definitions,
//! varyings, and the recognized entry-point signatures.

use regex::Regex;

/// GLSL type keywords that can start a function definition.
const TYPES: &str = "void|float|int|uint|bool|vec2|vec3|vec4|ivec2|ivec3|ivec4|uvec2|uvec3|uvec4|bvec2|bvec3|bvec4|mat2|mat3|mat4";

fn word_pattern(word: &str) -> Regex {
    // The pattern is built from an escaped literal; it cannot fail to parse.
    Regex::new(&format!(r"\b{}\b", regex::escape(word))).expect("escaped word pattern")
}

/// Replace every whole-word occurrence of `word` with `replacement`.
pub fn replace_word(source: &str, word: &str, replacement: &str) -> String {
    word_pattern(word)
        .replace_all(source, replacement)
        .into_owned()
}

/// Whether `word` occurs as a whole word in `source`.
pub fn contains_word(source: &str, word: &str) -> bool {
    word_pattern(word).is_match(source)
}

/// Names of the functions defined (or prototyped) in a snippet, in order of
/// appearance, deduplicated.
pub fn function_names(source: &str) -> Vec<String> {
    let re = Regex::new(&format!(r"\b(?:{TYPES})\s+(\w+)\s*\(")).expect("function pattern");
    let mut names = Vec::new();
    for captures in re.captures_iter(source) {
        let name = captures[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Names of the `varying` declarations in a snippet.
pub fn varying_names(source: &str) -> Vec<String> {
    let re = Regex::new(r"\bvarying\s+\w+\s+(\w+)\s*;").expect("varying pattern");
    let mut names = Vec::new();
    for captures in re.captures_iter(source) {
        let name = captures[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Whether the snippet defines a function named `name`.
pub fn has_function(source: &str, name: &str) -> bool {
    Regex::new(&format!(
        r"\b(?:{TYPES})\s+{}\s*\(",
        regex::escape(name)
    ))
    .expect("function lookup pattern")
    .is_match(source)
}

/// Whether a snippet's `mainImage` entry declares a `depth` parameter.
///
/// This is deliberately a textual check on the parameter list: the DEPTH
/// attribute alone requests a depth texture, but only a literal `depth`
/// parameter triggers the shared per-fragment depth fetch.
pub fn main_image_uses_depth(source: &str) -> bool {
    let re = Regex::new(r"\bmainImage\s*\(([^)]*)\)").expect("mainImage pattern");
    match re.captures(source) {
        Some(captures) => contains_word(&captures[1], "depth"),
        None => false,
    }
}

/// Indent every non-empty line by `levels` tabs.
pub fn indent(source: &str, levels: usize) -> String {
    let prefix = "\t".repeat(levels);
    source
        .replace("\r\n", "\n")
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
