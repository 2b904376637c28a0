//! Runtime uniform values for shader programs.

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::renderer::TextureId;

/// A value bound to a named shader uniform.
///
/// Values may be mutated freely between frames; only the owning pass's
/// recompile operation is needed when the *set* of uniforms changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// Sampler binding; carries no uniform-buffer bytes.
    Texture(TextureId),
}

impl Default for UniformValue {
    fn default() -> Self {
        UniformValue::Float(0.0)
    }
}

impl UniformValue {
    /// Convert to bytes for GPU upload. Texture bindings yield no bytes;
    /// they are bound through the backend's sampler path instead.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Bool(v) => bytemuck::bytes_of(&(*v as u32)).to_vec(),
            UniformValue::Vec2(v) => {
                let a = v.to_array();
                bytemuck::cast_slice(&a).to_vec()
            }
            UniformValue::Vec3(v) => {
                let a = v.to_array();
                bytemuck::cast_slice(&a).to_vec()
            }
            UniformValue::Vec4(v) => {
                let a = v.to_array();
                bytemuck::cast_slice(&a).to_vec()
            }
            UniformValue::Mat4(v) => {
                let a = v.to_cols_array();
                bytemuck::cast_slice(&a).to_vec()
            }
            UniformValue::Texture(_) => Vec::new(),
        }
    }

    /// Get as float.
    pub fn as_float(&self) -> f32 {
        match self {
            UniformValue::Float(v) => *v,
            UniformValue::Int(v) => *v as f32,
            _ => 0.0,
        }
    }

    /// Get as vec4, padding smaller vector types.
    pub fn as_vec4(&self) -> Vec4 {
        match self {
            UniformValue::Float(v) => Vec4::new(*v, 0.0, 0.0, 0.0),
            UniformValue::Vec2(v) => Vec4::new(v.x, v.y, 0.0, 0.0),
            UniformValue::Vec3(v) => Vec4::new(v.x, v.y, v.z, 0.0),
            UniformValue::Vec4(v) => *v,
            _ => Vec4::ZERO,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bytes_sizes() {
        assert_eq!(UniformValue::Float(1.0).to_bytes().len(), 4);
        assert_eq!(UniformValue::Vec2(Vec2::ONE).to_bytes().len(), 8);
        assert_eq!(UniformValue::Vec3(Vec3::ONE).to_bytes().len(), 12);
        assert_eq!(UniformValue::Vec4(Vec4::ONE).to_bytes().len(), 16);
        assert_eq!(UniformValue::Mat4(Mat4::IDENTITY).to_bytes().len(), 64);
        assert!(UniformValue::Texture(TextureId(0)).to_bytes().is_empty());
    }

    #[test]
    fn test_as_vec4_pads() {
        let v = UniformValue::Vec2(Vec2::new(0.25, 0.5));
        assert_eq!(v.as_vec4(), Vec4::new(0.25, 0.5, 0.0, 0.0));
    }

    #[test]
    fn test_serde_round_trip() {
        let values = [
            UniformValue::Float(0.5),
            UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)),
            UniformValue::Mat4(Mat4::IDENTITY),
            UniformValue::Texture(TextureId(7)),
        ];
        for value in values {
            let json = serde_json::to_string(&value).unwrap();
            let back: UniformValue = serde_json::from_str(&json).unwrap();
            assert_eq!(value, back);
        }
    }
}
