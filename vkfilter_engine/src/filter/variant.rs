/// Filter variants as data: shader names, push-constant layout and geometry

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::graphics_device::{PushConstantRange, ShaderStages};

/// Default shader names (resolved by the shader source, e.g. `shaders/quad.vert.spv`)
pub const QUAD_VERTEX_SHADER: &str = "quad.vert";
pub const TEXTURE_FRAGMENT_SHADER: &str = "texture.frag";
pub const FULLSCREEN_VERTEX_SHADER: &str = "fullscreen.vert";
pub const ANIMATED_FRAGMENT_SHADER: &str = "animated.frag";

/// Per-frame constants pushed by a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushConstantLayout {
    None,
    /// 4x4 column-major transform (64 bytes)
    Transform,
    /// `{width, height, elapsed_seconds, padding}` (16 bytes)
    ResolutionTime,
}

impl PushConstantLayout {
    pub fn size(&self) -> u32 {
        match self {
            PushConstantLayout::None => 0,
            PushConstantLayout::Transform => std::mem::size_of::<TransformConstants>() as u32,
            PushConstantLayout::ResolutionTime => std::mem::size_of::<ResolutionTimeConstants>() as u32,
        }
    }

    /// Range declared in the pipeline layout
    pub fn range(&self) -> Option<PushConstantRange> {
        match self {
            PushConstantLayout::None => None,
            PushConstantLayout::Transform => Some(PushConstantRange {
                stages: ShaderStages::VERTEX,
                size: self.size(),
            }),
            PushConstantLayout::ResolutionTime => Some(PushConstantRange {
                stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                size: self.size(),
            }),
        }
    }
}

/// Geometry generated by the vertex shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// One triangle covering the viewport
    FullscreenTriangle,
    /// Two triangles forming a quad
    Quad,
}

impl Geometry {
    pub fn vertex_count(&self) -> u32 {
        match self {
            Geometry::FullscreenTriangle => 3,
            Geometry::Quad => 6,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformConstants {
    pub transform: [f32; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ResolutionTimeConstants {
    pub width: f32,
    pub height: f32,
    pub elapsed_seconds: f32,
    pub padding: f32,
}

/// Shader content and push-constant layout of one effect
#[derive(Debug, Clone, PartialEq)]
pub struct FilterVariant {
    pub name: String,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub push_constants: PushConstantLayout,
    pub geometry: Geometry,
    /// Applied before the per-frame transform
    pub fixed_transform: Option<Mat4>,
}

impl FilterVariant {
    /// Textured quad, per-frame transform pushed as-is
    pub fn passthrough() -> Self {
        Self {
            name: "passthrough".to_string(),
            vertex_shader: QUAD_VERTEX_SHADER.to_string(),
            fragment_shader: TEXTURE_FRAGMENT_SHADER.to_string(),
            push_constants: PushConstantLayout::Transform,
            geometry: Geometry::Quad,
            fixed_transform: None,
        }
    }

    /// Textured quad with a fixed affine transform
    pub fn affine(matrix: Mat4) -> Self {
        Self {
            name: "affine".to_string(),
            fixed_transform: Some(matrix),
            ..Self::passthrough()
        }
    }

    /// Full-screen triangle fed with resolution and elapsed time
    pub fn animated() -> Self {
        Self {
            name: "animated".to_string(),
            vertex_shader: FULLSCREEN_VERTEX_SHADER.to_string(),
            fragment_shader: ANIMATED_FRAGMENT_SHADER.to_string(),
            push_constants: PushConstantLayout::ResolutionTime,
            geometry: Geometry::FullscreenTriangle,
            fixed_transform: None,
        }
    }

    pub fn with_shaders(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.vertex_shader = vertex.into();
        self.fragment_shader = fragment.into();
        self
    }

    /// Transform pushed for a frame whose producer transform is `frame`
    pub fn effective_transform(&self, frame: Mat4) -> Mat4 {
        match self.fixed_transform {
            Some(fixed) => fixed * frame,
            None => frame,
        }
    }
}

/// Rotation by `degrees` about the centre of the quad
///
/// The quad spans clip space with its centre at the origin, so this is a
/// rotation around Z.
pub fn affine_rotation(degrees: f32) -> Mat4 {
    Mat4::from_axis_angle(Vec3::Z, degrees.to_radians())
}
