//! Mesh data: vertex/index buffers, parts, materials and bounds
//!
//! Buffers are shared (`Arc`) between the parts that draw from them. GPU
//! upload is out of scope; these types only own the bytes and describe them.

use std::str::FromStr;
use std::sync::Arc;

use drm_common::VertexDeclaration;
use glam::{Mat4, Vec3, Vec4};

use crate::error::{ModelError, Result};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// Inverted box that any point or box expands
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut bb, p| {
            bb.include_point(p);
            bb
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn include_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after `matrix` is applied
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(self.corners().map(|c| matrix.transform_point3(c)))
    }
}

/// Interleaved vertex payload plus its declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    declaration: VertexDeclaration,
    vertex_count: u32,
    data: Vec<u8>,
}

impl VertexBuffer {
    /// Wrap `data`. Its length must be a whole number of vertices.
    pub fn new(declaration: VertexDeclaration, data: Vec<u8>) -> Result<Self> {
        declaration
            .validate()
            .map_err(ModelError::invalid_argument)?;
        let stride = declaration.stride() as usize;
        if data.len() % stride != 0 {
            return Err(ModelError::format(format!(
                "vertex data length {} is not a multiple of stride {}",
                data.len(),
                stride
            )));
        }
        let vertex_count = u32::try_from(data.len() / stride)
            .map_err(|_| ModelError::not_supported("more than u32::MAX vertices"))?;
        Ok(Self {
            declaration,
            vertex_count,
            data,
        })
    }

    pub fn declaration(&self) -> &VertexDeclaration {
        &self.declaration
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn position(&self, vertex: usize) -> Option<Vec3> {
        self.declaration.read_position(&self.data, vertex)
    }
}

/// Width of one index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexElementSize {
    SixteenBits,
    ThirtyTwoBits,
}

impl IndexElementSize {
    pub const fn bytes(self) -> usize {
        match self {
            Self::SixteenBits => 2,
            Self::ThirtyTwoBits => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            16 => Ok(Self::SixteenBits),
            32 => Ok(Self::ThirtyTwoBits),
            other => Err(ModelError::not_supported(format!(
                "{other}-bit index buffers"
            ))),
        }
    }

    /// Narrowest width that can hold every index
    pub fn for_indices(indices: &[u32]) -> Self {
        if indices.iter().all(|&i| i <= u32::from(u16::MAX)) {
            Self::SixteenBits
        } else {
            Self::ThirtyTwoBits
        }
    }
}

/// Index payload with inferred element width
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuffer {
    element_size: IndexElementSize,
    data: Vec<u8>,
}

impl IndexBuffer {
    /// Pack indices using the narrowest width that fits
    pub fn from_indices(indices: &[u32]) -> Self {
        let element_size = IndexElementSize::for_indices(indices);
        let data = match element_size {
            IndexElementSize::SixteenBits => {
                let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexElementSize::ThirtyTwoBits => bytemuck::cast_slice(indices).to_vec(),
        };
        Self { element_size, data }
    }

    /// Wrap raw little-endian bytes. Length must be a multiple of the width.
    pub fn from_bytes(element_size: IndexElementSize, data: Vec<u8>) -> Result<Self> {
        if data.len() % element_size.bytes() != 0 {
            return Err(ModelError::format(format!(
                "index data length {} is not a multiple of {}",
                data.len(),
                element_size.bytes()
            )));
        }
        Ok(Self { element_size, data })
    }

    pub fn element_size(&self) -> IndexElementSize {
        self.element_size
    }

    pub fn index_count(&self) -> usize {
        self.data.len() / self.element_size.bytes()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        let width = self.element_size.bytes();
        let bytes = self.data.get(i * width..(i + 1) * width)?;
        Some(match self.element_size {
            IndexElementSize::SixteenBits => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            IndexElementSize::ThirtyTwoBits => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
        })
    }

    pub fn indices(&self) -> Vec<u32> {
        (0..self.index_count()).filter_map(|i| self.get(i)).collect()
    }

    /// Swap two indices in place. Out-of-range positions are ignored.
    pub fn swap(&mut self, a: usize, b: usize) {
        let width = self.element_size.bytes();
        if a == b || a.max(b) >= self.index_count() {
            return;
        }
        for k in 0..width {
            self.data.swap(a * width + k, b * width + k);
        }
    }
}

/// Primitive topology of a mesh part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveType {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
}

impl PrimitiveType {
    pub fn name(self) -> &'static str {
        match self {
            Self::TriangleList => "TriangleList",
            Self::TriangleStrip => "TriangleStrip",
            Self::LineList => "LineList",
            Self::LineStrip => "LineStrip",
        }
    }

    /// Number of indices consumed by `primitive_count` primitives, or `None`
    /// when the count does not fit in 32 bits
    pub fn index_count(self, primitive_count: u32) -> Option<u32> {
        match self {
            Self::TriangleList => primitive_count.checked_mul(3),
            Self::TriangleStrip => primitive_count.checked_add(2),
            Self::LineList => primitive_count.checked_mul(2),
            Self::LineStrip => primitive_count.checked_add(1),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TriangleList" => Ok(Self::TriangleList),
            "TriangleStrip" => Ok(Self::TriangleStrip),
            "LineList" => Ok(Self::LineList),
            "LineStrip" => Ok(Self::LineStrip),
            other => Err(ModelError::not_supported(format!("primitive type '{other}'"))),
        }
    }
}

/// Surface description. Textures are references (paths), never decoded here.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_color: Vec4,
    pub specular_color: Vec3,
    pub specular_power: f32,
    pub diffuse_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub specular_texture: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_color: Vec4::ONE,
            specular_color: Vec3::ZERO,
            specular_power: 0.0,
            diffuse_texture: None,
            normal_texture: None,
            specular_texture: None,
        }
    }
}

/// A drawable window over shared vertex and index buffers
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub vertex_buffer: Arc<VertexBuffer>,
    pub vertex_offset: u32,
    pub num_vertices: u32,
    pub index_buffer: Arc<IndexBuffer>,
    pub start_index: u32,
    pub primitive_count: u32,
    pub primitive_type: PrimitiveType,
    /// Local-space bounds of the vertices in this part's window
    pub bounding_box: BoundingBox,
    /// Index into [`Model::materials`](crate::Model::materials)
    pub material: Option<usize>,
    /// Index into [`Model::skins`](crate::Model::skins)
    pub skin: Option<usize>,
}

/// Named collection of parts attached to a bone
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub parts: Vec<MeshPart>,
    pub bounding_box: BoundingBox,
}

impl Mesh {
    pub fn new(name: impl Into<String>, parts: Vec<MeshPart>) -> Self {
        let bounding_box = parts
            .iter()
            .fold(BoundingBox::EMPTY, |bb, p| bb.union(&p.bounding_box));
        Self {
            name: name.into(),
            parts,
            bounding_box,
        }
    }
}

/// What a skeleton needs to know about the mesh representation it carries
pub trait MeshData {
    /// Local-space bounds
    fn bounding_box(&self) -> BoundingBox;
}

impl MeshData for Mesh {
    fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }
}
