//! Vertex declarations and packing utilities
//!
//! A vertex buffer is an interleaved byte payload described by an ordered list
//! of (usage, format, offset) elements. Loaders build declarations element by
//! element from their source attribute names; the runtime only ever reads
//! positions back (for bounding boxes).

use glam::{Vec3, Vec4};
use half::f16;
use serde::{Deserialize, Serialize};

/// Semantic meaning of a vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexElementUsage {
    Position,
    Normal,
    Tangent,
    Binormal,
    TextureCoordinate,
    Color,
    BlendIndices,
    BlendWeight,
}

/// Storage format of a vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexElementFormat {
    Single,
    Vector2,
    Vector3,
    Vector4,
    /// Packed RGBA, one unorm8 per channel
    Color,
    /// Four unsigned bytes (packed blend indices)
    Byte4,
    Short2,
    Short4,
    NormalizedShort2,
    NormalizedShort4,
    HalfVector2,
    HalfVector4,
}

impl VertexElementFormat {
    /// Size of one element in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Single => 4,
            Self::Vector2 => 8,
            Self::Vector3 => 12,
            Self::Vector4 => 16,
            Self::Color => 4,
            Self::Byte4 => 4,
            Self::Short2 => 4,
            Self::Short4 => 8,
            Self::NormalizedShort2 => 4,
            Self::NormalizedShort4 => 8,
            Self::HalfVector2 => 4,
            Self::HalfVector4 => 8,
        }
    }
}

/// One element of a vertex declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VertexElement {
    pub offset: u32,
    pub format: VertexElementFormat,
    pub usage: VertexElementUsage,
    pub usage_index: u32,
}

impl VertexElement {
    pub const fn new(
        offset: u32,
        format: VertexElementFormat,
        usage: VertexElementUsage,
        usage_index: u32,
    ) -> Self {
        Self {
            offset,
            format,
            usage,
            usage_index,
        }
    }

    /// First byte past this element, `None` when it lies beyond `u32::MAX`
    pub const fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.format.size())
    }
}

/// Ordered element list plus stride
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexDeclaration {
    stride: u32,
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    /// Build a tightly packed declaration; offsets follow element order
    pub fn from_elements(
        elements: impl IntoIterator<Item = (VertexElementUsage, VertexElementFormat, u32)>,
    ) -> Self {
        let mut offset = 0;
        let elements = elements
            .into_iter()
            .map(|(usage, format, usage_index)| {
                let element = VertexElement::new(offset, format, usage, usage_index);
                offset += format.size();
                element
            })
            .collect();
        Self {
            stride: offset,
            elements,
        }
    }

    /// Declaration with explicit offsets. Call [`validate`](Self::validate)
    /// before trusting data read from a file.
    pub fn with_stride(stride: u32, elements: Vec<VertexElement>) -> Self {
        Self { stride, elements }
    }

    /// Check that every element fits inside the stride and none overlap
    pub fn validate(&self) -> Result<(), String> {
        if self.elements.is_empty() {
            return Err("vertex declaration has no elements".to_string());
        }
        let mut ranges: Vec<(u32, u32)> = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let end = match element.end() {
                Some(end) if end <= self.stride => end,
                _ => {
                    return Err(format!(
                        "{:?} element at offset {} overruns stride {}",
                        element.usage, element.offset, self.stride
                    ));
                }
            };
            let start = element.offset;
            if ranges.iter().any(|&(s, e)| start < e && s < end) {
                return Err(format!(
                    "{:?} element at offset {} overlaps another element",
                    element.usage, element.offset
                ));
            }
            ranges.push((start, end));
        }
        Ok(())
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn find(&self, usage: VertexElementUsage, usage_index: u32) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.usage == usage && e.usage_index == usage_index)
    }

    pub fn contains(&self, usage: VertexElementUsage) -> bool {
        self.elements.iter().any(|e| e.usage == usage)
    }

    /// Decode the position of vertex `index` from an interleaved payload.
    ///
    /// Supports Vector3, Vector4 and HalfVector4 positions. Returns `None` when
    /// there is no position element, the format is not positional, or the
    /// vertex lies outside `data`.
    pub fn read_position(&self, data: &[u8], index: usize) -> Option<Vec3> {
        let element = self.find(VertexElementUsage::Position, 0)?;
        let start = index * self.stride as usize + element.offset as usize;
        let bytes = data.get(start..start + element.format.size() as usize)?;
        match element.format {
            VertexElementFormat::Vector3 | VertexElementFormat::Vector4 => Some(Vec3::new(
                read_f32(bytes, 0),
                read_f32(bytes, 4),
                read_f32(bytes, 8),
            )),
            VertexElementFormat::HalfVector4 => Some(Vec3::new(
                read_f16(bytes, 0),
                read_f16(bytes, 2),
                read_f16(bytes, 4),
            )),
            _ => None,
        }
    }
}

#[inline]
fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[inline]
fn read_f16(bytes: &[u8], at: usize) -> f32 {
    f16::from_le_bytes([bytes[at], bytes[at + 1]]).to_f32()
}

// ============================================================================
// Packing
// ============================================================================

/// Convert f32 to unsigned normalized 8-bit integer (unorm8)
///
/// Maps f32 range [0.0, 1.0] to u8 range [0, 255], rounding to nearest.
#[inline]
pub fn f32_to_unorm8(value: f32) -> u8 {
    let clamped = value.clamp(0.0, 1.0);
    (clamped * 255.0 + 0.5) as u8
}

/// Pack RGBA color (f32x4) to Unorm8x4 format
#[inline]
pub fn pack_color_rgba_unorm8(color: Vec4) -> [u8; 4] {
    [
        f32_to_unorm8(color.x),
        f32_to_unorm8(color.y),
        f32_to_unorm8(color.z),
        f32_to_unorm8(color.w),
    ]
}

/// Unpack Unorm8x4 color back to f32x4
#[inline]
pub fn unpack_color_rgba_unorm8(packed: [u8; 4]) -> Vec4 {
    Vec4::new(
        f32::from(packed[0]) / 255.0,
        f32::from(packed[1]) / 255.0,
        f32::from(packed[2]) / 255.0,
        f32::from(packed[3]) / 255.0,
    )
}

/// Pack up to four joint indices into a Byte4 element.
///
/// Returns `None` if any index does not fit in a byte.
#[inline]
pub fn pack_bone_indices(indices: [u32; 4]) -> Option<[u8; 4]> {
    Some([
        u8::try_from(indices[0]).ok()?,
        u8::try_from(indices[1]).ok()?,
        u8::try_from(indices[2]).ok()?,
        u8::try_from(indices[3]).ok()?,
    ])
}
