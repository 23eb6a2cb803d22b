//! Programmatic GLB construction for loader tests.
//!
//! Accessor data goes into one BIN chunk; the JSON document is written with
//! `serde_json::json!` and completed by [`GlbBuilder::finish`].

#![allow(dead_code)]

use serde_json::{Value, json};

const FLOAT: u32 = 5126;
const UNSIGNED_SHORT: u32 = 5123;

/// Collects buffer views and accessors over a single binary buffer
#[derive(Default)]
pub struct GlbBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

fn components(ty: &str) -> usize {
    match ty {
        "SCALAR" => 1,
        "VEC2" => 2,
        "VEC3" => 3,
        "VEC4" => 4,
        "MAT4" => 16,
        other => panic!("unknown accessor type {other}"),
    }
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_view(&mut self, bytes: &[u8]) -> usize {
        // Views start 4-byte aligned
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
        }));
        self.views.len() - 1
    }

    /// Float accessor with per-component min/max
    pub fn floats(&mut self, values: &[f32], ty: &str) -> usize {
        let n = components(ty);
        assert_eq!(values.len() % n, 0, "values do not fill {ty} elements");
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);

        let mut min = vec![f32::MAX; n];
        let mut max = vec![f32::MIN; n];
        for element in values.chunks_exact(n) {
            for (i, v) in element.iter().enumerate() {
                min[i] = min[i].min(*v);
                max[i] = max[i].max(*v);
            }
        }
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": values.len() / n,
            "type": ty,
            "min": min,
            "max": max,
        }));
        self.accessors.len() - 1
    }

    /// Unsigned short accessor (indices or joints)
    pub fn u16s(&mut self, values: &[u16], ty: &str) -> usize {
        let n = components(ty);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_SHORT,
            "count": values.len() / n,
            "type": ty,
        }));
        self.accessors.len() - 1
    }

    /// Attach buffers, views and accessors to `document` and emit GLB bytes
    pub fn finish(self, mut document: Value) -> Vec<u8> {
        document["asset"] = json!({ "version": "2.0" });
        document["buffers"] = json!([{ "byteLength": self.bin.len() }]);
        document["bufferViews"] = Value::Array(self.views);
        document["accessors"] = Value::Array(self.accessors);
        let json = serde_json::to_vec(&document).expect("Failed to serialize JSON");
        assemble_glb(&json, &self.bin)
    }
}

/// Assemble the final GLB binary
pub fn assemble_glb(json_bytes: &[u8], buffer_data: &[u8]) -> Vec<u8> {
    // Pad JSON to 4-byte alignment
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;

    // Pad buffer to 4-byte alignment
    let buffer_padding = (4 - (buffer_data.len() % 4)) % 4;
    let buffer_chunk_length = buffer_data.len() + buffer_padding;

    let total_length = 12 + 8 + json_chunk_length + 8 + buffer_chunk_length;
    let mut glb = Vec::with_capacity(total_length);

    // Header
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    // JSON chunk
    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes());
    glb.extend_from_slice(json_bytes);
    glb.extend(std::iter::repeat_n(0x20u8, json_padding));

    // BIN chunk
    glb.extend_from_slice(&(buffer_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&0x004E4942u32.to_le_bytes());
    glb.extend_from_slice(buffer_data);
    glb.extend(std::iter::repeat_n(0u8, buffer_padding));

    glb
}

/// Root -> Child (translated +1 on Y) plus a skinned triangle on node Body.
///
/// Clip "Wave" animates Child with translation keys at t={0, 1} and rotation
/// keys at t={0, 0.5, 1}.
pub fn generate_skinned_glb() -> Vec<u8> {
    let mut glb = GlbBuilder::new();

    let positions = glb.floats(
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0],
        "VEC3",
    );
    let normals = glb.floats(
        &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        "VEC3",
    );
    let joints = glb.u16s(&[0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0], "VEC4");
    let weights = glb.floats(
        &[
            1.0, 0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0,
        ],
        "VEC4",
    );
    let indices = glb.u16s(&[0, 1, 2], "SCALAR");

    let mut ibms = Vec::with_capacity(32);
    ibms.extend_from_slice(&glam::Mat4::IDENTITY.to_cols_array());
    ibms.extend_from_slice(
        &glam::Mat4::from_translation(glam::Vec3::new(0.0, -1.0, 0.0)).to_cols_array(),
    );
    let ibm = glb.floats(&ibms, "MAT4");

    let translation_times = glb.floats(&[0.0, 1.0], "SCALAR");
    let translations = glb.floats(&[0.0, 1.0, 0.0, 2.0, 1.0, 0.0], "VEC3");
    let rotation_times = glb.floats(&[0.0, 0.5, 1.0], "SCALAR");
    let half_turn = std::f32::consts::FRAC_1_SQRT_2;
    let rotations = glb.floats(
        &[
            0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, half_turn, half_turn, //
            0.0, 0.0, 0.0, 1.0,
        ],
        "VEC4",
    );

    glb.finish(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Root", "children": [1, 2] },
            { "name": "Child", "translation": [0.0, 1.0, 0.0] },
            { "name": "Body", "mesh": 0, "skin": 0 },
        ],
        "materials": [{
            "name": "Skin",
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.5, 0.25, 1.0] },
        }],
        "meshes": [{
            "name": "Triangle",
            "primitives": [{
                "attributes": {
                    "POSITION": positions,
                    "NORMAL": normals,
                    "JOINTS_0": joints,
                    "WEIGHTS_0": weights,
                },
                "indices": indices,
                "material": 0,
            }],
        }],
        "skins": [{ "joints": [0, 1], "inverseBindMatrices": ibm }],
        "animations": [{
            "name": "Wave",
            "samplers": [
                { "input": translation_times, "output": translations, "interpolation": "LINEAR" },
                { "input": rotation_times, "output": rotations, "interpolation": "LINEAR" },
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 1, "path": "translation" } },
                { "sampler": 1, "target": { "node": 1, "path": "rotation" } },
            ],
        }],
    }))
}

/// Single untextured triangle with the given primitive mode, optionally
/// carrying two JOINTS/WEIGHTS sets
pub fn generate_triangle_glb(mode: u32, two_joint_sets: bool) -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let positions = glb.floats(
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        "VEC3",
    );
    let mut attributes = json!({ "POSITION": positions });
    if two_joint_sets {
        for set in 0..2 {
            let joints = glb.u16s(&[0; 12], "VEC4");
            let weights = glb.floats(&[0.25; 12], "VEC4");
            attributes[format!("JOINTS_{set}")] = json!(joints);
            attributes[format!("WEIGHTS_{set}")] = json!(weights);
        }
    }
    glb.finish(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Mesh", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": attributes, "mode": mode }] }],
    }))
}

/// glTF JSON with one node posed by a column-major 4x4 `matrix`
pub fn generate_matrix_node_gltf(matrix: [f32; 16]) -> Vec<u8> {
    let document = json!({
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Pivot", "matrix": matrix }],
    });
    serde_json::to_vec(&document).expect("Failed to serialize JSON")
}

/// Node "Arm" with CUBICSPLINE translation and rotation samplers plus a
/// STEP scale sampler, all keyed at t={0, 1}.
///
/// Cubic outputs carry (in-tangent, value, out-tangent) triples whose
/// tangents are 9.0 so a loader that keeps them is easy to spot.
pub fn generate_cubic_step_glb() -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let times = glb.floats(&[0.0, 1.0], "SCALAR");
    let translations = glb.floats(
        &[
            9.0, 9.0, 9.0, 0.0, 0.0, 0.0, 9.0, 9.0, 9.0, //
            9.0, 9.0, 9.0, 1.0, 0.0, 0.0, 9.0, 9.0, 9.0,
        ],
        "VEC3",
    );
    let half_turn = std::f32::consts::FRAC_1_SQRT_2;
    let rotations = glb.floats(
        &[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, half_turn, half_turn, 0.0, 0.0, 0.0, 1.0,
        ],
        "VEC4",
    );
    let scales = glb.floats(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], "VEC3");

    glb.finish(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Arm" }],
        "animations": [{
            "name": "Swing",
            "samplers": [
                { "input": times, "output": translations, "interpolation": "CUBICSPLINE" },
                { "input": times, "output": rotations, "interpolation": "CUBICSPLINE" },
                { "input": times, "output": scales, "interpolation": "STEP" },
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "translation" } },
                { "sampler": 1, "target": { "node": 0, "path": "rotation" } },
                { "sampler": 2, "target": { "node": 0, "path": "scale" } },
            ],
        }],
    }))
}

/// Triangle whose POSITION accessor carries a sparse override of vertex 1
pub fn generate_sparse_glb() -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let positions = glb.floats(
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        "VEC3",
    );
    let sparse_indices = glb.push_view(&1u16.to_le_bytes());
    let sparse_values: Vec<u8> = [2.0f32, 0.0, 0.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let sparse_values = glb.push_view(&sparse_values);
    glb.accessors[positions]["sparse"] = json!({
        "count": 1,
        "indices": { "bufferView": sparse_indices, "componentType": UNSIGNED_SHORT },
        "values": { "bufferView": sparse_values },
    });

    glb.finish(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Mesh", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    }))
}

/// Single node plus an image whose bytes live in a buffer view
pub fn generate_buffer_view_image_glb() -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let png_signature = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let view = glb.push_view(&png_signature);
    glb.finish(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Root" }],
        "images": [{ "bufferView": view, "mimeType": "image/png" }],
    }))
}
