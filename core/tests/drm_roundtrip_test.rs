//! DRM write/read round trips for both file layouts.

mod glb_generator;

use std::path::Path;

use drm_common::DRM_FORMAT;
use drm_core::formats::drm::{read_drm, read_drm_from, read_jdrm, write_drm, write_drm_to, write_jdrm};
use drm_core::formats::g3d::load_g3dj;
use drm_core::formats::gltf::load_gltf;
use drm_core::{LoadOptions, Model, ModelBuilder, load_model};
use tempfile::tempdir;

const SHARED_INDEX_G3D: &str = r#"{
    "id": "crate",
    "meshes": [{
        "attributes": ["POSITION", "TEXCOORD0"],
        "vertices": [
            0, 0, 0, 0, 0,
            1, 0, 0, 1, 0,
            1, 1, 0, 1, 1,
            0, 1, 0, 0, 1
        ],
        "parts": [
            {"id": "lower", "type": "TRIANGLES", "indices": [0, 1, 2]},
            {"id": "upper", "type": "TRIANGLES", "indices": [0, 2, 3]}
        ]
    }],
    "materials": [{"id": "wood", "diffuse": [0.6, 0.4, 0.2]}, {"id": "metal"}],
    "nodes": [{"id": "lid", "rotation": [0, 0.38268343, 0, 0.9238795], "parts": [
        {"meshpartid": "lower", "materialid": "wood"},
        {"meshpartid": "upper", "materialid": "metal"}
    ]}]
}"#;

fn skinned_model() -> Model {
    let content = load_gltf(&glb_generator::generate_skinned_glb(), None).unwrap();
    ModelBuilder::new(content).build().unwrap()
}

fn crate_model() -> Model {
    ModelBuilder::new(load_g3dj(SHARED_INDEX_G3D).unwrap())
        .build()
        .unwrap()
}

fn reload(path: &Path) -> Model {
    load_model(path, &LoadOptions::default()).unwrap()
}

/// Names, hierarchy, poses, buffers, skins and keyframes all survive
fn assert_same_model(expected: &Model, actual: &Model) {
    assert_eq!(expected.bone_count(), actual.bone_count());
    for (a, b) in expected.bones().iter().zip(actual.bones()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.parent(), b.parent());
        assert_eq!(a.children(), b.children());
        assert!(a.default_pose().abs_diff_eq(b.default_pose(), 1e-6));
        assert_eq!(a.skin(), b.skin());

        match (a.mesh(), b.mesh()) {
            (None, None) => {}
            (Some(ma), Some(mb)) => {
                assert_eq!(ma.name, mb.name);
                assert_eq!(ma.parts.len(), mb.parts.len());
                for (pa, pb) in ma.parts.iter().zip(&mb.parts) {
                    assert_eq!(pa.vertex_buffer.declaration(), pb.vertex_buffer.declaration());
                    assert_eq!(pa.vertex_buffer.data(), pb.vertex_buffer.data());
                    assert_eq!(pa.index_buffer.element_size(), pb.index_buffer.element_size());
                    assert_eq!(pa.index_buffer.data(), pb.index_buffer.data());
                    assert_eq!(pa.start_index, pb.start_index);
                    assert_eq!(pa.primitive_count, pb.primitive_count);
                    assert_eq!(pa.primitive_type, pb.primitive_type);
                    assert_eq!(pa.material, pb.material);
                    assert_eq!(pa.skin, pb.skin);
                }
            }
            _ => panic!("mesh presence differs on bone '{}'", a.name()),
        }
    }

    assert_eq!(expected.materials(), actual.materials());

    assert_eq!(expected.skins().len(), actual.skins().len());
    for (sa, sb) in expected.skins().iter().zip(actual.skins()) {
        assert_eq!(sa.joints(), sb.joints());
    }

    assert_eq!(expected.animations().len(), actual.animations().len());
    for clip in expected.animations() {
        let other = actual.clip(clip.name()).unwrap();
        assert_eq!(clip.duration(), other.duration());
        assert_eq!(clip.channels().len(), other.channels().len());
        for (ca, cb) in clip.channels().iter().zip(other.channels()) {
            assert_eq!(ca.bone(), cb.bone());
            assert_eq!(ca.translation_mode, cb.translation_mode);
            assert_eq!(ca.rotation_mode, cb.rotation_mode);
            assert_eq!(ca.scale_mode, cb.scale_mode);
            assert_eq!(ca.keyframes(), cb.keyframes());
        }
    }
}

#[test]
fn test_skinned_drm_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("skinned.drm");
    let model = skinned_model();

    write_drm(&model, &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(DRM_FORMAT.has_magic(&bytes));

    assert_same_model(&model, &reload(&path));
}

#[test]
fn test_skinned_jdrm_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("skinned.jdrm");
    let model = skinned_model();

    write_jdrm(&model, &path).unwrap();
    let sidecar = dir.path().join("skinned.bin");
    assert!(sidecar.exists());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["BinaryPath"], "skinned.bin");

    assert_same_model(&model, &reload(&path));
}

#[test]
fn test_shared_index_buffer_written_once() {
    let model = crate_model();
    let mut bytes = Vec::new();
    write_drm_to(&model, &mut bytes).unwrap();

    let content = read_drm_from(bytes.as_slice()).unwrap();
    assert_eq!(content.vertex_buffers.len(), 1);
    assert_eq!(content.index_buffers.len(), 1);
    let parts = &content.meshes[0].parts;
    assert_eq!(parts[0].start_index, 0);
    assert_eq!(parts[1].start_index, 3);

    let reloaded = ModelBuilder::new(content).build().unwrap();
    assert_same_model(&model, &reloaded);
}

#[test]
fn test_both_layouts_read_the_same_content() {
    let dir = tempdir().expect("Failed to create temp dir");
    let drm_path = dir.path().join("crate.drm");
    let jdrm_path = dir.path().join("crate.jdrm");
    let model = crate_model();
    write_drm(&model, &drm_path).unwrap();
    write_jdrm(&model, &jdrm_path).unwrap();

    let from_drm = ModelBuilder::new(read_drm(&drm_path).unwrap()).build().unwrap();
    let from_jdrm = ModelBuilder::new(read_jdrm(&jdrm_path).unwrap())
        .build()
        .unwrap();
    assert_same_model(&from_drm, &from_jdrm);
}

#[test]
fn test_rewritten_file_is_byte_identical() {
    let model = skinned_model();
    let mut first = Vec::new();
    write_drm_to(&model, &mut first).unwrap();

    let reloaded = ModelBuilder::new(read_drm_from(first.as_slice()).unwrap())
        .build()
        .unwrap();
    let mut second = Vec::new();
    write_drm_to(&reloaded, &mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_truncated_file_fails() {
    let model = crate_model();
    let mut bytes = Vec::new();
    write_drm_to(&model, &mut bytes).unwrap();
    bytes.truncate(bytes.len() - 5);
    assert!(read_drm_from(bytes.as_slice()).is_err());
}
