//! Subject scene: one glTF model group oriented toward the pointer.
//!
//! Loading failures are a degraded mode, not an error: the scene stays
//! empty, the backdrop still renders, and the glyph grid keeps animating.

use std::path::Path;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3};

/// Pointer-to-look-target scale on both axes.
pub const LOOK_SCALE: f32 = 1.5;
/// Fixed depth of the look target in front of the subject.
pub const LOOK_DEPTH: f32 = 5.0;

/// Longest bounding-box edge after normalization.
const SUBJECT_FIT: f32 = 2.5;
const GROUP_POSITION: Vec3 = Vec3::new(0.0, -1.0, 0.0);
const GROUP_SCALE: f32 = 2.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

pub struct SubjectScene {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    model_matrix: Mat4,
}

impl SubjectScene {
    /// Load the subject model. A missing or corrupt asset yields an empty
    /// scene and one log line; nothing is propagated.
    pub fn load(path: &Path) -> Self {
        let (vertices, indices) = match import_meshes(path) {
            Ok(mesh) => mesh,
            Err(error) => {
                eprintln!(
                    "[glyphcast] subject model {} unavailable, rendering without it: {error:#}",
                    path.display()
                );
                (Vec::new(), Vec::new())
            }
        };

        let mut scene = Self {
            vertices,
            indices,
            model_matrix: Mat4::IDENTITY,
        };
        scene.orient_toward(Vec2::ZERO);
        scene
    }

    pub fn empty() -> Self {
        let mut scene = Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            model_matrix: Mat4::IDENTITY,
        };
        scene.orient_toward(Vec2::ZERO);
        scene
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Point the subject group at the target derived from the smoothed
    /// pointer vector. Runs every frame before the render pass.
    pub fn orient_toward(&mut self, pointer: Vec2) {
        let target = Vec3::new(pointer.x * LOOK_SCALE, pointer.y * LOOK_SCALE, LOOK_DEPTH);
        let rotation = look_rotation(GROUP_POSITION, target);
        self.model_matrix = Mat4::from_translation(GROUP_POSITION)
            * rotation
            * Mat4::from_scale(Vec3::splat(GROUP_SCALE));
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }
}

/// Rotation orienting +Z from `from` toward `to`, Y-up.
fn look_rotation(from: Vec3, to: Vec3) -> Mat4 {
    let forward = to - from;
    if forward.length_squared() < 1e-8 {
        return Mat4::IDENTITY;
    }
    let z_axis = forward.normalize();
    let mut x_axis = Vec3::Y.cross(z_axis);
    if x_axis.length_squared() < 1e-8 {
        x_axis = Vec3::X;
    }
    let x_axis = x_axis.normalize();
    let y_axis = z_axis.cross(x_axis);
    Mat4::from_mat3(Mat3::from_cols(x_axis, y_axis, z_axis))
}

/// Flatten the default glTF scene into one vertex/index soup with node
/// transforms applied, then normalize it to a fixed size around the origin.
fn import_meshes(path: &Path) -> Result<(Vec<MeshVertex>, Vec<u32>)> {
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("failed to import {}", path.display()))?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("model contains no scene")?;
    for node in scene.nodes() {
        collect_node(&node, Mat4::IDENTITY, &buffers, &mut vertices, &mut indices);
    }

    if indices.is_empty() {
        anyhow::bail!("model contains no triangle data");
    }

    normalize(&mut vertices);
    Ok((vertices, indices))
}

fn collect_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    vertices: &mut Vec<MeshVertex>,
    indices: &mut Vec<u32>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
        for primitive in mesh.primitives() {
            let reader = primitive
                .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|normals| normals.collect())
                .unwrap_or_else(|| face_normals(&positions));

            let base = vertices.len() as u32;
            for (index, position) in positions.iter().enumerate() {
                let position = world.transform_point3(Vec3::from(*position));
                let normal = normal_matrix
                    * Vec3::from(normals.get(index).copied().unwrap_or([0.0, 0.0, 1.0]));
                vertices.push(MeshVertex {
                    position: position.to_array(),
                    normal: normal.normalize_or_zero().to_array(),
                });
            }

            match reader.read_indices() {
                Some(read) => indices.extend(read.into_u32().map(|index| base + index)),
                None => indices.extend(base..base + positions.len() as u32),
            }
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, vertices, indices);
    }
}

/// Fallback for primitives without normals: face normals accumulated over
/// consecutive triangles.
fn face_normals(positions: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for triangle in (0..positions.len() / 3).map(|t| t * 3) {
        let a = Vec3::from(positions[triangle]);
        let b = Vec3::from(positions[triangle + 1]);
        let c = Vec3::from(positions[triangle + 2]);
        let face = (b - a).cross(c - a);
        for offset in 0..3 {
            normals[triangle + offset] += face;
        }
    }
    normals
        .into_iter()
        .map(|normal| normal.normalize_or_zero().to_array())
        .collect()
}

/// Scale the soup so its longest bounding-box edge is `SUBJECT_FIT`,
/// centered on the origin.
fn normalize(vertices: &mut [MeshVertex]) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for vertex in vertices.iter() {
        let position = Vec3::from(vertex.position);
        min = min.min(position);
        max = max.max(position);
    }

    let size = max - min;
    let max_dim = size.x.max(size.y).max(size.z);
    if max_dim <= 0.0 {
        return;
    }
    let scale = SUBJECT_FIT / max_dim;
    let center = (min + max) * 0.5;

    for vertex in vertices.iter_mut() {
        let position = (Vec3::from(vertex.position) - center) * scale;
        vertex.position = position.to_array();
    }
}
