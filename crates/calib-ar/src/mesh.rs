//! Vertex/index data for the overlay drawn on top of the pattern.
//!
//! Geometry is in pattern units with the board on `Z = 0`; the camera sees
//! the board from the `-Z` side, so anything "standing" on it extrudes
//! towards `-Z`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    Lines,
    Triangles,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayMesh {
    pub primitive: Primitive,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

impl OverlayMesh {
    /// Pattern axes from the first corner: x red, y green, and the board
    /// normal (pointing at the camera) blue.
    pub fn axes(length: f32) -> Self {
        let o = [0.0, 0.0, 0.0];
        let vertices = vec![
            MeshVertex { position: o, color: RED },
            MeshVertex { position: [length, 0.0, 0.0], color: RED },
            MeshVertex { position: o, color: GREEN },
            MeshVertex { position: [0.0, length, 0.0], color: GREEN },
            MeshVertex { position: o, color: BLUE },
            MeshVertex { position: [0.0, 0.0, -length], color: BLUE },
        ];
        Self {
            primitive: Primitive::Lines,
            vertices,
            indices: (0..6).collect(),
        }
    }

    /// Cube of side `size` on the first square of the board. Faces wind
    /// counter-clockwise seen from outside.
    pub fn cube(size: f32) -> Self {
        let s = size;
        let corners: [[f32; 3]; 8] = [
            [0.0, 0.0, 0.0],
            [s, 0.0, 0.0],
            [s, s, 0.0],
            [0.0, s, 0.0],
            [0.0, 0.0, -s],
            [s, 0.0, -s],
            [s, s, -s],
            [0.0, s, -s],
        ];
        let inv = 1.0 / s.max(f32::EPSILON);
        let vertices = corners
            .iter()
            .map(|p| MeshVertex {
                position: *p,
                // colour by position so faces are distinguishable unlit
                color: [p[0] * inv, p[1] * inv, -p[2] * inv],
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 0, 2, 3, // on the board
            4, 6, 5, 4, 7, 6, // top
            0, 5, 1, 0, 4, 5, // y = 0
            1, 6, 2, 1, 5, 6, // x = s
            2, 7, 3, 2, 6, 7, // y = s
            3, 4, 0, 3, 7, 4, // x = 0
        ];
        Self {
            primitive: Primitive::Triangles,
            vertices,
            indices,
        }
    }

    /// Two triangles covering the viewport in `[0, 1]^2` screen coordinates,
    /// used to blit the video texture behind the overlay.
    pub fn fullscreen_quad() -> Self {
        let white = [1.0, 1.0, 1.0];
        let vertices = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            .iter()
            .map(|[x, y]| MeshVertex {
                position: [*x, *y, 0.0],
                color: white,
            })
            .collect();
        Self {
            primitive: Primitive::Triangles,
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    pub fn is_well_formed(&self) -> bool {
        let per_primitive = match self.primitive {
            Primitive::Lines => 2,
            Primitive::Triangles => 3,
        };
        self.indices.len() % per_primitive == 0
            && self
                .indices
                .iter()
                .all(|&i| (i as usize) < self.vertices.len())
    }
}
