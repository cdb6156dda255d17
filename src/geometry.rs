//! Full-viewport quad geometry and camera-to-quad orientation.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Clip-space corners of the quad in triangle-strip order.
pub const QUAD_POSITIONS: [[f32; 4]; 4] = [
    [-1.0, -1.0, 0.0, 1.0],
    [-1.0, 1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
];

/// Texture coordinates matching [`QUAD_POSITIONS`] for an upright image.
/// Texture space has v pointing down, clip space has y pointing up.
const UPRIGHT_TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0]];

/// Number of vertices in the strip.
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Clockwise rotation applied to the camera image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    fn quarter_turns(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 1,
            Rotation::Half => 2,
            Rotation::ThreeQuarter => 3,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarter),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let degrees: u32 = s.trim().parse().map_err(|_| format!("not a rotation: {s}"))?;
        Rotation::try_from(degrees)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.quarter_turns() * 90)
    }
}

/// How the camera image is laid onto the quad.
///
/// Mirroring is applied first, then flipping, then rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuadOrientation {
    pub rotation: Rotation,
    /// Swap left and right (selfie view)
    pub mirror: bool,
    /// Swap top and bottom
    pub flip: bool,
}

impl Default for QuadOrientation {
    fn default() -> Self {
        // Front cameras are shown mirrored
        Self {
            rotation: Rotation::None,
            mirror: true,
            flip: false,
        }
    }
}

impl QuadOrientation {
    /// An orientation that shows the image exactly as captured.
    pub const UPRIGHT: QuadOrientation = QuadOrientation {
        rotation: Rotation::None,
        mirror: false,
        flip: false,
    };

    /// Texture coordinates for the four strip vertices.
    pub fn tex_coords(&self) -> [[f32; 2]; 4] {
        UPRIGHT_TEX_COORDS.map(|[mut u, mut v]| {
            if self.mirror {
                u = 1.0 - u;
            }
            if self.flip {
                v = 1.0 - v;
            }
            for _ in 0..self.rotation.quarter_turns() {
                // The vertex that showed texel (u, v) now shows the texel a
                // quarter turn counter-clockwise of it, so the image turns clockwise.
                (u, v) = (v, 1.0 - u);
            }
            [u, v]
        })
    }
}

/// Layout of the position buffer (slot 0, `vec4<f32>` at location 0).
pub fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x4,
        }],
    }
}

/// Layout of the texture coordinate buffer (slot 1, `vec2<f32>` at location 1).
pub fn tex_coord_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x2,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_cover_clip_space() {
        let xs: Vec<f32> = QUAD_POSITIONS.iter().map(|p| p[0]).collect();
        let ys: Vec<f32> = QUAD_POSITIONS.iter().map(|p| p[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 1.0);
        for p in QUAD_POSITIONS {
            assert_eq!(p[2], 0.0);
            assert_eq!(p[3], 1.0);
        }
    }

    #[test]
    fn test_upright_maps_bottom_left_to_bottom_of_texture() {
        let uv = QuadOrientation::UPRIGHT.tex_coords();
        assert_eq!(uv, UPRIGHT_TEX_COORDS);
        // (-1,-1) is the bottom-left corner and samples the last texel row
        assert_eq!(uv[0], [0.0, 1.0]);
    }

    #[test]
    fn test_mirror_swaps_columns() {
        let orientation = QuadOrientation { mirror: true, ..QuadOrientation::UPRIGHT };
        assert_eq!(
            orientation.tex_coords(),
            [[1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]
        );
    }

    #[test]
    fn test_flip_swaps_rows() {
        let orientation = QuadOrientation { flip: true, ..QuadOrientation::UPRIGHT };
        assert_eq!(
            orientation.tex_coords(),
            [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]
        );
    }

    #[test]
    fn test_half_turn_equals_mirror_and_flip() {
        let half = QuadOrientation { rotation: Rotation::Half, ..QuadOrientation::UPRIGHT };
        let both = QuadOrientation { rotation: Rotation::None, mirror: true, flip: true };
        assert_eq!(half.tex_coords(), both.tex_coords());
    }

    #[test]
    fn test_quarter_turn_puts_top_left_texel_top_right() {
        let orientation = QuadOrientation { rotation: Rotation::Quarter, ..QuadOrientation::UPRIGHT };
        let uv = orientation.tex_coords();
        // Vertex 3 is the top-right corner of the viewport
        assert_eq!(uv[3], [0.0, 0.0]);
    }

    #[test]
    fn test_every_orientation_is_a_corner_permutation() {
        for rotation in [Rotation::None, Rotation::Quarter, Rotation::Half, Rotation::ThreeQuarter] {
            for mirror in [false, true] {
                for flip in [false, true] {
                    let mut uv = QuadOrientation { rotation, mirror, flip }.tex_coords().to_vec();
                    uv.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    assert_eq!(uv, vec![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
                }
            }
        }
    }

    #[test]
    fn test_rotation_parsing() {
        assert_eq!("270".parse::<Rotation>(), Ok(Rotation::ThreeQuarter));
        assert!("45".parse::<Rotation>().is_err());
        assert_eq!(Rotation::Quarter.to_string(), "90");
    }
}
