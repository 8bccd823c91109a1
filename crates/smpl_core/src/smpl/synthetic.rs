//! A small procedurally built body: a 4x6x2 vertex grid driven by a four joint
//! chain. It satisfies every structural invariant of a real model and is used
//! wherever no model archive is available.

use super::smpl_matrices::SmplMatrices;
use crate::common::{
    smpl_config::SmplConfig,
    vertex_joint_selector::{JointSelectorTable, Landmark},
};
use ndarray as nd;

pub const GRID_X: usize = 4;
pub const GRID_Y: usize = 6;
pub const GRID_Z: usize = 2;
pub const SPACING: f32 = 0.25;
pub const NUM_VERTS: usize = GRID_X * GRID_Y * GRID_Z;
pub const NUM_JOINTS: usize = 4;
pub const NUM_BETAS: usize = 3;
pub const PARENTS: [i64; NUM_JOINTS] = [-1, 0, 1, 2];

/// Joint that owns every row of the grid
const JOINT_OF_ROW: [usize; GRID_Y] = [0, 1, 1, 2, 2, 3];

/// Vertex index of grid cell ``(ix, iy, iz)``
pub fn vertex_index(ix: usize, iy: usize, iz: usize) -> usize {
    iz + GRID_Z * (ix + GRID_X * iy)
}

#[allow(clippy::cast_precision_loss)]
fn grid_position(ix: usize, iy: usize, iz: usize) -> [f32; 3] {
    let center_x = (GRID_X - 1) as f32 * 0.5;
    let center_z = (GRID_Z - 1) as f32 * 0.5;
    [(ix as f32 - center_x) * SPACING, iy as f32 * SPACING, (iz as f32 - center_z) * SPACING]
}

/// Buffers of the synthetic body
#[allow(clippy::cast_precision_loss)]
pub fn synthetic_matrices() -> SmplMatrices {
    let mut verts_template = nd::Array2::<f32>::zeros((NUM_VERTS, 3));
    let mut shape_dirs = nd::Array3::<f32>::zeros((NUM_VERTS, 3, NUM_BETAS));
    let mut joint_regressor = nd::Array2::<f32>::zeros((NUM_JOINTS, NUM_VERTS));
    let mut lbs_weights = nd::Array2::<f32>::zeros((NUM_VERTS, NUM_JOINTS));

    let mut rows_per_joint = [0usize; NUM_JOINTS];
    for &joint in &JOINT_OF_ROW {
        rows_per_joint[joint] += 1;
    }

    for iy in 0..GRID_Y {
        let joint = JOINT_OF_ROW[iy];
        let first_row_of_joint = iy == 0 || JOINT_OF_ROW[iy - 1] != joint;
        for ix in 0..GRID_X {
            for iz in 0..GRID_Z {
                let v = vertex_index(ix, iy, iz);
                let pos = grid_position(ix, iy, iz);
                for (c, &p) in pos.iter().enumerate() {
                    verts_template[[v, c]] = p;
                }
                //height, width and depth directions, orthogonal by construction
                shape_dirs[[v, 1, 0]] = 0.02 * pos[1];
                shape_dirs[[v, 0, 1]] = 0.04 * pos[0];
                shape_dirs[[v, 2, 2]] = 0.1 * pos[2];

                joint_regressor[[joint, v]] = 1.0 / (rows_per_joint[joint] * GRID_X * GRID_Z) as f32;

                //the first row of every non-root joint is shared with its parent
                if first_row_of_joint && joint > 0 {
                    lbs_weights[[v, joint - 1]] = 0.3;
                    lbs_weights[[v, joint]] = 0.7;
                } else {
                    lbs_weights[[v, joint]] = 1.0;
                }
            }
        }
    }

    let num_pose_basis = (NUM_JOINTS - 1) * 9;
    let pose_dirs = nd::Array3::<f32>::from_shape_fn((NUM_VERTS, 3, num_pose_basis), |(v, c, k)| {
        0.001 * ((v * 3 + c + k) % 7) as f32 - 0.003
    });

    let mut faces = Vec::new();
    for iz in 0..GRID_Z {
        for iy in 0..GRID_Y - 1 {
            for ix in 0..GRID_X - 1 {
                let a = vertex_index(ix, iy, iz);
                let b = vertex_index(ix + 1, iy, iz);
                let c = vertex_index(ix + 1, iy + 1, iz);
                let d = vertex_index(ix, iy + 1, iz);
                faces.extend([a, b, c, a, c, d].map(|x| u32::try_from(x).unwrap_or(u32::MAX)));
            }
        }
    }
    let num_faces = faces.len() / 3;
    let faces = nd::Array2::from_shape_vec((num_faces, 3), faces).unwrap_or_else(|_| nd::Array2::zeros((0, 3)));

    SmplMatrices {
        verts_template,
        faces,
        shape_dirs,
        pose_dirs,
        joint_regressor,
        lbs_weights,
        parents: PARENTS.to_vec(),
        kid_template: None,
    }
}

/// Config matching the synthetic body: the landmarks are the top and bottom
/// centres of the grid
pub fn synthetic_config() -> SmplConfig {
    let centre = |iy: usize| Landmark {
        name: if iy == 0 { "bottom".to_string() } else { "top".to_string() },
        vertices: vec![
            (vertex_index(1, iy, 0), 0.25),
            (vertex_index(2, iy, 0), 0.25),
            (vertex_index(1, iy, 1), 0.25),
            (vertex_index(2, iy, 1), 0.25),
        ],
    };
    SmplConfig::default().with_joint_selector(JointSelectorTable::Custom {
        landmarks: vec![centre(0), centre(GRID_Y - 1)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_buffers_are_consistent() {
        let matrices = synthetic_matrices();
        matrices.validate().unwrap();
        assert_eq!(matrices.num_verts(), NUM_VERTS);
        assert_eq!(matrices.pose_dirs.shape()[2], (NUM_JOINTS - 1) * 9);
        for row in matrices.lbs_weights.rows() {
            approx::assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        for row in matrices.joint_regressor.rows() {
            approx::assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
    }
}
