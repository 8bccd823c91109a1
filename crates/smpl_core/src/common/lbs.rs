//! Linear blend skinning building blocks, all batched along dim 0.

use burn::tensor::{backend::Backend, Float, Tensor};
use smpl_utils::numerical::identity3;

/// Offsets ``[B, V, 3]`` of a linear blend basis. `coeffs` is ``[B, K]`` and
/// `dirs` the basis stored as ``[K, V * 3]``.
pub fn blend_shapes<B: Backend>(coeffs: Tensor<B, 2, Float>, dirs: Tensor<B, 2, Float>) -> Tensor<B, 3, Float> {
    let [batch_size, _] = coeffs.dims();
    let [_, num_coords] = dirs.dims();
    coeffs.matmul(dirs).reshape([batch_size, num_coords / 3, 3])
}

/// Regresses ``[B, J, 3]`` joints from ``[B, V, 3]`` vertices with a ``[J, V]`` regressor
pub fn vertices2joints<B: Backend>(joint_regressor: Tensor<B, 2, Float>, vertices: Tensor<B, 3, Float>) -> Tensor<B, 3, Float> {
    let [batch_size, num_verts, _] = vertices.dims();
    let [num_joints, _] = joint_regressor.dims();
    joint_regressor
        .unsqueeze_dim::<3>(0)
        .expand([batch_size, num_joints, num_verts])
        .matmul(vertices)
}

/// Pose feature ``[B, (J - 1) * 9]``: the non-root rotation matrices minus the
/// identity, flattened. The root orientation does not deform the body.
pub fn pose_feature<B: Backend>(rot_mats: Tensor<B, 4, Float>) -> Tensor<B, 2, Float> {
    let [batch_size, num_joints, _, _] = rot_mats.dims();
    let device = rot_mats.device();
    let identity = identity3::<B>(&device).reshape([1, 1, 3, 3]);
    (rot_mats.slice([0..batch_size, 1..num_joints, 0..3, 0..3]) - identity).reshape([batch_size, (num_joints - 1) * 9])
}

/// Blends ``[B, V, 3]`` vertices with the ``[B, J, 4, 4]`` joint transforms
/// using per-vertex weights ``[V, J]``.
pub fn skin_vertices<B: Backend>(v_posed: Tensor<B, 3, Float>, lbs_weights: Tensor<B, 2, Float>, rel_transforms: Tensor<B, 4, Float>) -> Tensor<B, 3, Float> {
    let [batch_size, num_verts, _] = v_posed.dims();
    let [_, num_joints] = lbs_weights.dims();
    let device = v_posed.device();

    let weights = lbs_weights.unsqueeze_dim::<3>(0).expand([batch_size, num_verts, num_joints]);
    let per_vertex = weights
        .matmul(rel_transforms.reshape([batch_size, num_joints, 16]))
        .reshape([batch_size, num_verts, 4, 4]);

    let v_homo = Tensor::cat(vec![v_posed, Tensor::<B, 3, Float>::ones([batch_size, num_verts, 1], &device)], 2).unsqueeze_dim::<4>(3);
    per_vertex
        .matmul(v_homo)
        .slice([0..batch_size, 0..num_verts, 0..3, 0..1])
        .reshape([batch_size, num_verts, 3])
}
