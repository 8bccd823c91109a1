use burn::tensor::{backend::Backend, Float, Tensor};

/// Offset added to every axis-angle component before taking the norm so that a
/// zero rotation has a finite, non-NaN gradient. The resulting rotation is the
/// identity up to ~1e-8.
pub const RODRIGUES_EPS: f64 = 1e-8;

/// Identity 3x3 matrix as a rank-2 tensor
pub fn identity3<B: Backend>(device: &B::Device) -> Tensor<B, 2, Float> {
    Tensor::<B, 1, Float>::from_floats([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], device).reshape([3, 3])
}

/// Calculates the rotation matrices for a batch of rotation vectors.
///
/// `rot_vecs` is ``[N, 3]`` axis-angle, the result is ``[N, 3, 3]``. Uses
/// R = I + sin(t) K + (1 - cos(t)) K^2 with K the cross-product matrix of the
/// unit axis. Near-zero angles fall back to the identity smoothly, so the
/// operation stays differentiable at the rest pose.
pub fn batch_rodrigues<B: Backend>(rot_vecs: Tensor<B, 2, Float>) -> Tensor<B, 3, Float> {
    let [n, _] = rot_vecs.dims();
    let device = rot_vecs.device();

    let angle = rot_vecs.clone().add_scalar(RODRIGUES_EPS).powf_scalar(2.0).sum_dim(1).sqrt(); //[N,1]
    let rot_dir = rot_vecs.div(angle.clone());

    let cos = angle.clone().cos().reshape([n, 1, 1]);
    let sin = angle.sin().reshape([n, 1, 1]);

    let rx = rot_dir.clone().slice([0..n, 0..1]);
    let ry = rot_dir.clone().slice([0..n, 1..2]);
    let rz = rot_dir.slice([0..n, 2..3]);
    let zeros = Tensor::<B, 2, Float>::zeros([n, 1], &device);

    #[rustfmt::skip]
    let k = Tensor::cat(
        vec![
            zeros.clone(), rz.clone().neg(), ry.clone(),
            rz, zeros.clone(), rx.clone().neg(),
            ry.neg(), rx, zeros,
        ],
        1,
    )
    .reshape([n, 3, 3]);

    let identity = identity3::<B>(&device).reshape([1, 3, 3]);
    let k_sq = k.clone().matmul(k.clone());
    identity + sin.mul(k) + cos.neg().add_scalar(1.0).mul(k_sq)
}

/// Result of composing per-joint local transforms along the kinematic tree.
#[derive(Clone, Debug)]
pub struct RigidTransforms<B: Backend> {
    /// Posed joint locations ``[B, J, 3]``, the translation column of every global transform
    pub posed_joints: Tensor<B, 3, Float>,
    /// Global joint transforms ``[B, J, 4, 4]``
    pub transforms: Tensor<B, 4, Float>,
    /// Global transforms with the rest-pose joint location removed from the
    /// translation column ``[B, J, 4, 4]``. This is what skinning blends.
    pub rel_transforms: Tensor<B, 4, Float>,
}

/// Forward kinematics over a skeleton stored as a flat parent array.
///
/// `rot_mats` ``[B, J, 3, 3]`` are the local joint rotations, `joints`
/// ``[B, J, 3]`` the rest joint locations and `parents[i]` the parent of joint
/// `i` (entry 0 is ignored). Joints are visited in ascending order, which is
/// sufficient because every parent index is smaller than its child index.
///
/// # Panics
/// Will panic if `parents` is not topologically ordered (`parents[i] >= i`) or
/// is shorter than the number of joints
#[allow(clippy::similar_names)]
pub fn batch_rigid_transform<B: Backend>(rot_mats: Tensor<B, 4, Float>, joints: Tensor<B, 3, Float>, parents: &[usize]) -> RigidTransforms<B> {
    let [batch_size, num_joints, _, _] = rot_mats.dims();
    let device = rot_mats.device();

    let bottom_row = Tensor::cat(
        vec![
            Tensor::<B, 3, Float>::zeros([batch_size, 1, 3], &device),
            Tensor::<B, 3, Float>::ones([batch_size, 1, 1], &device),
        ],
        2,
    );
    let joint_at = |idx: usize| joints.clone().slice([0..batch_size, idx..idx + 1, 0..3]).reshape([batch_size, 3, 1]);

    let mut transform_chain: Vec<Tensor<B, 3, Float>> = Vec::with_capacity(num_joints);
    for idx in 0..num_joints {
        let rot = rot_mats.clone().slice([0..batch_size, idx..idx + 1, 0..3, 0..3]).reshape([batch_size, 3, 3]);
        //translation relative to the parent joint
        let rel_joint = if idx == 0 { joint_at(0) } else { joint_at(idx) - joint_at(parents[idx]) };
        let local = Tensor::cat(vec![Tensor::cat(vec![rot, rel_joint], 2), bottom_row.clone()], 1);
        let global = if idx == 0 {
            local
        } else {
            transform_chain[parents[idx]].clone().matmul(local)
        };
        transform_chain.push(global);
    }
    let transforms: Tensor<B, 4, Float> = Tensor::stack(transform_chain, 1);

    let posed_joints = transforms
        .clone()
        .slice([0..batch_size, 0..num_joints, 0..3, 3..4])
        .reshape([batch_size, num_joints, 3]);

    //A_i - [0 | A_i * [J_i; 0]]
    let joints_homogen = Tensor::cat(
        vec![
            joints.unsqueeze_dim::<4>(3),
            Tensor::<B, 4, Float>::zeros([batch_size, num_joints, 1, 1], &device),
        ],
        2,
    );
    let transformed_joints = transforms.clone().matmul(joints_homogen);
    let padded = Tensor::cat(
        vec![
            Tensor::<B, 4, Float>::zeros([batch_size, num_joints, 4, 3], &device),
            transformed_joints,
        ],
        3,
    );
    let rel_transforms = transforms.clone() - padded;

    RigidTransforms {
        posed_joints,
        transforms,
        rel_transforms,
    }
}
