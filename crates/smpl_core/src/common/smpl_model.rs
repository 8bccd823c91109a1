use super::{outputs::SmplOutput, skeleton::Skeleton, smpl_input::SmplInput, types::Gender};
use crate::error::SmplResult;
use burn::tensor::{backend::Backend, Float, Int, Tensor};
use smpl_utils::numerical::RigidTransforms;

/// Trait for a Smpl based model. Everything downstream of a body model (the
/// fitting loop, the demos) only talks to this.
pub trait SmplModel<B: Backend> {
    fn gender(&self) -> Gender;
    fn device(&self) -> B::Device;
    fn skeleton(&self) -> &Skeleton;
    fn num_verts(&self) -> usize;
    fn num_betas(&self) -> usize;
    /// Number of skeleton joints including the root
    fn num_joints(&self) -> usize {
        self.skeleton().num_joints()
    }
    /// Width of the body pose vector, 3 per non-root joint
    fn body_pose_dim(&self) -> usize {
        3 * (self.num_joints() - 1)
    }
    fn forward(&self, input: &SmplInput<B>) -> SmplResult<SmplOutput<B>>;
    fn betas2verts(&self, betas: Tensor<B, 2, Float>) -> SmplResult<Tensor<B, 3, Float>>;
    fn verts2joints(&self, verts_t_pose: Tensor<B, 3, Float>) -> Tensor<B, 3, Float>;
    fn compute_pose_feature(&self, rot_mats: Tensor<B, 4, Float>) -> Tensor<B, 2, Float>;
    fn compute_pose_correctives(&self, rot_mats: Tensor<B, 4, Float>) -> Tensor<B, 3, Float>;
    fn apply_pose(&self, verts_t_pose: Tensor<B, 3, Float>, joints: Tensor<B, 3, Float>, rot_mats: Tensor<B, 4, Float>) -> (Tensor<B, 3, Float>, RigidTransforms<B>);
    fn faces(&self) -> &Tensor<B, 2, Int>;
    fn lbs_weights(&self) -> Tensor<B, 2, Float>;
}
