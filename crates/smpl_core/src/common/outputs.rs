use burn::tensor::{backend::Backend, Float, Int, Tensor};

/// Result of a forward pass. Everything is batched along dim 0.
#[derive(Clone, Debug)]
pub struct SmplOutput<B: Backend> {
    /// Posed and translated vertices ``[B, V, 3]``, absent when not requested
    pub vertices: Option<Tensor<B, 3, Float>>,
    /// Posed joints followed by the selected landmarks ``[B, J', 3]``
    pub joints: Tensor<B, 3, Float>,
    /// ``[B, 3 * J]`` concatenation of global orient and body pose, when requested
    pub full_pose: Option<Tensor<B, 2, Float>>,
    pub betas: Tensor<B, 2, Float>,
    pub global_orient: Tensor<B, 2, Float>,
    pub body_pose: Tensor<B, 2, Float>,
    pub transl: Tensor<B, 2, Float>,
    /// Shaped template before posing ``[B, V, 3]``
    pub v_shaped: Tensor<B, 3, Float>,
    /// Skinning transforms of every joint ``[B, J, 4, 4]``
    pub rel_transforms: Tensor<B, 4, Float>,
    pub faces: Tensor<B, 2, Int>,
}
impl<B: Backend> SmplOutput<B> {
    pub fn batch_size(&self) -> usize {
        self.joints.dims()[0]
    }
    pub fn num_joints(&self) -> usize {
        self.joints.dims()[1]
    }
}
