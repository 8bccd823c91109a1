use burn::tensor::{backend::Backend, Float, Tensor};

/// Per-call overrides for the forward pass. Every parameter that is `None`
/// falls back to the defaults stored in the model.
///
/// Shapes: betas ``[B, S]``, global_orient ``[B, 3]``, body_pose
/// ``[B, 3 * (J - 1)]`` and transl ``[B, 3]``. A batch of 1 is broadcast to the
/// batch of the other parameters.
#[derive(Clone, Debug)]
pub struct SmplInput<B: Backend> {
    pub betas: Option<Tensor<B, 2, Float>>,
    pub global_orient: Option<Tensor<B, 2, Float>>,
    pub body_pose: Option<Tensor<B, 2, Float>>,
    pub transl: Option<Tensor<B, 2, Float>>,
    pub return_verts: Option<bool>,
    pub return_full_pose: Option<bool>,
}
impl<B: Backend> Default for SmplInput<B> {
    fn default() -> Self {
        Self {
            betas: None,
            global_orient: None,
            body_pose: None,
            transl: None,
            return_verts: None,
            return_full_pose: None,
        }
    }
}
impl<B: Backend> SmplInput<B> {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn with_betas(mut self, betas: Tensor<B, 2, Float>) -> Self {
        self.betas = Some(betas);
        self
    }
    #[must_use]
    pub fn with_global_orient(mut self, global_orient: Tensor<B, 2, Float>) -> Self {
        self.global_orient = Some(global_orient);
        self
    }
    #[must_use]
    pub fn with_body_pose(mut self, body_pose: Tensor<B, 2, Float>) -> Self {
        self.body_pose = Some(body_pose);
        self
    }
    #[must_use]
    pub fn with_transl(mut self, transl: Tensor<B, 2, Float>) -> Self {
        self.transl = Some(transl);
        self
    }
    #[must_use]
    pub fn with_return_verts(mut self, return_verts: bool) -> Self {
        self.return_verts = Some(return_verts);
        self
    }
    #[must_use]
    pub fn with_return_full_pose(mut self, return_full_pose: bool) -> Self {
        self.return_full_pose = Some(return_full_pose);
        self
    }
}
