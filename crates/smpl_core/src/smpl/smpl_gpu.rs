use super::{
    smpl::{JOINT_NAMES, NUM_JOINTS},
    smpl_matrices::SmplMatrices,
};
use crate::{
    common::{
        lbs::{blend_shapes, pose_feature, skin_vertices, vertices2joints},
        outputs::SmplOutput,
        skeleton::Skeleton,
        smpl_config::SmplConfig,
        smpl_input::SmplInput,
        smpl_model::SmplModel,
        types::{Age, Gender},
        vertex_joint_selector::VertexJointSelector,
    },
    error::{SmplError, SmplResult},
};
use burn::tensor::{backend::Backend, Float, Int, Tensor, TensorData};
use log::info;
use ndarray as nd;
use smpl_utils::{
    array::ToBurn,
    numerical::{batch_rigid_transform, batch_rodrigues, RigidTransforms},
};
use std::{
    io::{Read, Seek},
    path::Path,
};

/// Parameters used by ``forward`` for everything the caller does not override
#[derive(Clone, Debug)]
struct SmplDefaults<B: Backend> {
    betas: Tensor<B, 2, Float>,
    global_orient: Tensor<B, 2, Float>,
    body_pose: Tensor<B, 2, Float>,
    transl: Tensor<B, 2, Float>,
}

/// SMPL body model with all buffers resident on a burn device.
#[derive(Clone, Debug)]
pub struct SmplGPU<B: Backend> {
    pub device: B::Device,
    pub config: SmplConfig,
    pub skeleton: Skeleton,
    /// ``[V, 3]``
    pub verts_template: Tensor<B, 2, Float>,
    pub faces: Tensor<B, 2, Int>,
    /// ``[S, V * 3]``
    pub shape_dirs: Tensor<B, 2, Float>,
    /// ``[(J - 1) * 9, V * 3]``
    pub pose_dirs: Tensor<B, 2, Float>,
    /// ``[J, V]``
    pub joint_regressor: Tensor<B, 2, Float>,
    /// ``[V, J]``
    pub lbs_weights: Tensor<B, 2, Float>,
    pub vertex_joint_selector: VertexJointSelector<B>,
    joint_mapper: Option<Tensor<B, 1, Int>>,
    defaults: SmplDefaults<B>,
    num_verts: usize,
    num_betas: usize,
}

impl<B: Backend> SmplGPU<B> {
    /// Uploads host buffers to `device`. Shape directions beyond
    /// ``config.num_betas`` are dropped and the kid direction (if any) is
    /// appended after that.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new_from_matrices(config: SmplConfig, mut matrices: SmplMatrices, device: &B::Device) -> SmplResult<Self> {
        config.validate()?;
        if let Some(num_betas) = config.num_betas {
            matrices.truncate_betas(num_betas);
        }
        if config.age == Age::Kid {
            matrices.append_kid_shape_dir()?;
        }
        matrices.validate()?;

        let num_verts = matrices.num_verts();
        let num_joints = matrices.num_joints();
        let num_betas = matrices.num_betas();
        let num_pose_basis = matrices.pose_dirs.shape()[2];

        let mut skeleton = Skeleton::new(&matrices.parents)?;
        if num_joints < 2 {
            return Err(SmplError::UnsupportedSkeleton(format!("a body needs a root and at least one body joint, got {num_joints} joints")));
        }
        if num_pose_basis != (num_joints - 1) * 9 {
            return Err(SmplError::UnsupportedSkeleton(format!(
                "posedirs has {num_pose_basis} components but {} body joints need {}",
                num_joints - 1,
                (num_joints - 1) * 9
            )));
        }
        if num_joints == NUM_JOINTS + 1 {
            skeleton = skeleton.with_joint_names(&JOINT_NAMES);
        }

        let shape_dirs = flatten_basis(&matrices.shape_dirs).to_burn(device);
        let pose_dirs = flatten_basis(&matrices.pose_dirs).to_burn(device);
        let vertex_joint_selector = VertexJointSelector::from_table(&config.joint_selector, num_verts, device)?;

        let defaults = SmplDefaults {
            betas: preset("betas", config.betas.as_deref(), num_betas, config.batch_size, device)?,
            global_orient: preset("global_orient", config.global_orient.as_deref(), 3, config.batch_size, device)?,
            body_pose: preset("body_pose", config.body_pose.as_deref(), 3 * (num_joints - 1), config.batch_size, device)?,
            transl: preset("transl", config.transl.as_deref(), 3, config.batch_size, device)?,
        };

        info!("Initialised burn on Backend: {:?}", B::name());
        info!(
            "Body model: gender {}, age {}, {num_verts} verts, {num_joints} joints, {num_betas} betas, {} landmarks",
            config.gender,
            config.age,
            vertex_joint_selector.num_extra_joints()
        );

        Ok(Self {
            device: device.clone(),
            skeleton,
            verts_template: matrices.verts_template.to_burn(device),
            faces: matrices.faces.to_burn(device),
            shape_dirs,
            pose_dirs,
            joint_regressor: matrices.joint_regressor.to_burn(device),
            lbs_weights: matrices.lbs_weights.to_burn(device),
            vertex_joint_selector,
            joint_mapper: None,
            defaults,
            num_verts,
            num_betas,
            config,
        })
    }

    /// Loads a model archive. For ``Age::Kid`` the kid template is read from
    /// ``config.kid_template_path``.
    pub fn new_from_npz(model_path: impl AsRef<Path>, config: SmplConfig, device: &B::Device) -> SmplResult<Self> {
        let matrices = SmplMatrices::from_npz(model_path)?;
        Self::new_with_kid_template(config, matrices, device)
    }

    pub fn new_from_reader<R: Read + Seek>(reader: R, config: SmplConfig, device: &B::Device) -> SmplResult<Self> {
        let matrices = SmplMatrices::from_reader(reader)?;
        Self::new_with_kid_template(config, matrices, device)
    }

    fn new_with_kid_template(config: SmplConfig, mut matrices: SmplMatrices, device: &B::Device) -> SmplResult<Self> {
        if config.age == Age::Kid && matrices.kid_template.is_none() {
            let path = config
                .kid_template_path
                .as_ref()
                .ok_or_else(|| SmplError::InvalidConfig("age is kid but no kid_template_path is set".to_string()))?;
            matrices.load_kid_template(path)?;
        }
        Self::new_from_matrices(config, matrices, device)
    }

    /// Reorders (or subsets) the output joints. Indices refer to the joints
    /// followed by the landmarks.
    pub fn with_joint_mapper(mut self, indices: &[usize]) -> SmplResult<Self> {
        let available = self.num_output_joints();
        if let Some(&bad) = indices.iter().find(|&&idx| idx >= available) {
            return Err(SmplError::InvalidConfig(format!("joint mapper index {bad} is out of range for {available} joints")));
        }
        #[allow(clippy::cast_possible_wrap)]
        let data = TensorData::new(indices.iter().map(|&x| x as i64).collect::<Vec<i64>>(), [indices.len()]);
        self.joint_mapper = Some(Tensor::<B, 1, Int>::from_data(data, &self.device));
        Ok(self)
    }

    /// Joints before mapping: skeleton joints and landmarks
    pub fn num_output_joints(&self) -> usize {
        self.skeleton.num_joints() + self.vertex_joint_selector.num_extra_joints()
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn check_width(&self, what: &str, tensor: &Tensor<B, 2, Float>, width: usize) -> SmplResult<()> {
        let [batch, got] = tensor.dims();
        if got == width {
            Ok(())
        } else {
            Err(SmplError::ShapeMismatch {
                what: what.to_string(),
                expected: vec![batch, width],
                got: vec![batch, got],
            })
        }
    }
}

impl<B: Backend> SmplModel<B> for SmplGPU<B> {
    fn gender(&self) -> Gender {
        self.config.gender
    }
    fn device(&self) -> B::Device {
        self.device.clone()
    }
    fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }
    fn num_verts(&self) -> usize {
        self.num_verts
    }
    fn num_betas(&self) -> usize {
        self.num_betas
    }

    #[allow(clippy::similar_names)]
    fn forward(&self, input: &SmplInput<B>) -> SmplResult<SmplOutput<B>> {
        let betas = input.betas.clone().unwrap_or_else(|| self.defaults.betas.clone());
        let global_orient = input.global_orient.clone().unwrap_or_else(|| self.defaults.global_orient.clone());
        let body_pose = input.body_pose.clone().unwrap_or_else(|| self.defaults.body_pose.clone());
        let transl = input.transl.clone().unwrap_or_else(|| self.defaults.transl.clone());

        self.check_width("betas", &betas, self.num_betas)?;
        self.check_width("global_orient", &global_orient, 3)?;
        self.check_width("body_pose", &body_pose, self.body_pose_dim())?;
        self.check_width("transl", &transl, 3)?;

        let batch_size = [&betas, &global_orient, &body_pose, &transl]
            .iter()
            .map(|t| t.dims()[0])
            .max()
            .unwrap_or(1);
        let betas = broadcast_batch("betas", betas, batch_size)?;
        let global_orient = broadcast_batch("global_orient", global_orient, batch_size)?;
        let body_pose = broadcast_batch("body_pose", body_pose, batch_size)?;
        let transl = broadcast_batch("transl", transl, batch_size)?;

        let num_joints = self.num_joints();
        let full_pose = Tensor::cat(vec![global_orient.clone(), body_pose.clone()], 1);
        let rot_mats = batch_rodrigues(full_pose.clone().reshape([batch_size * num_joints, 3])).reshape([batch_size, num_joints, 3, 3]);

        let v_shaped = self.betas2verts(betas.clone())?;
        let joints_rest = self.verts2joints(v_shaped.clone());
        let (verts_posed, rigid) = self.apply_pose(v_shaped.clone(), joints_rest, rot_mats);

        let mut joints = self.vertex_joint_selector.forward(verts_posed.clone(), rigid.posed_joints);
        if let Some(mapper) = &self.joint_mapper {
            joints = joints.select(1, mapper.clone());
        }

        let offset = transl.clone().unsqueeze_dim::<3>(1);
        let joints = joints + offset.clone();
        let return_verts = input.return_verts.unwrap_or(self.config.return_verts);
        let vertices = return_verts.then(|| verts_posed + offset);
        let return_full_pose = input.return_full_pose.unwrap_or(self.config.return_full_pose);

        Ok(SmplOutput {
            vertices,
            joints,
            full_pose: return_full_pose.then_some(full_pose),
            betas,
            global_orient,
            body_pose,
            transl,
            v_shaped,
            rel_transforms: rigid.rel_transforms,
            faces: self.faces.clone(),
        })
    }

    fn betas2verts(&self, betas: Tensor<B, 2, Float>) -> SmplResult<Tensor<B, 3, Float>> {
        self.check_width("betas", &betas, self.num_betas)?;
        let offsets = blend_shapes(betas, self.shape_dirs.clone());
        Ok(offsets + self.verts_template.clone().unsqueeze_dim::<3>(0))
    }

    fn verts2joints(&self, verts_t_pose: Tensor<B, 3, Float>) -> Tensor<B, 3, Float> {
        vertices2joints(self.joint_regressor.clone(), verts_t_pose)
    }

    fn compute_pose_feature(&self, rot_mats: Tensor<B, 4, Float>) -> Tensor<B, 2, Float> {
        pose_feature(rot_mats)
    }

    fn compute_pose_correctives(&self, rot_mats: Tensor<B, 4, Float>) -> Tensor<B, 3, Float> {
        blend_shapes(self.compute_pose_feature(rot_mats), self.pose_dirs.clone())
    }

    fn apply_pose(&self, verts_t_pose: Tensor<B, 3, Float>, joints: Tensor<B, 3, Float>, rot_mats: Tensor<B, 4, Float>) -> (Tensor<B, 3, Float>, RigidTransforms<B>) {
        let v_posed = if self.config.enable_pose_corrective {
            verts_t_pose + self.compute_pose_correctives(rot_mats.clone())
        } else {
            verts_t_pose
        };
        let rigid = batch_rigid_transform(rot_mats, joints, self.skeleton.parents());
        let verts = skin_vertices(v_posed, self.lbs_weights.clone(), rigid.rel_transforms.clone());
        (verts, rigid)
    }

    fn faces(&self) -> &Tensor<B, 2, Int> {
        &self.faces
    }

    fn lbs_weights(&self) -> Tensor<B, 2, Float> {
        self.lbs_weights.clone()
    }
}

/// ``[V, 3, K]`` basis to ``[K, V * 3]`` so blending is ``coeffs.matmul(basis)``
fn flatten_basis(basis: &nd::Array3<f32>) -> nd::Array2<f32> {
    let (num_verts, _, num_components) = basis.dim();
    let mut flat = nd::Array2::<f32>::zeros((num_components, num_verts * 3));
    for ((v, c, k), &val) in basis.indexed_iter() {
        flat[[k, v * 3 + c]] = val;
    }
    flat
}

/// Default parameter tensor ``[batch_size, width]`` from an optional preset
fn preset<B: Backend>(what: &str, values: Option<&[f32]>, width: usize, batch_size: usize, device: &B::Device) -> SmplResult<Tensor<B, 2, Float>> {
    let Some(values) = values else {
        return Ok(Tensor::<B, 2, Float>::zeros([batch_size, width], device));
    };
    let data = if values.len() == width {
        values.repeat(batch_size)
    } else if values.len() == width * batch_size {
        values.to_vec()
    } else {
        return Err(SmplError::ShapeMismatch {
            what: format!("{what} preset"),
            expected: vec![batch_size, width],
            got: vec![values.len()],
        });
    };
    Ok(Tensor::<B, 2, Float>::from_data(TensorData::new(data, [batch_size, width]), device))
}

/// Expands a batch of 1 to `batch_size`. Any other mismatch is an error,
/// batches are never truncated.
fn broadcast_batch<B: Backend>(what: &str, tensor: Tensor<B, 2, Float>, batch_size: usize) -> SmplResult<Tensor<B, 2, Float>> {
    let [batch, width] = tensor.dims();
    if batch == batch_size {
        Ok(tensor)
    } else if batch == 1 {
        Ok(tensor.expand([batch_size, width]))
    } else {
        Err(SmplError::BatchMismatch {
            what: what.to_string(),
            expected: batch_size,
            got: batch,
        })
    }
}
