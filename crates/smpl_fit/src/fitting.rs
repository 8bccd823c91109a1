//! Fits body model parameters to a target point cloud by minimising the
//! Chamfer distance with Adam.

use crate::error::{FitError, FitResult};
use burn::{
    module::{Module, Param},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Float, Tensor,
    },
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use smpl_chamfer::chamfer::{ChamferDistance, ChamferOptions};
use smpl_core::common::{smpl_input::SmplInput, smpl_model::SmplModel};

/// Which parameter groups receive optimizer updates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGroups {
    pub betas: bool,
    pub global_orient: bool,
    pub body_pose: bool,
    pub transl: bool,
}
impl Default for ParamGroups {
    fn default() -> Self {
        Self {
            betas: true,
            global_orient: false,
            body_pose: true,
            transl: false,
        }
    }
}
impl ParamGroups {
    pub fn betas_only() -> Self {
        Self {
            betas: true,
            global_orient: false,
            body_pose: false,
            transl: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    pub steps: usize,
    pub learning_rate: f64,
    pub optimize: ParamGroups,
    /// Loss is logged every `log_every` steps and at the last step
    pub log_every: usize,
    pub chamfer: ChamferOptions,
}
impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            steps: 200,
            learning_rate: 0.1,
            optimize: ParamGroups::default(),
            log_every: 10,
            chamfer: ChamferOptions::bidirectional(),
        }
    }
}
impl FittingConfig {
    pub fn validate(&self) -> FitResult<()> {
        if self.steps == 0 {
            return Err(FitError::InvalidConfig("steps must be at least 1".to_string()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(FitError::InvalidConfig(format!("learning rate must be positive, got {}", self.learning_rate)));
        }
        if self.log_every == 0 {
            return Err(FitError::InvalidConfig("log_every must be at least 1".to_string()));
        }
        Ok(())
    }
    #[must_use]
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
    #[must_use]
    pub fn with_optimize(mut self, optimize: ParamGroups) -> Self {
        self.optimize = optimize;
        self
    }
}

/// The parameters being fitted. Only the groups enabled in
/// [`ParamGroups`] take part in the graph, the others are detached and never
/// updated.
#[derive(Module, Debug)]
pub struct FitParams<B: Backend> {
    pub betas: Param<Tensor<B, 2>>,
    pub global_orient: Param<Tensor<B, 2>>,
    pub body_pose: Param<Tensor<B, 2>>,
    pub transl: Param<Tensor<B, 2>>,
}
impl<B: Backend> FitParams<B> {
    pub fn new(betas: Tensor<B, 2>, global_orient: Tensor<B, 2>, body_pose: Tensor<B, 2>, transl: Tensor<B, 2>) -> Self {
        Self {
            betas: Param::from_tensor(betas.require_grad()),
            global_orient: Param::from_tensor(global_orient.require_grad()),
            body_pose: Param::from_tensor(body_pose.require_grad()),
            transl: Param::from_tensor(transl.require_grad()),
        }
    }

    /// Zero shape, rest pose and no translation for `batch_size` bodies of `model`
    pub fn zeros<M: SmplModel<B>>(model: &M, batch_size: usize) -> Self {
        let device = model.device();
        Self::new(
            Tensor::zeros([batch_size, model.num_betas()], &device),
            Tensor::zeros([batch_size, 3], &device),
            Tensor::zeros([batch_size, model.body_pose_dim()], &device),
            Tensor::zeros([batch_size, 3], &device),
        )
    }

    pub fn to_input(&self, groups: &ParamGroups) -> SmplInput<B> {
        let pick = |param: &Param<Tensor<B, 2>>, optimized: bool| if optimized { param.val() } else { param.val().detach() };
        SmplInput::new()
            .with_betas(pick(&self.betas, groups.betas))
            .with_global_orient(pick(&self.global_orient, groups.global_orient))
            .with_body_pose(pick(&self.body_pose, groups.body_pose))
            .with_transl(pick(&self.transl, groups.transl))
            .with_return_verts(true)
    }
}

#[derive(Debug)]
pub struct FitOutcome<B: Backend> {
    pub params: FitParams<B>,
    /// Loss before every optimizer step
    pub losses: Vec<f32>,
}
impl<B: Backend> FitOutcome<B> {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
    /// Fitted betas copied to the host
    pub fn betas(&self) -> Vec<f32> {
        self.params.betas.val().into_data().convert::<f32>().to_vec::<f32>().unwrap_or_default()
    }
}

/// Runs `config.steps` iterations of: deform, measure the Chamfer distance
/// to `target` ``[B, N, 3]``, backpropagate and take an Adam step.
pub fn fit<B: AutodiffBackend, M: SmplModel<B>>(model: &M, target: &Tensor<B, 3, Float>, init: FitParams<B>, config: &FittingConfig) -> FitResult<FitOutcome<B>> {
    config.validate()?;
    let chamfer = ChamferDistance::new(config.chamfer);
    let mut optim = AdamConfig::new().init::<B, FitParams<B>>();
    let mut params = init;
    let mut losses = Vec::with_capacity(config.steps);

    info!("Fitting {:?} for {} steps with lr {}", config.optimize, config.steps, config.learning_rate);
    for step in 0..config.steps {
        let output = model.forward(&params.to_input(&config.optimize))?;
        let vertices = output
            .vertices
            .ok_or_else(|| FitError::InvalidConfig("the model did not return vertices".to_string()))?;
        let loss = chamfer.forward(vertices, target.clone())?.sum();

        let loss_value = loss.clone().into_scalar().elem::<f32>();
        if step % config.log_every == 0 || step + 1 == config.steps {
            info!("Step {step}, Chamfer loss: {loss_value}");
        } else {
            debug!("Step {step}, Chamfer loss: {loss_value}");
        }
        losses.push(loss_value);

        let grads = GradientsParams::from_grads(loss.backward(), &params);
        params = optim.step(config.learning_rate, params, grads);
    }
    Ok(FitOutcome { params, losses })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_mirrors_reference_driver() {
        let config = FittingConfig::default();
        assert_eq!(config.steps, 200);
        assert!((config.learning_rate - 0.1).abs() < 1e-12);
        assert!(config.chamfer.bidirectional);
        assert!(config.optimize.betas && config.optimize.body_pose);
        config.validate().unwrap();
    }

    #[test]
    fn degenerate_configs_are_rejected() {
        assert!(FittingConfig::default().with_steps(0).validate().is_err());
        assert!(FittingConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(FittingConfig::default().with_learning_rate(f64::NAN).validate().is_err());
    }
}
