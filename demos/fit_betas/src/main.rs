use anyhow::Context;
use burn::{
    backend::{Autodiff, NdArray},
    tensor::{Tensor, TensorData},
};
use log::info;
use smpl_rs::{
    prelude::*,
    smpl_core::smpl::{
        smpl::NUM_JOINTS,
        synthetic::{synthetic_config, synthetic_matrices},
    },
};

type FitBackend = Autodiff<NdArray>;

fn load_model(model_path: Option<&str>, device: &<FitBackend as burn::tensor::backend::Backend>::Device) -> anyhow::Result<SmplGPU<FitBackend>> {
    match model_path {
        Some(path) => SmplGPU::new_from_npz(path, SmplConfig::default(), device).with_context(|| format!("failed to load body model from {path}")),
        None => {
            info!("No model path given, fitting the synthetic body");
            Ok(SmplGPU::new_from_matrices(synthetic_config(), synthetic_matrices(), device)?)
        }
    }
}

/// Bends a leg, both elbows and the head of a full SMPL skeleton
fn target_body_pose(model: &SmplGPU<FitBackend>) -> Vec<f32> {
    let mut pose = vec![0.0f32; model.body_pose_dim()];
    if model.num_joints() == NUM_JOINTS + 1 {
        pose[3] = 0.5;
        pose[5] = -0.5;
        pose[3 * 18..3 * 18 + 3].fill(0.5);
        pose[3 * 19..3 * 19 + 3].fill(-0.5);
        pose[3 * 15..3 * 15 + 3].fill(0.3);
    }
    pose
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init(); // Call only once per process

    let model_path = std::env::args().nth(1);
    let device = Default::default();
    let model = load_model(model_path.as_deref(), &device)?;

    //the target is the same body with betas = -2 and a different pose
    let betas_target = Tensor::<FitBackend, 2>::ones([1, model.num_betas()], &device).mul_scalar(-2.0);
    let body_pose = target_body_pose(&model);
    let body_pose_target = Tensor::<FitBackend, 2>::from_data(TensorData::new(body_pose, [1, model.body_pose_dim()]), &device);
    let target_output = model.forward(&SmplInput::new().with_betas(betas_target).with_body_pose(body_pose_target))?;
    let vertices_target = target_output.vertices.context("model returned no vertices")?.detach();
    info!("Generated target output");

    let config = FittingConfig::default();
    let outcome = fit(&model, &vertices_target, FitParams::zeros(&model, 1), &config)?;

    info!("Final Chamfer loss: {:?}", outcome.final_loss());
    info!("Fitted betas: {:?}", outcome.betas());
    Ok(())
}
