use anyhow::Context;
use burn::{backend::NdArray, tensor::Tensor};
use log::info;
use smpl_rs::{
    prelude::*,
    smpl_core::smpl::synthetic::{synthetic_config, synthetic_matrices},
};
use std::time::Instant;

type BenchBackend = NdArray;

const ITERATIONS: usize = 1000;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init(); // Call only once per process

    let device = Default::default();
    let model = match std::env::args().nth(1) {
        Some(path) => SmplGPU::<BenchBackend>::new_from_npz(&path, SmplConfig::default(), &device).with_context(|| format!("failed to load body model from {path}"))?,
        None => {
            info!("No model path given, benchmarking the synthetic body");
            SmplGPU::new_from_matrices(synthetic_config(), synthetic_matrices(), &device)?
        }
    };

    let input = SmplInput::new()
        .with_betas(Tensor::<BenchBackend, 2>::ones([1, model.num_betas()], &device).mul_scalar(-2.0))
        .with_global_orient(Tensor::<BenchBackend, 2>::ones([1, 3], &device));

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        model.forward(&input)?;
    }
    let seconds = start.elapsed().as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let fps = ITERATIONS as f64 / seconds;
    info!("FPS (forward pass, {ITERATIONS} iterations): {fps:.1}");
    Ok(())
}
