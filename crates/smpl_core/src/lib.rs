pub mod error;

pub mod common {
    pub mod lbs;
    pub mod outputs;
    pub mod skeleton;
    pub mod smpl_config;
    pub mod smpl_input;
    pub mod smpl_model;
    pub mod types;
    pub mod vertex_joint_selector;
}

pub mod smpl {
    #[allow(clippy::module_inception)]
    pub mod smpl;
    pub mod smpl_gpu;
    pub mod smpl_matrices;
    pub mod synthetic;
}

pub mod prelude {
    pub use crate::common::{
        outputs::SmplOutput,
        skeleton::Skeleton,
        smpl_config::SmplConfig,
        smpl_input::SmplInput,
        smpl_model::SmplModel,
        types::{Age, Gender},
        vertex_joint_selector::{JointSelectorTable, Landmark},
    };
    pub use crate::error::{SmplError, SmplResult};
    pub use crate::smpl::{smpl_gpu::SmplGPU, smpl_matrices::SmplMatrices};
}
