use super::{
    types::{Age, Gender},
    vertex_joint_selector::JointSelectorTable,
};
use crate::error::{SmplError, SmplResult};
use serde::{Deserialize, Serialize};
use smpl_utils::io::FileLoader;
use std::path::Path;

/// Construction options of a body model.
///
/// Optional parameter presets become the defaults used by ``forward`` when the
/// caller does not override a parameter. A preset holds either one row (shared
/// by the whole batch) or ``batch_size`` rows, flattened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmplConfig {
    pub gender: Gender,
    pub age: Age,
    /// Path to an npz holding the kid ``v_template``, required for ``Age::Kid``
    pub kid_template_path: Option<String>,
    /// Keeps at most this many shape directions of the model; `None` keeps all
    pub num_betas: Option<usize>,
    pub batch_size: usize,
    pub joint_selector: JointSelectorTable,
    pub enable_pose_corrective: bool,
    pub return_verts: bool,
    pub return_full_pose: bool,
    pub betas: Option<Vec<f32>>,
    pub global_orient: Option<Vec<f32>>,
    pub body_pose: Option<Vec<f32>>,
    pub transl: Option<Vec<f32>>,
}
impl Default for SmplConfig {
    fn default() -> Self {
        Self {
            gender: Gender::Neutral,
            age: Age::Adult,
            kid_template_path: None,
            num_betas: None,
            batch_size: 1,
            joint_selector: JointSelectorTable::default(),
            enable_pose_corrective: true,
            return_verts: true,
            return_full_pose: false,
            betas: None,
            global_orient: None,
            body_pose: None,
            transl: None,
        }
    }
}
impl SmplConfig {
    pub fn new(gender: Gender, batch_size: usize) -> Self {
        Self {
            gender,
            batch_size,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> SmplResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SmplResult<Self> {
        let reader = std::io::BufReader::new(FileLoader::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the fields that do not depend on the model buffers
    pub fn validate(&self) -> SmplResult<()> {
        if self.batch_size == 0 {
            return Err(SmplError::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        if self.num_betas == Some(0) {
            return Err(SmplError::InvalidConfig("num_betas must be at least 1".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_num_betas(mut self, num_betas: usize) -> Self {
        self.num_betas = Some(num_betas);
        self
    }
    #[must_use]
    pub fn with_age(mut self, age: Age, kid_template_path: Option<String>) -> Self {
        self.age = age;
        self.kid_template_path = kid_template_path;
        self
    }
    #[must_use]
    pub fn with_joint_selector(mut self, joint_selector: JointSelectorTable) -> Self {
        self.joint_selector = joint_selector;
        self
    }
    #[must_use]
    pub fn with_pose_corrective(mut self, enable: bool) -> Self {
        self.enable_pose_corrective = enable;
        self
    }
    #[must_use]
    pub fn with_return_full_pose(mut self, return_full_pose: bool) -> Self {
        self.return_full_pose = return_full_pose;
        self
    }
}
