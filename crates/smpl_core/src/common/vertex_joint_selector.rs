use crate::{
    error::{SmplError, SmplResult},
    smpl::smpl::{FACE_VERTEX_IDS, FEET_VERTEX_IDS, FINGER_TIP_VERTEX_IDS},
};
use burn::tensor::{backend::Backend, Float, Tensor, TensorData};
use serde::{Deserialize, Serialize};

/// A surface landmark expressed as a weighted combination of mesh vertices.
/// A plain vertex pick is a single entry with weight 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub vertices: Vec<(usize, f32)>,
}
impl Landmark {
    pub fn from_vertex(name: &str, vertex: usize) -> Self {
        Self {
            name: name.to_string(),
            vertices: vec![(vertex, 1.0)],
        }
    }
}

/// Which extra landmarks are appended to the skeleton joints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JointSelectorTable {
    /// Face landmarks, optionally followed by feet and finger tips of the SMPL mesh
    Smpl { use_hands: bool, use_feet_keypoints: bool },
    Custom { landmarks: Vec<Landmark> },
    Disabled,
}
impl Default for JointSelectorTable {
    fn default() -> Self {
        Self::Smpl {
            use_hands: true,
            use_feet_keypoints: true,
        }
    }
}
impl JointSelectorTable {
    pub fn landmarks(&self) -> Vec<Landmark> {
        match self {
            Self::Smpl { use_hands, use_feet_keypoints } => {
                let mut ids: Vec<(&str, usize)> = FACE_VERTEX_IDS.to_vec();
                if *use_feet_keypoints {
                    ids.extend_from_slice(&FEET_VERTEX_IDS);
                }
                if *use_hands {
                    ids.extend_from_slice(&FINGER_TIP_VERTEX_IDS);
                }
                ids.into_iter().map(|(name, v)| Landmark::from_vertex(name, v)).collect()
            }
            Self::Custom { landmarks } => landmarks.clone(),
            Self::Disabled => Vec::new(),
        }
    }
}

/// Appends surface landmarks to the skeleton joints.
/// The landmark weights are kept as a dense ``[E, V]`` matrix so the selection
/// is a single batched matmul and differentiable w.r.t. the vertices.
#[derive(Clone, Debug)]
pub struct VertexJointSelector<B: Backend> {
    names: Vec<String>,
    weights: Option<Tensor<B, 2, Float>>,
}
impl<B: Backend> VertexJointSelector<B> {
    pub fn new(landmarks: &[Landmark], num_verts: usize, device: &B::Device) -> SmplResult<Self> {
        if landmarks.is_empty() {
            return Ok(Self {
                names: Vec::new(),
                weights: None,
            });
        }
        let mut weights = vec![0.0f32; landmarks.len() * num_verts];
        for (row, landmark) in landmarks.iter().enumerate() {
            if landmark.vertices.is_empty() {
                return Err(SmplError::InvalidConfig(format!("landmark '{}' has no vertices", landmark.name)));
            }
            for &(vertex, weight) in &landmark.vertices {
                if vertex >= num_verts {
                    return Err(SmplError::InvalidConfig(format!(
                        "landmark '{}' uses vertex {vertex} but the mesh has {num_verts} vertices",
                        landmark.name
                    )));
                }
                weights[row * num_verts + vertex] += weight;
            }
        }
        let weights = Tensor::<B, 2, Float>::from_data(TensorData::new(weights, [landmarks.len(), num_verts]), device);
        Ok(Self {
            names: landmarks.iter().map(|l| l.name.clone()).collect(),
            weights: Some(weights),
        })
    }

    pub fn from_table(table: &JointSelectorTable, num_verts: usize, device: &B::Device) -> SmplResult<Self> {
        Self::new(&table.landmarks(), num_verts, device)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn num_extra_joints(&self) -> usize {
        self.names.len()
    }

    /// ``[B, J, 3]`` joints and ``[B, V, 3]`` vertices to ``[B, J + E, 3]``
    pub fn forward(&self, vertices: Tensor<B, 3, Float>, joints: Tensor<B, 3, Float>) -> Tensor<B, 3, Float> {
        match &self.weights {
            None => joints,
            Some(weights) => {
                let [batch_size, num_verts, _] = vertices.dims();
                let extra = weights
                    .clone()
                    .unsqueeze_dim::<3>(0)
                    .expand([batch_size, self.names.len(), num_verts])
                    .matmul(vertices);
                Tensor::cat(vec![joints, extra], 1)
            }
        }
    }
}
