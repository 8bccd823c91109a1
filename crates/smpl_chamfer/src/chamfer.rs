use crate::{
    error::{ChamferError, ChamferResult},
    knn::{check_point_sets, knn_points, KnnOptions},
};
use burn::tensor::{backend::Backend, Float, Tensor};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    Sum,
    Mean,
    None,
}
impl Reduction {
    /// Parses `sum`, `mean` or `none`. Anything else is an error, there is no
    /// fallback.
    pub fn parse(name: &str) -> ChamferResult<Self> {
        Self::from_str(name).map_err(|_| ChamferError::InvalidReduction(name.to_string()))
    }

    fn apply<B: Backend>(self, dists: Tensor<B, 2, Float>, dim: usize) -> Tensor<B, 2, Float> {
        match self {
            Self::Sum => dists.sum_dim(dim),
            Self::Mean => dists.mean_dim(dim),
            Self::None => dists,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChamferOptions {
    /// Source to target plus target to source
    pub bidirectional: bool,
    /// Only target to source. Ignored when `bidirectional` is set.
    pub reverse: bool,
    pub batch_reduction: Reduction,
    pub point_reduction: Reduction,
}
impl Default for ChamferOptions {
    fn default() -> Self {
        Self {
            bidirectional: false,
            reverse: false,
            batch_reduction: Reduction::Mean,
            point_reduction: Reduction::Sum,
        }
    }
}
impl ChamferOptions {
    pub fn bidirectional() -> Self {
        Self {
            bidirectional: true,
            ..Default::default()
        }
    }
    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
    #[must_use]
    pub fn with_reductions(mut self, batch_reduction: Reduction, point_reduction: Reduction) -> Self {
        self.batch_reduction = batch_reduction;
        self.point_reduction = point_reduction;
        self
    }
    /// Builds options from reduction names, e.g. from a config file
    pub fn from_names(bidirectional: bool, reverse: bool, batch_reduction: &str, point_reduction: &str) -> ChamferResult<Self> {
        Ok(Self {
            bidirectional,
            reverse,
            batch_reduction: Reduction::parse(batch_reduction)?,
            point_reduction: Reduction::parse(point_reduction)?,
        })
    }
}

/// Nearest-neighbour squared distance between two point clouds.
///
/// The result keeps the reduced axes with size 1: ``[B, P]`` without any
/// reduction, ``[B, 1]`` after the point reduction, ``[1, P]`` after only the
/// batch reduction and ``[1, 1]`` when both are applied. ``P`` is the point
/// count of the set the distances are measured from.
#[derive(Clone, Debug, Default)]
pub struct ChamferDistance {
    pub options: ChamferOptions,
}
impl ChamferDistance {
    pub fn new(options: ChamferOptions) -> Self {
        Self { options }
    }

    pub fn forward<B: Backend>(&self, source: Tensor<B, 3, Float>, target: Tensor<B, 3, Float>) -> ChamferResult<Tensor<B, 2, Float>> {
        check_point_sets(&source, &target)?;
        let ChamferOptions {
            bidirectional,
            reverse,
            batch_reduction,
            point_reduction,
        } = self.options;
        if bidirectional && reverse {
            warn!("Both bidirectional and reverse are set, bidirectional takes precedence");
        }
        let directed = |from: Tensor<B, 3, Float>, to: Tensor<B, 3, Float>| -> ChamferResult<Tensor<B, 2, Float>> {
            let nearest = knn_points(from, to, None, None, &KnnOptions::new(1))?;
            Ok(batch_reduction.apply(point_reduction.apply(first_slot(nearest.dists), 1), 0))
        };
        if bidirectional {
            let ([_, n_source, _], [_, n_target, _]) = (source.dims(), target.dims());
            if point_reduction == Reduction::None && n_source != n_target {
                return Err(ChamferError::PointCountMismatch {
                    what: "per-point bidirectional distances",
                    expected: vec![n_source],
                    got: vec![n_target],
                });
            }
            Ok(directed(source.clone(), target.clone())? + directed(target, source)?)
        } else if reverse {
            directed(target, source)
        } else {
            directed(source, target)
        }
    }

    /// Same as [`ChamferDistance::forward`] with the options given per call
    pub fn distance<B: Backend>(source: Tensor<B, 3, Float>, target: Tensor<B, 3, Float>, options: ChamferOptions) -> ChamferResult<Tensor<B, 2, Float>> {
        Self::new(options).forward(source, target)
    }
}

/// ``[B, P, 1]`` distances to ``[B, P]``
fn first_slot<B: Backend>(dists: Tensor<B, 3, Float>) -> Tensor<B, 2, Float> {
    let [batch, points, _] = dists.dims();
    dists.reshape([batch, points])
}
