//! K nearest neighbours between two batched point sets.
//!
//! The search itself runs on the host and only produces indices. Distances are
//! then recomputed as ``|p1 - p2[idx]|^2`` on the tensor side, so inside an
//! autodiff graph the gradient of a distance is ``2 (p1 - p2)`` scattered back
//! to both point sets at the stored indices (the adjoint of the gather). The
//! same rule is available in closed form as [`knn_backward`].

use crate::error::{ChamferError, ChamferResult};
use burn::tensor::{backend::Backend, Float, Int, Tensor, TensorData};
use rayon::prelude::*;

/// Index of an empty neighbour slot
pub const INVALID_INDEX: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KnnOptions {
    pub k: usize,
    /// Also gather the neighbour coordinates
    pub return_nn: bool,
    /// Sort the K neighbours by ascending distance, otherwise by index
    pub return_sorted: bool,
}
impl Default for KnnOptions {
    fn default() -> Self {
        Self {
            k: 1,
            return_nn: false,
            return_sorted: true,
        }
    }
}
impl KnnOptions {
    pub fn new(k: usize) -> Self {
        Self { k, ..Default::default() }
    }
    #[must_use]
    pub fn with_return_nn(mut self, return_nn: bool) -> Self {
        self.return_nn = return_nn;
        self
    }
    #[must_use]
    pub fn with_return_sorted(mut self, return_sorted: bool) -> Self {
        self.return_sorted = return_sorted;
        self
    }
}

#[derive(Clone, Debug)]
pub struct KnnOutput<B: Backend> {
    /// Squared distances ``[B, N1, K]``, zero in invalid slots
    pub dists: Tensor<B, 3, Float>,
    /// Neighbour indices into the second set ``[B, N1, K]``, [`INVALID_INDEX`] in invalid slots
    pub idx: Tensor<B, 3, Int>,
    /// Neighbour coordinates ``[B, N1, K, D]`` when requested, zero in invalid slots
    pub knn: Option<Tensor<B, 4, Float>>,
}

/// Shapes shared by both point sets
#[derive(Clone, Copy, Debug)]
struct KnnDims {
    batch: usize,
    n1: usize,
    n2: usize,
    dim: usize,
}

fn to_host<B: Backend, const D: usize>(tensor: &Tensor<B, D, Float>) -> ChamferResult<Vec<f32>> {
    tensor
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ChamferError::Data(format!("{e:?}")))
}

fn to_host_int<B: Backend, const D: usize>(tensor: &Tensor<B, D, Int>) -> ChamferResult<Vec<i64>> {
    tensor
        .to_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ChamferError::Data(format!("{e:?}")))
}

/// Checks that two point sets can be compared and returns their shapes
pub(crate) fn check_point_sets<B: Backend>(p1: &Tensor<B, 3, Float>, p2: &Tensor<B, 3, Float>) -> ChamferResult<(usize, usize, usize, usize)> {
    let [batch1, n1, dim1] = p1.dims();
    let [batch2, n2, dim2] = p2.dims();
    let (device1, device2) = (p1.device(), p2.device());
    if device1 != device2 {
        return Err(ChamferError::DeviceMismatch(format!("{device1:?}"), format!("{device2:?}")));
    }
    if batch1 != batch2 {
        return Err(ChamferError::BatchSizeMismatch(batch1, batch2));
    }
    if dim1 != dim2 {
        return Err(ChamferError::DimMismatch(dim1, dim2));
    }
    if n1 == 0 {
        return Err(ChamferError::EmptyPointCloud("p1"));
    }
    if n2 == 0 {
        return Err(ChamferError::EmptyPointCloud("p2"));
    }
    Ok((batch1, n1, n2, dim1))
}

/// Per-batch valid lengths, defaulting to the full point count
fn resolve_lengths(what: &'static str, lengths: Option<&[usize]>, batch: usize, max_len: usize) -> ChamferResult<Vec<usize>> {
    let Some(lengths) = lengths else {
        return Ok(vec![max_len; batch]);
    };
    if lengths.len() != batch {
        return Err(ChamferError::InvalidLength {
            what,
            reason: format!("{} entries for a batch of {batch}", lengths.len()),
        });
    }
    if let Some(&bad) = lengths.iter().find(|&&l| l > max_len) {
        return Err(ChamferError::InvalidLength {
            what,
            reason: format!("length {bad} exceeds the {max_len} points of the cloud"),
        });
    }
    Ok(lengths.to_vec())
}

/// Brute-force top-K search, parallel over the query points. Returns
/// ``[B * N1 * K]`` indices with [`INVALID_INDEX`] in empty slots.
#[allow(clippy::cast_possible_wrap)]
fn search(p1: &[f32], p2: &[f32], dims: KnnDims, lengths1: &[usize], lengths2: &[usize], k: usize, sorted: bool) -> Vec<i64> {
    let KnnDims { n1, n2, dim, .. } = dims;
    let mut idx = vec![INVALID_INDEX; dims.batch * n1 * k];
    idx.par_chunks_mut(k).enumerate().for_each(|(row, slots)| {
        let (b, i) = (row / n1, row % n1);
        if i >= lengths1[b] {
            return;
        }
        let query = &p1[row * dim..(row + 1) * dim];
        //ascending by distance, ties keep the lower index first
        let mut best: Vec<(f32, usize)> = Vec::with_capacity(k + 1);
        for j in 0..lengths2[b] {
            let start = (b * n2 + j) * dim;
            let cand = &p2[start..start + dim];
            let dist: f32 = query.iter().zip(cand).map(|(a, c)| (a - c) * (a - c)).sum();
            if best.len() < k || best.last().is_some_and(|&(worst, _)| dist < worst) {
                let pos = best.partition_point(|&(d, _)| d <= dist);
                best.insert(pos, (dist, j));
                best.truncate(k);
            }
        }
        if !sorted {
            best.sort_by_key(|&(_, j)| j);
        }
        for (slot, (_, j)) in slots.iter_mut().zip(best) {
            *slot = j as i64;
        }
    });
    idx
}

/// Splits raw indices into gatherable (clamped) indices and a validity mask
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn clamp_and_mask(idx: &[i64], n1: usize, k: usize, lengths2: &[usize]) -> (Vec<i64>, Vec<f32>) {
    idx.iter()
        .enumerate()
        .map(|(flat, &j)| {
            let b = flat / (n1 * k);
            if j >= 0 && (j as usize) < lengths2[b] {
                (j, 1.0)
            } else {
                (0, 0.0)
            }
        })
        .unzip()
}

/// Gathers ``[B, N1, K, D]`` rows of `x` at already clamped indices
fn gather_points<B: Backend>(x: Tensor<B, 3, Float>, clamped: Vec<i64>, n1: usize, k: usize) -> Tensor<B, 4, Float> {
    let [batch, _, dim] = x.dims();
    let index = Tensor::<B, 2, Int>::from_data(TensorData::new(clamped, [batch, n1 * k]), &x.device())
        .unsqueeze_dim::<3>(2)
        .expand([batch, n1 * k, dim]);
    x.gather(1, index).reshape([batch, n1, k, dim])
}

/// Gathers the neighbour coordinates ``[B, N1, K, D]`` of `x` ``[B, N2, D]``
/// at `idx` ``[B, N1, K]``. Slots that are negative or beyond `lengths` are zero.
pub fn knn_gather<B: Backend>(x: Tensor<B, 3, Float>, idx: &Tensor<B, 3, Int>, lengths: Option<&[usize]>) -> ChamferResult<Tensor<B, 4, Float>> {
    let [batch, n2, _] = x.dims();
    let [idx_batch, n1, k] = idx.dims();
    if batch != idx_batch {
        return Err(ChamferError::BatchSizeMismatch(batch, idx_batch));
    }
    let lengths = resolve_lengths("lengths", lengths, batch, n2)?;
    let (clamped, mask) = clamp_and_mask(&to_host_int(idx)?, n1, k, &lengths);
    let mask = Tensor::<B, 3, Float>::from_data(TensorData::new(mask, [batch, n1, k]), &x.device()).unsqueeze_dim::<4>(3);
    Ok(gather_points(x, clamped, n1, k) * mask)
}

/// K nearest neighbours in `p2` ``[B, N2, D]`` of every point of `p1`
/// ``[B, N1, D]``, restricted per batch to the first `lengths2[b]` points.
///
/// Query points beyond `lengths1[b]` get only invalid slots. When a batch has
/// fewer than K valid points the remaining slots are invalid: distance 0,
/// index [`INVALID_INDEX`] and no gradient.
pub fn knn_points<B: Backend>(
    p1: Tensor<B, 3, Float>,
    p2: Tensor<B, 3, Float>,
    lengths1: Option<&[usize]>,
    lengths2: Option<&[usize]>,
    options: &KnnOptions,
) -> ChamferResult<KnnOutput<B>> {
    let (batch, n1, n2, dim) = check_point_sets(&p1, &p2)?;
    let k = options.k;
    if k == 0 {
        return Err(ChamferError::InvalidK);
    }
    let lengths1 = resolve_lengths("lengths1", lengths1, batch, n1)?;
    let lengths2 = resolve_lengths("lengths2", lengths2, batch, n2)?;
    let dims = KnnDims { batch, n1, n2, dim };
    let device = p1.device();

    let idx = search(&to_host(&p1)?, &to_host(&p2)?, dims, &lengths1, &lengths2, k, options.return_sorted);
    let (clamped, mask) = clamp_and_mask(&idx, n1, k, &lengths2);
    let mask = Tensor::<B, 3, Float>::from_data(TensorData::new(mask, [batch, n1, k]), &device);

    let nn = gather_points(p2, clamped, n1, k);
    let diff = p1.unsqueeze_dim::<4>(2).expand([batch, n1, k, dim]) - nn.clone();
    let dists = (diff.clone() * diff).sum_dim(3).reshape([batch, n1, k]) * mask.clone();

    let knn = options.return_nn.then(|| nn * mask.unsqueeze_dim::<4>(3));
    let idx = Tensor::<B, 3, Int>::from_data(TensorData::new(idx, [batch, n1, k]), &device);
    Ok(KnnOutput { dists, idx, knn })
}

/// Closed-form gradient of the neighbour distances.
///
/// For every valid slot ``(b, i, k)`` with neighbour ``j``, the upstream
/// gradient ``g`` contributes ``2 g (p1[i] - p2[j])`` to ``grad_p1[i]`` and the
/// negation to ``grad_p2[j]``. Contributions to a shared neighbour accumulate.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::similar_names)]
pub fn knn_backward<B: Backend>(
    p1: &Tensor<B, 3, Float>,
    p2: &Tensor<B, 3, Float>,
    lengths1: Option<&[usize]>,
    lengths2: Option<&[usize]>,
    idx: &Tensor<B, 3, Int>,
    grad_dists: &Tensor<B, 3, Float>,
) -> ChamferResult<(Tensor<B, 3, Float>, Tensor<B, 3, Float>)> {
    let (batch, n1, n2, dim) = check_point_sets(p1, p2)?;
    let k = idx.dims()[2];
    if idx.dims() != [batch, n1, k] {
        return Err(ChamferError::PointCountMismatch {
            what: "idx",
            expected: vec![batch, n1, k],
            got: idx.dims().to_vec(),
        });
    }
    if grad_dists.dims() != idx.dims() {
        return Err(ChamferError::PointCountMismatch {
            what: "grad_dists",
            expected: idx.dims().to_vec(),
            got: grad_dists.dims().to_vec(),
        });
    }
    let lengths1 = resolve_lengths("lengths1", lengths1, batch, n1)?;
    let lengths2 = resolve_lengths("lengths2", lengths2, batch, n2)?;

    let p1_host = to_host(p1)?;
    let p2_host = to_host(p2)?;
    let idx_host = to_host_int(idx)?;
    let grad_host = to_host(grad_dists)?;

    let mut grad_p1 = vec![0.0f32; batch * n1 * dim];
    let mut grad_p2 = vec![0.0f32; batch * n2 * dim];
    for b in 0..batch {
        for i in 0..lengths1[b] {
            for slot in 0..k {
                let flat = (b * n1 + i) * k + slot;
                let j = idx_host[flat];
                if j < 0 || j as usize >= lengths2[b] {
                    continue;
                }
                let (row1, row2) = ((b * n1 + i) * dim, (b * n2 + j as usize) * dim);
                for c in 0..dim {
                    let g = 2.0 * grad_host[flat] * (p1_host[row1 + c] - p2_host[row2 + c]);
                    grad_p1[row1 + c] += g;
                    grad_p2[row2 + c] -= g;
                }
            }
        }
    }
    let device = p1.device();
    Ok((
        Tensor::from_data(TensorData::new(grad_p1, [batch, n1, dim]), &device),
        Tensor::from_data(TensorData::new(grad_p2, [batch, n2, dim]), &device),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn cloud<B: Backend>(values: &[f32], shape: [usize; 3]) -> Tensor<B, 3> {
        Tensor::<B, 3>::from_data(TensorData::new(values.to_vec(), shape), &Default::default())
    }

    fn brute_force_nn(p1: &[[f32; 3]], p2: &[[f32; 3]]) -> Vec<(usize, f32)> {
        p1.iter()
            .map(|a| {
                p2.iter()
                    .map(|b| (0..3).map(|c| (a[c] - b[c]) * (a[c] - b[c])).sum::<f32>())
                    .enumerate()
                    .fold((0, f32::INFINITY), |best, (j, d)| if d < best.1 { (j, d) } else { best })
            })
            .collect()
    }

    #[test]
    fn nearest_neighbour_matches_brute_force() {
        let a = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.3, 0.9, -0.2]];
        let b = [[0.9, 0.1, 0.0], [-2.0, 0.0, 0.0], [0.1, 0.0, 0.1], [0.5, 0.5, 0.5], [0.0, 1.0, 0.0]];
        let p1 = cloud::<TestBackend>(&a.concat(), [1, 3, 3]);
        let p2 = cloud::<TestBackend>(&b.concat(), [1, 5, 3]);
        let out = knn_points(p1, p2, None, None, &KnnOptions::default()).unwrap();
        let idx = to_host_int(&out.idx).unwrap();
        let dists = to_host(&out.dists).unwrap();
        for (i, (j, d)) in brute_force_nn(&a, &b).into_iter().enumerate() {
            assert_eq!(idx[i], j as i64);
            assert_abs_diff_eq!(dists[i], d, epsilon = 1e-6);
        }
    }

    #[test]
    fn neighbours_are_sorted_by_distance() {
        let p1 = cloud::<TestBackend>(&[0.0, 0.0, 0.0], [1, 1, 3]);
        let p2 = cloud::<TestBackend>(&[3.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0], [1, 3, 3]);
        let sorted = knn_points(p1.clone(), p2.clone(), None, None, &KnnOptions::new(3)).unwrap();
        assert_eq!(to_host_int(&sorted.idx).unwrap(), vec![1, 2, 0]);
        assert_eq!(to_host(&sorted.dists).unwrap(), vec![1.0, 4.0, 9.0]);
        let by_index = knn_points(p1, p2, None, None, &KnnOptions::new(2).with_return_sorted(false)).unwrap();
        assert_eq!(to_host_int(&by_index.idx).unwrap(), vec![1, 2]);
    }

    #[test]
    fn short_batches_leave_invalid_slots_empty() {
        let p1 = cloud::<TestBackend>(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [2, 2, 3]);
        let p2 = cloud::<TestBackend>(&[0.5, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 1.0], [2, 2, 3]);
        let options = KnnOptions::new(3).with_return_nn(true);
        let out = knn_points(p1, p2, None, Some(&[1, 2]), &options).unwrap();
        let idx = to_host_int(&out.idx).unwrap();
        let dists = to_host(&out.dists).unwrap();
        //batch 0 has a single valid target point
        for i in 0..2 {
            let row = &idx[i * 3..i * 3 + 3];
            assert_eq!(row.iter().filter(|&&j| j >= 0).count(), 1);
            assert_eq!(&dists[i * 3 + 1..i * 3 + 3], &[0.0, 0.0]);
        }
        //batch 1 has two
        for i in 2..4 {
            assert_eq!(idx[i * 3 + 2], INVALID_INDEX);
            assert!(idx[i * 3] >= 0 && idx[i * 3 + 1] >= 0);
        }
        let knn = to_host(&out.knn.unwrap()).unwrap();
        assert_eq!(&knn[3..9], &[0.0; 6]);
        assert_eq!(&knn[0..3], &[0.5, 0.0, 0.0]);
    }

    #[test]
    fn invalid_slots_receive_no_gradient() {
        let p1 = cloud::<TestAutodiffBackend>(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], [1, 2, 3]).require_grad();
        let p2 = cloud::<TestAutodiffBackend>(&[0.2, 0.0, 0.0, 5.0, 5.0, 5.0, 9.0, 9.0, 9.0], [1, 3, 3]).require_grad();
        let out = knn_points(p1.clone(), p2.clone(), None, Some(&[1]), &KnnOptions::new(3)).unwrap();
        let grads = out.dists.sum().backward();
        let g2 = to_host(&p2.grad(&grads).unwrap()).unwrap();
        assert!(g2[3..].iter().all(|&g| g == 0.0));
        let g1 = to_host(&p1.grad(&grads).unwrap()).unwrap();
        assert_abs_diff_eq!(g1[0], 2.0 * (0.0 - 0.2), epsilon = 1e-6);
        assert_abs_diff_eq!(g1[3], 2.0 * (1.0 - 0.2), epsilon = 1e-6);
    }

    #[test]
    fn autodiff_gradient_matches_closed_form_backward() {
        let a: Vec<f32> = (0..2 * 6 * 3).map(|x| ((x * 37 % 17) as f32) * 0.13 - 1.0).collect();
        let b: Vec<f32> = (0..2 * 4 * 3).map(|x| ((x * 23 % 11) as f32) * 0.21 - 1.0).collect();
        let w: Vec<f32> = (0..2 * 6 * 2).map(|x| 0.5 + (x % 5) as f32 * 0.25).collect();
        let lengths1 = [6, 4];
        let lengths2 = [4, 1];

        let p1 = cloud::<TestAutodiffBackend>(&a, [2, 6, 3]).require_grad();
        let p2 = cloud::<TestAutodiffBackend>(&b, [2, 4, 3]).require_grad();
        let weights = cloud::<TestAutodiffBackend>(&w, [2, 6, 2]);
        let out = knn_points(p1.clone(), p2.clone(), Some(&lengths1), Some(&lengths2), &KnnOptions::new(2)).unwrap();
        let grads = (out.dists * weights.clone()).sum().backward();
        let auto_p1 = to_host(&p1.grad(&grads).unwrap()).unwrap();
        let auto_p2 = to_host(&p2.grad(&grads).unwrap()).unwrap();

        let (manual_p1, manual_p2) = knn_backward(&p1, &p2, Some(&lengths1), Some(&lengths2), &out.idx, &weights).unwrap();
        for (x, y) in auto_p1.iter().zip(to_host(&manual_p1).unwrap()) {
            assert_abs_diff_eq!(*x, y, epsilon = 1e-5);
        }
        for (x, y) in auto_p2.iter().zip(to_host(&manual_p2).unwrap()) {
            assert_abs_diff_eq!(*x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn knn_gather_zeroes_out_of_range_slots() {
        let x = cloud::<TestBackend>(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 2, 3]);
        let idx = Tensor::<TestBackend, 3, Int>::from_data(TensorData::new(vec![1i64, -1, 0, 1], [1, 2, 2]), &Default::default());
        let gathered = knn_gather(x, &idx, Some(&[1])).unwrap();
        assert_eq!(gathered.dims(), [1, 2, 2, 3]);
        assert_eq!(to_host(&gathered).unwrap(), vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let p1 = cloud::<TestBackend>(&[0.0; 6], [1, 2, 3]);
        let p2 = cloud::<TestBackend>(&[0.0; 12], [2, 2, 3]);
        assert!(matches!(knn_points(p1.clone(), p2, None, None, &KnnOptions::default()), Err(ChamferError::BatchSizeMismatch(1, 2))));
        let p2 = cloud::<TestBackend>(&[0.0; 4], [1, 2, 2]);
        assert!(matches!(knn_points(p1.clone(), p2, None, None, &KnnOptions::default()), Err(ChamferError::DimMismatch(3, 2))));
        assert!(matches!(knn_points(p1.clone(), p1.clone(), None, None, &KnnOptions::new(0)), Err(ChamferError::InvalidK)));
        assert!(matches!(
            knn_points(p1.clone(), p1, None, Some(&[3]), &KnnOptions::default()),
            Err(ChamferError::InvalidLength { .. })
        ));
    }
}
