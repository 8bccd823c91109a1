use burn::tensor::{backend::Backend, DataError, Float, Int, Tensor, TensorData, TensorKind};
use ndarray as nd;

/// Conversion of host ndarray buffers into burn tensors living on `device`.
/// Logical (row-major) element order is preserved regardless of the memory
/// layout of the source array.
pub trait ToBurn<B: Backend, const D: usize, K: TensorKind<B>> {
    fn to_burn(&self, device: &B::Device) -> Tensor<B, D, K>;
}

macro_rules! impl_to_burn_float {
    ($arr:ty, $dim:literal) => {
        impl<B: Backend> ToBurn<B, $dim, Float> for $arr {
            fn to_burn(&self, device: &B::Device) -> Tensor<B, $dim, Float> {
                let shape: [usize; $dim] = self.shape().try_into().unwrap_or([0; $dim]);
                let data = TensorData::new(self.iter().copied().collect::<Vec<f32>>(), shape);
                Tensor::<B, $dim, Float>::from_data(data, device)
            }
        }
    };
}
impl_to_burn_float!(nd::Array2<f32>, 2);
impl_to_burn_float!(nd::Array3<f32>, 3);

impl<B: Backend> ToBurn<B, 2, Int> for nd::Array2<u32> {
    #[allow(clippy::cast_possible_wrap)]
    fn to_burn(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        let data = TensorData::new(self.iter().map(|&x| x as i64).collect::<Vec<i64>>(), [self.nrows(), self.ncols()]);
        Tensor::<B, 2, Int>::from_data(data, device)
    }
}

/// Copies a float tensor back to the host as row-major `f32`
pub fn tensor_to_data_float<B: Backend, const D: usize>(tensor: &Tensor<B, D, Float>) -> Result<Vec<f32>, DataError> {
    tensor.to_data().convert::<f32>().to_vec::<f32>()
}
