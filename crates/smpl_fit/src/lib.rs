pub mod error;
pub mod fitting;

pub mod prelude {
    pub use crate::error::{FitError, FitResult};
    pub use crate::fitting::{fit, FitOutcome, FitParams, FittingConfig, ParamGroups};
}
