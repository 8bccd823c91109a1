use smpl_chamfer::error::ChamferError;
use smpl_core::error::SmplError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Smpl(#[from] SmplError),

    #[error(transparent)]
    Chamfer(#[from] ChamferError),

    #[error("invalid fitting configuration: {0}")]
    InvalidConfig(String),
}

pub type FitResult<T> = Result<T, FitError>;
