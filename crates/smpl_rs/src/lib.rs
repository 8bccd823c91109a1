#![deny(missing_docs)]
//! ## Crate Items Overview
//!
//! This section provides quick links to the main items in smpl-rs.
//!
//! ### Modules
//! - [`smpl_core`](crate::smpl_core) - The SMPL body model: blend shapes, forward kinematics, skinning and the npz loader.
//! - [`smpl_chamfer`](crate::smpl_chamfer) - K nearest neighbours and the Chamfer distance, differentiable w.r.t. both point clouds.
//! - [`smpl_fit`](crate::smpl_fit) - Fitting body parameters to a point cloud.
//! - [`smpl_utils`](crate::smpl_utils) - Rotation and transform numerics shared by the crates above.
//!
//! ## Demos
//! The `demos/` folder of the repository has two binaries:
//!
//! - **fit_betas**: recovers the shape of a body from its vertices, `cargo run --release -p fit_betas -- [model.npz]`
//! - **benchmark**: forward passes per second, `cargo run --release -p benchmark -- [model.npz]`
//!
//! Both fall back to a small synthetic body when no model archive is given.
pub use smpl_chamfer;
pub use smpl_core;
pub use smpl_fit;
pub use smpl_utils;

/// The most used items of all crates
pub mod prelude {
    pub use smpl_chamfer::prelude::*;
    pub use smpl_core::prelude::*;
    pub use smpl_fit::prelude::*;
}
