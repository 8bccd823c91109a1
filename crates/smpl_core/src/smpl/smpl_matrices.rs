use super::smpl::{NUM_JOINTS, PARENT_ID_PER_JOINT};
use crate::error::{SmplError, SmplResult};
use log::{info, warn};
use ndarray as nd;
use ndarray_npy::NpzReader;
use smpl_utils::io::{has_extension, FileLoader};
use std::{
    io::{Read, Seek},
    path::Path,
};

/// Host-side model buffers as stored in an SMPL npz archive.
///
/// Layouts: ``v_template [V, 3]``, ``faces [F, 3]``, ``shape_dirs [V, 3, S]``,
/// ``pose_dirs [V, 3, (J - 1) * 9]``, ``joint_regressor [J, V]``,
/// ``lbs_weights [V, J]`` and one raw parent per joint.
#[derive(Clone, Debug)]
pub struct SmplMatrices {
    pub verts_template: nd::Array2<f32>,
    pub faces: nd::Array2<u32>,
    pub shape_dirs: nd::Array3<f32>,
    pub pose_dirs: nd::Array3<f32>,
    pub joint_regressor: nd::Array2<f32>,
    pub lbs_weights: nd::Array2<f32>,
    pub parents: Vec<i64>,
    /// Template of the kid variant, only used when the model is built with ``Age::Kid``
    pub kid_template: Option<nd::Array2<f32>>,
}

impl SmplMatrices {
    pub fn num_verts(&self) -> usize {
        self.verts_template.nrows()
    }
    pub fn num_joints(&self) -> usize {
        self.parents.len()
    }
    pub fn num_betas(&self) -> usize {
        self.shape_dirs.shape()[2]
    }

    /// Reads every buffer from an npz archive
    pub fn from_npz(model_path: impl AsRef<Path>) -> SmplResult<Self> {
        let model_path = model_path.as_ref();
        if !has_extension(model_path, "npz") {
            return Err(SmplError::InvalidExtension(model_path.display().to_string(), "npz"));
        }
        info!("Loading body model from {}", model_path.display());
        Self::from_reader(FileLoader::open(model_path)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> SmplResult<Self> {
        let mut npz = NpzReader::new(reader).map_err(SmplError::Archive)?;
        let names = npz.names().map_err(SmplError::Archive)?;

        let verts_template: nd::Array2<f32> = read_float(&mut npz, &names, "v_template")?;
        let faces: nd::Array2<i64> = read_int(&mut npz, &names, "f")?;
        let shape_dirs: nd::Array3<f32> = read_float(&mut npz, &names, "shapedirs")?;
        let pose_dirs: nd::Array3<f32> = read_float(&mut npz, &names, "posedirs")?;
        let joint_regressor: nd::Array2<f32> = read_float(&mut npz, &names, "J_regressor")?;
        let lbs_weights: nd::Array2<f32> = read_float(&mut npz, &names, "weights")?;

        let parents = if has_buffer(&names, "kintree_table") {
            let kintree: nd::Array2<i64> = read_int(&mut npz, &names, "kintree_table")?;
            kintree.row(0).to_vec()
        } else if joint_regressor.nrows() == NUM_JOINTS + 1 {
            warn!("No kintree_table in npz, using the default SMPL hierarchy");
            PARENT_ID_PER_JOINT.to_vec()
        } else {
            return Err(SmplError::MissingBuffer("kintree_table".to_string()));
        };

        let faces = faces.mapv(|x| u32::try_from(x).unwrap_or(u32::MAX));
        Ok(Self {
            verts_template,
            faces,
            shape_dirs,
            pose_dirs,
            joint_regressor,
            lbs_weights,
            parents,
            kid_template: None,
        })
    }

    /// Reads the ``v_template`` of a kid model and keeps it for the kid variant
    pub fn load_kid_template(&mut self, kid_template_path: impl AsRef<Path>) -> SmplResult<()> {
        let mut npz = NpzReader::new(FileLoader::open(kid_template_path)?).map_err(SmplError::Archive)?;
        let names = npz.names().map_err(SmplError::Archive)?;
        self.kid_template = Some(read_float(&mut npz, &names, "v_template")?);
        Ok(())
    }

    /// Checks that all buffers agree on ``V``, ``J`` and ``S``
    pub fn validate(&self) -> SmplResult<()> {
        let num_verts = self.num_verts();
        let num_joints = self.num_joints();
        let num_betas = self.num_betas();
        check_shape("v_template", self.verts_template.shape(), &[num_verts, 3])?;
        check_shape("f", self.faces.shape(), &[self.faces.nrows(), 3])?;
        check_shape("shapedirs", self.shape_dirs.shape(), &[num_verts, 3, num_betas])?;
        check_shape("J_regressor", self.joint_regressor.shape(), &[num_joints, num_verts])?;
        check_shape("weights", self.lbs_weights.shape(), &[num_verts, num_joints])?;
        let pose_shape = self.pose_dirs.shape();
        if pose_shape[0] != num_verts || pose_shape[1] != 3 {
            return Err(SmplError::ShapeMismatch {
                what: "posedirs".to_string(),
                expected: vec![num_verts, 3, (num_joints.saturating_sub(1)) * 9],
                got: pose_shape.to_vec(),
            });
        }
        if let Some(&max_idx) = self.faces.iter().max() {
            if max_idx as usize >= num_verts {
                return Err(SmplError::InvalidConfig(format!("face index {max_idx} is out of range for {num_verts} vertices")));
            }
        }
        if let Some(kid) = &self.kid_template {
            check_shape("kid v_template", kid.shape(), &[num_verts, 3])?;
        }
        Ok(())
    }

    /// Keeps the first `num_betas` shape directions
    pub fn truncate_betas(&mut self, num_betas: usize) {
        let keep = num_betas.min(self.num_betas());
        if keep < self.num_betas() {
            self.shape_dirs = self.shape_dirs.slice_axis(nd::Axis(2), nd::Slice::from(0..keep)).to_owned();
        }
    }

    /// Appends the kid template offset as an extra shape direction. The kid
    /// template is centred on the origin and the adult template subtracted.
    pub fn append_kid_shape_dir(&mut self) -> SmplResult<()> {
        let kid = self
            .kid_template
            .as_ref()
            .ok_or_else(|| SmplError::InvalidConfig("the kid variant needs a kid template".to_string()))?;
        check_shape("kid v_template", kid.shape(), &[self.num_verts(), 3])?;
        let kid_mean = kid.mean_axis(nd::Axis(0)).ok_or_else(|| SmplError::InvalidConfig("empty kid template".to_string()))?;
        let kid_centred = kid - &kid_mean;
        let diff = (kid_centred - &self.verts_template).insert_axis(nd::Axis(2));
        self.shape_dirs = nd::concatenate(nd::Axis(2), &[self.shape_dirs.view(), diff.view()]).map_err(|e| SmplError::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}

fn check_shape(what: &str, got: &[usize], expected: &[usize]) -> SmplResult<()> {
    if got == expected {
        Ok(())
    } else {
        Err(SmplError::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        })
    }
}

fn has_buffer(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n == name || n.strip_suffix(".npy") == Some(name))
}

/// Reads `name` with the element type `T`. Archives written by numpy store
/// ``name.npy``, so both keys are tried.
fn read_as<T: ndarray_npy::ReadableElement, R: Read + Seek, D: nd::Dimension>(npz: &mut NpzReader<R>, name: &str) -> Result<nd::Array<T, D>, ndarray_npy::ReadNpzError> {
    npz.by_name::<nd::OwnedRepr<T>, D>(name)
        .or_else(|_| npz.by_name::<nd::OwnedRepr<T>, D>(&format!("{name}.npy")))
}

/// Reads a float buffer stored either as f32 or f64
fn read_float<R: Read + Seek, D: nd::Dimension>(npz: &mut NpzReader<R>, names: &[String], name: &str) -> SmplResult<nd::Array<f32, D>> {
    if !has_buffer(names, name) {
        return Err(SmplError::MissingBuffer(name.to_string()));
    }
    if let Ok(arr) = read_as::<f32, _, D>(npz, name) {
        return Ok(arr);
    }
    #[allow(clippy::cast_possible_truncation)]
    read_as::<f64, _, D>(npz, name)
        .map(|arr| arr.mapv(|x| x as f32))
        .map_err(|source| SmplError::Npz { name: name.to_string(), source })
}

/// Reads an index buffer stored with any of the common integer dtypes
fn read_int<R: Read + Seek, D: nd::Dimension>(npz: &mut NpzReader<R>, names: &[String], name: &str) -> SmplResult<nd::Array<i64, D>> {
    if !has_buffer(names, name) {
        return Err(SmplError::MissingBuffer(name.to_string()));
    }
    if let Ok(arr) = read_as::<i64, _, D>(npz, name) {
        return Ok(arr);
    }
    if let Ok(arr) = read_as::<i32, _, D>(npz, name) {
        return Ok(arr.mapv(i64::from));
    }
    if let Ok(arr) = read_as::<u32, _, D>(npz, name) {
        return Ok(arr.mapv(i64::from));
    }
    read_as::<u64, _, D>(npz, name)
        .map(|arr| arr.mapv(|x| i64::try_from(x).unwrap_or(-1)))
        .map_err(|source| SmplError::Npz { name: name.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smpl::synthetic::synthetic_matrices;
    use approx::assert_abs_diff_eq;
    use ndarray_npy::NpzWriter;
    use std::io::Cursor;

    fn write_npz(matrices: &SmplMatrices, with_kintree: bool, f64_template: bool) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut npz = NpzWriter::new(&mut buf);
            if f64_template {
                npz.add_array("v_template", &matrices.verts_template.mapv(f64::from)).unwrap();
            } else {
                npz.add_array("v_template", &matrices.verts_template).unwrap();
            }
            npz.add_array("f", &matrices.faces.mapv(|x| x as i32)).unwrap();
            npz.add_array("shapedirs", &matrices.shape_dirs).unwrap();
            npz.add_array("posedirs", &matrices.pose_dirs).unwrap();
            npz.add_array("J_regressor", &matrices.joint_regressor).unwrap();
            npz.add_array("weights", &matrices.lbs_weights).unwrap();
            if with_kintree {
                let mut kintree = nd::Array2::<u32>::zeros((2, matrices.num_joints()));
                for (j, &p) in matrices.parents.iter().enumerate() {
                    kintree[[0, j]] = u32::try_from(p).unwrap_or(u32::MAX);
                    kintree[[1, j]] = j as u32;
                }
                npz.add_array("kintree_table", &kintree).unwrap();
            }
            npz.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn reads_back_written_archive() {
        let matrices = synthetic_matrices();
        let bytes = write_npz(&matrices, true, true);
        let loaded = SmplMatrices::from_reader(Cursor::new(bytes)).unwrap();
        loaded.validate().unwrap();
        assert_eq!(loaded.faces, matrices.faces);
        assert_eq!(loaded.num_betas(), matrices.num_betas());
        assert_eq!(loaded.parents[1..], matrices.parents[1..]);
        assert_eq!(loaded.parents[0], i64::from(u32::MAX));
        for (a, b) in loaded.verts_template.iter().zip(matrices.verts_template.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn missing_kintree_for_non_smpl_skeleton_is_reported() {
        let matrices = synthetic_matrices();
        let bytes = write_npz(&matrices, false, false);
        let res = SmplMatrices::from_reader(Cursor::new(bytes));
        assert!(matches!(res, Err(SmplError::MissingBuffer(name)) if name == "kintree_table"));
    }

    #[test]
    fn rejects_wrong_extension() {
        assert!(matches!(SmplMatrices::from_npz("model.pkl"), Err(SmplError::InvalidExtension(_, _))));
    }

    #[test]
    fn kid_direction_is_appended_after_truncation() {
        let mut matrices = synthetic_matrices();
        //move the adult off the origin so its mean cannot hide in the direction
        matrices.verts_template.column_mut(1).mapv_inplace(|y| y + 1.0);
        let kid = matrices.verts_template.mapv(|x| x * 0.5 + 1.0);
        matrices.kid_template = Some(kid.clone());
        let num_betas = matrices.num_betas();
        matrices.truncate_betas(num_betas - 1);
        matrices.append_kid_shape_dir().unwrap();
        assert_eq!(matrices.num_betas(), num_betas);

        let kid_mean = kid.mean_axis(nd::Axis(0)).unwrap();
        let expected = &kid - &kid_mean - &matrices.verts_template;
        let kid_dir = matrices.shape_dirs.index_axis(nd::Axis(2), num_betas - 1).to_owned();
        for (got, want) in kid_dir.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-5);
        }
        let adult_mean = matrices.verts_template.mean_axis(nd::Axis(0)).unwrap();
        for (mean, adult) in kid_dir.mean_axis(nd::Axis(0)).unwrap().iter().zip(adult_mean.iter()) {
            assert_abs_diff_eq!(*mean, -adult, epsilon = 1e-5);
        }
    }

    #[test]
    fn kid_without_template_is_a_config_error() {
        let mut matrices = synthetic_matrices();
        assert!(matches!(matrices.append_kid_shape_dir(), Err(SmplError::InvalidConfig(_))));
    }
}
