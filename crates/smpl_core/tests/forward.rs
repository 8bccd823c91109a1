use approx::assert_abs_diff_eq;
use burn::{backend::NdArray, tensor::Tensor};
use nalgebra as na;
use smpl_core::{
    prelude::*,
    smpl::{
        smpl::{NUM_JOINTS, NUM_VERTS},
        synthetic::{synthetic_config, synthetic_matrices, NUM_BETAS, NUM_JOINTS as SYNTH_JOINTS},
    },
};
use smpl_utils::array::tensor_to_data_float;

type TestBackend = NdArray;

fn synthetic_model() -> SmplGPU<TestBackend> {
    SmplGPU::new_from_matrices(synthetic_config(), synthetic_matrices(), &Default::default()).unwrap()
}

fn host<const D: usize>(tensor: &Tensor<TestBackend, D>) -> Vec<f32> {
    tensor_to_data_float(tensor).unwrap()
}

fn assert_close(a: &[f32], b: &[f32], eps: f32) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_abs_diff_eq!(*x, *y, epsilon = eps);
    }
}

fn betas(values: [f32; NUM_BETAS]) -> Tensor<TestBackend, 2> {
    Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape([1, NUM_BETAS])
}

#[test]
fn rest_pose_leaves_shaped_template_untouched() {
    let model = synthetic_model();
    let out = model.forward(&SmplInput::new().with_betas(betas([0.5, -1.0, 2.0]))).unwrap();
    let vertices = out.vertices.clone().unwrap();
    assert_close(&host(&vertices), &host(&out.v_shaped), 1e-5);

    let rest_joints = model.verts2joints(out.v_shaped.clone());
    let posed_joints = out.joints.clone().slice([0..1, 0..SYNTH_JOINTS, 0..3]);
    assert_close(&host(&posed_joints), &host(&rest_joints), 1e-5);
}

#[test]
fn shape_offsets_are_linear_in_betas() {
    let model = synthetic_model();
    let template = model.betas2verts(betas([0.0; NUM_BETAS])).unwrap();
    let a = model.betas2verts(betas([1.0, 0.0, -2.0])).unwrap();
    let b = model.betas2verts(betas([0.5, 3.0, 1.0])).unwrap();
    let sum = model.betas2verts(betas([1.5, 3.0, -1.0])).unwrap();
    let expected = a - template.clone() + b;
    assert_close(&host(&sum), &host(&expected), 1e-5);
}

#[test]
fn translation_shifts_every_output_point() {
    let model = synthetic_model();
    let device = Default::default();
    let pose = Tensor::<TestBackend, 1>::from_floats([0.1, 0.2, -0.3, 0.0, 0.4, 0.0, 0.2, 0.0, 0.1], &device).reshape([1, 9]);
    let base = SmplInput::new().with_body_pose(pose).with_betas(betas([1.0, 1.0, 1.0]));
    let transl = Tensor::<TestBackend, 1>::from_floats([0.5, -1.0, 2.0], &device).reshape([1, 3]);

    let out0 = model.forward(&base).unwrap();
    let out1 = model.forward(&base.clone().with_transl(transl.clone())).unwrap();
    let shift = transl.unsqueeze_dim::<3>(1);
    assert_close(
        &host(&out1.vertices.unwrap()),
        &host(&(out0.vertices.unwrap() + shift.clone())),
        1e-5,
    );
    assert_close(&host(&out1.joints), &host(&(out0.joints + shift)), 1e-5);
}

#[test]
fn global_orient_rotates_the_body_about_the_root() {
    let model = synthetic_model();
    let device = Default::default();
    let axis_angle = na::Vector3::new(0.3f32, -0.7, 0.4);
    let rot = na::Rotation3::new(axis_angle);
    let orient = Tensor::<TestBackend, 1>::from_floats([axis_angle.x, axis_angle.y, axis_angle.z], &device).reshape([1, 3]);

    let rest = model.forward(&SmplInput::default()).unwrap();
    let posed = model.forward(&SmplInput::new().with_global_orient(orient)).unwrap();

    let rest_joints = host(&rest.joints);
    let root = na::Vector3::new(rest_joints[0], rest_joints[1], rest_joints[2]);
    let rotate_all = |points: &[f32]| -> Vec<f32> {
        points
            .chunks(3)
            .flat_map(|p| {
                let q = rot * (na::Vector3::new(p[0], p[1], p[2]) - root) + root;
                [q.x, q.y, q.z]
            })
            .collect()
    };
    assert_close(&host(&posed.joints), &rotate_all(&rest_joints), 1e-4);
    assert_close(
        &host(&posed.vertices.unwrap()),
        &rotate_all(&host(&rest.vertices.unwrap())),
        1e-4,
    );
}

#[test]
fn child_joints_follow_their_parents() {
    let model = synthetic_model();
    let device = Default::default();
    //bend the second joint by 90 degrees about z, the chain above it rotates rigidly
    let mut pose = [0.0f32; 9];
    pose[2] = std::f32::consts::FRAC_PI_2;
    let pose = Tensor::<TestBackend, 1>::from_floats(pose, &device).reshape([1, 9]);
    let rest = host(&model.forward(&SmplInput::default()).unwrap().joints);
    let posed = host(&model.forward(&SmplInput::new().with_body_pose(pose)).unwrap().joints);

    let joint = |data: &[f32], j: usize| na::Vector3::new(data[3 * j], data[3 * j + 1], data[3 * j + 2]);
    let rot = na::Rotation3::from_axis_angle(&na::Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
    for j in 0..SYNTH_JOINTS {
        //only descendants of the bent joint move, about the bent joint
        if model.skeleton().chain_to_root(j)[1..].contains(&1) {
            let expected = rot * (joint(&rest, j) - joint(&rest, 1)) + joint(&rest, 1);
            assert_abs_diff_eq!(joint(&posed, j), expected, epsilon = 1e-4);
        } else {
            assert_abs_diff_eq!(joint(&posed, j), joint(&rest, j), epsilon = 1e-5);
        }
    }
}

#[test]
fn return_verts_can_be_disabled_per_call() {
    let model = synthetic_model();
    let out = model.forward(&SmplInput::new().with_return_verts(false)).unwrap();
    assert!(out.vertices.is_none());
    assert_eq!(out.num_joints(), SYNTH_JOINTS + 2);
}

#[test]
fn config_file_drives_construction() {
    let path = std::env::temp_dir().join("smpl_core_config_test.json");
    std::fs::write(
        &path,
        r#"{"gender": "male", "batch_size": 2, "joint_selector": {"kind": "disabled"}, "enable_pose_corrective": false}"#,
    )
    .unwrap();
    let config = SmplConfig::from_json_file(&path).unwrap();
    let model = SmplGPU::<TestBackend>::new_from_matrices(config, synthetic_matrices(), &Default::default()).unwrap();
    assert_eq!(model.gender(), Gender::Male);
    let out = model.forward(&SmplInput::default()).unwrap();
    assert_eq!(out.joints.dims(), [2, SYNTH_JOINTS, 3]);
    std::fs::remove_file(path).ok();
}

/// Needs the real SMPL archive: `SMPL_MODEL_PATH=/path/to/SMPL_NEUTRAL.npz cargo test -- --ignored`
#[test]
#[ignore = "requires SMPL_MODEL_PATH"]
fn full_smpl_model_forward() {
    let Ok(path) = std::env::var("SMPL_MODEL_PATH") else {
        return;
    };
    let model = SmplGPU::<TestBackend>::new_from_npz(path, SmplConfig::default().with_num_betas(10), &Default::default()).unwrap();
    assert_eq!(model.num_verts(), NUM_VERTS);
    assert_eq!(model.num_joints(), NUM_JOINTS + 1);
    assert_eq!(model.skeleton().joint_names().map(<[String]>::len), Some(NUM_JOINTS + 1));
    let out = model.forward(&SmplInput::default()).unwrap();
    assert_eq!(out.vertices.unwrap().dims(), [1, NUM_VERTS, 3]);
    assert_eq!(out.joints.dims(), [1, NUM_JOINTS + 1 + 21, 3]);
}
