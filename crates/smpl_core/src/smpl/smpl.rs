pub const NUM_BODY_JOINTS: usize = 23;
pub const NUM_JOINTS: usize = NUM_BODY_JOINTS;
pub const NUM_VERTS: usize = 6890;

/// Parent of every joint, root first. The root sentinel is -1.
pub const PARENT_ID_PER_JOINT: [i64; NUM_JOINTS + 1] = [-1, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 12, 13, 14, 16, 17, 18, 19, 20, 21];

pub const JOINT_NAMES: [&str; NUM_JOINTS + 1] = [
    "pelvis",
    "left_hip",
    "right_hip",
    "spine1",
    "left_knee",
    "right_knee",
    "spine2",
    "left_ankle",
    "right_ankle",
    "spine3",
    "left_foot",
    "right_foot",
    "neck",
    "left_collar",
    "right_collar",
    "head",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hand",
    "right_hand",
];

/// Landmarks on the SMPL topology, in the order they are appended to the joints
pub const FACE_VERTEX_IDS: [(&str, usize); 5] = [("nose", 332), ("reye", 6260), ("leye", 2800), ("rear", 4071), ("lear", 583)];
pub const FEET_VERTEX_IDS: [(&str, usize); 6] = [
    ("LBigToe", 3216),
    ("LSmallToe", 3226),
    ("LHeel", 3387),
    ("RBigToe", 6617),
    ("RSmallToe", 6624),
    ("RHeel", 6787),
];
pub const FINGER_TIP_VERTEX_IDS: [(&str, usize); 10] = [
    ("lthumb", 2746),
    ("lindex", 2319),
    ("lmiddle", 2445),
    ("lring", 2556),
    ("lpinky", 2673),
    ("rthumb", 6191),
    ("rindex", 5782),
    ("rmiddle", 5905),
    ("rring", 6016),
    ("rpinky", 6133),
];
