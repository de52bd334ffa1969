use preprocess::BoundingBox;
use serde::Serialize;

/// Decoder output in model-input pixel space, before NMS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub score: f64,
    /// `(x1, y1, x2, y2)` in model-input pixels.
    pub bbox: [f64; 4],
}

/// A detector result in original image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub score: f64,
    pub bbox: BoundingBox,
}

/// The 33 BlazePose body landmarks, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkType {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

pub const NUM_LANDMARKS: usize = 33;

impl LandmarkType {
    pub const ALL: [LandmarkType; NUM_LANDMARKS] = [
        LandmarkType::Nose,
        LandmarkType::LeftEyeInner,
        LandmarkType::LeftEye,
        LandmarkType::LeftEyeOuter,
        LandmarkType::RightEyeInner,
        LandmarkType::RightEye,
        LandmarkType::RightEyeOuter,
        LandmarkType::LeftEar,
        LandmarkType::RightEar,
        LandmarkType::MouthLeft,
        LandmarkType::MouthRight,
        LandmarkType::LeftShoulder,
        LandmarkType::RightShoulder,
        LandmarkType::LeftElbow,
        LandmarkType::RightElbow,
        LandmarkType::LeftWrist,
        LandmarkType::RightWrist,
        LandmarkType::LeftPinky,
        LandmarkType::RightPinky,
        LandmarkType::LeftIndex,
        LandmarkType::RightIndex,
        LandmarkType::LeftThumb,
        LandmarkType::RightThumb,
        LandmarkType::LeftHip,
        LandmarkType::RightHip,
        LandmarkType::LeftKnee,
        LandmarkType::RightKnee,
        LandmarkType::LeftAnkle,
        LandmarkType::RightAnkle,
        LandmarkType::LeftHeel,
        LandmarkType::RightHeel,
        LandmarkType::LeftFootIndex,
        LandmarkType::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            LandmarkType::Nose => "nose",
            LandmarkType::LeftEyeInner => "left_eye_inner",
            LandmarkType::LeftEye => "left_eye",
            LandmarkType::LeftEyeOuter => "left_eye_outer",
            LandmarkType::RightEyeInner => "right_eye_inner",
            LandmarkType::RightEye => "right_eye",
            LandmarkType::RightEyeOuter => "right_eye_outer",
            LandmarkType::LeftEar => "left_ear",
            LandmarkType::RightEar => "right_ear",
            LandmarkType::MouthLeft => "mouth_left",
            LandmarkType::MouthRight => "mouth_right",
            LandmarkType::LeftShoulder => "left_shoulder",
            LandmarkType::RightShoulder => "right_shoulder",
            LandmarkType::LeftElbow => "left_elbow",
            LandmarkType::RightElbow => "right_elbow",
            LandmarkType::LeftWrist => "left_wrist",
            LandmarkType::RightWrist => "right_wrist",
            LandmarkType::LeftPinky => "left_pinky",
            LandmarkType::RightPinky => "right_pinky",
            LandmarkType::LeftIndex => "left_index",
            LandmarkType::RightIndex => "right_index",
            LandmarkType::LeftThumb => "left_thumb",
            LandmarkType::RightThumb => "right_thumb",
            LandmarkType::LeftHip => "left_hip",
            LandmarkType::RightHip => "right_hip",
            LandmarkType::LeftKnee => "left_knee",
            LandmarkType::RightKnee => "right_knee",
            LandmarkType::LeftAnkle => "left_ankle",
            LandmarkType::RightAnkle => "right_ankle",
            LandmarkType::LeftHeel => "left_heel",
            LandmarkType::RightHeel => "right_heel",
            LandmarkType::LeftFootIndex => "left_foot_index",
            LandmarkType::RightFootIndex => "right_foot_index",
        }
    }
}

/// One keypoint. `x`/`y` are normalized `[0, 1]` while crop-local and
/// original-image pixels once composed into a [`Pose`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub kind: LandmarkType,
    pub x: f64,
    pub y: f64,
    /// Relative depth, passed through from the model.
    pub z: f64,
    pub visibility: f64,
}

/// Landmark decoder output for one crop, in normalized crop coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarks {
    pub landmarks: Vec<Landmark>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub bounding_box: BoundingBox,
    pub score: f64,
    /// Empty, or exactly one entry per [`LandmarkType`] in canonical order.
    pub landmarks: Vec<Landmark>,
    pub image_width: u32,
    pub image_height: u32,
}

impl Pose {
    /// A pose without landmarks, as produced in boxes-only mode.
    pub fn from_detection(detection: &Detection, image_width: u32, image_height: u32) -> Self {
        Self {
            bounding_box: detection.bbox,
            score: detection.score,
            landmarks: Vec::new(),
            image_width,
            image_height,
        }
    }

    pub fn has_landmarks(&self) -> bool {
        !self.landmarks.is_empty()
    }

    pub fn landmark(&self, kind: LandmarkType) -> Option<&Landmark> {
        self.landmarks.get(kind.index())
    }
}
