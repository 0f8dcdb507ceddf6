//! Head pose estimation from the five RetinaFace landmarks.
//!
//! - Roll: angle of the eye line.
//! - Yaw: horizontal nose offset from the eye center relative to the
//!   interocular distance, with a fixed gain of 1.2.
//! - Pitch: where the nose sits between the eye line and the mouth line;
//!   halfway is 0 degrees.

use facedet_models::{EulerAngle, Landmark, Point, LANDMARK_COUNT};
use tracing::debug;

use crate::error::{DetectError, DetectResult};

/// Gain applied to the raw yaw angle.
pub const YAW_GAIN: f32 = 1.2;

/// Smallest eye-to-mouth vertical distance, in pixels, that still yields a pitch.
pub const MIN_FACE_LENGTH: f32 = 1e-6;

#[inline]
fn roll_and_yaw(landmarks: &[Point; LANDMARK_COUNT]) -> (f32, f32, Point) {
    let left_eye = landmarks[Landmark::LeftEye.index()];
    let right_eye = landmarks[Landmark::RightEye.index()];
    let nose = landmarks[Landmark::NoseTip.index()];

    let dx = right_eye.x - left_eye.x;
    let dy = right_eye.y - left_eye.y;
    let roll = dy.atan2(dx).to_degrees();

    let eye_center = left_eye.midpoint(&right_eye);
    let yaw = (nose.x - eye_center.x).atan2(dx).to_degrees() * YAW_GAIN;

    (roll, yaw, eye_center)
}

/// Estimate yaw, pitch and roll in degrees.
///
/// # Errors
/// `DegenerateGeometry` when a landmark is not finite or the mouth line sits
/// on the eye line, which leaves pitch undefined.
pub fn estimate(landmarks: &[Point; LANDMARK_COUNT]) -> DetectResult<EulerAngle> {
    if !landmarks.iter().all(Point::is_finite) {
        return Err(DetectError::degenerate_geometry("landmark is not finite"));
    }

    let (roll, yaw, eye_center) = roll_and_yaw(landmarks);
    let nose = landmarks[Landmark::NoseTip.index()];
    let mouth_center =
        landmarks[Landmark::LeftMouth.index()].midpoint(&landmarks[Landmark::RightMouth.index()]);

    let face_length = mouth_center.y - eye_center.y;
    if face_length.abs() < MIN_FACE_LENGTH {
        return Err(DetectError::degenerate_geometry(format!(
            "eye-to-mouth distance {} is too small for pitch",
            face_length
        )));
    }

    let pitch_ratio = (nose.y - eye_center.y) / face_length;
    let pitch = (0.5 - pitch_ratio) * 90.0;

    Ok(EulerAngle::new(yaw, pitch, roll))
}

/// Like [`estimate`], but reports pitch 0 instead of failing on degenerate
/// geometry. Yaw and roll are kept when they are finite.
pub fn estimate_lenient(landmarks: &[Point; LANDMARK_COUNT]) -> EulerAngle {
    match estimate(landmarks) {
        Ok(angle) => angle,
        Err(e) => {
            debug!(error = %e, "Pose geometry degenerate, reporting pitch 0");
            let (roll, yaw, _) = roll_and_yaw(landmarks);
            EulerAngle::new(finite_or_zero(yaw), 0.0, finite_or_zero(roll))
        }
    }
}

#[inline]
fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
