//! Face detection results and their flat record encoding.
//!
//! A detection crosses the host boundary as 18 consecutive floats:
//!
//! ```text
//! [x, y, width, height, yaw, pitch, roll,
//!  lm0.x, lm0.y, lm1.x, lm1.y, lm2.x, lm2.y, lm3.x, lm3.y, lm4.x, lm4.y,
//!  quality]
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{EulerAngle, Point, Rect};

/// Number of facial landmarks per detection.
pub const LANDMARK_COUNT: usize = 5;

/// Number of floats in one encoded detection record.
pub const RECORD_LEN: usize = 18;

/// Facial landmark positions, in the order the model emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    LeftEye = 0,
    RightEye = 1,
    NoseTip = 2,
    LeftMouth = 3,
    RightMouth = 4,
}

impl Landmark {
    /// All landmarks in model order.
    pub const ALL: [Landmark; LANDMARK_COUNT] = [
        Landmark::LeftEye,
        Landmark::RightEye,
        Landmark::NoseTip,
        Landmark::LeftMouth,
        Landmark::RightMouth,
    ];

    /// Position of this landmark in a detection's landmark array.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Errors raised when encoding or decoding a detection record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record buffer too short: need {needed} floats, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },
}

/// A single detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Face-class confidence in [0, 1]
    pub score: f32,
    /// Face bounding box
    pub bounds: Rect,
    /// Left eye, right eye, nose tip, left mouth corner, right mouth corner
    pub landmarks: [Point; LANDMARK_COUNT],
    /// Head pose derived from the landmarks
    pub angle: EulerAngle,
    /// Quality estimate; currently always equal to `score`
    pub quality: f32,
}

impl Detection {
    /// Create a detection whose quality equals its score.
    pub fn new(
        score: f32,
        bounds: Rect,
        landmarks: [Point; LANDMARK_COUNT],
        angle: EulerAngle,
    ) -> Self {
        Self {
            score,
            bounds,
            landmarks,
            angle,
            quality: score,
        }
    }

    /// Look up a single landmark.
    #[inline]
    pub fn landmark(&self, which: Landmark) -> Point {
        self.landmarks[which.index()]
    }

    /// Map bounds and landmarks from a scaled canvas back to source pixels.
    ///
    /// Angles, score and quality are scale invariant and copied as-is.
    pub fn unscale(&self, scale: f32) -> Detection {
        Detection {
            bounds: self.bounds.unscale(scale),
            landmarks: self.landmarks.map(|p| p.unscale(scale)),
            ..*self
        }
    }

    /// Write this detection as an 18-float record into the front of `out`.
    pub fn write_record(&self, out: &mut [f32]) -> Result<(), RecordError> {
        if out.len() < RECORD_LEN {
            return Err(RecordError::BufferTooShort {
                needed: RECORD_LEN,
                actual: out.len(),
            });
        }

        out[0] = self.bounds.x;
        out[1] = self.bounds.y;
        out[2] = self.bounds.width;
        out[3] = self.bounds.height;
        out[4] = self.angle.yaw;
        out[5] = self.angle.pitch;
        out[6] = self.angle.roll;
        for (i, point) in self.landmarks.iter().enumerate() {
            out[7 + i * 2] = point.x;
            out[8 + i * 2] = point.y;
        }
        out[17] = self.quality;
        Ok(())
    }

    /// Read a detection back from an 18-float record.
    ///
    /// The record carries no separate score, so `score` is set to the quality value.
    pub fn from_record(record: &[f32]) -> Result<Detection, RecordError> {
        if record.len() < RECORD_LEN {
            return Err(RecordError::BufferTooShort {
                needed: RECORD_LEN,
                actual: record.len(),
            });
        }

        let mut landmarks = [Point::default(); LANDMARK_COUNT];
        for (i, point) in landmarks.iter_mut().enumerate() {
            *point = Point::new(record[7 + i * 2], record[8 + i * 2]);
        }

        Ok(Detection {
            score: record[17],
            bounds: Rect::new(record[0], record[1], record[2], record[3]),
            landmarks,
            angle: EulerAngle::new(record[4], record[5], record[6]),
            quality: record[17],
        })
    }
}
