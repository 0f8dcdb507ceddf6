//! End-to-end detector tests with a scripted inference engine.

use facedet_media::decode::{BOX_VALUES, LANDMARK_VALUES, SCORE_VALUES};
use facedet_media::{
    AnchorConfig, DetectError, DetectResult, DetectorConfig, ErrorKind, FaceDetector, FrameView,
    InferenceEngine, OutputLayout, PixelFormat, RawOutputs,
};
use facedet_models::{Detection, RECORD_LEN};

/// One scripted face: prior index, face score and box deltas.
#[derive(Clone, Copy)]
struct Face {
    prior: usize,
    score: f32,
    deltas: [f32; 4],
}

enum Script {
    Faces(Vec<Face>),
    Empty,
    Truncated,
    Fail,
}

struct ScriptedEngine {
    script: Script,
    layout: OutputLayout,
    last_input: Vec<f32>,
}

impl ScriptedEngine {
    fn new(script: Script) -> Self {
        Self {
            script,
            layout: OutputLayout::PriorMajor,
            last_input: Vec::new(),
        }
    }

    fn channel_major(mut self) -> Self {
        self.layout = OutputLayout::ChannelMajor;
        self
    }
}

fn index(layout: OutputLayout, n: usize, k: usize, i: usize, c: usize) -> usize {
    match layout {
        OutputLayout::PriorMajor => i * k + c,
        OutputLayout::ChannelMajor => c * n + i,
    }
}

impl InferenceEngine for ScriptedEngine {
    fn run(&mut self, input: &[f32], size: usize, outputs: &mut RawOutputs) -> DetectResult<()> {
        self.last_input = input.to_vec();
        let n = AnchorConfig::default().prior_count(size, size);
        outputs.clear();

        match &self.script {
            Script::Fail => Err(DetectError::inference("scripted failure")),
            Script::Empty => Ok(()),
            Script::Truncated => {
                outputs.boxes = vec![0.0; n * BOX_VALUES];
                outputs.scores = vec![0.0; n * SCORE_VALUES - 1];
                outputs.landmarks = vec![0.0; n * LANDMARK_VALUES];
                Ok(())
            }
            Script::Faces(faces) => {
                outputs.boxes = vec![0.0; n * BOX_VALUES];
                outputs.scores = vec![0.0; n * SCORE_VALUES];
                outputs.landmarks = vec![0.0; n * LANDMARK_VALUES];
                for face in faces {
                    outputs.scores[index(self.layout, n, SCORE_VALUES, face.prior, 1)] = face.score;
                    for (c, d) in face.deltas.iter().enumerate() {
                        outputs.boxes[index(self.layout, n, BOX_VALUES, face.prior, c)] = *d;
                    }
                    // Spread the landmarks so pose has a defined pitch
                    let lm = [-2.0, -2.0, 2.0, -2.0, 0.0, 0.0, -1.5, 2.0, 1.5, 2.0];
                    for (c, v) in lm.iter().enumerate() {
                        outputs.landmarks[index(self.layout, n, LANDMARK_VALUES, face.prior, c)] = *v;
                    }
                }
                Ok(())
            }
        }
    }
}

fn rgba_frame(width: usize, height: usize) -> Vec<u8> {
    (0..width * height * 4).map(|i| (i % 253) as u8).collect()
}

fn detector(script: Script) -> FaceDetector<ScriptedEngine> {
    FaceDetector::with_engine(DetectorConfig::default(), ScriptedEngine::new(script)).unwrap()
}

// Stride-16 block starts after 40*40*2 stride-8 priors; each 16px cell has 2 priors.
const STRIDE16_START: usize = 3200;

fn stride16_prior(row: usize, col: usize, size_index: usize) -> usize {
    STRIDE16_START + (row * 20 + col) * 2 + size_index
}

#[test]
fn test_detects_and_maps_to_source_pixels() {
    let faces = vec![Face {
        prior: stride16_prior(5, 5, 0),
        score: 0.9,
        deltas: [0.0; 4],
    }];
    let mut det = detector(Script::Faces(faces));

    let data = rgba_frame(640, 480);
    let frame = FrameView::packed(&data, 640, 480, PixelFormat::Rgba).unwrap();
    let found = det.detect(&frame, 10).unwrap();

    assert_eq!(found.len(), 1);
    let face = found[0];
    // Canvas cell center (88, 88), 64px anchor; scale 0.5 doubles everything
    assert!((face.bounds.x - 112.0).abs() < 1e-2);
    assert!((face.bounds.y - 112.0).abs() < 1e-2);
    assert!((face.bounds.width - 128.0).abs() < 1e-2);
    assert_eq!(face.quality, face.score);
    assert!(face.angle.pitch.is_finite());
    assert!(face.angle.roll.abs() < 1e-4);
}

#[test]
fn test_engine_receives_letterboxed_tensor() {
    let mut det = detector(Script::Faces(Vec::new()));
    let data = rgba_frame(640, 480);
    let frame = FrameView::packed(&data, 640, 480, PixelFormat::Rgba).unwrap();
    det.detect(&frame, 1).unwrap();

    let input = &det.engine().last_input;
    let plane = 320 * 320;
    assert_eq!(input.len(), 3 * plane);
    // Bottom margin rows 240..320 are zero pixels, i.e. the negated means
    assert!(input[240 * 320..plane].iter().all(|&v| v == -104.0));
    assert!(input[plane + 240 * 320..2 * plane].iter().all(|&v| v == -117.0));
    assert!(input[2 * plane + 240 * 320..].iter().all(|&v| v == -123.0));
    // Top-left canvas pixel samples source pixel (0, 0): R=0, G=1, B=2
    assert_eq!(input[0], 0.0 - 104.0);
    assert_eq!(input[plane], 1.0 - 117.0);
    assert_eq!(input[2 * plane], 2.0 - 123.0);
}

#[test]
fn test_overlapping_faces_suppressed_and_sorted() {
    let faces = vec![
        // Neighbouring 16px cells, 64px anchors
        Face {
            prior: stride16_prior(5, 5, 0),
            score: 0.6,
            deltas: [0.0; 4],
        },
        Face {
            prior: stride16_prior(5, 6, 0),
            score: 0.95,
            deltas: [0.0; 4],
        },
        Face {
            prior: stride16_prior(15, 15, 0),
            score: 0.8,
            deltas: [0.0; 4],
        },
    ];
    let mut det = detector(Script::Faces(faces));
    let data = rgba_frame(320, 320);
    let frame = FrameView::packed(&data, 320, 320, PixelFormat::Rgba).unwrap();
    let found = det.detect(&frame, 10).unwrap();

    // Cells (5,5) and (5,6) overlap with IoU 0.6; the weaker one goes
    let scores: Vec<f32> = found.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.95, 0.8]);
    for (i, a) in found.iter().enumerate() {
        for b in &found[i + 1..] {
            assert!(a.bounds.iou(&b.bounds) < 0.4);
        }
    }
}

#[test]
fn test_limit_caps_results() {
    let faces: Vec<Face> = (0..6)
        .map(|k| Face {
            prior: stride16_prior(2 + k * 3, 2, 0),
            score: 0.7 + k as f32 * 0.05,
            deltas: [0.0; 4],
        })
        .collect();
    let mut det = detector(Script::Faces(faces));
    let data = rgba_frame(320, 320);
    let frame = FrameView::packed(&data, 320, 320, PixelFormat::Rgba).unwrap();

    let found = det.detect(&frame, 4).unwrap();
    assert_eq!(found.len(), 4);
    assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_low_confidence_faces_not_reported() {
    let faces = vec![
        // Passes the 0.3 decode threshold but not the 0.6 confidence threshold
        Face {
            prior: stride16_prior(3, 3, 0),
            score: 0.5,
            deltas: [0.0; 4],
        },
        Face {
            prior: stride16_prior(15, 15, 0),
            score: 0.9,
            deltas: [0.0; 4],
        },
    ];
    let mut det = detector(Script::Faces(faces.clone()));
    let data = rgba_frame(320, 320);
    let frame = FrameView::packed(&data, 320, 320, PixelFormat::Rgba).unwrap();

    let found = det.detect(&frame, 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].quality, 0.9);

    let config = DetectorConfig {
        confidence_threshold: 0.4,
        ..DetectorConfig::default()
    };
    let mut lenient =
        FaceDetector::with_engine(config, ScriptedEngine::new(Script::Faces(faces))).unwrap();
    let scores: Vec<f32> = lenient.detect(&frame, 10).unwrap().iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.5]);
}

#[test]
fn test_detect_into_skips_low_confidence_records() {
    let faces = vec![Face {
        prior: stride16_prior(8, 8, 1),
        score: 0.45,
        deltas: [0.0; 4],
    }];
    let mut det = detector(Script::Faces(faces));
    let data = vec![90u8; 64 * 64 * 3];
    let mut out = vec![-1.0f32; 2 * RECORD_LEN];
    let written = det
        .detect_into(&data, 64, 64, 64 * 3, PixelFormat::Rgb, 2, &mut out)
        .unwrap();
    assert_eq!(written, 0);
    assert!(out.iter().all(|&v| v == -1.0));
}

#[test]
fn test_channel_major_engine() {
    let faces = vec![Face {
        prior: stride16_prior(7, 3, 1),
        score: 0.7,
        deltas: [0.5, -0.5, 0.1, 0.2],
    }];

    let config = DetectorConfig {
        output_layout: OutputLayout::ChannelMajor,
        ..DetectorConfig::default()
    };
    let mut channel =
        FaceDetector::with_engine(config, ScriptedEngine::new(Script::Faces(faces.clone())).channel_major())
            .unwrap();
    let mut prior = detector(Script::Faces(faces));

    let data = rgba_frame(200, 100);
    let frame = FrameView::packed(&data, 200, 100, PixelFormat::Rgba).unwrap();
    let a = channel.detect(&frame, 5).unwrap();
    let b = prior.detect(&frame, 5).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a, b);
}

#[test]
fn test_no_predictions_is_empty() {
    let mut det = detector(Script::Empty);
    let data = rgba_frame(64, 64);
    let frame = FrameView::packed(&data, 64, 64, PixelFormat::Rgba).unwrap();
    assert!(det.detect(&frame, 5).unwrap().is_empty());
}

#[test]
fn test_truncated_output_is_shape_mismatch() {
    let mut det = detector(Script::Truncated);
    let data = rgba_frame(64, 64);
    let frame = FrameView::packed(&data, 64, 64, PixelFormat::Rgba).unwrap();
    let err = det.detect(&frame, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_engine_failure_passes_through() {
    let mut det = detector(Script::Fail);
    let data = rgba_frame(64, 64);
    let frame = FrameView::packed(&data, 64, 64, PixelFormat::Rgba).unwrap();
    let err = det.detect(&frame, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inference);
    assert!(err.to_string().contains("scripted failure"));
}

#[test]
fn test_detect_into_host_surface() {
    let faces = vec![Face {
        prior: stride16_prior(10, 10, 0),
        score: 0.88,
        deltas: [0.0; 4],
    }];
    let mut det = detector(Script::Faces(faces));

    // BGR image with 4 bytes of row padding
    let (w, h, stride) = (160usize, 120usize, 160 * 3 + 4);
    let data = vec![50u8; stride * h];
    let mut out = vec![0.0f32; 3 * RECORD_LEN];
    let written = det
        .detect_into(&data, w, h, stride, PixelFormat::Bgr, 3, &mut out)
        .unwrap();
    assert_eq!(written, 1);

    let face = Detection::from_record(&out[..RECORD_LEN]).unwrap();
    assert!((face.quality - 0.88).abs() < 1e-6);
    // 160x120 is not scaled: canvas coordinates equal source coordinates
    assert!((face.bounds.x - (168.0 - 32.0)).abs() < 1e-2);
}

#[test]
fn test_host_surface_rejects_bad_input_before_writing() {
    let mut det = detector(Script::Faces(Vec::new()));
    let data = vec![0u8; 16];
    let mut out = vec![7.0f32; RECORD_LEN];

    let err = det
        .detect_into(&data, 4, 4, 4, PixelFormat::Grayscale, 1, &mut out)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    let err = det
        .detect_into(&data, 4, 4, 8, PixelFormat::Rgba, 1, &mut out)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = det
        .detect_into(&data, 2, 2, 8, PixelFormat::Rgba, 0, &mut out)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert!(out.iter().all(|&v| v == 7.0));
}

#[test]
fn test_repeated_calls_are_deterministic() {
    let faces = vec![Face {
        prior: stride16_prior(4, 9, 1),
        score: 0.75,
        deltas: [0.3, 0.1, -0.2, 0.4],
    }];
    let mut det = detector(Script::Faces(faces));
    let data = rgba_frame(500, 333);
    let frame = FrameView::packed(&data, 500, 333, PixelFormat::Rgba).unwrap();

    let first = det.detect(&frame, 5).unwrap();
    let input = det.engine().last_input.clone();
    let second = det.detect(&frame, 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(input, det.engine().last_input);
}
