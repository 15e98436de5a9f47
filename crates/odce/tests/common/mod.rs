#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;

use image::GrayImage;
use nalgebra::Matrix3;
use odce::dataset::{Dataset, Detection, Frame, Obstacle, Sequence};
use odce::{
    BBox, CategoryRef, DatasetFile, EngineError, EngineParams, EvaluationCorpus, MetricEngine,
    ResourceError, SeaEdge, SequenceAssets, SequenceResources, StereoCalibration, NUM_STATS,
};

pub const WIDTH: u32 = 1278;
pub const HEIGHT: u32 = 958;

/// Left camera used throughout: fx = fy = 1000, principal point (640, 480).
///
/// For a level vehicle the danger-zone boundary projects to rows 547..567.
pub fn calibration() -> StereoCalibration {
    StereoCalibration {
        m1: Matrix3::new(1000.0, 0.0, 640.0, 0.0, 1000.0, 480.0, 0.0, 0.0, 1.0),
        d1: vec![0.0; 5],
        m2: None,
        d2: None,
        r: None,
        t: None,
        image_size: [WIDTH, HEIGHT],
    }
}

/// The same calibration as an OpenCV FileStorage document.
pub fn calibration_yaml() -> String {
    format!(
        "%YAML:1.0
---
M1: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 1.e+03, 0., 6.4e+02, 0., 1.e+03, 4.8e+02, 0., 0.,
       1. ]
D1: !!opencv-matrix
   rows: 1
   cols: 5
   dt: d
   data: [ 0., 0., 0., 0., 0. ]
imageSize: [ {}, {} ]
",
        WIDTH, HEIGHT
    )
}

/// In-memory resources: one calibration for all sequences, optional static
/// masks by sequence id.
#[derive(Default)]
pub struct MemoryResources {
    pub masks: BTreeMap<i64, GrayImage>,
}

impl SequenceResources for MemoryResources {
    fn load(&self, sequence: &Sequence) -> Result<SequenceAssets, ResourceError> {
        Ok(SequenceAssets {
            calibration: calibration(),
            static_mask: self.masks.get(&sequence.id).cloned(),
        })
    }
}

/// Metric engine returning fixed statistics and recording every corpus.
pub struct StubEngine {
    pub stats: [f64; NUM_STATS],
    pub seen: RefCell<Vec<EvaluationCorpus>>,
}

impl StubEngine {
    pub fn new(stats: [f64; NUM_STATS]) -> Self {
        Self {
            stats,
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl MetricEngine for StubEngine {
    fn evaluate(
        &self,
        corpus: &EvaluationCorpus,
        params: &EngineParams,
    ) -> Result<[f64; NUM_STATS], EngineError> {
        assert_eq!(params.iou_type, "bbox");
        self.seen.borrow_mut().push(corpus.clone());
        Ok(self.stats)
    }
}

/// Sea edge running straight across the image at row `y`.
pub fn horizontal_edge(y: f64) -> SeaEdge {
    SeaEdge::new(vec![0.0, f64::from(WIDTH - 1)], vec![y, y])
}

pub fn obstacle(bbox: [f64; 4], kind: &str) -> Obstacle {
    Obstacle {
        bbox: BBox::from(bbox),
        kind: kind.to_string(),
        area: Some(bbox[2] * bbox[3]),
    }
}

pub fn detection(bbox: [f64; 4], category: &str) -> Detection {
    Detection {
        bbox: BBox::from(bbox),
        category: CategoryRef::Name(category.to_string()),
    }
}

pub fn gt_frame(id: i64, edge_y: f64, obstacles: Vec<Obstacle>) -> Frame {
    Frame {
        id,
        roll: Some(0.0),
        pitch: Some(0.0),
        image_file_name: format!("{:08}L.jpg", id),
        water_edges: vec![horizontal_edge(edge_y)],
        obstacles,
        ..Frame::default()
    }
}

pub fn dt_frame(id: i64, detections: Vec<Detection>) -> Frame {
    Frame {
        id,
        detections,
        ..Frame::default()
    }
}

pub fn gt_sequence(id: i64, exhaustive: bool, frames: Vec<Frame>) -> Sequence {
    Sequence {
        id,
        path: format!("/kope{}-00000000-00000100/frames/", id),
        exhaustive,
        frames,
        ..Sequence::default()
    }
}

pub fn dt_sequence(id: i64, frames: Vec<Frame>) -> Sequence {
    Sequence {
        id,
        frames,
        ..Sequence::default()
    }
}

pub fn file(sequences: Vec<Sequence>) -> DatasetFile {
    DatasetFile {
        dataset: Dataset { sequences },
    }
}
