use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::GrayImage;
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use odce::dataset::{Dataset, Detection, Frame, Obstacle, Sequence};
use odce::{
    assemble, build_danger_zone_mask, build_sea_edge_mask, AssemblyOptions, BBox, CategoryRef,
    DangerZoneParams, DatasetFile, EvalMode, EvaluationConfig, IgnoreMask, ResourceError, SeaEdge,
    SequenceAssets, SequenceResources, StereoCalibration,
};

const W: u32 = 1278;
const H: u32 = 958;

fn calibration() -> StereoCalibration {
    StereoCalibration {
        m1: Matrix3::new(1000.0, 0.0, 640.0, 0.0, 1000.0, 480.0, 0.0, 0.0, 1.0),
        d1: vec![-0.1, 0.02, 0.0, 0.0, 0.0],
        m2: None,
        d2: None,
        r: None,
        t: None,
        image_size: [W, H],
    }
}

struct Fixed;

impl SequenceResources for Fixed {
    fn load(&self, _sequence: &Sequence) -> Result<SequenceAssets, ResourceError> {
        Ok(SequenceAssets {
            calibration: calibration(),
            static_mask: None,
        })
    }
}

fn wavy_edge(rng: &mut StdRng) -> SeaEdge {
    let xs: Vec<f64> = (0..=64).map(|i| f64::from(i) * 20.0).collect();
    let ys: Vec<f64> = xs.iter().map(|_| 380.0 + rng.gen_range(-15.0..15.0)).collect();
    SeaEdge::new(xs, ys)
}

fn random_box(rng: &mut StdRng) -> [f64; 4] {
    [
        rng.gen_range(0.0..1200.0),
        rng.gen_range(300.0..900.0),
        rng.gen_range(8.0..120.0),
        rng.gen_range(8.0..80.0),
    ]
}

fn synthetic_pair(frames: usize, boxes: usize) -> (DatasetFile, DatasetFile) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut gt_frames = Vec::with_capacity(frames);
    let mut dt_frames = Vec::with_capacity(frames);
    for id in 0..frames as i64 {
        let obstacles = (0..boxes)
            .map(|_| Obstacle {
                bbox: BBox::from(random_box(&mut rng)),
                kind: "ship".to_string(),
                area: None,
            })
            .collect();
        let detections = (0..boxes)
            .map(|_| Detection {
                bbox: BBox::from(random_box(&mut rng)),
                category: CategoryRef::Id(0),
            })
            .collect();
        gt_frames.push(Frame {
            id,
            roll: Some(rng.gen_range(-3.0..3.0)),
            pitch: Some(rng.gen_range(-3.0..3.0)),
            water_edges: vec![wavy_edge(&mut rng)],
            obstacles,
            ..Frame::default()
        });
        dt_frames.push(Frame {
            id,
            detections,
            ..Frame::default()
        });
    }
    let gt = DatasetFile {
        dataset: Dataset {
            sequences: vec![Sequence {
                id: 0,
                path: "/bench-0-1/frames/".to_string(),
                exhaustive: true,
                frames: gt_frames,
                ..Sequence::default()
            }],
        },
    };
    let dt = DatasetFile {
        dataset: Dataset {
            sequences: vec![Sequence {
                id: 0,
                frames: dt_frames,
                ..Sequence::default()
            }],
        },
    };
    (gt, dt)
}

fn bench_sea_edge(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let edges = vec![wavy_edge(&mut rng)];
    c.bench_function("sea_edge_mask_1278x958", |b| {
        b.iter(|| build_sea_edge_mask(black_box(&edges), W, H))
    });
}

fn bench_danger_zone(c: &mut Criterion) {
    let camera = calibration().camera_model().unwrap();
    let params = DangerZoneParams::default();
    c.bench_function("danger_zone_mask_1278x958", |b| {
        b.iter(|| {
            build_danger_zone_mask(black_box(1.5), black_box(-2.0), &camera, W, H, &params)
                .unwrap()
        })
    });
}

fn bench_combine(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let layer = build_sea_edge_mask(&[wavy_edge(&mut rng)], W, H);
    let static_mask = GrayImage::from_fn(W, H, |x, _| image::Luma([u8::from(x < 40) * 255]));
    c.bench_function("ignore_mask_combine_two_layers", |b| {
        b.iter(|| {
            let mut mask = IgnoreMask::keep_all(W, H);
            mask.combine(black_box(&layer)).unwrap();
            mask.combine(black_box(&static_mask)).unwrap();
            mask
        })
    });
}

fn bench_assemble(c: &mut Criterion) {
    let (gt, dt) = synthetic_pair(20, 15);
    let config = EvaluationConfig::default();
    for mode in [EvalMode::Edge, EvalMode::DangerZone] {
        let opts = AssemblyOptions::new(mode, true);
        c.bench_function(&format!("assemble_20_frames_{}", mode), |b| {
            b.iter(|| assemble(black_box(&gt), black_box(&dt), &Fixed, &opts, &config).unwrap())
        });
    }
}

criterion_group!(
    masks,
    bench_sea_edge,
    bench_danger_zone,
    bench_combine,
    bench_assemble
);
criterion_main!(masks);
