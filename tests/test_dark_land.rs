use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sarwater::core::bimodality::{BimodalityThresholds, EstimatorParams};
use sarwater::core::classifier::{
    BandSelection, ComponentJob, ComponentVerdict, PassRasters, RefinementPhase,
};
use sarwater::core::dark_land::DarkLandClassifier;
use sarwater::core::dispatch::ParallelDispatcher;
use sarwater::core::labeling::label_components;
use sarwater::core::reconcile::BlockBoundaryReconciler;
use sarwater::io::Window;
use sarwater::{
    BlockRasterStore, IntensityBand, MemoryRasterStore, Polarization, RasterMeta, RunContext,
    WriteOptions,
};
use std::path::{Path, PathBuf};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Linear power drawn around `mean_db`
fn speckled(rng: &mut StdRng, mean_db: f64, std_db: f64) -> f64 {
    10f64.powf((mean_db + std_db * normal(rng)) / 10.0)
}

fn classifier(collect_metrics: bool) -> DarkLandClassifier {
    DarkLandClassifier {
        intensity: PathBuf::from("intensity.tif"),
        reference_land: PathBuf::from("land.tif"),
        no_data: PathBuf::from("no_data.tif"),
        thresholds: BimodalityThresholds::default(),
        estimator: EstimatorParams::default(),
        minimum_pixel: 4,
        collect_metrics,
    }
}

fn vv() -> BandSelection {
    BandSelection {
        index: 1,
        band: IntensityBand::Backscatter(Polarization::VV),
    }
}

/// Register a scene that lies entirely on reference land
fn seed_land_scene(store: &MemoryRasterStore, water: &Array2<u8>, intensity: &Array2<f64>) {
    let meta = RasterMeta::new(water.nrows(), water.ncols());
    store.insert("water.tif", meta.clone(), water).unwrap();
    store.insert("intensity.tif", meta.clone(), intensity).unwrap();
    store
        .insert("land.tif", meta.clone(), &Array2::<u8>::ones(water.dim()))
        .unwrap();
    store
        .insert("no_data.tif", meta, &Array2::<u8>::zeros(water.dim()))
        .unwrap();
}

/// Classify every component of `water` labeled as a single region
fn classify_whole(store: &MemoryRasterStore, water: &Array2<u8>, phase: &DarkLandClassifier) -> Vec<ComponentVerdict> {
    let (rows, cols) = water.dim();
    let meta = RasterMeta::new(rows, cols);
    let labeling = label_components(water.mapv(|v| v == 1).view());
    store
        .insert("whole_labels.tif", meta.clone(), &labeling.labels.mapv(|l| l as i32))
        .unwrap();
    store.insert("whole_mask.tif", meta, water).unwrap();

    let rasters = PassRasters {
        labels: Path::new("whole_labels.tif"),
        phase_mask: Path::new("whole_mask.tif"),
    };
    labeling
        .components
        .iter()
        .map(|component| {
            let job = ComponentJob {
                label: component.label as i32,
                size: component.pixel_count,
                bbox: component.bbox,
                window: Window::around(&component.bbox, phase.margin(component.pixel_count), rows, cols),
            };
            phase.classify(store, &job, &vv(), &rasters).unwrap()
        })
        .collect()
}

#[test]
fn test_component_brighter_than_surroundings_is_kept() {
    init_logging();
    let store = MemoryRasterStore::new();
    let mut rng = StdRng::seed_from_u64(3);

    let mut water = Array2::<u8>::zeros((40, 40));
    water.slice_mut(s![10..15, 10..15]).fill(1);
    let mut intensity = Array2::from_shape_simple_fn((40, 40), || speckled(&mut rng, -13.0, 0.5));
    intensity
        .slice_mut(s![10..15, 10..15])
        .mapv_inplace(|_| 0.5);
    seed_land_scene(&store, &water, &intensity);

    let verdicts = classify_whole(&store, &water, &classifier(true));
    assert_eq!(verdicts.len(), 1);
    assert!(verdicts[0].accepted);
    assert_eq!(verdicts[0].ancillary_portion, 1.0);
    // decided before any bimodality test
    assert!(verdicts[0].metrics.is_none());
}

#[test]
fn test_dark_component_with_bimodal_surroundings_is_kept() {
    init_logging();
    let store = MemoryRasterStore::new();
    let mut rng = StdRng::seed_from_u64(8);

    let mut water = Array2::<u8>::zeros((60, 60));
    water.slice_mut(s![20..40, 20..40]).fill(1);
    let intensity = Array2::from_shape_fn((60, 60), |(r, c)| {
        if water[[r, c]] == 1 {
            speckled(&mut rng, -24.0, 1.0)
        } else {
            speckled(&mut rng, -10.0, 1.0)
        }
    });
    seed_land_scene(&store, &water, &intensity);

    let verdicts = classify_whole(&store, &water, &classifier(true));
    assert_eq!(verdicts.len(), 1);
    assert!(verdicts[0].accepted);
    assert!(verdicts[0].metrics.is_some());
}

#[test]
fn test_seam_verdict_matches_whole_region() {
    init_logging();
    const SIZE: usize = 100;
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    let mut rng = StdRng::seed_from_u64(17);

    let mut water = Array2::<u8>::zeros((SIZE, SIZE));
    water.slice_mut(s![48..54, 20..26]).fill(1);
    water.slice_mut(s![45..56, 60..72]).fill(1);
    water.slice_mut(s![10..18, 40..48]).fill(1);
    let intensity = Array2::from_shape_fn((SIZE, SIZE), |(r, c)| {
        let mean_db = if water[[r, c]] == 1 && c < 50 { -22.0 } else { -11.0 };
        speckled(&mut rng, mean_db, 1.5)
    });
    seed_land_scene(&store, &water, &intensity);

    let phase = classifier(false);
    let whole = classify_whole(&store, &water, &phase);
    let labeling = label_components(water.mapv(|v| v == 1).view());

    let ctx = RunContext::begin("seam", dir.path(), false).unwrap();
    let dispatcher = ParallelDispatcher::new(2).unwrap();
    for lines_per_block in [17, 50] {
        let reconciler = BlockBoundaryReconciler::new(
            &store,
            &dispatcher,
            &ctx,
            RasterMeta::new(SIZE, SIZE),
            lines_per_block,
            WriteOptions::default(),
        );
        let output = dir.path().join(format!("refined_{}.tif", lines_per_block));
        let summary = reconciler
            .run(&phase, Path::new("water.tif"), &[vv()], &output)
            .unwrap();
        assert!(summary.deferred() > 0);

        let refined: Array2<u8> = store.read_raster(&output).unwrap();
        for component in &labeling.components {
            let (row, col) = (component.bbox.y0, component.bbox.x0);
            let expected = whole[component.label as usize - 1].accepted;
            assert_eq!(
                refined[[row, col]] == 1,
                expected,
                "component {} with {} lines per block",
                component.label,
                lines_per_block
            );
        }
    }
}
