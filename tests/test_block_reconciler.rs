use ndarray::{s, Array2};
use sarwater::core::bimodality::{BimodalityThresholds, EstimatorParams};
use sarwater::core::classifier::BandSelection;
use sarwater::core::dark_land::DarkLandClassifier;
use sarwater::core::dispatch::ParallelDispatcher;
use sarwater::core::reconcile::BlockBoundaryReconciler;
use sarwater::{
    BlockRasterStore, IntensityBand, MemoryRasterStore, Polarization, RasterMeta, RunContext,
    WriteOptions,
};
use std::path::{Path, PathBuf};

const SIZE: usize = 100;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scene with four water components:
/// - 6x6 block crossing row 50 on open land (kept),
/// - 3-pixel sliver (too small),
/// - 10x10 patch on reference land that looks like its surroundings (removed),
/// - 5x5 block on open land (kept).
fn seed_scene(store: &MemoryRasterStore) {
    let meta = RasterMeta::new(SIZE, SIZE);

    let mut water = Array2::<u8>::zeros((SIZE, SIZE));
    water.slice_mut(s![48..54, 20..26]).fill(1);
    water.slice_mut(s![10..11, 70..73]).fill(1);
    water.slice_mut(s![70..80, 40..50]).fill(1);
    water.slice_mut(s![5..10, 5..10]).fill(1);

    let mut land = Array2::<u8>::zeros((SIZE, SIZE));
    land.slice_mut(s![60..95, 30..60]).fill(1);

    let intensity = Array2::<f32>::from_elem((SIZE, SIZE), 0.1);
    let no_data = Array2::<u8>::zeros((SIZE, SIZE));

    store.insert("water.tif", meta.clone(), &water).unwrap();
    store.insert("land.tif", meta.clone(), &land).unwrap();
    store.insert("intensity.tif", meta.clone(), &intensity).unwrap();
    store.insert("no_data.tif", meta, &no_data).unwrap();
}

fn classifier() -> DarkLandClassifier {
    DarkLandClassifier {
        intensity: PathBuf::from("intensity.tif"),
        reference_land: PathBuf::from("land.tif"),
        no_data: PathBuf::from("no_data.tif"),
        thresholds: BimodalityThresholds::default(),
        estimator: EstimatorParams::default(),
        minimum_pixel: 4,
        collect_metrics: false,
    }
}

fn vv() -> Vec<BandSelection> {
    vec![BandSelection {
        index: 1,
        band: IntensityBand::Backscatter(Polarization::VV),
    }]
}

fn refine(store: &MemoryRasterStore, scratch: &Path, lines_per_block: usize, workers: usize) -> Array2<u8> {
    let ctx = RunContext::begin("reconcile", scratch, false).unwrap();
    let dispatcher = ParallelDispatcher::new(workers).unwrap();
    let reconciler = BlockBoundaryReconciler::new(
        store,
        &dispatcher,
        &ctx,
        RasterMeta::new(SIZE, SIZE),
        lines_per_block,
        WriteOptions::default(),
    );

    let output = scratch.join("refined.tif");
    let summary = reconciler
        .run(&classifier(), Path::new("water.tif"), &vv(), &output)
        .unwrap();
    println!("{:?}", summary);

    store.read_raster(&output).unwrap()
}

fn expected() -> Array2<u8> {
    let mut expected = Array2::<u8>::zeros((SIZE, SIZE));
    expected.slice_mut(s![48..54, 20..26]).fill(1);
    expected.slice_mut(s![5..10, 5..10]).fill(1);
    expected
}

#[test]
fn test_seam_component_is_deferred_and_kept() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let ctx = RunContext::begin("reconcile", dir.path(), false).unwrap();
    let dispatcher = ParallelDispatcher::new(2).unwrap();
    let reconciler = BlockBoundaryReconciler::new(
        &store,
        &dispatcher,
        &ctx,
        RasterMeta::new(SIZE, SIZE),
        50,
        WriteOptions::default(),
    );
    let output = dir.path().join("refined.tif");
    let summary = reconciler
        .run(&classifier(), Path::new("water.tif"), &vv(), &output)
        .unwrap();

    assert_eq!(summary.passes.len(), 2);
    assert_eq!(summary.passes[0].blocks, 2);
    // one piece of the seam component on each side
    assert_eq!(summary.passes[0].deferred, 2);
    assert_eq!(summary.passes[0].dispatched, 3);
    assert_eq!(summary.passes[1].components, 1);
    assert_eq!(summary.accepted(), 2);

    let check: Array2<u8> = store.read_raster(&ctx.scratch_path("check_dark_land_0.tif")).unwrap();
    let mut seam = Array2::<u8>::zeros((SIZE, SIZE));
    seam.slice_mut(s![48..54, 20..26]).fill(1);
    assert_eq!(check, seam);

    let refined: Array2<u8> = store.read_raster(&output).unwrap();
    assert_eq!(refined, expected());
}

#[test]
fn test_block_size_does_not_change_result() {
    init_logging();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let small = tempfile::tempdir().unwrap();
    let whole = tempfile::tempdir().unwrap();
    let blocked = refine(&store, small.path(), 50, 2);
    let single = refine(&store, whole.path(), SIZE, 2);

    assert_eq!(blocked, single);
    assert_eq!(single, expected());
}

#[test]
fn test_worker_count_does_not_change_result() {
    init_logging();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let one = tempfile::tempdir().unwrap();
    let four = tempfile::tempdir().unwrap();
    assert_eq!(refine(&store, one.path(), 25, 1), refine(&store, four.path(), 25, 4));
}

#[test]
fn test_no_band_passes_input_through() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let ctx = RunContext::begin("reconcile", dir.path(), false).unwrap();
    let dispatcher = ParallelDispatcher::new(1).unwrap();
    let reconciler = BlockBoundaryReconciler::new(
        &store,
        &dispatcher,
        &ctx,
        RasterMeta::new(SIZE, SIZE),
        50,
        WriteOptions::default(),
    );
    let output = dir.path().join("passthrough.tif");
    let summary = reconciler
        .run(&classifier(), Path::new("water.tif"), &[], &output)
        .unwrap();

    assert!(summary.passes.is_empty());
    let water: Array2<u8> = store.read_raster(Path::new("water.tif")).unwrap();
    let passed: Array2<u8> = store.read_raster(&output).unwrap();
    assert_eq!(passed, water);
}

#[test]
fn test_full_pass_skipped_without_seams() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let ctx = RunContext::begin("reconcile", dir.path(), false).unwrap();
    let dispatcher = ParallelDispatcher::new(2).unwrap();
    let reconciler = BlockBoundaryReconciler::new(
        &store,
        &dispatcher,
        &ctx,
        RasterMeta::new(SIZE, SIZE),
        SIZE,
        WriteOptions::default(),
    );
    let output = dir.path().join("refined.tif");
    let summary = reconciler
        .run(&classifier(), Path::new("water.tif"), &vv(), &output)
        .unwrap();

    assert_eq!(summary.passes.len(), 1);
    assert_eq!(summary.deferred(), 0);
    assert!(!store.exists(&ctx.scratch_path("refined_dark_land_1.tif")));
}
