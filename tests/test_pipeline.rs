use ndarray::{s, Array2};
use sarwater::{
    AncillaryInputs, BlockRasterStore, MemoryRasterStore, RasterMeta, RefinementConfig,
    RefinementPipeline, SarError,
};
use std::path::{Path, PathBuf};

const SIZE: usize = 60;
const LAND: i32 = 10;
const PERMANENT_WATER: i32 = 80;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Water square (rows/cols 10..40) with two holes in the initial mask:
/// a 4x4 hole on permanent water and a 4x4 hole on land.
fn seed_scene(store: &MemoryRasterStore) {
    let meta = RasterMeta::new(SIZE, SIZE);

    let mut water = Array2::<u8>::zeros((SIZE, SIZE));
    water.slice_mut(s![10..40, 10..40]).fill(1);
    water.slice_mut(s![20..24, 20..24]).fill(0);
    water.slice_mut(s![30..34, 30..34]).fill(0);

    let mut landcover = Array2::<i32>::from_elem((SIZE, SIZE), LAND);
    landcover.slice_mut(s![10..40, 10..40]).fill(PERMANENT_WATER);
    landcover.slice_mut(s![30..34, 30..34]).fill(LAND);

    // unit power is 0 dB, so the water sample around the first hole is exactly constant
    let mut band = Array2::<f64>::from_elem((SIZE, SIZE), 3.0);
    band.slice_mut(s![10..40, 10..40]).fill(1.0);
    band.slice_mut(s![30..34, 30..34]).fill(3.0);

    store.insert("water.tif", meta.clone(), &water).unwrap();
    store.insert("landcover.tif", meta.clone(), &landcover).unwrap();
    store
        .insert_bands("intensity.tif", meta.clone(), &[band.clone(), band])
        .unwrap();
    store
        .insert("no_data.tif", meta, &Array2::<u8>::zeros((SIZE, SIZE)))
        .unwrap();
}

fn config(dir: &Path, lines_per_block: usize) -> RefinementConfig {
    RefinementConfig {
        inputs: AncillaryInputs {
            intensity: PathBuf::from("intensity.tif"),
            landcover: PathBuf::from("landcover.tif"),
            reference_land: None,
            water_mask: PathBuf::from("water.tif"),
            no_data: PathBuf::from("no_data.tif"),
        },
        scratch_dir: dir.join("scratch"),
        output_path: dir.join("refined.tif"),
        lines_per_block,
        number_workers: 2,
        cog: false,
        ..RefinementConfig::default()
    }
}

fn expected() -> Array2<u8> {
    let mut expected = Array2::<u8>::zeros((SIZE, SIZE));
    expected.slice_mut(s![10..40, 10..40]).fill(1);
    expected.slice_mut(s![30..34, 30..34]).fill(0);
    expected
}

#[test]
fn test_water_gap_filled_land_gap_kept() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let config = config(dir.path(), 500);
    let pipeline = RefinementPipeline::new(config.clone(), &store).unwrap();
    let summary = pipeline.run().unwrap();

    let refined: Array2<u8> = store.read_raster(&config.output_path).unwrap();
    assert_eq!(refined, expected());
    assert_eq!(summary.water_pixels_in, 900 - 32);
    assert_eq!(summary.water_pixels_out, 900 - 16);
    assert_eq!(summary.fill_gap.accepted(), 1);

    let json = std::fs::read_to_string(dir.path().join("scratch").join("refinement_summary.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["run_id"], summary.run_id.as_str());
    assert_eq!(value["water_pixels_out"], 884);
}

#[test]
fn test_seams_do_not_change_refinement() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let config = config(dir.path(), 16);
    let summary = RefinementPipeline::new(config.clone(), &store)
        .unwrap()
        .run()
        .unwrap();

    assert!(summary.dark_land.deferred() > 0);
    assert_eq!(summary.dark_land.passes.len(), 2);
    let refined: Array2<u8> = store.read_raster(&config.output_path).unwrap();
    assert_eq!(refined, expected());
}

#[test]
fn test_debug_mode_writes_component_rasters() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let config = RefinementConfig {
        debug_mode: true,
        ..config(dir.path(), 500)
    };
    RefinementPipeline::new(config, &store).unwrap().run().unwrap();

    let scratch = dir.path().join("scratch");
    assert!(store.exists(&scratch.join("reference_land.tif")));
    assert!(store.exists(&scratch.join("dark_land_portion_VV_0.tif")));
    assert!(store.exists(&scratch.join("dark_land_binary_ashman_VV_0.tif")));
    assert!(store.exists(&scratch.join("fill_gap_portion_VH_0.tif")));
    assert!(!store.exists(&scratch.join("fill_gap_binary_ashman_VH_0.tif")));

    let portion: Array2<f32> = store
        .read_raster(&scratch.join("fill_gap_portion_VV_0.tif"))
        .unwrap();
    assert_eq!(portion[[21, 21]], 1.0);
    assert_eq!(portion[[31, 31]], 0.0);
    assert_eq!(portion[[15, 15]], -1.0);
}

#[test]
fn test_missing_input_is_reported() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let mut config = config(dir.path(), 500);
    config.inputs.no_data = PathBuf::from("absent.tif");
    let result = RefinementPipeline::new(config, &store).unwrap().run();

    match result {
        Err(SarError::MissingAncillaryFile(path)) => assert_eq!(path, PathBuf::from("absent.tif")),
        other => panic!("expected missing file error, got {:?}", other.map(|s| s.run_id)),
    }
}

#[test]
fn test_blank_intensity_band_is_degenerate() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);

    let meta = RasterMeta::new(SIZE, SIZE);
    let band = Array2::<f64>::from_elem((SIZE, SIZE), 1.0);
    let blank = Array2::<f64>::zeros((SIZE, SIZE));
    store
        .insert_bands("intensity.tif", meta, &[band, blank])
        .unwrap();

    let result = RefinementPipeline::new(config(dir.path(), 500), &store)
        .unwrap()
        .run();
    assert!(matches!(result, Err(SarError::DegenerateAncillaryData(_))));
}

#[test]
fn test_unclassified_landcover_is_degenerate() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryRasterStore::new();
    seed_scene(&store);
    store
        .insert(
            "landcover.tif",
            RasterMeta::new(SIZE, SIZE),
            &Array2::<i32>::zeros((SIZE, SIZE)),
        )
        .unwrap();

    let result = RefinementPipeline::new(config(dir.path(), 500), &store)
        .unwrap()
        .run();
    assert!(matches!(result, Err(SarError::DegenerateAncillaryData(_))));
}

#[test]
fn test_invalid_config_is_rejected() {
    let store = MemoryRasterStore::new();
    let config = RefinementConfig {
        number_workers: 0,
        ..RefinementConfig::default()
    };
    assert!(matches!(
        RefinementPipeline::new(config, &store),
        Err(SarError::Config(_))
    ));
}
