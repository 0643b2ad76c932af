//! Integration test: Full pipeline (load → clean → train → select → persist → predict)

use harvest_automl::export::{artifact_file_stem, ArtifactStore, Predictor};
use harvest_automl::pipeline::{Pipeline, PipelineConfig};
use harvest_automl::training::{ModelKind, TrainingConfig};
use harvest_automl::utils::DataLoader;
use harvest_automl::HarvestError;
use std::fmt::Write as _;
use std::path::Path;

/// FAOSTAT-style long export with a few extra columns and unrelated elements
fn write_faostat_csv(path: &Path, regions: usize, years: usize) {
    let mut csv = String::from("Domain,Area,Element,Item,Year,Unit,Value,Flag\n");
    for r in 0..regions {
        for t in 0..years {
            let area = 1_000.0 + 150.0 * r as f64 + 20.0 * t as f64;
            let crop_yield = 20_000.0 + 900.0 * ((r * 7 + t * 3) % 11) as f64;
            let production = area * crop_yield / 10_000.0;
            let year = 1990 + t;
            let region = format!("Region {}", r);
            writeln!(csv, "Crops,{},Area harvested,Wheat,{},ha,{},A", region, year, area).unwrap();
            writeln!(csv, "Crops,{},Yield,Wheat,{},hg/ha,{},E", region, year, crop_yield).unwrap();
            writeln!(csv, "Crops,{},Production,Wheat,{},t,{},A", region, year, production).unwrap();
            writeln!(csv, "Crops,{},Stocks,Wheat,{},t,{},A", region, year, production / 3.0).unwrap();
        }
    }
    std::fs::write(path, csv).unwrap();
}

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_output_dir(dir.join("output"))
        .with_models_dir(dir.join("models"))
}

#[test]
fn test_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("faostat.csv");
    write_faostat_csv(&input, 8, 15);

    let pipeline = Pipeline::new(config_in(dir.path())).unwrap();
    let report = pipeline.run(&input).unwrap();

    assert_eq!(report.clean.stats.input_rows, 8 * 15 * 4);
    assert_eq!(report.clean.stats.relevant_rows, 8 * 15 * 3);
    assert_eq!(report.clean.stats.complete_groups, 120);
    assert!(report.clean.rows > 0 && report.clean.rows <= 120);

    // Cleaned table round-trips through the loader
    let cleaned = DataLoader::new().load_cleaned(&report.clean.cleaned_path).unwrap();
    assert_eq!(cleaned.len(), report.clean.rows);

    let train = &report.train;
    assert_eq!(train.comparison.len(), ModelKind::ALL.len());
    assert_eq!(train.n_train + train.n_test, train.feature_rows);
    assert_eq!(
        train.artifact_path,
        dir.path()
            .join("models")
            .join(format!("{}.json", artifact_file_stem(&train.winner)))
    );

    let best_r2 = train
        .comparison
        .iter()
        .filter_map(|row| row.metrics.map(|m| m.r2))
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(train.winner_metrics.r2, best_r2);

    let comparison = DataLoader::new().load_frame(&train.comparison_path).unwrap();
    assert_eq!(comparison.height(), ModelKind::ALL.len());
}

#[test]
fn test_artifact_reloads_into_predictor() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("faostat.csv");
    write_faostat_csv(&input, 6, 12);

    let pipeline = Pipeline::new(config_in(dir.path())).unwrap();
    let report = pipeline.run(&input).unwrap();

    let predictor = Predictor::load(&report.train.artifact_path).unwrap();
    assert_eq!(predictor.model_name(), report.train.winner);
    assert_eq!(predictor.artifact().metrics, report.train.winner_metrics);

    let production = predictor.predict(1_500.0, 25_000.0).unwrap();
    assert!(production.is_finite());
    assert!(production >= 0.0);

    let artifact = ArtifactStore::load_model(&report.train.artifact_path).unwrap();
    let again = Predictor::from_artifact(artifact).unwrap();
    assert_eq!(again.predict(1_500.0, 25_000.0).unwrap(), production);
}

#[test]
fn test_rerun_overwrites_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("faostat.csv");
    write_faostat_csv(&input, 5, 10);

    let config = config_in(dir.path()).with_training(
        TrainingConfig::default().with_roster(vec![
            ModelKind::LinearRegression,
            ModelKind::DecisionTreeRegressor,
        ]),
    );
    let pipeline = Pipeline::new(config).unwrap();

    let first = pipeline.run(&input).unwrap();
    let second = pipeline.run(&input).unwrap();

    assert_eq!(first.train.winner, second.train.winner);
    assert_eq!(first.train.comparison, second.train.comparison);
    assert_eq!(first.train.artifact_path, second.train.artifact_path);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("models"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_train_from_cleaned_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("faostat.csv");
    write_faostat_csv(&input, 5, 10);

    let pipeline = Pipeline::new(config_in(dir.path())).unwrap();
    let (records, clean) = pipeline.clean(&input).unwrap();

    let from_file = pipeline.train_from_file(&clean.cleaned_path).unwrap();
    let from_memory = pipeline.train_from_records(&records).unwrap();
    assert_eq!(from_file.winner, from_memory.winner);
    assert_eq!(from_file.feature_rows, from_memory.feature_rows);
}

#[test]
fn test_missing_column_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(&input, "Area,Year,Item,Value\nA,2000,Wheat,1\n").unwrap();

    let pipeline = Pipeline::new(config_in(dir.path())).unwrap();
    assert!(matches!(pipeline.run(&input), Err(HarvestError::LoadError(_))));
}
