//! Pipeline Configuration
//!
//! Resolved once at startup from the process environment and the pipelines
//! file, then passed around by reference.

use anyhow::{Context, Result};
use batch_deploy::{BatchConfig, Dag};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use storage::path_join;
use tracing::debug;
use training_engine::TrainingConfig;

pub const DEFAULT_BASE_FOLDER: &str = "abfs://testmlopaes.dfs.core.windows.net/testing";
pub const DEFAULT_STORAGE_ROOT: &str = "./data";
/// Equipment readings under the input folder
pub const INPUT_FILE: &str = "O_G_Equipment_Data.xlsx";

const PROJECT: &str = "project1";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Where artifacts are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Object paths mirrored under `STORAGE_ROOT`
    Local,
    /// The ADLS Gen2 filesystem named by `BASE_FOLDER`
    Azure,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "azure" => Ok(StorageBackend::Azure),
            other => anyhow::bail!("STORAGE_BACKEND must be local or azure, got {:?}", other),
        }
    }
}

/// Storage tiers under the base folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFolders {
    pub base: String,
    pub raw: String,
    pub input: String,
    pub trusted: String,
    pub refined: String,
}

impl StorageFolders {
    pub fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            raw: path_join(&base, &["raw"]),
            input: path_join(&base, &["input"]),
            trusted: path_join(&base, &["trusted"]),
            refined: path_join(&base, &["refined"]),
            base,
        }
    }

    pub fn input_table(&self) -> String {
        path_join(&self.input, &[INPUT_FILE])
    }

    pub fn model_path(&self) -> String {
        path_join(&self.refined, &[PROJECT, "models", "model.bin"])
    }

    pub fn predictions_path(&self) -> String {
        path_join(&self.refined, &[PROJECT, "results", "predictions.parquet"])
    }
}

/// Contents of the pipelines file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PipelineFile {
    dags: BTreeMap<String, Dag>,
    batch: BatchConfig,
    training: TrainingConfig,
}

/// Process-wide settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run date
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
    pub folders: StorageFolders,
    pub storage_backend: StorageBackend,
    /// Local directory object paths are mapped into
    pub storage_root: PathBuf,
    pub dags: BTreeMap<String, Dag>,
    pub batch: BatchConfig,
    pub training: TrainingConfig,
}

impl PipelineConfig {
    /// Resolve the environment, then layer `pipelines` and `PIPELINE__*` variables
    pub fn load(pipelines: &Path) -> Result<Self> {
        let file = read_pipelines(pipelines)?;
        debug!("Declared dags: {:?}", file.dags.keys().collect::<Vec<_>>());
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    fn resolve(file: PipelineFile, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let today = match var("TODAY") {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .with_context(|| format!("TODAY must look like {}, got {:?}", DATE_FORMAT, raw))?,
            None => Utc::now().date_naive(),
        };
        let yesterday = today
            .pred_opt()
            .with_context(|| format!("{} has no previous day", today))?;

        let base = var("BASE_FOLDER").unwrap_or_else(|| DEFAULT_BASE_FOLDER.to_string());
        let storage_root = var("STORAGE_ROOT").unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string());
        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Local,
        };

        Ok(Self {
            today,
            yesterday,
            folders: StorageFolders::new(&base),
            storage_backend,
            storage_root: PathBuf::from(storage_root),
            dags: file.dags,
            batch: file.batch,
            training: file.training,
        })
    }

    /// Look up a declared dag
    pub fn dag(&self, name: &str) -> Result<&Dag> {
        self.dags.get(name).with_context(|| {
            let known: Vec<&str> = self.dags.keys().map(String::as_str).collect();
            format!("Unknown dag {:?} (declared: {})", name, known.join(", "))
        })
    }
}

fn read_pipelines(path: &Path) -> Result<PipelineFile> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("PIPELINE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    settings
        .try_deserialize()
        .with_context(|| format!("Invalid pipeline configuration in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_folders() {
        let folders = StorageFolders::new("abfs://acct/testing/");
        assert_eq!(folders.raw, "abfs://acct/testing/raw");
        assert_eq!(folders.trusted, "abfs://acct/testing/trusted");
        assert_eq!(
            folders.input_table(),
            "abfs://acct/testing/input/O_G_Equipment_Data.xlsx"
        );
        assert_eq!(
            folders.model_path(),
            "abfs://acct/testing/refined/project1/models/model.bin"
        );
        assert_eq!(
            folders.predictions_path(),
            "abfs://acct/testing/refined/project1/results/predictions.parquet"
        );
    }

    #[test]
    fn test_resolve_dates_and_defaults() {
        let config =
            PipelineConfig::resolve(PipelineFile::default(), lookup(&[("TODAY", "2024-03-01")]))
                .unwrap();
        assert_eq!(config.today, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        // Leap year
        assert_eq!(config.yesterday, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(config.folders.base, DEFAULT_BASE_FOLDER);
        assert_eq!(config.storage_root, PathBuf::from(DEFAULT_STORAGE_ROOT));
        assert_eq!(config.storage_backend, StorageBackend::Local);
    }

    #[test]
    fn test_resolve_overrides() {
        let config = PipelineConfig::resolve(
            PipelineFile::default(),
            lookup(&[("BASE_FOLDER", "file://lake/dev"), ("STORAGE_ROOT", "/tmp/lake")]),
        )
        .unwrap();
        assert_eq!(config.folders.refined, "file://lake/dev/refined");
        assert_eq!(config.storage_root, PathBuf::from("/tmp/lake"));
    }

    #[test]
    fn test_storage_backend() {
        let config = PipelineConfig::resolve(
            PipelineFile::default(),
            lookup(&[("STORAGE_BACKEND", "Azure")]),
        )
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Azure);

        let err = PipelineConfig::resolve(
            PipelineFile::default(),
            lookup(&[("STORAGE_BACKEND", "s3")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("STORAGE_BACKEND"));
    }

    #[test]
    fn test_invalid_today() {
        let err = PipelineConfig::resolve(PipelineFile::default(), lookup(&[("TODAY", "01/03/2024")]))
            .unwrap_err();
        assert!(err.to_string().contains("TODAY"));
    }

    #[test]
    fn test_pipelines_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[dags.train]
tasks = ["train"]
schedule = "0 3 * * MON"

[dags.daily]
tasks = ["predict"]

[batch]
pool_id = "nightly"
recreate_delay_secs = 5

[training]
seed = 7
test_fraction = 0.25
baseline_cs = 4
cv_folds = 3

[training.grid]
solvers = ["liblinear", "lbfgs"]
cs = [1, 10]
negative_weights = [0.0, 0.5]
folds = 2
inner_folds = 2
"#
        )
        .unwrap();

        let parsed = read_pipelines(file.path()).unwrap();
        let config = PipelineConfig::resolve(parsed, lookup(&[])).unwrap();

        assert_eq!(config.dag("train").unwrap().tasks, vec!["train"]);
        assert_eq!(
            config.dag("train").unwrap().schedule.as_deref(),
            Some("0 3 * * MON")
        );
        assert!(config.dag("daily").unwrap().schedule.is_none());
        assert!(config.dag("weekly").is_err());

        assert_eq!(config.batch.pool_id, "nightly");
        assert_eq!(config.batch.vm_size, "Standard_D2_v3");
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.grid.cs, vec![1, 10]);
    }

    #[test]
    fn test_missing_pipelines_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = read_pipelines(&dir.path().join("absent.toml")).unwrap();
        assert!(parsed.dags.is_empty());
        assert_eq!(parsed.batch, BatchConfig::default());
    }
}
