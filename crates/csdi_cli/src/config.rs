//! Experiment configuration: the base config file, command-line overrides
//! and the `config.json` persisted in every run folder.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the persisted config inside a run folder.
pub const RUN_CONFIG_FILE: &str = "config.json";

/// Full experiment configuration handed to the model and trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExperimentConfig {
    /// Training loop settings.
    #[serde(default)]
    pub train: TrainSection,
    /// Diffusion settings, passed through untouched to the model.
    #[serde(default)]
    pub diffusion: Map<String, Value>,
    /// Model settings, including the conditioning options set from the CLI.
    #[serde(default)]
    pub model: ModelSection,
    /// Metadata ("time weaver") settings.
    #[serde(default)]
    pub weaver: WeaverSection,
}

/// Training loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSection {
    /// Number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Batch size used by all three loaders.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,
    /// Cap on iterations per epoch.
    #[serde(default = "default_itr_per_epoch")]
    pub itr_per_epoch: u64,
    /// Remaining train options, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_epochs() -> usize {
    200
}

fn default_batch_size() -> usize {
    8
}

fn default_lr() -> f64 {
    1.0e-3
}

fn default_itr_per_epoch() -> u64 {
    100_000_000
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            lr: default_lr(),
            itr_per_epoch: default_itr_per_epoch(),
            extra: Map::new(),
        }
    }
}

/// Model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Time embedding width.
    #[serde(default = "default_timeemb")]
    pub timeemb: usize,
    /// Feature embedding width.
    #[serde(default = "default_featureemb")]
    pub featureemb: usize,
    /// Mask strategy used for training targets.
    #[serde(default = "default_target_strategy")]
    pub target_strategy: String,
    /// Channels sampled per training step; caps `n_condit_features`.
    #[serde(default = "default_num_sample_features")]
    pub num_sample_features: i64,
    /// Condition on noise instead of observations.
    #[serde(default)]
    pub is_pseudo_unconditional: bool,
    /// No history at all.
    #[serde(default)]
    pub is_true_unconditional: bool,
    /// History steps per window.
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Conditioning channel count, `-1` for all.
    #[serde(default = "default_n_condit_features")]
    pub n_condit_features: i64,
    /// Conditioning strategy name.
    #[serde(default = "default_condit_strat")]
    pub condit_strat: String,
    /// Remaining model options, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_timeemb() -> usize {
    128
}

fn default_featureemb() -> usize {
    16
}

fn default_target_strategy() -> String {
    "test".to_string()
}

fn default_num_sample_features() -> i64 {
    64
}

fn default_history_length() -> usize {
    csdi_data::DEFAULT_HISTORY_LENGTH
}

fn default_n_condit_features() -> i64 {
    -1
}

fn default_condit_strat() -> String {
    "pca".to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            timeemb: default_timeemb(),
            featureemb: default_featureemb(),
            target_strategy: default_target_strategy(),
            num_sample_features: default_num_sample_features(),
            is_pseudo_unconditional: false,
            is_true_unconditional: false,
            history_length: default_history_length(),
            n_condit_features: default_n_condit_features(),
            condit_strat: default_condit_strat(),
            extra: Map::new(),
        }
    }
}

/// Metadata settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WeaverSection {
    /// Whether metadata is fed to the model.
    #[serde(default)]
    pub included: bool,
    /// Width of the one-hot metadata.
    #[serde(default)]
    pub k_meta: usize,
    /// Remaining weaver options, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Conditioning options given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditioningOptions {
    /// Condition on noise instead of observations.
    pub pseudo_unconditional: bool,
    /// No history at all.
    pub true_unconditional: bool,
    /// History steps per window.
    pub history_length: usize,
    /// Conditioning channel count, `<= 0` for all.
    pub n_condit_features: i64,
    /// Conditioning strategy name.
    pub condit_strat: String,
}

impl ConditioningOptions {
    /// Treat `n_condit_features == 0` as true-unconditional.
    ///
    /// Returns `true` if the options were rewritten.
    pub fn normalize(&mut self) -> bool {
        if self.n_condit_features == 0 {
            self.true_unconditional = true;
            self.n_condit_features = -1;
            true
        } else {
            false
        }
    }
}

impl ExperimentConfig {
    /// Read a base config from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))
    }

    /// Read a persisted run config.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run config {:?}", path))
    }

    /// Write this config as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write run config {:?}", path))
    }

    /// Copy the conditioning options into the model section and check
    /// they are consistent.
    pub fn apply(&mut self, opts: &ConditioningOptions) -> Result<()> {
        self.model.is_pseudo_unconditional = opts.pseudo_unconditional;
        self.model.is_true_unconditional = opts.true_unconditional;
        self.model.history_length = opts.history_length;
        self.model.n_condit_features = opts.n_condit_features;
        self.model.condit_strat = opts.condit_strat.clone();

        if opts.pseudo_unconditional && opts.true_unconditional {
            bail!("Cannot be both pseudo and true unconditional");
        }
        if (opts.pseudo_unconditional || opts.true_unconditional) && opts.n_condit_features > 0 {
            bail!("Cannot be unconditional and have conditional features");
        }
        if opts.n_condit_features > self.model.num_sample_features {
            bail!(
                "Cannot have more conditional features ({}) than sample features ({})",
                opts.n_condit_features,
                self.model.num_sample_features
            );
        }
        Ok(())
    }

    /// Record the metadata width once the datasets are built.
    pub fn record_metadata(&mut self, k_meta: usize) {
        self.weaver.included = true;
        self.weaver.k_meta = k_meta;
    }
}

/// Where a run's config and artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFolder {
    /// Folder path.
    pub path: PathBuf,
    /// Whether this run reuses an earlier run's folder.
    pub reused: bool,
}

impl RunFolder {
    /// Create a fresh, timestamped folder under `save_root`.
    pub fn create(save_root: &Path, timestamp: &str) -> Result<Self> {
        let path = save_root.join(format!("run_{}", timestamp));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create run folder {:?}", path))?;
        Ok(Self { path, reused: false })
    }

    /// Open an existing run folder under `save_root`.
    pub fn reuse(save_root: &Path, name: &str) -> Result<Self> {
        let path = save_root.join(name);
        if !path.join(RUN_CONFIG_FILE).is_file() {
            bail!("Run folder {:?} has no {}", path, RUN_CONFIG_FILE);
        }
        Ok(Self { path, reused: true })
    }

    /// Path of the persisted config.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path.join(RUN_CONFIG_FILE)
    }
}
