use crate::campaign::DEFAULT_ROUNDS;
use crate::sanitizer::{DEFAULT_DENYLIST, Denylist};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Fixed RNG seed. A fresh one is drawn when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

pub fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

pub fn default_log_file() -> PathBuf {
    PathBuf::from("fuzz_results.txt")
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            log_file: default_log_file(),
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LoaderSettings {
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_denylist() -> Vec<String> {
    DEFAULT_DENYLIST.iter().map(|m| m.to_string()).collect()
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
        }
    }
}

impl LoaderSettings {
    pub fn denylist(&self) -> Denylist {
        Denylist::new(&self.denylist)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    /// Directory relative source paths are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_frequency")]
    pub frequency: PathBuf,
    #[serde(default = "default_report")]
    pub report: PathBuf,
    #[serde(default = "default_mining")]
    pub mining: PathBuf,
}

fn default_frequency() -> PathBuf {
    PathBuf::from("targets/empirical/frequency.py")
}

fn default_report() -> PathBuf {
    PathBuf::from("targets/empirical/report.py")
}

fn default_mining() -> PathBuf {
    PathBuf::from("targets/mining/mining.py")
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_dir: None,
            frequency: default_frequency(),
            report: default_report(),
            mining: default_mining(),
        }
    }
}

impl SourceSettings {
    /// Sources rooted at `base_dir`, with the default file names.
    pub fn rooted_at(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn frequency_path(&self) -> PathBuf {
        self.resolve(&self.frequency)
    }

    pub fn report_path(&self) -> PathBuf {
        self.resolve(&self.report)
    }

    pub fn mining_path(&self) -> PathBuf {
        self.resolve(&self.mining)
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScourConfig {
    #[serde(default)]
    pub campaign: CampaignSettings,
    #[serde(default)]
    pub loader: LoaderSettings,
    #[serde(default)]
    pub sources: SourceSettings,
}

impl ScourConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let mut config: ScourConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        // Sources are relative to the file that names them.
        if let Some(dir) = path.parent() {
            let base = match config.sources.base_dir.take() {
                Some(base) => dir.join(base),
                None => dir.to_path_buf(),
            };
            config.sources.base_dir = Some(base);
        }

        Ok(config)
    }
}
