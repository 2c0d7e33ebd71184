use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use time::{format_description, OffsetDateTime};
use tracing::info;

/// A single timestamped directory holding every artifact of one harness
/// invocation: server and bot logs, replays, and result files.
#[derive(Debug, Clone)]
pub(crate) struct ExperimentDir {
    root: PathBuf,
}

impl ExperimentDir {
    /// Creates `<data_dir>/experiment_<timestamp>`, including any missing
    /// parent directories.
    pub fn create(data_dir: &Path) -> anyhow::Result<Self> {
        let format = format_description::parse("[year][month][day]_[hour][minute][second]")
            .expect("invalid experiment timestamp format");
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(&format)
            .context("could not format experiment timestamp")?;

        let root = data_dir.join(format!("experiment_{stamp}"));
        fs::create_dir_all(&root)
            .with_context(|| format!("could not create experiment directory {}", root.display()))?;
        info!(dir = %root.display(), "experiment directory created");
        Ok(ExperimentDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn replay_path(&self, test_id: usize) -> PathBuf {
        self.root.join(format!("replay_{test_id}.json"))
    }

    pub fn server_log_path(&self, test_id: usize) -> PathBuf {
        self.root.join(format!("server_{test_id}.log"))
    }

    pub fn bot_log_path(&self, test_id: usize, slot: usize) -> PathBuf {
        self.root.join(format!("bot_{test_id}_{slot}.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_directory_under_the_data_dir() {
        let data = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(data.path()).unwrap();
        assert!(experiment.root().is_dir());
        assert!(experiment.root().starts_with(data.path()));
        let name = experiment.root().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("experiment_"));
    }

    #[test]
    fn artifact_paths_follow_the_naming_scheme() {
        let data = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(data.path()).unwrap();
        assert!(experiment.replay_path(3).ends_with("replay_3.json"));
        assert!(experiment.server_log_path(3).ends_with("server_3.log"));
        assert!(experiment.bot_log_path(3, 2).ends_with("bot_3_2.log"));
    }
}
