use std::path::{Path, PathBuf};

use super::types::{AppConfig, OptimizationLevel, ProvenanceBackend};

/// Get the default lineflow data directory: ~/.lineflow
pub fn get_lineflow_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".lineflow"))
}

/// Load a config file without applying the search path.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.lineflow/config.toml (highest)
    let data_dir = get_lineflow_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if user_config.exists() {
        let s = std::fs::read_to_string(&user_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    // Default sqlite location lives under the data directory
    if cfg.provenance.backend == ProvenanceBackend::Sqlite
        && cfg
            .provenance
            .path
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        std::fs::create_dir_all(&data_dir)?;
        cfg.provenance.path = Some(
            data_dir
                .join("provenance.db")
                .to_string_lossy()
                .to_string(),
        );
    }

    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) -> anyhow::Result<()> {
    if let Some(v) = env_value("LINEFLOW_OPTIMIZATION_LEVEL") {
        cfg.orchestrator.optimization_level = v
            .parse::<OptimizationLevel>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = env_value("LINEFLOW_MAX_WORKERS") {
        cfg.orchestrator.max_workers = v
            .parse()
            .map_err(|e| anyhow::anyhow!("LINEFLOW_MAX_WORKERS: {e}"))?;
    }
    if let Some(v) = env_value("LINEFLOW_FAILURE_POLICY") {
        cfg.orchestrator.failure_policy = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = env_value("LINEFLOW_PROVENANCE_PATH") {
        cfg.provenance.backend = ProvenanceBackend::Sqlite;
        cfg.provenance.path = Some(v);
    }

    cfg.orchestrator.validate().map_err(anyhow::Error::msg)?;
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_path_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nmax_concurrent_tasks = 4\nstep_timeout_ms = 250").unwrap();

        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.orchestrator.max_concurrent_tasks, 4);
        assert_eq!(cfg.orchestrator.step_timeout_ms, 250);
    }

    #[test]
    fn test_load_from_path_rejects_zero_tasks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nmax_concurrent_tasks = 0").unwrap();

        assert!(load_from_path(file.path()).is_err());
    }
}
