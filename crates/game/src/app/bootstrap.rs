use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use adventure_engine::{EngineConfig, LevelClass, LoopConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::gameplay;

const CONFIG_ENV_VAR: &str = "ADVENTURE_CONFIG";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) levels: Vec<LevelClass>,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Adventure Startup ===");

    let engine = load_engine_config().with_env_overrides();
    info!(
        container = %engine.container_id,
        canvas = %engine.primary_canvas_id,
        recovery_passes = engine.recovery_pass_delays_ms.len(),
        "engine_config"
    );
    let config = LoopConfig {
        engine,
        ..LoopConfig::default()
    };

    AppWiring {
        config,
        levels: gameplay::main_game(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_engine_config() -> EngineConfig {
    engine_config_from(env::var_os(CONFIG_ENV_VAR))
}

fn engine_config_from(raw_path: Option<OsString>) -> EngineConfig {
    let Some(raw_path) = raw_path else {
        return EngineConfig::default();
    };
    let path = PathBuf::from(raw_path);
    match EngineConfig::load(&path) {
        Ok(config) => {
            info!(path = %path.display(), "engine_config_loaded");
            config
        }
        Err(error) => {
            warn!(
                env_var = CONFIG_ENV_VAR,
                path = %path.display(),
                error = %error,
                "invalid engine config; falling back to defaults"
            );
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn unset_config_path_uses_defaults() {
        assert_eq!(engine_config_from(None), EngineConfig::default());
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "primary_canvas_id": "stage" }"#).expect("write config");

        let config = engine_config_from(Some(path.into_os_string()));

        assert_eq!(config.primary_canvas_id, "stage");
        assert_eq!(config.container_id, EngineConfig::default().container_id);
    }

    #[test]
    fn invalid_or_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let invalid = dir.path().join("engine.json");
        fs::write(&invalid, r#"{ "recovery_pass_delays_ms": [100, "soon"] }"#)
            .expect("write config");

        assert_eq!(
            engine_config_from(Some(invalid.into_os_string())),
            EngineConfig::default()
        );
        assert_eq!(
            engine_config_from(Some(dir.path().join("absent.json").into_os_string())),
            EngineConfig::default()
        );
    }
}
