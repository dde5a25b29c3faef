use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;

pub use app::{
    entity_class, force_element_visibility, level_class_tag, load_sprite, reassert_presence,
    resolve_sprite_path, run_app, run_app_with_metrics, scaled_sprite_dimensions,
    validate_sprite_path, AppError, BuildContext, Chrome, CommandQueue, CompletionHook,
    ConfigError, ContentError, ControlCommand, ControlError, ControlId, ControlState, Destroyable,
    Display, DisplayMode, Drawable, Element, ElementId, ElementKind, EngineConfig, EntityClass,
    EntityConfig, EntityRegistry, EntitySpec, EventBus, FrameContext, GameControl, GameEvent,
    GameLevel, GameObject, InputAction, InputSnapshot, Interaction, LevelClass, LevelDefinition,
    ListenerId, LoopConfig, LoopMetricsSnapshot, MemoryDisplay, MetricsHandle, NpcRecord,
    NpcRegistry, PixelBuffer, Provenance, RecoveryReport, RegisteredEntity, RenderSurface,
    Renderer, Resizable, Runtime, SpriteError, SpritePathError, Style, SurfaceError,
    SurfaceMetrics, TimerId, Updatable, Viewport, CLEAR_COLOR, LEVEL_ID_KEY, LEVEL_NAME_KEY,
    MAX_COMMANDS_PER_DRAIN, RECOVERY_DELAYS_ENV_VAR, SLOW_FRAME_ENV_VAR,
};

pub const ROOT_ENV_VAR: &str = "ADVENTURE_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "ADVENTURE_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/adventure\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let assets_dir = root.join("assets");
    Ok(AppPaths { root, assets_dir })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            find_root_from(&exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let cwd = env::current_dir().expect("cwd");
        assert!(!is_repo_marker(&cwd.join("definitely_not_a_marker")));
    }

    #[test]
    fn root_is_found_by_walking_upward() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        fs::create_dir(dir.path().join("assets")).expect("assets dir");
        let nested = dir.path().join("target").join("debug");
        fs::create_dir_all(&nested).expect("nested dir");

        let root = find_root_from(&nested).expect("root found");

        assert_eq!(root, normalize_path(dir.path()));
    }

    #[test]
    fn missing_markers_yield_no_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("bin");
        fs::create_dir_all(&nested).expect("nested dir");
        assert!(find_root_from(&nested)
            .map(|root| !root.starts_with(normalize_path(dir.path())))
            .unwrap_or(true));
    }
}
