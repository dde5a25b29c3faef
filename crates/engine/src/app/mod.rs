mod commands;
mod config;
mod control;
mod display;
mod entity;
mod events;
mod input;
mod level;
mod loop_runner;
mod metrics;
mod recovery;
mod registry;
mod rendering;
mod runtime;
mod scheduler;
mod surface;

pub use commands::{CommandQueue, ControlCommand};
pub use config::{ConfigError, EngineConfig, RECOVERY_DELAYS_ENV_VAR};
pub use control::{CompletionHook, ControlError, ControlId, ControlState, GameControl};
pub use display::{
    Chrome, Display, DisplayMode, Element, ElementId, ElementKind, MemoryDisplay, PixelBuffer,
    Provenance, Style, Viewport,
};
pub use entity::{
    entity_class, BuildContext, ContentError, Destroyable, Drawable, EntityClass, EntityConfig,
    EntityRegistry, EntitySpec, FrameContext, GameObject, Interaction, RegisteredEntity,
    Resizable, Updatable, LEVEL_ID_KEY, LEVEL_NAME_KEY,
};
pub use events::{EventBus, GameEvent, ListenerId};
pub use input::{InputAction, InputSnapshot};
pub use level::{level_class_tag, GameLevel, LevelClass, LevelDefinition};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use recovery::{force_element_visibility, reassert_presence, RecoveryReport};
pub use registry::{NpcRecord, NpcRegistry};
pub use rendering::{
    load_sprite, resolve_sprite_path, scaled_sprite_dimensions, validate_sprite_path, Renderer,
    SpriteError, SpritePathError, CLEAR_COLOR,
};
pub use runtime::{Runtime, MAX_COMMANDS_PER_DRAIN};
pub use scheduler::TimerId;
pub use surface::{RenderSurface, SurfaceError, SurfaceMetrics};
