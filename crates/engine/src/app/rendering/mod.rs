mod renderer;
mod sprite;

pub use renderer::{Renderer, CLEAR_COLOR};
pub use sprite::{
    load_sprite, resolve_sprite_path, scaled_sprite_dimensions, validate_sprite_path,
    SpriteError, SpritePathError,
};
