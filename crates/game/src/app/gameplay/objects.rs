use std::rc::Rc;

use adventure_engine::{
    entity_class, load_sprite, resolve_sprite_path, BuildContext, ContentError, ControlId,
    Destroyable, Display, Drawable, Element, ElementId, EntityClass, EntityConfig, FrameContext,
    GameEvent, GameObject, InputAction, Interaction, PixelBuffer, Resizable, SurfaceMetrics,
    Updatable,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::levels;

pub(crate) const PLAYER_CLASS: &str = "player";
pub(crate) const NPC_CLASS: &str = "npc";

/// Extra pixels around an NPC within which the player counts as touching it.
const REACH_MARGIN_PX: i32 = 24;
const DEFAULT_SCALE_FACTOR: f32 = 5.0;
const DEFAULT_STEP_FACTOR: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub(crate) struct Position {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

impl Rect {
    fn expanded(self, margin: i32) -> Self {
        Self {
            left: self.left - margin,
            top: self.top - margin,
            width: (self.width as i32 + margin * 2).max(0) as u32,
            height: (self.height as i32 + margin * 2).max(0) as u32,
        }
    }

    fn intersects(&self, other: &Rect) -> bool {
        self.left < other.left + other.width as i32
            && other.left < self.left + self.width as i32
            && self.top < other.top + other.height as i32
            && other.top < self.top + self.height as i32
    }
}

/// Sprite pixels or, when the image is unavailable, a flat colour block.
#[derive(Debug, Clone)]
struct Art {
    sprite: Option<PixelBuffer>,
    color: [u8; 4],
}

impl Art {
    fn load(surface: &SurfaceMetrics, entity: &str, src: Option<&str>, color: [u8; 4]) -> Self {
        let sprite = src.and_then(|src| {
            let loaded = resolve_sprite_path(&surface.asset_root, src)
                .and_then(|path| load_sprite(&path));
            match loaded {
                Ok(sprite) => Some(sprite),
                Err(error) => {
                    warn!(entity, src, error = %error, "sprite_fallback_to_color");
                    None
                }
            }
        });
        Self { sprite, color }
    }

    /// On-screen size: `1/scale_factor` of the surface height, keeping the
    /// sprite's aspect ratio.
    fn frame_size(&self, surface: &SurfaceMetrics, scale_factor: f32) -> (u32, u32) {
        let scale_factor = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor
        } else {
            DEFAULT_SCALE_FACTOR
        };
        let height = (surface.inner_height as f32 / scale_factor).round().max(1.0) as u32;
        let width = match &self.sprite {
            Some(sprite) if !sprite.is_empty() => {
                let aspect = sprite.width() as f32 / sprite.height() as f32;
                (height as f32 * aspect).round().max(1.0) as u32
            }
            _ => height,
        };
        (width, height)
    }

    fn render(&self, width: u32, height: u32) -> PixelBuffer {
        match &self.sprite {
            Some(sprite) => sprite.scaled(width, height),
            None => {
                let mut pixels = PixelBuffer::new(width, height);
                pixels.fill(self.color);
                pixels
            }
        }
    }
}

fn element_id_for(control: ControlId, level_name: &str, entity: &str) -> ElementId {
    let slug: String = entity
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    ElementId::new(format!("{control}-{}-{slug}", level_name.to_ascii_lowercase()))
}

fn to_pixels(position: Position, surface: &SurfaceMetrics) -> (i32, i32) {
    (
        (position.x * surface.inner_width as f32).round() as i32,
        (position.y * surface.inner_height as f32).round() as i32,
    )
}

fn element_rect(display: &dyn Display, id: &ElementId) -> Option<Rect> {
    let element = display.element(id)?;
    let style = element.style();
    Some(Rect {
        left: style.left,
        top: style.top,
        width: element.pixels().width(),
        height: element.pixels().height(),
    })
}

/// Whether an attached player canvas of `control` overlaps `rect`.
fn player_within(display: &dyn Display, control: ControlId, rect: Rect) -> bool {
    display.element_ids().iter().any(|id| {
        display.element(id).is_some_and(|element| {
            element.is_attached()
                && element.has_class(PLAYER_CLASS)
                && element.is_owned_by(control)
        }) && element_rect(display, id).is_some_and(|player| player.intersects(&rect))
    })
}

/// Writes `pixels` into the canvas `id` and moves it to `(left, top)`.
fn paint_canvas(
    display: &mut dyn Display,
    id: &ElementId,
    pixels: &PixelBuffer,
    left: i32,
    top: i32,
) {
    if let Some(element) = display.element_mut(id) {
        let canvas = element.pixels_mut();
        if canvas.width() != pixels.width() || canvas.height() != pixels.height() {
            canvas.resize(pixels.width(), pixels.height());
        }
        canvas.put(pixels);
        let style = element.style_mut();
        style.absolute = true;
        style.left = left;
        style.top = top;
    }
}

#[derive(Debug, Deserialize)]
struct BackgroundData {
    id: String,
    #[serde(default)]
    src: Option<String>,
    #[serde(default = "default_background_color")]
    color: [u8; 4],
}

fn default_background_color() -> [u8; 4] {
    [40, 44, 52, 255]
}

/// Full-surface backdrop painted onto the level's primary canvas.
pub(crate) struct Background {
    id: String,
    art: Art,
    canvas: ElementId,
    cached: Option<PixelBuffer>,
}

impl Background {
    pub(crate) fn class() -> Rc<dyn EntityClass> {
        entity_class("Background", |config, ctx| {
            Ok(Box::new(Background::build(config, ctx)?) as Box<dyn GameObject>)
        })
    }

    fn build(config: &EntityConfig, ctx: &mut BuildContext<'_>) -> Result<Self, ContentError> {
        let data: BackgroundData = config.parse("Background")?;
        let art = Art::load(ctx.surface, &data.id, data.src.as_deref(), data.color);
        Ok(Self {
            id: data.id,
            art,
            canvas: ctx.surface.canvas_id.clone(),
            cached: None,
        })
    }

    fn frame(&mut self, display: &dyn Display) -> Option<&PixelBuffer> {
        let (width, height) = display
            .element(&self.canvas)
            .map(|canvas| (canvas.pixels().width(), canvas.pixels().height()))?;
        let stale = self
            .cached
            .as_ref()
            .map_or(true, |cached| cached.width() != width || cached.height() != height);
        if stale {
            self.cached = Some(self.art.render(width, height));
        }
        self.cached.as_ref()
    }
}

impl Updatable for Background {
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        self.draw(&mut *ctx.display)
    }
}

impl Resizable for Background {
    fn resize(&mut self, _surface: &SurfaceMetrics, _display: &mut dyn Display) {
        self.cached = None;
    }
}

impl Destroyable for Background {
    fn destroy(&mut self, _display: &mut dyn Display) {
        self.cached = None;
        debug!(entity = %self.id, "background_destroyed");
    }
}

impl Drawable for Background {
    fn draw(&mut self, display: &mut dyn Display) -> Result<(), ContentError> {
        let canvas = self.canvas.clone();
        let Some(frame) = self.frame(&*display).cloned() else {
            return Err(ContentError::message(format!(
                "background '{}' has no canvas '{canvas}'",
                self.id
            )));
        };
        if let Some(element) = display.element_mut(&canvas) {
            element.pixels_mut().put(&frame);
        }
        Ok(())
    }
}

impl GameObject for Background {
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }

    fn refresh_state(&mut self) {
        self.cached = None;
    }
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    id: String,
    #[serde(default)]
    src: Option<String>,
    #[serde(default = "default_player_color")]
    color: [u8; 4],
    #[serde(default = "default_scale_factor")]
    scale_factor: f32,
    #[serde(default = "default_step_factor")]
    step_factor: f32,
    init_position: Position,
    #[serde(default)]
    greeting: Option<String>,
}

fn default_player_color() -> [u8; 4] {
    [90, 200, 250, 255]
}

fn default_scale_factor() -> f32 {
    DEFAULT_SCALE_FACTOR
}

fn default_step_factor() -> f32 {
    DEFAULT_STEP_FACTOR
}

/// Keyboard-driven character with its own canvas.
pub(crate) struct Player {
    id: String,
    element: ElementId,
    art: Art,
    scale_factor: f32,
    step_factor: f32,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    bounds: (u32, u32),
    dirty: bool,
}

impl Player {
    pub(crate) fn class() -> Rc<dyn EntityClass> {
        entity_class("Player", |config, ctx| {
            Ok(Box::new(Player::build(config, ctx)?) as Box<dyn GameObject>)
        })
    }

    fn build(config: &EntityConfig, ctx: &mut BuildContext<'_>) -> Result<Self, ContentError> {
        let data: PlayerData = config.parse("Player")?;
        let surface = ctx.surface;
        let art = Art::load(surface, &data.id, data.src.as_deref(), data.color);
        let (width, height) = art.frame_size(surface, data.scale_factor);
        let (x, y) = to_pixels(data.init_position, surface);
        let id = element_id_for(ctx.control(), &surface.level_name, &data.id);
        let element = ctx.register_element(
            Element::canvas(id, width, height)
                .with_class(PLAYER_CLASS)
                .with_position(x, y),
        );
        if let Some(greeting) = data.greeting.as_deref() {
            debug!(entity = %data.id, greeting, "player_greeting");
        }
        let mut player = Self {
            id: data.id,
            element,
            art,
            scale_factor: data.scale_factor,
            step_factor: data.step_factor,
            x,
            y,
            width,
            height,
            bounds: (surface.inner_width, surface.inner_height),
            dirty: true,
        };
        player.clamp_to_bounds();
        Ok(player)
    }

    fn step(&self) -> i32 {
        let factor = if self.step_factor > 0.0 {
            self.step_factor
        } else {
            DEFAULT_STEP_FACTOR
        };
        ((self.bounds.0 as f32 / factor) * 5.0).round().max(1.0) as i32
    }

    fn clamp_to_bounds(&mut self) {
        let max_x = self.bounds.0.saturating_sub(self.width) as i32;
        let max_y = self.bounds.1.saturating_sub(self.height) as i32;
        self.x = self.x.clamp(0, max_x);
        self.y = self.y.clamp(0, max_y);
    }
}

impl Updatable for Player {
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        let step = self.step();
        let (before_x, before_y) = (self.x, self.y);
        if ctx.input.is_down(InputAction::MoveLeft) {
            self.x -= step;
        }
        if ctx.input.is_down(InputAction::MoveRight) {
            self.x += step;
        }
        if ctx.input.is_down(InputAction::MoveUp) {
            self.y -= step;
        }
        if ctx.input.is_down(InputAction::MoveDown) {
            self.y += step;
        }
        self.clamp_to_bounds();
        if (self.x, self.y) != (before_x, before_y) {
            self.dirty = true;
        }
        if self.dirty {
            self.draw(&mut *ctx.display)?;
        }
        Ok(())
    }
}

impl Resizable for Player {
    fn resize(&mut self, surface: &SurfaceMetrics, display: &mut dyn Display) {
        let (width, height) = self.art.frame_size(surface, self.scale_factor);
        self.width = width;
        self.height = height;
        self.bounds = (surface.inner_width, surface.inner_height);
        self.clamp_to_bounds();
        self.dirty = true;
        if let Err(error) = self.draw(display) {
            warn!(entity = %self.id, error = %error, "player_resize_draw_failed");
        }
    }
}

impl Destroyable for Player {
    fn destroy(&mut self, _display: &mut dyn Display) {
        debug!(entity = %self.id, x = self.x, y = self.y, "player_destroyed");
    }
}

impl Drawable for Player {
    fn draw(&mut self, display: &mut dyn Display) -> Result<(), ContentError> {
        if !display.contains(&self.element) {
            return Err(ContentError::message(format!(
                "player canvas '{}' is missing",
                self.element
            )));
        }
        let pixels = self.art.render(self.width, self.height);
        paint_canvas(display, &self.element, &pixels, self.x, self.y);
        self.dirty = false;
        Ok(())
    }
}

impl GameObject for Player {
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }

    fn refresh_state(&mut self) {
        self.dirty = true;
    }

    fn redraw(&mut self, display: &mut dyn Display) {
        if let Err(error) = self.draw(display) {
            warn!(entity = %self.id, error = %error, "player_redraw_failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum NpcAction {
    Greet,
    EndLevel,
    NestedGame { game: String },
}

impl Default for NpcAction {
    fn default() -> Self {
        Self::Greet
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DropItem {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default = "default_quantity")]
    pub(crate) quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct NpcData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    greeting: Option<String>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default = "default_npc_color")]
    color: [u8; 4],
    #[serde(default = "default_scale_factor")]
    scale_factor: f32,
    init_position: Position,
    #[serde(default)]
    action: NpcAction,
    #[serde(default)]
    drop_items: Vec<DropItem>,
}

fn default_npc_color() -> [u8; 4] {
    [240, 180, 60, 255]
}

/// Non-player character. Interacting with it while the player is in reach
/// greets, hands out one item and then runs its action.
pub(crate) struct Npc {
    id: String,
    greeting: String,
    element: ElementId,
    art: Art,
    scale_factor: f32,
    position: Position,
    rect: Rect,
    action: NpcAction,
    drop_items: Vec<DropItem>,
    has_dropped_item: bool,
}

impl Npc {
    pub(crate) fn class() -> Rc<dyn EntityClass> {
        entity_class("Npc", |config, ctx| {
            Ok(Box::new(Npc::build(config, ctx)?) as Box<dyn GameObject>)
        })
    }

    fn build(config: &EntityConfig, ctx: &mut BuildContext<'_>) -> Result<Self, ContentError> {
        let data: NpcData = config.parse("Npc")?;
        if let NpcAction::NestedGame { game } = &data.action {
            if levels::nested_game(game).is_none() {
                return Err(ContentError::message(format!(
                    "npc action names unknown nested game '{game}'"
                )));
            }
        }
        let id = match data.id {
            Some(id) => id,
            None => ctx.npcs.next_anonymous_id(),
        };
        let surface = ctx.surface;
        let art = Art::load(surface, &id, data.src.as_deref(), data.color);
        let (width, height) = art.frame_size(surface, data.scale_factor);
        let (left, top) = to_pixels(data.init_position, surface);
        let control = ctx.control();
        let element_id = element_id_for(control, &surface.level_name, &id);
        let element = ctx.register_element(
            Element::canvas(element_id, width, height)
                .with_class(NPC_CLASS)
                .with_position(left, top),
        );
        ctx.npcs.register(id.clone(), control, &surface.level_name);

        let mut npc = Self {
            greeting: data.greeting.unwrap_or_else(|| format!("Hello, I am {id}.")),
            id,
            element,
            art,
            scale_factor: data.scale_factor,
            position: data.init_position,
            rect: Rect {
                left,
                top,
                width,
                height,
            },
            action: data.action,
            drop_items: data.drop_items,
            has_dropped_item: false,
        };
        npc.draw(&mut *ctx.display)?;
        Ok(npc)
    }

    fn drop_item(&mut self, ctx: &mut FrameContext<'_>) {
        if self.has_dropped_item {
            return;
        }
        let Some(item) = self.drop_items.first() else {
            return;
        };
        self.has_dropped_item = true;
        info!(
            npc = %self.id,
            item = %item.id,
            name = item.name.as_deref().unwrap_or(item.id.as_str()),
            quantity = item.quantity,
            "npc_dropped_item"
        );
        ctx.commands.emit(GameEvent::InventoryUpdated {
            item_id: Some(item.id.clone()),
        });
    }
}

impl Updatable for Npc {
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        if ctx.display.contains(&self.element) && !ctx.display.is_attached(&self.element) {
            ctx.display.attach(&self.element);
            debug!(npc = %self.id, "npc_reattached");
        }
        Ok(())
    }
}

impl Resizable for Npc {
    fn resize(&mut self, surface: &SurfaceMetrics, display: &mut dyn Display) {
        let (width, height) = self.art.frame_size(surface, self.scale_factor);
        let (left, top) = to_pixels(self.position, surface);
        self.rect = Rect {
            left,
            top,
            width,
            height,
        };
        if let Err(error) = self.draw(display) {
            warn!(npc = %self.id, error = %error, "npc_resize_draw_failed");
        }
    }
}

impl Destroyable for Npc {
    fn destroy(&mut self, _display: &mut dyn Display) {
        debug!(npc = %self.id, "npc_destroyed");
    }
}

impl Drawable for Npc {
    fn draw(&mut self, display: &mut dyn Display) -> Result<(), ContentError> {
        if !display.contains(&self.element) {
            return Err(ContentError::message(format!(
                "npc canvas '{}' is missing",
                self.element
            )));
        }
        let pixels = self.art.render(self.rect.width, self.rect.height);
        paint_canvas(display, &self.element, &pixels, self.rect.left, self.rect.top);
        Ok(())
    }
}

impl GameObject for Npc {
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }

    fn redraw(&mut self, display: &mut dyn Display) {
        if let Err(error) = self.draw(display) {
            warn!(npc = %self.id, error = %error, "npc_redraw_failed");
        }
    }

    fn interact(&mut self, ctx: &mut FrameContext<'_>) -> Result<Interaction, ContentError> {
        let control = ctx.control();
        let reach = self.rect.expanded(REACH_MARGIN_PX);
        if !player_within(&*ctx.display, control, reach) {
            return Ok(Interaction::Ignored);
        }
        let interactions = ctx.npcs.record_interaction(&self.id).unwrap_or(0);
        info!(
            npc = %self.id,
            greeting = %self.greeting,
            interactions,
            "npc_greeting"
        );
        self.drop_item(ctx);

        match &self.action {
            NpcAction::Greet => {}
            NpcAction::EndLevel => {
                info!(npc = %self.id, "npc_ends_level");
                ctx.commands.end_level(control);
            }
            NpcAction::NestedGame { game } => {
                let Some(levels) = levels::nested_game(game) else {
                    return Err(ContentError::message(format!(
                        "unknown nested game '{game}'"
                    )));
                };
                info!(npc = %self.id, game = %game, "npc_starts_nested_game");
                ctx.commands.start_nested(control, levels);
            }
        }
        Ok(Interaction::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_expansion_reaches_neighbours() {
        let npc = Rect {
            left: 100,
            top: 100,
            width: 10,
            height: 10,
        };
        let player = Rect {
            left: 120,
            top: 100,
            width: 10,
            height: 10,
        };
        assert!(!npc.intersects(&player));
        assert!(npc.expanded(REACH_MARGIN_PX).intersects(&player));
    }

    #[test]
    fn element_ids_are_slugged_per_control_and_level() {
        let id = element_id_for(ControlId(3), "Airport", "Chill Guy");
        assert_eq!(id.as_str(), "control-3-airport-chill-guy");
    }

    #[test]
    fn npc_action_defaults_to_greeting() {
        assert_eq!(NpcAction::default(), NpcAction::Greet);
    }

    #[test]
    fn nested_game_action_parses_by_kind() {
        let action: NpcAction =
            serde_json::from_value(serde_json::json!({"kind": "nested_game", "game": "x"}))
                .expect("action parses");
        assert_eq!(
            action,
            NpcAction::NestedGame {
                game: "x".to_string()
            }
        );
    }
}
