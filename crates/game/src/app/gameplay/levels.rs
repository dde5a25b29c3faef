use std::rc::Rc;

use adventure_engine::{
    ContentError, Display, EntityClass, EntityConfig, EntitySpec, FrameContext, LevelClass,
    LevelDefinition, RenderSurface,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::objects::{Background, Npc, Player};

pub(crate) const AIRPORT: &str = "Airport";
pub(crate) const SILICON_VALLEY: &str = "SiliconValley";
pub(crate) const METEOR_BLASTER: &str = "MeteorBlaster";

pub(crate) const METEOR_BLASTER_GAME: &str = "meteor_blaster";

/// Levels of the top-level game, in play order.
pub(crate) fn main_game() -> Vec<LevelClass> {
    vec![airport(), silicon_valley()]
}

/// Level lists an NPC can launch as a game within the game.
pub(crate) fn nested_game(name: &str) -> Option<Vec<LevelClass>> {
    match name {
        METEOR_BLASTER_GAME => Some(vec![meteor_blaster()]),
        _ => None,
    }
}

pub(crate) fn airport() -> LevelClass {
    LevelClass::new(AIRPORT, |surface| Box::new(Airport::new(surface)))
}

pub(crate) fn silicon_valley() -> LevelClass {
    LevelClass::new(SILICON_VALLEY, |surface| Box::new(SiliconValley::new(surface)))
}

pub(crate) fn meteor_blaster() -> LevelClass {
    LevelClass::new(METEOR_BLASTER, |surface| Box::new(MeteorBlaster::new(surface)))
}

pub(super) fn specs(entries: Vec<(Rc<dyn EntityClass>, Value)>) -> Vec<EntitySpec> {
    entries
        .into_iter()
        .filter_map(|(class, value)| match EntityConfig::from_value(value) {
            Ok(config) => Some(EntitySpec::new(class, config)),
            Err(error) => {
                warn!(entity = class.name(), error = %error, "entity_config_rejected");
                None
            }
        })
        .collect()
}

fn chill_guy(x: f32, y: f32) -> Value {
    json!({
        "id": "Chill Guy",
        "greeting": "Hi I am Chill Guy, the desert wanderer. I am looking for wisdom and adventure!",
        "src": "images/gamify/chillguy.png",
        "scale_factor": 5.0,
        "step_factor": 1000.0,
        "init_position": { "x": x, "y": y }
    })
}

struct Airport {
    width: u32,
    height: u32,
}

impl Airport {
    fn new(surface: &RenderSurface) -> Self {
        let metrics = surface.metrics();
        Self {
            width: metrics.inner_width,
            height: metrics.inner_height,
        }
    }
}

impl LevelDefinition for Airport {
    fn entities(&self) -> Vec<EntitySpec> {
        specs(vec![
            (
                Background::class(),
                json!({
                    "id": "Airport-Background",
                    "src": "images/gamify/airport.png",
                    "color": [132, 176, 214, 255]
                }),
            ),
            (Player::class(), chill_guy(0.0, 0.8)),
            (
                Npc::class(),
                json!({
                    "id": "Pilot",
                    "greeting": "Greetings passenger! Ready to blast some meteors before we depart?",
                    "src": "images/gamify/pilot.png",
                    "init_position": { "x": 0.1, "y": 0.2 },
                    "action": { "kind": "nested_game", "game": METEOR_BLASTER_GAME }
                }),
            ),
            (
                Npc::class(),
                json!({
                    "id": "Worker",
                    "greeting": "Hey there! I'm a stock market advisor. The plane to Silicon Valley is about to depart!",
                    "src": "images/gamify/worker.png",
                    "scale_factor": 3.5,
                    "color": [120, 200, 120, 255],
                    "init_position": { "x": 0.6, "y": 0.7 },
                    "drop_items": [
                        { "id": "stock_guide", "name": "Stock Market Guide" },
                        { "id": "trading_chip", "name": "Trading Chip", "quantity": 5 }
                    ]
                }),
            ),
            (
                Npc::class(),
                json!({
                    "id": "Gate Agent",
                    "greeting": "Boarding now. Enjoy Silicon Valley!",
                    "color": [200, 90, 90, 255],
                    "init_position": { "x": 0.85, "y": 0.45 },
                    "action": { "kind": "end_level" }
                }),
            ),
        ])
    }

    fn initialize(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        info!(
            level = AIRPORT,
            width = self.width,
            height = self.height,
            npcs = ctx.npcs.len(),
            "airport_boarding_open"
        );
        Ok(())
    }
}

struct SiliconValley;

impl SiliconValley {
    fn new(_surface: &RenderSurface) -> Self {
        Self
    }
}

impl LevelDefinition for SiliconValley {
    fn entities(&self) -> Vec<EntitySpec> {
        specs(vec![
            (
                Background::class(),
                json!({
                    "id": "SiliconValley-Background",
                    "src": "images/gamify/siliconvalley.png",
                    "color": [70, 110, 80, 255]
                }),
            ),
            (Player::class(), chill_guy(0.05, 0.75)),
            (
                Npc::class(),
                json!({
                    "id": "Investor",
                    "greeting": "Welcome to the valley. Got a pitch for me?",
                    "src": "images/gamify/investor.png",
                    "init_position": { "x": 0.4, "y": 0.3 },
                    "drop_items": [{ "id": "term_sheet", "name": "Term Sheet" }]
                }),
            ),
            (
                Npc::class(),
                json!({
                    "id": "Exit",
                    "greeting": "Your journey ends here. Thanks for playing!",
                    "color": [230, 230, 230, 255],
                    "init_position": { "x": 0.9, "y": 0.1 },
                    "action": { "kind": "end_level" }
                }),
            ),
        ])
    }
}

/// Nested mini-game. Ends when the player reaches the exit beacon.
struct MeteorBlaster {
    frames_survived: u64,
}

impl MeteorBlaster {
    fn new(_surface: &RenderSurface) -> Self {
        Self { frames_survived: 0 }
    }
}

impl LevelDefinition for MeteorBlaster {
    fn entities(&self) -> Vec<EntitySpec> {
        specs(vec![
            (
                Background::class(),
                json!({
                    "id": "Space-Background",
                    "src": "images/gamify/space.png",
                    "color": [8, 8, 24, 255]
                }),
            ),
            (
                Player::class(),
                json!({
                    "id": "Ufo",
                    "src": "images/gamify/ufo.png",
                    "color": [180, 180, 255, 255],
                    "scale_factor": 5.0,
                    "step_factor": 1000.0,
                    "init_position": { "x": 0.0, "y": 0.0 }
                }),
            ),
            (
                Npc::class(),
                json!({
                    "id": "Exit Beacon",
                    "greeting": "Congratulations! You've survived the meteor storm!",
                    "color": [255, 255, 120, 255],
                    "scale_factor": 8.0,
                    "init_position": { "x": 0.9, "y": 0.08 },
                    "action": { "kind": "end_level" }
                }),
            ),
        ])
    }

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        self.frames_survived += 1;
        Ok(())
    }

    fn destroy(&mut self, _display: &mut dyn Display) -> Result<(), ContentError> {
        info!(
            level = METEOR_BLASTER,
            frames_survived = self.frames_survived,
            "meteor_storm_over"
        );
        Ok(())
    }
}
