use std::cell::RefCell;
use std::rc::Rc;

use adventure_engine::{
    ControlId, Display, ElementId, EngineConfig, EntityClass, EntitySpec, GameEvent, InputAction,
    LevelClass, LevelDefinition, Runtime, Viewport,
};
use serde_json::{json, Value};

use super::levels::{
    main_game, nested_game, specs, AIRPORT, METEOR_BLASTER, METEOR_BLASTER_GAME, SILICON_VALLEY,
};
use super::objects::{Background, Npc, Player};

type Entries = Vec<(Rc<dyn EntityClass>, Value)>;

struct TestLevel {
    entries: Entries,
}

impl LevelDefinition for TestLevel {
    fn entities(&self) -> Vec<EntitySpec> {
        specs(self.entries.clone())
    }
}

fn test_level(name: &str, entries: Entries) -> LevelClass {
    LevelClass::new(name, move |_| {
        Box::new(TestLevel {
            entries: entries.clone(),
        })
    })
}

fn runtime() -> Runtime {
    Runtime::headless(
        EngineConfig::default(),
        Viewport {
            width: 800,
            height: 600,
        },
    )
}

fn hero(x: f32, y: f32) -> (Rc<dyn EntityClass>, Value) {
    (
        Player::class(),
        json!({ "id": "Hero", "init_position": { "x": x, "y": y } }),
    )
}

fn press(runtime: &mut Runtime, action: InputAction) {
    runtime.key_down(action);
    runtime.key_up(action);
}

fn level_name(runtime: &Runtime, id: ControlId) -> String {
    runtime
        .control(id)
        .and_then(|control| control.current_level())
        .map(|level| level.name().to_string())
        .expect("control has a level")
}

#[test]
fn main_game_builds_airport_with_fallback_art() {
    let mut runtime = runtime();
    let id = runtime.launch(main_game()).expect("main game starts");
    runtime.run_frame();

    let level = runtime
        .control(id)
        .and_then(|control| control.current_level())
        .expect("airport level");
    assert_eq!(level.name(), AIRPORT);
    assert_eq!(level.entity_count(), 5);
    assert_eq!(level.construct_failures(), 0);

    let canvas = runtime
        .display()
        .element(&runtime.config().primary_canvas())
        .expect("primary canvas");
    assert_eq!(canvas.pixels().pixel(10, 10), Some([132, 176, 214, 255]));
    for npc in ["Pilot", "Worker", "Gate Agent"] {
        assert!(runtime.npcs().get(npc).is_some(), "npc={npc}");
    }
}

#[test]
fn nested_games_resolve_by_name() {
    let names: Vec<String> = nested_game(METEOR_BLASTER_GAME)
        .expect("meteor blaster")
        .iter()
        .map(|level| level.name().to_string())
        .collect();
    assert_eq!(names, vec![METEOR_BLASTER.to_string()]);
    assert!(nested_game(SILICON_VALLEY).is_none());
    assert!(nested_game("silicon_valley").is_none());
}

#[test]
fn interaction_out_of_reach_is_ignored() {
    let mut runtime = runtime();
    let id = runtime.launch(main_game()).expect("main game starts");
    runtime.run_frame();

    press(&mut runtime, InputAction::Interact);
    runtime.run_frame();

    assert_eq!(level_name(&runtime, id), AIRPORT);
    assert_eq!(runtime.controls().count(), 1);
    assert_eq!(
        runtime.npcs().get("Pilot").map(|record| record.interactions),
        Some(0)
    );
}

#[test]
fn npc_in_reach_ends_level_and_advances() {
    let mut runtime = runtime();
    let first = test_level(
        "Gate",
        vec![
            hero(0.5, 0.5),
            (
                Npc::class(),
                json!({
                    "id": "Guide",
                    "init_position": { "x": 0.5, "y": 0.5 },
                    "action": { "kind": "end_level" }
                }),
            ),
        ],
    );
    let second = test_level(
        "Plane",
        vec![(Background::class(), json!({ "id": "Cabin" }))],
    );
    let id = runtime.launch(vec![first, second]).expect("game starts");
    runtime.run_frame();

    press(&mut runtime, InputAction::Interact);
    runtime.run_frame();

    let control = runtime.control(id).expect("control");
    assert_eq!(control.level_index(), 1);
    assert_eq!(level_name(&runtime, id), "Plane");
    assert_eq!(
        runtime.npcs().get("Guide").map(|record| record.interactions),
        Some(1)
    );
}

#[test]
fn npc_drops_only_one_item() {
    let mut runtime = runtime();
    let dropped = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&dropped);
    runtime.events_mut().subscribe(move |event| {
        if let GameEvent::InventoryUpdated { item_id: Some(item_id) } = event {
            sink.borrow_mut().push(item_id.clone());
        }
    });
    let level = test_level(
        "Market",
        vec![
            hero(0.3, 0.3),
            (
                Npc::class(),
                json!({
                    "id": "Worker",
                    "init_position": { "x": 0.3, "y": 0.3 },
                    "drop_items": [{ "id": "stock_guide" }, { "id": "trading_chip" }]
                }),
            ),
        ],
    );
    runtime.launch(vec![level]).expect("game starts");
    runtime.run_frame();

    press(&mut runtime, InputAction::Interact);
    press(&mut runtime, InputAction::Interact);

    assert_eq!(*dropped.borrow(), vec!["stock_guide".to_string()]);
    assert_eq!(
        runtime.npcs().get("Worker").map(|record| record.interactions),
        Some(2)
    );
}

#[test]
fn pilot_runs_meteor_blaster_and_exit_resumes_parent() {
    let mut runtime = runtime();
    let lounge = test_level(
        "Lounge",
        vec![
            (Background::class(), json!({ "id": "Lounge-Background" })),
            hero(0.1, 0.2),
            (
                Npc::class(),
                json!({
                    "id": "Pilot",
                    "init_position": { "x": 0.1, "y": 0.2 },
                    "action": { "kind": "nested_game", "game": METEOR_BLASTER_GAME }
                }),
            ),
        ],
    );
    let parent = runtime.launch(vec![lounge]).expect("game starts");
    runtime.run_frame();

    press(&mut runtime, InputAction::Interact);

    assert!(runtime.control(parent).expect("parent").is_paused());
    let child = runtime
        .controls()
        .map(|control| control.id())
        .find(|id| *id != parent)
        .expect("nested game spawned");
    assert_eq!(level_name(&runtime, child), METEOR_BLASTER);

    runtime.key_down(InputAction::MoveRight);
    for _ in 0..300 {
        runtime.run_frame();
    }
    runtime.key_up(InputAction::MoveRight);

    press(&mut runtime, InputAction::Interact);
    runtime.run_frame();

    let child_control = runtime.control(child).expect("child");
    assert!(child_control.is_terminal());
    let parent_control = runtime.control(parent).expect("parent");
    assert!(!parent_control.is_paused());
    assert_eq!(parent_control.resume_count(), 1);
    assert_eq!(level_name(&runtime, parent), "Lounge");
}

#[test]
fn unknown_nested_game_fails_only_that_npc() {
    let mut runtime = runtime();
    let level = test_level(
        "Broken",
        vec![
            (Background::class(), json!({ "id": "Backdrop" })),
            (
                Npc::class(),
                json!({
                    "id": "Lost",
                    "init_position": { "x": 0.5, "y": 0.5 },
                    "action": { "kind": "nested_game", "game": "nowhere" }
                }),
            ),
            hero(0.1, 0.1),
        ],
    );
    let id = runtime.launch(vec![level]).expect("game starts");

    let level = runtime
        .control(id)
        .and_then(|control| control.current_level())
        .expect("level");
    assert_eq!(level.entity_count(), 2);
    assert_eq!(level.construct_failures(), 1);
    assert!(runtime.npcs().get("Lost").is_none());
}

#[test]
fn player_movement_is_clamped_to_surface() {
    let mut runtime = runtime();
    let id = runtime
        .launch(vec![test_level("Walk", vec![hero(0.0, 0.0)])])
        .expect("game starts");
    let element = ElementId::new(format!("{id}-walk-hero"));

    runtime.key_down(InputAction::MoveLeft);
    runtime.key_down(InputAction::MoveUp);
    for _ in 0..5 {
        runtime.run_frame();
    }
    runtime.key_up(InputAction::MoveLeft);
    runtime.key_up(InputAction::MoveUp);
    let style = *runtime.display().element(&element).expect("hero").style();
    assert_eq!((style.left, style.top), (0, 0));

    runtime.key_down(InputAction::MoveRight);
    for _ in 0..400 {
        runtime.run_frame();
    }
    let hero = runtime.display().element(&element).expect("hero");
    assert_eq!(hero.style().left, 800 - hero.pixels().width() as i32);
}
