use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::control::ControlId;
use super::display::{Display, Provenance};
use super::entity::{
    BuildContext, ContentError, EntitySpec, FrameContext, Interaction, RegisteredEntity,
    LEVEL_ID_KEY, LEVEL_NAME_KEY,
};
use super::recovery::{self, RecoveryReport};
use super::runtime::Host;
use super::scheduler::{TimerId, TimerTask};
use super::surface::RenderSurface;

/// Content supplied for one scene. Hooks are optional.
pub trait LevelDefinition {
    fn entities(&self) -> Vec<EntitySpec>;

    fn initialize(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), ContentError> {
        Ok(())
    }

    fn destroy(&mut self, _display: &mut dyn Display) -> Result<(), ContentError> {
        Ok(())
    }
}

type LevelConstructor = dyn Fn(&RenderSurface) -> Box<dyn LevelDefinition>;

#[derive(Clone)]
pub struct LevelClass {
    name: String,
    constructor: Rc<LevelConstructor>,
}

impl LevelClass {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&RenderSurface) -> Box<dyn LevelDefinition> + 'static,
    {
        Self {
            name: name.into(),
            constructor: Rc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self, surface: &RenderSurface) -> Box<dyn LevelDefinition> {
        (self.constructor)(surface)
    }
}

impl fmt::Debug for LevelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelClass")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn level_class_tag(level_name: &str) -> String {
    format!("level-{level_name}")
}

/// One activation of a level: its surface, its entities and its
/// continuation flag.
pub struct GameLevel {
    name: String,
    generation: u64,
    surface: RenderSurface,
    definition: Box<dyn LevelDefinition>,
    continue_running: bool,
    destroyed: bool,
    construct_failures: usize,
    consistency_timer: Option<TimerId>,
}

impl fmt::Debug for GameLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLevel")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("entities", self.surface.entities())
            .field("continue_running", &self.continue_running)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl GameLevel {
    pub(crate) fn create(
        class: &LevelClass,
        control: ControlId,
        generation: u64,
        host: &mut Host<'_>,
    ) -> Self {
        let name = class.name().to_string();
        let mut surface = RenderSurface::new(
            host.config.primary_canvas(),
            control,
            name.as_str(),
            host.config.asset_root.clone(),
        );
        if surface.create(&mut *host.display).is_err() {
            debug!(level = %name, "level_surface_unbound");
        }

        let mut definition = class.construct(&surface);
        let level_tag = level_class_tag(&name);
        let mut construct_failures = 0;

        for (index, spec) in definition.entities().into_iter().enumerate() {
            let class_name = spec.class.name().to_string();
            let config = spec
                .config
                .clone()
                .with(LEVEL_NAME_KEY, name.as_str())
                .with(LEVEL_ID_KEY, level_tag.as_str());

            let mut ctx = BuildContext::new(surface.metrics(), &mut *host.display, &mut *host.npcs);
            let result = spec.class.construct(&config, &mut ctx);
            let elements = ctx.into_registered();

            match result {
                Ok(object) => {
                    for id in &elements {
                        if let Some(element) = host.display.element_mut(id) {
                            element.set_provenance(Provenance {
                                control,
                                level_name: name.clone(),
                            });
                            element.add_class(level_tag.as_str());
                        }
                    }
                    surface
                        .entities_mut()
                        .push(RegisteredEntity::new(class_name, object, elements));
                }
                Err(error) => {
                    construct_failures += 1;
                    for id in &elements {
                        if id != surface.canvas_id() {
                            host.display.remove(id);
                        }
                    }
                    warn!(
                        level = %name,
                        entity = %class_name,
                        index,
                        error = %error,
                        "entity_construct_failed"
                    );
                }
            }
        }

        {
            let mut ctx = host.frame_context(surface.metrics(), 0);
            if let Err(error) = definition.initialize(&mut ctx) {
                warn!(level = %name, error = %error, "level_initialize_failed");
            }
        }

        let consistency_timer = host.timers.schedule(
            host.config.consistency_check_delay(),
            TimerTask::ConsistencyCheck {
                control,
                generation,
            },
        );

        info!(
            level = %name,
            control = %control,
            entity_count = surface.entities().len(),
            construct_failures,
            "level_created"
        );

        Self {
            name,
            generation,
            surface,
            definition,
            continue_running: true,
            destroyed: false,
            construct_failures,
            consistency_timer: Some(consistency_timer),
        }
    }

    pub(crate) fn update(&mut self, host: &mut Host<'_>, frame: u64) {
        if self.destroyed {
            return;
        }
        self.surface.clear(&mut *host.display);

        let (metrics, entities) = self.surface.split_mut();
        for entry in entities.iter_mut() {
            let mut ctx = host.frame_context(metrics, frame);
            if let Err(error) = entry.object_mut().update(&mut ctx) {
                warn!(
                    level = %self.name,
                    entity = entry.class_name(),
                    error = %error,
                    "entity_update_failed"
                );
            }
        }

        let mut ctx = host.frame_context(self.surface.metrics(), frame);
        if let Err(error) = self.definition.update(&mut ctx) {
            warn!(level = %self.name, error = %error, "level_update_failed");
        }
    }

    /// Runs the level hook, destroys entities newest first and releases
    /// the surface. Later calls do nothing.
    pub fn destroy(&mut self, display: &mut dyn Display) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Err(error) = self.definition.destroy(display) {
            warn!(level = %self.name, error = %error, "level_destroy_hook_failed");
        }

        let primary = self.surface.canvas_id().clone();
        let mut destroyed = 0usize;
        while let Some(entry) = self.surface.entities_mut().pop() {
            let (class_name, mut object, elements) = entry.into_parts();
            object.destroy(display);
            for id in elements.iter().filter(|id| **id != primary) {
                display.remove(id);
            }
            destroyed += 1;
            debug!(level = %self.name, entity = %class_name, "entity_destroyed");
        }
        self.surface.release();

        info!(level = %self.name, entity_count = destroyed, "level_destroyed");
    }

    pub fn resize(&mut self, display: &mut dyn Display) {
        if self.destroyed {
            return;
        }
        if self.surface.resize(display).is_err() {
            debug!(level = %self.name, "level_surface_unbound");
        }
        let (metrics, entities) = self.surface.split_mut();
        for entry in entities.iter_mut() {
            entry.object_mut().resize(metrics, display);
        }
    }

    pub(crate) fn interact(&mut self, host: &mut Host<'_>, frame: u64) -> bool {
        if self.destroyed {
            return false;
        }
        let mut handled = false;
        let (metrics, entities) = self.surface.split_mut();
        for entry in entities.iter_mut() {
            let nested_before = host.commands.nested_start_count();
            let mut ctx = host.frame_context(metrics, frame);
            match entry.object_mut().interact(&mut ctx) {
                Ok(Interaction::Handled) => {
                    handled = true;
                    if host.commands.nested_start_count() > nested_before {
                        info!(
                            level = %self.name,
                            entity = entry.class_name(),
                            "interaction_starts_nested_game"
                        );
                    }
                }
                Ok(Interaction::Ignored) => {}
                Err(error) => {
                    warn!(
                        level = %self.name,
                        entity = entry.class_name(),
                        error = %error,
                        "entity_interact_failed"
                    );
                }
            }
        }
        handled
    }

    /// Deferred consistency check: reattaches registered elements and
    /// reasserts their visibility.
    pub fn verify_elements(&mut self, display: &mut dyn Display) -> RecoveryReport {
        recovery::reassert_presence(self, display)
    }

    pub fn refresh_game_objects(&mut self, display: &mut dyn Display) {
        if !self.destroyed {
            self.surface.refresh_game_objects(display);
        }
    }

    pub fn should_continue(&self) -> bool {
        self.continue_running
    }

    pub fn end(&mut self) {
        self.continue_running = false;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn entity_count(&self) -> usize {
        self.surface.entities().len()
    }

    pub fn construct_failures(&self) -> usize {
        self.construct_failures
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub(crate) fn surface_mut(&mut self) -> &mut RenderSurface {
        &mut self.surface
    }

    pub(crate) fn consistency_timer(&self) -> Option<TimerId> {
        self.consistency_timer
    }
}
