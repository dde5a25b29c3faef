use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::commands::{CommandQueue, ControlCommand};
use super::config::EngineConfig;
use super::control::{CompletionHook, ControlError, ControlId, GameControl};
use super::display::{Display, MemoryDisplay, Viewport};
use super::entity::FrameContext;
use super::events::EventBus;
use super::input::{InputAction, InputSnapshot};
use super::level::LevelClass;
use super::registry::NpcRegistry;
use super::scheduler::{FrameQueue, TimerQueue};
use super::surface::SurfaceMetrics;

pub const MAX_COMMANDS_PER_DRAIN: usize = 1024;

/// Split borrow of everything a controller touches besides itself.
pub(crate) struct Host<'a> {
    pub(crate) display: &'a mut dyn Display,
    pub(crate) frames: &'a mut FrameQueue,
    pub(crate) timers: &'a mut TimerQueue,
    pub(crate) events: &'a mut EventBus,
    pub(crate) npcs: &'a mut NpcRegistry,
    pub(crate) commands: &'a mut CommandQueue,
    pub(crate) input: &'a InputSnapshot,
    pub(crate) config: &'a EngineConfig,
}

impl Host<'_> {
    pub(crate) fn frame_context<'c>(
        &'c mut self,
        surface: &'c SurfaceMetrics,
        frame: u64,
    ) -> FrameContext<'c> {
        FrameContext {
            display: &mut *self.display,
            surface,
            input: self.input,
            npcs: &mut *self.npcs,
            commands: &mut *self.commands,
            frame,
        }
    }
}

/// Single-threaded host loop: the display, every controller (top level and
/// nested), frame and timer scheduling, events and the NPC registry.
pub struct Runtime<D: Display = MemoryDisplay> {
    config: EngineConfig,
    display: D,
    controls: BTreeMap<ControlId, GameControl>,
    nested: BTreeSet<ControlId>,
    next_control_id: u64,
    frames: FrameQueue,
    timers: TimerQueue,
    events: EventBus,
    npcs: NpcRegistry,
    commands: CommandQueue,
    input: InputSnapshot,
    draining: bool,
}

impl Runtime<MemoryDisplay> {
    /// In-memory display pre-populated with the container and primary
    /// canvas named by `config`.
    pub fn headless(config: EngineConfig, viewport: Viewport) -> Self {
        let display = MemoryDisplay::with_game_elements(
            viewport,
            &config.container_element(),
            &config.primary_canvas(),
        );
        Self::new(config, display)
    }
}

impl<D: Display> Runtime<D> {
    pub fn new(config: EngineConfig, display: D) -> Self {
        Self {
            config,
            display,
            controls: BTreeMap::new(),
            nested: BTreeSet::new(),
            next_control_id: 0,
            frames: FrameQueue::default(),
            timers: TimerQueue::default(),
            events: EventBus::default(),
            npcs: NpcRegistry::default(),
            commands: CommandQueue::default(),
            input: InputSnapshot::empty(),
            draining: false,
        }
    }

    pub fn spawn(&mut self, levels: Vec<LevelClass>) -> ControlId {
        let id = ControlId(self.next_control_id);
        self.next_control_id = self.next_control_id.saturating_add(1);
        self.controls.insert(id, GameControl::new(id, levels));
        debug!(control = %id, "control_spawned");
        id
    }

    pub fn start(&mut self, id: ControlId) -> Result<(), ControlError> {
        let result = self.with_control(id, |control, host| control.start(host))?;
        self.drain_commands();
        result
    }

    pub fn launch(&mut self, levels: Vec<LevelClass>) -> Result<ControlId, ControlError> {
        let id = self.spawn(levels);
        self.start(id)?;
        Ok(id)
    }

    pub fn set_completion_hook(
        &mut self,
        id: ControlId,
        hook: CompletionHook,
    ) -> Result<(), ControlError> {
        let control = self
            .controls
            .get_mut(&id)
            .ok_or(ControlError::UnknownControl(id))?;
        control.set_completion_hook(hook);
        Ok(())
    }

    /// Runs every pending frame callback once. Returns how many ran.
    /// Nested games that finished on an earlier frame are dropped first.
    pub fn run_frame(&mut self) -> usize {
        self.prune_finished();
        let pending = self.frames.take();
        let ran = pending.len();
        for id in pending {
            if self
                .with_control(id, |control, host| control.game_loop(host))
                .is_err()
            {
                debug!(control = %id, "frame_for_unknown_control");
            }
            self.drain_commands();
        }
        ran
    }

    /// Moves the virtual clock forward and fires every timer that came due.
    pub fn advance(&mut self, delta: Duration) -> usize {
        let due = self.timers.advance(delta);
        let fired = due.len();
        for (timer, task) in due {
            let id = task.control();
            if self
                .with_control(id, |control, host| control.handle_timer(timer, task, host))
                .is_err()
            {
                debug!(control = %id, "timer_for_unknown_control");
            }
            self.drain_commands();
        }
        fired
    }

    pub fn key_down(&mut self, action: InputAction) {
        self.input.set(action, true);
        let ids: Vec<ControlId> = self.controls.keys().copied().collect();
        match action {
            InputAction::Exit => {
                for id in ids {
                    let _ = self.with_control(id, |control, _| control.handle_exit_key());
                }
            }
            InputAction::Interact => {
                for id in ids {
                    let _ = self.with_control(id, |control, host| control.interact(host));
                    self.drain_commands();
                }
            }
            _ => {}
        }
        self.drain_commands();
    }

    pub fn key_up(&mut self, action: InputAction) {
        self.input.set(action, false);
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.display.set_viewport(viewport);
        let ids: Vec<ControlId> = self.controls.keys().copied().collect();
        for id in ids {
            let _ = self.with_control(id, |control, host| control.resize(&mut *host.display));
        }
        info!(width = viewport.width, height = viewport.height, "viewport_resized");
        self.drain_commands();
    }

    pub fn pause(&mut self, id: ControlId) -> Result<bool, ControlError> {
        let paused = self.with_control(id, |control, host| control.pause(host))?;
        self.drain_commands();
        Ok(paused)
    }

    pub fn resume(&mut self, id: ControlId) -> Result<bool, ControlError> {
        let resumed = self.with_control(id, |control, host| control.resume(host))?;
        self.drain_commands();
        Ok(resumed)
    }

    /// Pauses `parent` and starts a child game whose completion resumes it.
    pub fn start_nested(
        &mut self,
        parent: ControlId,
        levels: Vec<LevelClass>,
    ) -> Result<ControlId, ControlError> {
        let paused = self.with_control(parent, |control, host| control.pause(host))?;
        let child = self.spawn(levels);
        self.nested.insert(child);
        self.set_completion_hook(
            child,
            Box::new(move |commands: &mut CommandQueue| commands.resume(parent)),
        )?;

        match self.start(child) {
            Ok(()) => {
                info!(parent = %parent, child = %child, "nested_game_started");
                Ok(child)
            }
            Err(error) => {
                warn!(parent = %parent, child = %child, error = %error, "nested_game_failed");
                if paused {
                    let _ = self.with_control(parent, |control, host| control.resume(host));
                }
                Err(error)
            }
        }
    }

    /// Applies queued commands until the queue is empty.
    pub fn apply_commands(&mut self) {
        self.drain_commands();
    }

    fn drain_commands(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        let mut applied = 0usize;
        while let Some(command) = self.commands.pop_front() {
            self.apply_command(command);
            applied += 1;
            if applied >= MAX_COMMANDS_PER_DRAIN {
                warn!(
                    remaining = self.commands.len(),
                    "command_drain_limit_reached"
                );
                break;
            }
        }
        self.draining = false;
    }

    fn apply_command(&mut self, command: ControlCommand) {
        let outcome = match command {
            ControlCommand::EndLevel(id) => self
                .with_control(id, |control, _| {
                    control.request_level_end();
                })
                .map(|_| ()),
            ControlCommand::Pause(id) => self.pause(id).map(|_| ()),
            ControlCommand::Resume(id) => self.resume(id).map(|_| ()),
            ControlCommand::StartNested { parent, levels } => {
                self.start_nested(parent, levels).map(|_| ())
            }
            ControlCommand::Emit(event) => {
                let listeners = self.events.dispatch(&event);
                debug!(event = event.name(), listeners, "event_emitted");
                Ok(())
            }
        };
        if let Err(error) = outcome {
            warn!(error = %error, "control_command_failed");
        }
    }

    fn with_control<R>(
        &mut self,
        id: ControlId,
        f: impl FnOnce(&mut GameControl, &mut Host<'_>) -> R,
    ) -> Result<R, ControlError> {
        let Runtime {
            config,
            display,
            controls,
            frames,
            timers,
            events,
            npcs,
            commands,
            input,
            ..
        } = self;
        let control = controls
            .get_mut(&id)
            .ok_or(ControlError::UnknownControl(id))?;
        let mut host = Host {
            display,
            frames,
            timers,
            events,
            npcs,
            commands,
            input,
            config,
        };
        Ok(f(control, &mut host))
    }

    /// True once every spawned controller has reached its terminal state.
    pub fn is_finished(&self) -> bool {
        !self.controls.is_empty() && self.controls.values().all(GameControl::is_terminal)
    }

    /// Drops terminal nested controllers along with their NPC records.
    /// Top-level controllers stay so `is_finished` can observe them.
    pub fn prune_finished(&mut self) -> usize {
        let finished: Vec<ControlId> = self
            .nested
            .iter()
            .copied()
            .filter(|id| self.controls.get(id).map_or(true, GameControl::is_terminal))
            .collect();
        for id in &finished {
            self.nested.remove(id);
            self.controls.remove(id);
            self.npcs.remove_control(*id);
        }
        if !finished.is_empty() {
            debug!(pruned = finished.len(), "nested_controls_pruned");
        }
        finished.len()
    }

    /// Tears down every controller without running completion hooks.
    pub fn shutdown(&mut self) {
        let ids: Vec<ControlId> = self.controls.keys().copied().collect();
        for id in ids.iter().rev() {
            let _ = self.with_control(*id, |control, host| control.shutdown(host));
        }
        info!(controls = ids.len(), "runtime_shutdown");
    }

    pub fn control(&self, id: ControlId) -> Option<&GameControl> {
        self.controls.get(&id)
    }

    pub fn control_mut(&mut self, id: ControlId) -> Option<&mut GameControl> {
        self.controls.get_mut(&id)
    }

    pub fn controls(&self) -> impl Iterator<Item = &GameControl> {
        self.controls.values()
    }

    pub fn active_control_count(&self) -> usize {
        self.controls
            .values()
            .filter(|control| !control.is_terminal())
            .count()
    }

    pub fn live_entity_count(&self) -> usize {
        self.controls
            .values()
            .filter_map(GameControl::current_level)
            .filter(|level| !level.is_destroyed())
            .map(|level| level.entity_count())
            .sum()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn npcs(&self) -> &NpcRegistry {
        &self.npcs
    }

    pub fn commands_mut(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    pub fn pending_frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_frame_requested(&self, id: ControlId) -> bool {
        self.frames.is_requested(id)
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.pending()
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }
}
