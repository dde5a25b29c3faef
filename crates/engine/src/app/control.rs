use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::commands::CommandQueue;
use super::display::{Display, DisplayMode, ElementId, PixelBuffer};
use super::events::GameEvent;
use super::level::{GameLevel, LevelClass};
use super::recovery;
use super::runtime::Host;
use super::scheduler::{TimerId, TimerQueue, TimerTask};

const OVERLAY_CLASSES: [&str; 3] = ["dialog", "popup", "modal"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlId(pub u64);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "control-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Running,
    Paused,
    LevelEnding,
    Terminal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("primary canvas '{0}' is not present; the game cannot start")]
    MissingCanvas(ElementId),
    #[error("game container '{0}' is not present; the game cannot start")]
    MissingContainer(ElementId),
    #[error("{0} has no levels to run")]
    NoLevels(ControlId),
    #[error("{0} does not exist")]
    UnknownControl(ControlId),
    #[error("{0} was already started")]
    AlreadyStarted(ControlId),
}

/// Runs instead of advancing when the level ends. Nested games use it to
/// queue the parent's resume.
pub type CompletionHook = Box<dyn FnOnce(&mut CommandQueue)>;

#[derive(Debug, Clone)]
struct SavedCanvas {
    id: ElementId,
    pixels: PixelBuffer,
    hidden_by_pause: bool,
}

/// Drives one game: its ordered level list, the active level and the frame
/// loop that updates it.
pub struct GameControl {
    id: ControlId,
    levels: Vec<LevelClass>,
    level_index: usize,
    current_level: Option<GameLevel>,
    state: ControlState,
    frame_counter: u64,
    level_generation: u64,
    exit_listener_active: bool,
    saved_canvas_state: Vec<Vec<SavedCanvas>>,
    canvas_contexts: BTreeSet<ElementId>,
    recovery_timers: Vec<TimerId>,
    on_complete: Option<CompletionHook>,
    completion_signalled: bool,
    transitions: usize,
    resume_count: usize,
}

impl fmt::Debug for GameControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameControl")
            .field("id", &self.id)
            .field("levels", &self.levels)
            .field("level_index", &self.level_index)
            .field("current_level", &self.current_level)
            .field("state", &self.state)
            .field("frame_counter", &self.frame_counter)
            .field("has_completion_hook", &self.on_complete.is_some())
            .finish_non_exhaustive()
    }
}

impl GameControl {
    pub fn new(id: ControlId, levels: Vec<LevelClass>) -> Self {
        Self {
            id,
            levels,
            level_index: 0,
            current_level: None,
            state: ControlState::Idle,
            frame_counter: 0,
            level_generation: 0,
            exit_listener_active: false,
            saved_canvas_state: Vec::new(),
            canvas_contexts: BTreeSet::new(),
            recovery_timers: Vec::new(),
            on_complete: None,
            completion_signalled: false,
            transitions: 0,
            resume_count: 0,
        }
    }

    pub fn set_completion_hook(&mut self, hook: CompletionHook) {
        self.on_complete = Some(hook);
    }

    pub(crate) fn start(&mut self, host: &mut Host<'_>) -> Result<(), ControlError> {
        if self.state != ControlState::Idle {
            error!(control = %self.id, state = ?self.state, "control_start_rejected");
            return Err(ControlError::AlreadyStarted(self.id));
        }
        if self.levels.is_empty() {
            error!(control = %self.id, "control_start_without_levels");
            return Err(ControlError::NoLevels(self.id));
        }

        let container = host.config.container_element();
        if !host.display.contains(&container) {
            error!(control = %self.id, container = %container, "control_container_missing");
            return Err(ControlError::MissingContainer(container));
        }
        let canvas = host.config.primary_canvas();
        if !host
            .display
            .element(&canvas)
            .is_some_and(|element| element.is_canvas())
        {
            error!(control = %self.id, canvas = %canvas, "control_canvas_missing");
            return Err(ControlError::MissingCanvas(canvas));
        }

        self.exit_listener_active = true;
        self.canvas_contexts.clear();
        self.canvas_contexts.insert(canvas);
        info!(control = %self.id, level_count = self.levels.len(), "control_started");

        self.transition_to_level(host);
        Ok(())
    }

    fn transition_to_level(&mut self, host: &mut Host<'_>) {
        self.cancel_recovery_timers(host.timers);
        self.cleanup_previous_level(host);

        let Some(class) = self.levels.get(self.level_index).cloned() else {
            warn!(control = %self.id, index = self.level_index, "level_index_out_of_range");
            self.state = ControlState::Terminal;
            return;
        };

        self.level_generation += 1;
        host.events.dispatch(&GameEvent::LevelTransition {
            control: self.id,
            level_index: self.level_index,
            level_name: class.name().to_string(),
        });

        let level = GameLevel::create(&class, self.id, self.level_generation, host);
        if let Some(timer) = level.consistency_timer() {
            self.recovery_timers.push(timer);
        }
        for entry in level.surface().entities().iter() {
            for id in entry.elements() {
                if host.display.element(id).is_some_and(|element| element.is_canvas()) {
                    self.canvas_contexts.insert(id.clone());
                }
            }
        }
        self.current_level = Some(level);
        self.transitions += 1;

        for delay in host.config.recovery_pass_delays() {
            let timer = host.timers.schedule(
                delay,
                TimerTask::RecoveryPass {
                    control: self.id,
                    generation: self.level_generation,
                    delay_ms: delay.as_millis() as u64,
                },
            );
            self.recovery_timers.push(timer);
        }

        self.state = ControlState::Running;
        host.frames.request(self.id);
        info!(
            control = %self.id,
            level = %class.name(),
            index = self.level_index,
            "level_transition"
        );
    }

    fn cleanup_previous_level(&mut self, host: &mut Host<'_>) {
        if let Some(mut level) = self.current_level.take() {
            level.destroy(&mut *host.display);
        }

        let primary = host.config.primary_canvas();
        let stale: Vec<ElementId> = host
            .display
            .element_ids()
            .into_iter()
            .filter(|id| *id != primary)
            .filter(|id| {
                host.display
                    .element(id)
                    .is_some_and(|element| element.is_owned_by(self.id))
            })
            .collect();
        for id in &stale {
            host.display.remove(id);
        }
        self.canvas_contexts.retain(|id| *id == primary);

        if !stale.is_empty() {
            debug!(control = %self.id, removed = stale.len(), "previous_level_swept");
        }
    }

    /// One frame. The continuation flag is checked before the pause flag,
    /// and a paused controller does not reschedule itself.
    pub(crate) fn game_loop(&mut self, host: &mut Host<'_>) {
        if !matches!(self.state, ControlState::Running | ControlState::Paused) {
            return;
        }
        let Some(level) = self.current_level.as_mut() else {
            return;
        };
        if !level.should_continue() {
            self.handle_level_end(host);
            return;
        }
        if self.state == ControlState::Paused {
            return;
        }

        level.update(host, self.frame_counter);
        self.handle_in_level_logic();
        host.frames.request(self.id);
    }

    fn handle_in_level_logic(&mut self) {
        if self.level_index == 0 && self.frame_counter == 0 {
            if let Some(level) = self.current_level.as_ref() {
                info!(control = %self.id, level = %level.name(), "level_start");
            }
        }
        self.frame_counter = self.frame_counter.saturating_add(1);
    }

    fn handle_level_end(&mut self, host: &mut Host<'_>) {
        self.state = ControlState::LevelEnding;
        self.cancel_recovery_timers(host.timers);
        host.frames.cancel(self.id);
        if let Some(level) = self.current_level.as_mut() {
            level.destroy(&mut *host.display);
        }

        if let Some(hook) = self.on_complete.take() {
            self.state = ControlState::Terminal;
            self.exit_listener_active = false;
            info!(control = %self.id, "control_completion_hook");
            hook(&mut *host.commands);
            return;
        }

        if self.level_index + 1 < self.levels.len() {
            self.level_index += 1;
            self.transition_to_level(host);
            return;
        }

        self.state = ControlState::Terminal;
        self.exit_listener_active = false;
        self.signal_completion(host);
    }

    fn signal_completion(&mut self, host: &mut Host<'_>) {
        if self.completion_signalled {
            return;
        }
        self.completion_signalled = true;
        info!(control = %self.id, levels = self.levels.len(), "game_completed");
        host.events
            .dispatch(&GameEvent::GameCompleted { control: self.id });
    }

    pub(crate) fn handle_exit_key(&mut self) -> bool {
        if !self.exit_listener_active || self.state != ControlState::Running {
            return false;
        }
        match self.current_level.as_mut() {
            Some(level) if level.should_continue() => {
                level.end();
                info!(control = %self.id, level = %level.name(), "exit_key_pressed");
                true
            }
            _ => false,
        }
    }

    pub fn request_level_end(&mut self) -> bool {
        match self.current_level.as_mut() {
            Some(level) if !level.is_destroyed() => {
                level.end();
                true
            }
            _ => false,
        }
    }

    /// Stops the frame loop, snapshots every visible canvas and hides the
    /// non-primary ones.
    pub(crate) fn pause(&mut self, host: &mut Host<'_>) -> bool {
        if self.state != ControlState::Running {
            debug!(control = %self.id, state = ?self.state, "pause_ignored");
            return false;
        }
        self.state = ControlState::Paused;
        self.exit_listener_active = false;
        host.frames.cancel(self.id);

        let primary = host.config.primary_canvas();
        let mut saved = Vec::new();
        for id in host.display.element_ids() {
            let Some(element) = host.display.element(&id) else {
                continue;
            };
            if !element.is_canvas() || !element.is_attached() || !element.style().is_shown() {
                continue;
            }
            saved.push(SavedCanvas {
                hidden_by_pause: id != primary,
                pixels: element.pixels().clone(),
                id,
            });
        }
        for canvas in saved.iter().filter(|canvas| canvas.hidden_by_pause) {
            if let Some(element) = host.display.element_mut(&canvas.id) {
                element.style_mut().display = DisplayMode::None;
            }
        }

        info!(control = %self.id, canvases = saved.len(), "control_paused");
        self.saved_canvas_state.push(saved);
        true
    }

    pub(crate) fn resume(&mut self, host: &mut Host<'_>) -> bool {
        if self.state != ControlState::Paused {
            debug!(control = %self.id, state = ?self.state, "resume_ignored");
            return false;
        }
        self.exit_listener_active = true;

        let saved = self.saved_canvas_state.pop().unwrap_or_default();
        let restored = saved.len();
        for canvas in saved {
            let Some(element) = host.display.element_mut(&canvas.id) else {
                warn!(control = %self.id, canvas = %canvas.id, "resume_canvas_missing");
                continue;
            };
            if canvas.hidden_by_pause {
                element.style_mut().display = DisplayMode::Block;
            }
            element.pixels_mut().put(&canvas.pixels);
        }

        self.state = ControlState::Running;
        self.resume_count += 1;
        host.frames.request(self.id);
        info!(control = %self.id, canvases = restored, "control_resumed");
        true
    }

    pub(crate) fn handle_timer(&mut self, timer: TimerId, task: TimerTask, host: &mut Host<'_>) {
        self.recovery_timers.retain(|pending| *pending != timer);

        let generation = match &task {
            TimerTask::ConsistencyCheck { generation, .. }
            | TimerTask::RecoveryPass { generation, .. } => *generation,
        };
        if generation != self.level_generation || self.state != ControlState::Running {
            debug!(
                control = %self.id,
                generation,
                current = self.level_generation,
                state = ?self.state,
                "recovery_skipped"
            );
            return;
        }
        let Some(level) = self.current_level.as_mut() else {
            return;
        };

        match task {
            TimerTask::ConsistencyCheck { .. } => {
                let report = level.verify_elements(&mut *host.display);
                info!(
                    control = %self.id,
                    level = %level.name(),
                    inspected = report.inspected,
                    reattached = report.reattached,
                    restyled = report.restyled,
                    missing = report.missing,
                    "consistency_check"
                );
            }
            TimerTask::RecoveryPass { delay_ms, .. } => {
                let report = recovery::force_element_visibility(
                    level,
                    &mut *host.display,
                    host.config.forced_z_index,
                );
                if report.is_noop() {
                    debug!(control = %self.id, delay_ms, "recovery_pass_noop");
                } else {
                    info!(
                        control = %self.id,
                        level = %level.name(),
                        delay_ms,
                        inspected = report.inspected,
                        reattached = report.reattached,
                        restyled = report.restyled,
                        redrawn = report.redrawn,
                        "recovery_pass"
                    );
                }
            }
        }
    }

    pub fn cleanup_level_elements(
        &mut self,
        display: &mut dyn Display,
        primary: &ElementId,
    ) -> usize {
        let mut removed = 0;
        for id in display.element_ids() {
            let Some(element) = display.element_mut(&id) else {
                continue;
            };
            if !element.is_owned_by(self.id) {
                continue;
            }
            if OVERLAY_CLASSES.iter().any(|class| element.has_class(class)) {
                display.remove(&id);
                removed += 1;
            } else if element.is_canvas() && id != *primary {
                element.pixels_mut().clear();
            }
        }
        debug!(control = %self.id, removed, "level_elements_cleaned");
        removed
    }

    pub(crate) fn resize(&mut self, display: &mut dyn Display) {
        if !matches!(self.state, ControlState::Running | ControlState::Paused) {
            return;
        }
        if let Some(level) = self.current_level.as_mut() {
            level.resize(display);
        }
    }

    pub(crate) fn interact(&mut self, host: &mut Host<'_>) -> bool {
        if self.state != ControlState::Running {
            return false;
        }
        match self.current_level.as_mut() {
            Some(level) => level.interact(host, self.frame_counter),
            None => false,
        }
    }

    pub(crate) fn shutdown(&mut self, host: &mut Host<'_>) {
        self.cancel_recovery_timers(host.timers);
        host.frames.cancel(self.id);
        self.cleanup_previous_level(host);
        self.exit_listener_active = false;
        self.saved_canvas_state.clear();
        self.state = ControlState::Terminal;
    }

    fn cancel_recovery_timers(&mut self, timers: &mut TimerQueue) {
        let cancelled = self
            .recovery_timers
            .drain(..)
            .filter(|timer| timers.cancel(*timer))
            .count();
        if cancelled > 0 {
            debug!(control = %self.id, cancelled, "recovery_timers_cancelled");
        }
    }

    pub fn id(&self) -> ControlId {
        self.id
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn level_index(&self) -> usize {
        self.level_index
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn current_level(&self) -> Option<&GameLevel> {
        self.current_level.as_ref()
    }

    pub fn current_level_mut(&mut self) -> Option<&mut GameLevel> {
        self.current_level.as_mut()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn is_paused(&self) -> bool {
        self.state == ControlState::Paused
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ControlState::Terminal
    }

    pub fn has_exit_listener(&self) -> bool {
        self.exit_listener_active
    }

    pub fn completion_signalled(&self) -> bool {
        self.completion_signalled
    }

    pub fn transitions(&self) -> usize {
        self.transitions
    }

    pub fn resume_count(&self) -> usize {
        self.resume_count
    }

    pub fn snapshot_depth(&self) -> usize {
        self.saved_canvas_state.len()
    }

    pub fn pending_recovery_timers(&self) -> usize {
        self.recovery_timers.len()
    }

    pub fn canvas_contexts(&self) -> impl Iterator<Item = &ElementId> {
        self.canvas_contexts.iter()
    }
}
