use std::collections::VecDeque;

use super::control::ControlId;
use super::events::GameEvent;
use super::level::LevelClass;

/// Requests content makes of the runtime. They are applied after the
/// callback that queued them returns, so nothing in a level ever needs a
/// live reference to a controller.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    EndLevel(ControlId),
    Pause(ControlId),
    Resume(ControlId),
    StartNested {
        parent: ControlId,
        levels: Vec<LevelClass>,
    },
    Emit(GameEvent),
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<ControlCommand>,
}

impl CommandQueue {
    pub fn push(&mut self, command: ControlCommand) {
        self.commands.push_back(command);
    }

    pub fn end_level(&mut self, control: ControlId) {
        self.push(ControlCommand::EndLevel(control));
    }

    pub fn pause(&mut self, control: ControlId) {
        self.push(ControlCommand::Pause(control));
    }

    pub fn resume(&mut self, control: ControlId) {
        self.push(ControlCommand::Resume(control));
    }

    pub fn start_nested(&mut self, parent: ControlId, levels: Vec<LevelClass>) {
        self.push(ControlCommand::StartNested { parent, levels });
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.push(ControlCommand::Emit(event));
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn pop_front(&mut self) -> Option<ControlCommand> {
        self.commands.pop_front()
    }

    pub(crate) fn nested_start_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, ControlCommand::StartNested { .. }))
            .count()
    }
}
