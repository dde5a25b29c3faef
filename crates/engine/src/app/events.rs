use std::fmt;

use super::control::ControlId;

/// Broadcast notifications for collaborators that must not hold a
/// controller reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    LevelTransition {
        control: ControlId,
        level_index: usize,
        level_name: String,
    },
    InventoryUpdated {
        item_id: Option<String>,
    },
    GameCompleted {
        control: ControlId,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::LevelTransition { .. } => "levelTransition",
            GameEvent::InventoryUpdated { .. } => "inventoryUpdated",
            GameEvent::GameCompleted { .. } => "gameCompleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&GameEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    /// Returns how many listeners saw the event.
    pub fn dispatch(&mut self, event: &GameEvent) -> usize {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
        self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
