use std::collections::BTreeMap;

use super::control::ControlId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcRecord {
    pub control: ControlId,
    pub level_name: String,
    pub interactions: u32,
}

/// Cross-transition bookkeeping for NPCs, owned by the runtime and handed to
/// content through build and frame contexts.
#[derive(Debug, Default)]
pub struct NpcRegistry {
    records: BTreeMap<String, NpcRecord>,
    anonymous_counter: u64,
}

impl NpcRegistry {
    /// Re-registering an id replaces the record but keeps its interaction
    /// count.
    pub fn register(&mut self, npc_id: impl Into<String>, control: ControlId, level_name: &str) {
        let npc_id = npc_id.into();
        let interactions = self
            .records
            .get(&npc_id)
            .map(|record| record.interactions)
            .unwrap_or(0);
        self.records.insert(
            npc_id,
            NpcRecord {
                control,
                level_name: level_name.to_string(),
                interactions,
            },
        );
    }

    pub fn unregister(&mut self, npc_id: &str) -> Option<NpcRecord> {
        self.records.remove(npc_id)
    }

    pub fn get(&self, npc_id: &str) -> Option<&NpcRecord> {
        self.records.get(npc_id)
    }

    pub fn record_interaction(&mut self, npc_id: &str) -> Option<u32> {
        let record = self.records.get_mut(npc_id)?;
        record.interactions = record.interactions.saturating_add(1);
        Some(record.interactions)
    }

    pub fn next_anonymous_id(&mut self) -> String {
        let id = format!("npc_{}", self.anonymous_counter);
        self.anonymous_counter = self.anonymous_counter.saturating_add(1);
        id
    }

    pub fn remove_control(&mut self, control: ControlId) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.control != control);
        before - self.records.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reregistering_keeps_interaction_count() {
        let mut registry = NpcRegistry::default();
        registry.register("pilot", ControlId(0), "Airport");
        assert_eq!(registry.record_interaction("pilot"), Some(1));

        registry.register("pilot", ControlId(0), "Airport");

        let record = registry.get("pilot").expect("pilot record");
        assert_eq!(record.interactions, 1);
        assert_eq!(record.level_name, "Airport");
    }

    #[test]
    fn remove_control_drops_only_that_controllers_npcs() {
        let mut registry = NpcRegistry::default();
        registry.register("pilot", ControlId(0), "Airport");
        registry.register("exit", ControlId(1), "Meteor");

        assert_eq!(registry.remove_control(ControlId(1)), 1);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["pilot"]);
    }

    #[test]
    fn anonymous_ids_are_unique() {
        let mut registry = NpcRegistry::default();
        let first = registry.next_anonymous_id();
        let second = registry.next_anonymous_id();

        assert_ne!(first, second);
        assert_eq!(registry.record_interaction("missing"), None);
    }
}
