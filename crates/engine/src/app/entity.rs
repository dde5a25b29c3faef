use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::commands::CommandQueue;
use super::control::ControlId;
use super::display::{Display, Element, ElementId};
use super::input::InputSnapshot;
use super::registry::NpcRegistry;
use super::rendering::SpriteError;
use super::surface::SurfaceMetrics;

pub const LEVEL_NAME_KEY: &str = "levelName";
pub const LEVEL_ID_KEY: &str = "levelId";

/// Failures raised by level content. The engine logs these and carries on.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid config for {entity}: {source}")]
    InvalidConfig {
        entity: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("entity config must be a JSON object, got {found}")]
    ConfigNotObject { found: &'static str },
    #[error("failed to load asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: SpriteError,
    },
    #[error("{0}")]
    Message(String),
}

impl ContentError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Free-form entity configuration, a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityConfig(Map<String, Value>);

impl EntityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, ContentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(ContentError::ConfigNotObject { found: "null" }),
            Value::Bool(_) => Err(ContentError::ConfigNotObject { found: "bool" }),
            Value::Number(_) => Err(ContentError::ConfigNotObject { found: "number" }),
            Value::String(_) => Err(ContentError::ConfigNotObject { found: "string" }),
            Value::Array(_) => Err(ContentError::ConfigNotObject { found: "array" }),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn level_name(&self) -> Option<&str> {
        self.get_str(LEVEL_NAME_KEY)
    }

    pub fn level_id(&self) -> Option<&str> {
        self.get_str(LEVEL_ID_KEY)
    }

    /// Deserializes the whole config into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self, entity: &str) -> Result<T, ContentError> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(|source| {
            ContentError::InvalidConfig {
                entity: entity.to_string(),
                source,
            }
        })
    }
}

pub trait Updatable {
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ContentError>;
}

pub trait Resizable {
    fn resize(&mut self, surface: &SurfaceMetrics, display: &mut dyn Display);
}

pub trait Destroyable {
    /// Called exactly once per level teardown.
    fn destroy(&mut self, display: &mut dyn Display);
}

pub trait Drawable {
    fn draw(&mut self, display: &mut dyn Display) -> Result<(), ContentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Ignored,
    Handled,
}

/// Everything the level lifecycle needs from an entity. Optional
/// capabilities default to no-ops.
pub trait GameObject: Updatable + Resizable + Destroyable {
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        None
    }

    fn refresh_state(&mut self) {}

    fn redraw(&mut self, _display: &mut dyn Display) {}

    fn interact(&mut self, _ctx: &mut FrameContext<'_>) -> Result<Interaction, ContentError> {
        Ok(Interaction::Ignored)
    }
}

/// Constructor for one kind of entity, the `new EntityClass(config, env)`
/// of a level descriptor.
pub trait EntityClass {
    fn name(&self) -> &str;

    fn construct(
        &self,
        config: &EntityConfig,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Box<dyn GameObject>, ContentError>;
}

type ConstructFn = dyn Fn(&EntityConfig, &mut BuildContext<'_>) -> Result<Box<dyn GameObject>, ContentError>;

struct FnEntityClass {
    name: String,
    construct: Box<ConstructFn>,
}

impl EntityClass for FnEntityClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(
        &self,
        config: &EntityConfig,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Box<dyn GameObject>, ContentError> {
        (self.construct)(config, ctx)
    }
}

/// Wraps a closure as an entity class.
pub fn entity_class<F>(name: impl Into<String>, construct: F) -> Rc<dyn EntityClass>
where
    F: Fn(&EntityConfig, &mut BuildContext<'_>) -> Result<Box<dyn GameObject>, ContentError>
        + 'static,
{
    Rc::new(FnEntityClass {
        name: name.into(),
        construct: Box::new(construct),
    })
}

#[derive(Clone)]
pub struct EntitySpec {
    pub class: Rc<dyn EntityClass>,
    pub config: EntityConfig,
}

impl EntitySpec {
    pub fn new(class: Rc<dyn EntityClass>, config: EntityConfig) -> Self {
        Self { class, config }
    }
}

impl fmt::Debug for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySpec")
            .field("class", &self.class.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Handed to entity constructors. Elements inserted through
/// [`BuildContext::register_element`] are tracked for provenance tagging,
/// recovery and teardown.
pub struct BuildContext<'a> {
    pub surface: &'a SurfaceMetrics,
    pub display: &'a mut dyn Display,
    pub npcs: &'a mut NpcRegistry,
    registered: Vec<ElementId>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        surface: &'a SurfaceMetrics,
        display: &'a mut dyn Display,
        npcs: &'a mut NpcRegistry,
    ) -> Self {
        Self {
            surface,
            display,
            npcs,
            registered: Vec::new(),
        }
    }

    pub fn control(&self) -> ControlId {
        self.surface.control
    }

    pub fn register_element(&mut self, element: Element) -> ElementId {
        let id = element.id().clone();
        self.display.insert(element);
        self.adopt_element(id.clone());
        id
    }

    /// Claims an element that already exists in the display.
    pub fn adopt_element(&mut self, id: ElementId) {
        if !self.registered.contains(&id) {
            self.registered.push(id);
        }
    }

    pub(crate) fn into_registered(self) -> Vec<ElementId> {
        self.registered
    }
}

/// Per-frame access for entities and level hooks.
pub struct FrameContext<'a> {
    pub display: &'a mut dyn Display,
    pub surface: &'a SurfaceMetrics,
    pub input: &'a InputSnapshot,
    pub npcs: &'a mut NpcRegistry,
    pub commands: &'a mut CommandQueue,
    pub frame: u64,
}

impl FrameContext<'_> {
    pub fn control(&self) -> ControlId {
        self.surface.control
    }
}

pub struct RegisteredEntity {
    class_name: String,
    object: Box<dyn GameObject>,
    elements: Vec<ElementId>,
}

impl RegisteredEntity {
    pub(crate) fn new(
        class_name: impl Into<String>,
        object: Box<dyn GameObject>,
        elements: Vec<ElementId>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            object,
            elements,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn object_mut(&mut self) -> &mut dyn GameObject {
        self.object.as_mut()
    }

    pub(crate) fn into_parts(self) -> (String, Box<dyn GameObject>, Vec<ElementId>) {
        (self.class_name, self.object, self.elements)
    }
}

/// Live entities of one level in insertion order, which is both update
/// order and z-order.
#[derive(Default)]
pub struct EntityRegistry {
    entries: Vec<RegisteredEntity>,
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(RegisteredEntity::class_name))
            .finish()
    }
}

impl EntityRegistry {
    pub fn push(&mut self, entity: RegisteredEntity) {
        self.entries.push(entity);
    }

    /// Removes the most recently added entity.
    pub fn pop(&mut self) -> Option<RegisteredEntity> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisteredEntity> {
        self.entries.iter_mut()
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.entries.iter().map(RegisteredEntity::class_name).collect()
    }

    pub fn owner_of(&self, element: &ElementId) -> Option<&RegisteredEntity> {
        self.entries
            .iter()
            .find(|entry| entry.elements.contains(element))
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementId> {
        self.entries.iter().flat_map(|entry| entry.elements.iter())
    }
}
