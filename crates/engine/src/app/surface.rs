use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use super::control::ControlId;
use super::display::{Display, ElementId};
use super::entity::EntityRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("canvas element '{0}' is not present in the display")]
    CanvasMissing(ElementId),
}

/// Geometry and ownership of one level's drawing area. Entities receive
/// this by reference; it never points back at the controller itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMetrics {
    pub canvas_id: ElementId,
    pub inner_width: u32,
    pub inner_height: u32,
    /// Header height above the game area.
    pub top: u32,
    /// Footer height below the game area.
    pub bottom: u32,
    pub control: ControlId,
    pub level_name: String,
    pub asset_root: PathBuf,
}

impl SurfaceMetrics {
    pub fn level_class(&self) -> String {
        super::level::level_class_tag(&self.level_name)
    }
}

#[derive(Debug)]
pub struct RenderSurface {
    metrics: SurfaceMetrics,
    bound: bool,
    entities: EntityRegistry,
}

impl RenderSurface {
    pub fn new(
        canvas_id: ElementId,
        control: ControlId,
        level_name: impl Into<String>,
        asset_root: PathBuf,
    ) -> Self {
        Self {
            metrics: SurfaceMetrics {
                canvas_id,
                inner_width: 0,
                inner_height: 0,
                top: 0,
                bottom: 0,
                control,
                level_name: level_name.into(),
                asset_root,
            },
            bound: false,
            entities: EntityRegistry::default(),
        }
    }

    /// Binds the primary canvas and sizes it to the viewport. A missing
    /// canvas is logged and reported; the surface stays unbound.
    pub fn create(&mut self, display: &mut dyn Display) -> Result<(), SurfaceError> {
        let viewport = display.viewport();
        let chrome = display.chrome();
        self.metrics.inner_width = viewport.width;
        self.metrics.inner_height = viewport.height;
        self.metrics.top = chrome.header_height;
        self.metrics.bottom = chrome.footer_height;

        let Some(canvas) = display.element_mut(&self.metrics.canvas_id) else {
            self.bound = false;
            warn!(
                canvas = %self.metrics.canvas_id,
                level = %self.metrics.level_name,
                "surface_canvas_missing"
            );
            return Err(SurfaceError::CanvasMissing(self.metrics.canvas_id.clone()));
        };

        let pixels = canvas.pixels_mut();
        if pixels.width() != viewport.width || pixels.height() != viewport.height {
            pixels.resize(viewport.width, viewport.height);
        }
        let style = canvas.style_mut();
        style.absolute = true;
        style.left = 0;
        style.top = 0;
        style.fill_parent = true;
        self.bound = true;
        Ok(())
    }

    pub fn resize(&mut self, display: &mut dyn Display) -> Result<(), SurfaceError> {
        self.create(display)
    }

    pub fn clear(&self, display: &mut dyn Display) {
        if !self.bound {
            return;
        }
        if let Some(canvas) = display.element_mut(&self.metrics.canvas_id) {
            canvas.pixels_mut().clear();
        }
    }

    /// Drops the binding. Entities must already have been torn down.
    pub fn release(&mut self) {
        self.bound = false;
        self.entities = EntityRegistry::default();
    }

    /// Forces every registered element visible, refreshes and redraws all
    /// entities, then draws the drawable ones onto a cleared surface.
    pub fn refresh_game_objects(&mut self, display: &mut dyn Display) {
        for id in self.entities.elements() {
            if let Some(element) = display.element_mut(id) {
                element.set_attached(true);
                element.style_mut().force_visible(None);
            }
        }
        for entry in self.entities.iter_mut() {
            let object = entry.object_mut();
            object.refresh_state();
            object.redraw(display);
        }
        self.clear(display);
        for entry in self.entities.iter_mut() {
            let class_name = entry.class_name().to_string();
            if let Some(drawable) = entry.object_mut().as_drawable() {
                if let Err(error) = drawable.draw(display) {
                    warn!(entity = %class_name, error = %error, "entity_draw_failed");
                }
            }
        }
    }

    pub fn metrics(&self) -> &SurfaceMetrics {
        &self.metrics
    }

    pub fn canvas_id(&self) -> &ElementId {
        &self.metrics.canvas_id
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        &mut self.entities
    }

    pub(crate) fn split_mut(&mut self) -> (&SurfaceMetrics, &mut EntityRegistry) {
        (&self.metrics, &mut self.entities)
    }
}
