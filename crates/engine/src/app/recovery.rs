use tracing::warn;

use super::display::{Display, ElementId};
use super::level::GameLevel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub inspected: usize,
    pub reattached: usize,
    pub restyled: usize,
    pub redrawn: usize,
    pub missing: usize,
}

impl RecoveryReport {
    pub fn is_noop(&self) -> bool {
        self.reattached == 0 && self.restyled == 0 && self.redrawn == 0
    }
}

pub fn reassert_presence(level: &mut GameLevel, display: &mut dyn Display) -> RecoveryReport {
    sweep(level, display, None)
}

/// Staggered recovery pass: like [`reassert_presence`], but also raises
/// elements to `z_index` and redraws drawable entities whose elements had
/// to be repaired.
pub fn force_element_visibility(
    level: &mut GameLevel,
    display: &mut dyn Display,
    z_index: i32,
) -> RecoveryReport {
    sweep(level, display, Some(z_index))
}

fn sweep(level: &mut GameLevel, display: &mut dyn Display, z_index: Option<i32>) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    if level.is_destroyed() {
        return report;
    }

    let level_name = level.name().to_string();
    let surface = level.surface_mut();
    let control = surface.metrics().control;
    let primary = surface.canvas_id().clone();

    for entry in surface.entities_mut().iter_mut() {
        let mut repaired = false;
        for id in entry.elements() {
            if *id == primary {
                continue;
            }
            let Some(element) = display.element_mut(id) else {
                report.missing += 1;
                continue;
            };
            let current = element
                .provenance()
                .is_some_and(|tag| tag.control == control && tag.level_name == level_name);
            if !current {
                continue;
            }
            report.inspected += 1;
            if !element.is_attached() {
                element.set_attached(true);
                report.reattached += 1;
                repaired = true;
            }
            if element.style_mut().force_visible(z_index) {
                report.restyled += 1;
                repaired = true;
            }
        }

        if repaired && z_index.is_some() && owns_canvas(entry.elements(), &primary, display) {
            let class_name = entry.class_name().to_string();
            if let Some(drawable) = entry.object_mut().as_drawable() {
                match drawable.draw(display) {
                    Ok(()) => report.redrawn += 1,
                    Err(error) => {
                        warn!(entity = %class_name, error = %error, "recovery_redraw_failed");
                    }
                }
            }
        }
    }
    report
}

fn owns_canvas(elements: &[ElementId], primary: &ElementId, display: &dyn Display) -> bool {
    elements.iter().any(|id| {
        id != primary
            && display
                .element(id)
                .is_some_and(|element| element.is_canvas())
    })
}
