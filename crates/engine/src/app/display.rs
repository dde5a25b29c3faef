use std::fmt;

use serde::{Deserialize, Serialize};

use super::control::ControlId;

const OPACITY_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chrome {
    pub header_height: u32,
    pub footer_height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.rgba.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    pub fn clear(&mut self) {
        self.rgba.fill(0);
    }

    /// Resizing drops the previous contents, matching how a canvas behaves
    /// when its backing size changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let index = self.index_of(x, y)?;
        let mut out = [0; 4];
        out.copy_from_slice(&self.rgba[index..index + 4]);
        Some(out)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        match self.index_of(x, y) {
            Some(index) => {
                self.rgba[index..index + 4].copy_from_slice(&rgba);
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for chunk in self.rgba.chunks_exact_mut(4) {
            chunk.copy_from_slice(&rgba);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: [u8; 4]) {
        let Some((x0, y0, x1, y1)) = self.clip_rect(x, y, width, height) else {
            return;
        };
        for row in y0..y1 {
            for col in x0..x1 {
                let index = (row as usize * self.width as usize + col as usize) * 4;
                self.rgba[index..index + 4].copy_from_slice(&rgba);
            }
        }
    }

    pub fn blit(&mut self, source: &PixelBuffer, x: i32, y: i32) {
        let Some((x0, y0, x1, y1)) = self.clip_rect(x, y, source.width, source.height) else {
            return;
        };
        for row in y0..y1 {
            let src_row = (row as i64 - y as i64) as usize;
            for col in x0..x1 {
                let src_col = (col as i64 - x as i64) as usize;
                let src_index = (src_row * source.width as usize + src_col) * 4;
                if source.rgba[src_index + 3] == 0 {
                    continue;
                }
                let dst_index = (row as usize * self.width as usize + col as usize) * 4;
                self.rgba[dst_index..dst_index + 4]
                    .copy_from_slice(&source.rgba[src_index..src_index + 4]);
            }
        }
    }

    /// Writes `source` verbatim at the origin, clipped to the overlapping
    /// region. Transparent pixels overwrite, unlike [`PixelBuffer::blit`].
    pub fn put(&mut self, source: &PixelBuffer) {
        let width = self.width.min(source.width) as usize;
        let height = self.height.min(source.height) as usize;
        for row in 0..height {
            let dst = row * self.width as usize * 4;
            let src = row * source.width as usize * 4;
            self.rgba[dst..dst + width * 4].copy_from_slice(&source.rgba[src..src + width * 4]);
        }
    }

    pub fn scaled(&self, width: u32, height: u32) -> PixelBuffer {
        let mut out = PixelBuffer::new(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        for row in 0..height {
            let src_row = (row as u64 * self.height as u64 / height.max(1) as u64) as u32;
            for col in 0..width {
                let src_col = (col as u64 * self.width as u64 / width.max(1) as u64) as u32;
                if let Some(rgba) = self.pixel(src_col, src_row) {
                    out.set_pixel(col, row, rgba);
                }
            }
        }
        out
    }

    fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    fn clip_rect(&self, x: i32, y: i32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (x as i64 + width as i64).min(self.width as i64);
        let y1 = (y as i64 + height as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Block,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub display: DisplayMode,
    pub visible: bool,
    pub opacity: f32,
    pub z_index: i32,
    pub absolute: bool,
    pub left: i32,
    pub top: i32,
    pub fill_parent: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            display: DisplayMode::Block,
            visible: true,
            opacity: 1.0,
            z_index: 0,
            absolute: false,
            left: 0,
            top: 0,
            fill_parent: false,
        }
    }
}

impl Style {
    pub fn is_shown(&self) -> bool {
        self.display == DisplayMode::Block && self.visible && self.opacity > OPACITY_EPSILON
    }

    pub fn force_visible(&mut self, z_index: Option<i32>) -> bool {
        let before = *self;
        self.display = DisplayMode::Block;
        self.visible = true;
        self.opacity = 1.0;
        if let Some(z_index) = z_index {
            self.z_index = z_index;
        }
        before != *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub control: ControlId,
    pub level_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Canvas,
    Block,
}

#[derive(Debug, Clone)]
pub struct Element {
    id: ElementId,
    kind: ElementKind,
    pixels: PixelBuffer,
    style: Style,
    classes: Vec<String>,
    provenance: Option<Provenance>,
    attached: bool,
}

impl Element {
    pub fn canvas(id: impl Into<ElementId>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Canvas,
            pixels: PixelBuffer::new(width, height),
            style: Style::default(),
            classes: Vec::new(),
            provenance: None,
            attached: true,
        }
    }

    pub fn block(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Block,
            pixels: PixelBuffer::default(),
            style: Style::default(),
            classes: Vec::new(),
            provenance: None,
            attached: true,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_position(mut self, left: i32, top: i32) -> Self {
        self.style.absolute = true;
        self.style.left = left;
        self.style.top = top;
        self
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn is_canvas(&self) -> bool {
        self.kind == ElementKind::Canvas
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut PixelBuffer {
        &mut self.pixels
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.style
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|existing| existing == class)
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.has_class(&class) {
            self.classes.push(class);
        }
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub fn set_provenance(&mut self, provenance: Provenance) {
        self.provenance = Some(provenance);
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub fn is_owned_by(&self, control: ControlId) -> bool {
        self.provenance
            .as_ref()
            .is_some_and(|provenance| provenance.control == control)
    }
}

/// The host screen: every element, the viewport and the page chrome.
///
/// Elements stay addressable while detached, the way a DOM node survives
/// removal from the document as long as something references it.
pub trait Display {
    fn viewport(&self) -> Viewport;
    fn set_viewport(&mut self, viewport: Viewport);
    fn chrome(&self) -> Chrome;
    fn element(&self, id: &ElementId) -> Option<&Element>;
    fn element_mut(&mut self, id: &ElementId) -> Option<&mut Element>;
    fn insert(&mut self, element: Element) -> Option<Element>;
    fn remove(&mut self, id: &ElementId) -> Option<Element>;
    fn element_ids(&self) -> Vec<ElementId>;

    fn contains(&self, id: &ElementId) -> bool {
        self.element(id).is_some()
    }

    fn is_attached(&self, id: &ElementId) -> bool {
        self.element(id).is_some_and(Element::is_attached)
    }

    fn attach(&mut self, id: &ElementId) -> bool {
        match self.element_mut(id) {
            Some(element) if !element.is_attached() => {
                element.set_attached(true);
                true
            }
            _ => false,
        }
    }

    fn detach(&mut self, id: &ElementId) -> bool {
        match self.element_mut(id) {
            Some(element) if element.is_attached() => {
                element.set_attached(false);
                true
            }
            _ => false,
        }
    }

    fn read_pixels(&self, id: &ElementId) -> Option<PixelBuffer> {
        self.element(id)
            .filter(|element| element.is_canvas())
            .map(|element| element.pixels().clone())
    }

    fn write_pixels(&mut self, id: &ElementId, pixels: &PixelBuffer) -> bool {
        match self.element_mut(id) {
            Some(element) if element.is_canvas() => {
                element.pixels_mut().put(pixels);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDisplay {
    viewport: Viewport,
    chrome: Chrome,
    elements: Vec<Element>,
}

impl MemoryDisplay {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            chrome: Chrome::default(),
            elements: Vec::new(),
        }
    }

    pub fn with_game_elements(
        viewport: Viewport,
        container_id: &ElementId,
        canvas_id: &ElementId,
    ) -> Self {
        let mut display = Self::new(viewport);
        display.insert(Element::block(container_id.clone()));
        display.insert(Element::canvas(
            canvas_id.clone(),
            viewport.width,
            viewport.height,
        ));
        display
    }

    pub fn set_chrome(&mut self, chrome: Chrome) {
        self.chrome = chrome;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Flattens every attached, shown canvas into one viewport-sized frame,
    /// ordered by z-index and then by insertion.
    pub fn composite(&self) -> PixelBuffer {
        let mut frame = PixelBuffer::new(self.viewport.width, self.viewport.height);
        let mut layers: Vec<&Element> = self
            .elements
            .iter()
            .filter(|element| {
                element.is_canvas() && element.is_attached() && element.style().is_shown()
            })
            .collect();
        layers.sort_by_key(|element| element.style().z_index);
        for layer in layers {
            let style = layer.style();
            if style.fill_parent {
                frame.blit(layer.pixels(), 0, 0);
            } else {
                frame.blit(layer.pixels(), style.left, style.top);
            }
        }
        frame
    }

    fn position_of(&self, id: &ElementId) -> Option<usize> {
        self.elements.iter().position(|element| element.id() == id)
    }
}

impl Display for MemoryDisplay {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn chrome(&self) -> Chrome {
        self.chrome
    }

    fn element(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| element.id() == id)
    }

    fn element_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| element.id() == id)
    }

    fn insert(&mut self, element: Element) -> Option<Element> {
        let previous = self
            .position_of(element.id())
            .map(|index| self.elements.remove(index));
        self.elements.push(element);
        previous
    }

    fn remove(&mut self, id: &ElementId) -> Option<Element> {
        self.position_of(id).map(|index| self.elements.remove(index))
    }

    fn element_ids(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .map(|element| element.id().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn fill_rect_is_clipped_to_buffer() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.fill_rect(-2, -2, 4, 4, RED);

        assert_eq!(buffer.pixel(0, 0), Some(RED));
        assert_eq!(buffer.pixel(1, 1), Some(RED));
        assert_eq!(buffer.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn blit_skips_transparent_source_pixels() {
        let mut target = PixelBuffer::new(2, 1);
        target.fill(BLUE);
        let mut source = PixelBuffer::new(2, 1);
        source.set_pixel(1, 0, RED);

        target.blit(&source, 0, 0);

        assert_eq!(target.pixel(0, 0), Some(BLUE));
        assert_eq!(target.pixel(1, 0), Some(RED));
    }

    #[test]
    fn put_overwrites_overlap_only() {
        let mut target = PixelBuffer::new(3, 3);
        target.fill(BLUE);
        let source = PixelBuffer::new(2, 2);

        target.put(&source);

        assert_eq!(target.pixel(1, 1), Some([0, 0, 0, 0]));
        assert_eq!(target.pixel(2, 2), Some(BLUE));
    }

    #[test]
    fn from_rgba_rejects_mismatched_length() {
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn scaled_doubles_each_pixel() {
        let mut source = PixelBuffer::new(1, 1);
        source.set_pixel(0, 0, RED);

        let scaled = source.scaled(2, 2);

        assert_eq!(scaled.pixel(1, 1), Some(RED));
        assert_eq!(scaled.pixel(0, 1), Some(RED));
    }

    #[test]
    fn force_visible_reports_changes_once() {
        let mut style = Style {
            display: DisplayMode::None,
            opacity: 0.0,
            ..Style::default()
        };

        assert!(!style.is_shown());
        assert!(style.force_visible(Some(1000)));
        assert!(style.is_shown());
        assert!(!style.force_visible(Some(1000)));
    }

    #[test]
    fn insert_replaces_existing_id_and_moves_it_to_top() {
        let mut display = MemoryDisplay::new(Viewport {
            width: 4,
            height: 4,
        });
        display.insert(Element::canvas("a", 1, 1));
        display.insert(Element::canvas("b", 1, 1));
        let previous = display.insert(Element::canvas("a", 2, 2));

        assert!(previous.is_some());
        assert_eq!(
            display.element_ids(),
            vec![ElementId::new("b"), ElementId::new("a")]
        );
    }

    #[test]
    fn detached_elements_remain_addressable() {
        let mut display = MemoryDisplay::new(Viewport::default());
        let id = ElementId::new("npc");
        display.insert(Element::block(id.clone()));

        assert!(display.detach(&id));
        assert!(!display.detach(&id));
        assert!(display.contains(&id));
        assert!(!display.is_attached(&id));
        assert!(display.attach(&id));
    }

    #[test]
    fn read_and_write_pixels_only_apply_to_canvases() {
        let mut display = MemoryDisplay::new(Viewport::default());
        display.insert(Element::block("div"));
        display.insert(Element::canvas("canvas", 1, 1));
        let mut pixels = PixelBuffer::new(1, 1);
        pixels.fill(RED);

        assert!(!display.write_pixels(&ElementId::new("div"), &pixels));
        assert!(display.write_pixels(&ElementId::new("canvas"), &pixels));
        assert_eq!(display.read_pixels(&ElementId::new("canvas")), Some(pixels));
        assert_eq!(display.read_pixels(&ElementId::new("div")), None);
    }

    #[test]
    fn composite_skips_hidden_and_detached_canvases() {
        let viewport = Viewport {
            width: 2,
            height: 1,
        };
        let mut display = MemoryDisplay::new(viewport);
        let mut left = Element::canvas("left", 1, 1).with_position(0, 0);
        left.pixels_mut().fill(RED);
        let mut right = Element::canvas("right", 1, 1).with_position(1, 0);
        right.pixels_mut().fill(BLUE);
        right.style_mut().display = DisplayMode::None;
        display.insert(left);
        display.insert(right);

        let frame = display.composite();
        assert_eq!(frame.pixel(0, 0), Some(RED));
        assert_eq!(frame.pixel(1, 0), Some([0, 0, 0, 0]));

        display.detach(&ElementId::new("left"));
        assert_eq!(display.composite().pixel(0, 0), Some([0, 0, 0, 0]));
    }
}
