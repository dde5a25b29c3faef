use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::app::display::{MemoryDisplay, PixelBuffer, Viewport};

pub const CLEAR_COLOR: [u8; 4] = [20, 22, 28, 255];

/// Presents the composited display into a window through `pixels`.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn present(&mut self, display: &MemoryDisplay) -> Result<(), Error> {
        let composite = display.composite();
        let Viewport { width, height } = self.viewport;
        copy_composite(self.pixels.frame_mut(), width, height, &composite);
        self.pixels.render()
    }
}

/// Writes `composite` over the clear colour, clipped to the frame.
fn copy_composite(frame: &mut [u8], width: u32, height: u32, composite: &PixelBuffer) {
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&CLEAR_COLOR);
    }
    let rows = height.min(composite.height());
    let cols = width.min(composite.width());
    for y in 0..rows {
        for x in 0..cols {
            let Some(rgba) = composite.pixel(x, y) else {
                continue;
            };
            if rgba[3] == 0 {
                continue;
            }
            let offset = (y as usize * width as usize + x as usize) * 4;
            if let Some(dst) = frame.get_mut(offset..offset + 4) {
                dst.copy_from_slice(&rgba);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_composite_pixels_show_clear_colour() {
        let mut composite = PixelBuffer::new(2, 1);
        composite.set_pixel(1, 0, [1, 2, 3, 255]);
        let mut frame = vec![0u8; 2 * 4];

        copy_composite(&mut frame, 2, 1, &composite);

        assert_eq!(&frame[0..4], &CLEAR_COLOR);
        assert_eq!(&frame[4..8], &[1, 2, 3, 255]);
    }

    #[test]
    fn composite_is_clipped_to_smaller_frame() {
        let mut composite = PixelBuffer::new(4, 4);
        composite.fill([9, 9, 9, 255]);
        let mut frame = vec![0u8; 2 * 2 * 4];

        copy_composite(&mut frame, 2, 2, &composite);

        assert!(frame.chunks_exact(4).all(|pixel| pixel == [9, 9, 9, 255]));
    }
}
