//! Classic sine plasma. Cycles through palettes when its configuration UI is
//! opened, so it doubles as the module that exercises that path.

use std::f32::consts::TAU;

use image::Rgba;
use session::{
    DrawContext, FrameInterval, ModuleIdentity, Plugin, PluginLoadError, RenderError, SurfaceSize,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Palette {
    Ember,
    Lagoon,
    Mono,
}

impl Palette {
    fn next(self) -> Self {
        match self {
            Self::Ember => Self::Lagoon,
            Self::Lagoon => Self::Mono,
            Self::Mono => Self::Ember,
        }
    }

    fn shade(self, value: f32) -> Rgba<u8> {
        let phase = value * TAU;
        let channel = |offset: f32| (((phase + offset).sin() * 0.5 + 0.5) * 255.0) as u8;
        match self {
            Self::Ember => Rgba([channel(0.0), channel(1.2), channel(2.8) / 3, 255]),
            Self::Lagoon => Rgba([channel(3.0) / 4, channel(1.0), channel(0.0), 255]),
            Self::Mono => {
                let level = channel(0.0);
                Rgba([level, level, level, 255])
            }
        }
    }
}

pub struct Plasma {
    size: SurfaceSize,
    palette: Palette,
    /// Sample every `step` pixels; previews run at a coarser grain.
    step: u32,
}

impl Plasma {
    pub fn new(preview: bool) -> Self {
        Self {
            size: SurfaceSize::new(1, 1),
            palette: Palette::Ember,
            step: if preview { 2 } else { 1 },
        }
    }

    pub(crate) fn palette(&self) -> Palette {
        self.palette
    }

    fn value_at(&self, x: f32, y: f32, t: f32) -> f32 {
        let width = self.size.width as f32;
        let height = self.size.height as f32;
        let u = x / width * 8.0;
        let v = y / height * 8.0;
        let mut sum = (u + t).sin();
        sum += ((v + t * 0.7).sin() + (u * 0.5).cos()).sin();
        sum += ((u + v + t * 1.3) * 0.5).sin();
        let cx = u + (t * 0.5).sin() * 4.0;
        let cy = v + (t * 0.3).cos() * 4.0;
        sum += ((cx * cx + cy * cy).sqrt() + t).sin();
        sum / 4.0
    }
}

impl Plugin for Plasma {
    fn configure(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError> {
        let t = ctx.elapsed().as_secs_f32();
        let step = self.step.max(1);
        let canvas = ctx.canvas_mut();
        let (width, height) = canvas.dimensions();
        for y in (0..height).step_by(step as usize) {
            for x in (0..width).step_by(step as usize) {
                let colour = self.palette.shade(self.value_at(x as f32, y as f32, t));
                for dy in 0..step.min(height - y) {
                    for dx in 0..step.min(width - x) {
                        canvas.put_pixel(x + dx, y + dy, colour);
                    }
                }
            }
        }
        Ok(())
    }

    fn preferred_frame_interval(&self) -> FrameInterval {
        FrameInterval::from_millis(33)
    }

    fn has_configuration_ui(&self) -> bool {
        true
    }

    fn show_configuration_ui(&mut self) {
        self.palette = self.palette.next();
        info!(palette = ?self.palette, "plasma palette changed");
    }
}

pub(crate) fn create(
    _identity: &ModuleIdentity,
    _size: SurfaceSize,
    preview: bool,
) -> Result<Box<dyn Plugin>, PluginLoadError> {
    Ok(Box::new(Plasma::new(preview)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::RgbaImage;
    use session::SurfaceAccounting;

    use super::*;

    fn render(plasma: &mut Plasma, size: SurfaceSize, elapsed: Duration) -> RgbaImage {
        plasma.configure(size);
        let mut canvas = RgbaImage::new(size.width, size.height);
        let mut accounting = SurfaceAccounting::new();
        {
            let mut guard = accounting.enter();
            let mut ctx = guard.context(&mut canvas, 0, elapsed);
            plasma.draw(&mut ctx).unwrap();
        }
        assert!(accounting.is_balanced());
        canvas
    }

    #[test]
    fn fills_every_pixel_opaque() {
        let mut plasma = Plasma::new(false);
        let canvas = render(&mut plasma, SurfaceSize::new(17, 9), Duration::from_millis(250));
        assert!(canvas.pixels().all(|pixel| pixel[3] == 255));
    }

    #[test]
    fn animates_over_time() {
        let mut plasma = Plasma::new(false);
        let size = SurfaceSize::new(16, 16);
        let first = render(&mut plasma, size, Duration::ZERO);
        let later = render(&mut plasma, size, Duration::from_secs(2));
        assert_ne!(first.as_raw(), later.as_raw());
    }

    #[test]
    fn preview_uses_blocks() {
        let mut plasma = Plasma::new(true);
        let canvas = render(&mut plasma, SurfaceSize::new(8, 8), Duration::from_secs(1));
        assert_eq!(canvas.get_pixel(0, 0), canvas.get_pixel(1, 1));
        assert_eq!(canvas.get_pixel(6, 2), canvas.get_pixel(7, 3));
    }

    #[test]
    fn configuration_cycles_palettes() {
        let mut plasma = Plasma::new(false);
        assert!(plasma.has_configuration_ui());
        plasma.show_configuration_ui();
        assert_eq!(plasma.palette(), Palette::Lagoon);
        plasma.show_configuration_ui();
        plasma.show_configuration_ui();
        assert_eq!(plasma.palette(), Palette::Ember);
    }
}
