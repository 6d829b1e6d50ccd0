//! Stars streaming out of the centre of the screen.

use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use session::{
    DrawContext, FrameInterval, ModuleIdentity, Plugin, PluginLoadError, RenderError, SurfaceSize,
};

const FULL_STARS: usize = 400;
const PREVIEW_STARS: usize = 80;
/// Depth units travelled per second.
const SPEED: f32 = 0.6;
const BACKGROUND: Rgba<u8> = Rgba([2, 2, 12, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Star {
    x: f32,
    y: f32,
    z: f32,
}

pub struct Starfield {
    rng: StdRng,
    stars: Vec<Star>,
    size: SurfaceSize,
    last_elapsed: f32,
}

impl Starfield {
    pub fn new(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let stars = (0..count).map(|_| spawn(&mut rng, None)).collect();
        Self {
            rng,
            stars,
            size: SurfaceSize::new(1, 1),
            last_elapsed: 0.0,
        }
    }

    fn advance(&mut self, dt: f32) {
        for star in &mut self.stars {
            star.z -= SPEED * dt;
            if star.z <= 0.01 {
                *star = spawn(&mut self.rng, Some(1.0));
            }
        }
    }

    fn project(&self, star: &Star) -> Option<(u32, u32)> {
        let half_w = self.size.width as f32 / 2.0;
        let half_h = self.size.height as f32 / 2.0;
        let sx = half_w + star.x / star.z * half_w;
        let sy = half_h + star.y / star.z * half_h;
        let inside = sx >= 0.0 && sy >= 0.0 && sx < self.size.width as f32 && sy < self.size.height as f32;
        inside.then_some((sx as u32, sy as u32))
    }
}

fn spawn(rng: &mut StdRng, depth: Option<f32>) -> Star {
    Star {
        x: rng.gen_range(-1.0..1.0),
        y: rng.gen_range(-1.0..1.0),
        z: depth.unwrap_or_else(|| rng.gen_range(0.05..1.0)),
    }
}

impl Plugin for Starfield {
    fn configure(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError> {
        let elapsed = ctx.elapsed().as_secs_f32();
        let dt = (elapsed - self.last_elapsed).clamp(0.0, 0.25);
        self.last_elapsed = elapsed;
        self.advance(dt);

        ctx.lock_focus();
        let projected: Vec<((u32, u32), u8)> = self
            .stars
            .iter()
            .filter_map(|star| {
                let brightness = ((1.0 - star.z).clamp(0.0, 1.0) * 255.0) as u8;
                self.project(star).map(|point| (point, brightness.max(40)))
            })
            .collect();
        let canvas = ctx.canvas_mut();
        for pixel in canvas.pixels_mut() {
            *pixel = BACKGROUND;
        }
        for ((x, y), level) in projected {
            canvas.put_pixel(x, y, Rgba([level, level, level, 255]));
        }
        ctx.unlock_focus();
        Ok(())
    }

    fn preferred_frame_interval(&self) -> FrameInterval {
        FrameInterval::from_millis(16)
    }
}

pub(crate) fn create(
    _identity: &ModuleIdentity,
    _size: SurfaceSize,
    preview: bool,
) -> Result<Box<dyn Plugin>, PluginLoadError> {
    let count = if preview { PREVIEW_STARS } else { FULL_STARS };
    Ok(Box::new(Starfield::new(count, rand::random())))
}
