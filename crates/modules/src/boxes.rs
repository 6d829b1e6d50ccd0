//! Solid boxes bouncing off the edges. Runs unlimited, so it is the module to
//! reach for when checking how fast the host can go.

use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use session::{
    DrawContext, FrameInterval, ModuleIdentity, Plugin, PluginLoadError, RenderError, SurfaceSize,
};

const BOX_COUNT: usize = 6;
const BACKGROUND: Rgba<u8> = Rgba([16, 16, 16, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Body {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    side: f32,
    colour: Rgba<u8>,
}

pub struct BouncingBoxes {
    bodies: Vec<Body>,
    size: SurfaceSize,
    last_elapsed: f32,
}

impl BouncingBoxes {
    pub fn new(seed: u64, size: SurfaceSize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let width = size.width.max(1) as f32;
        let height = size.height.max(1) as f32;
        let bodies = (0..BOX_COUNT)
            .map(|_| {
                let side = (width.min(height) * rng.gen_range(0.05..0.15)).max(1.0);
                Body {
                    x: rng.gen_range(0.0..(width - side).max(1.0)),
                    y: rng.gen_range(0.0..(height - side).max(1.0)),
                    vx: rng.gen_range(0.2..0.6) * width * if rng.gen() { 1.0 } else { -1.0 },
                    vy: rng.gen_range(0.2..0.6) * height * if rng.gen() { 1.0 } else { -1.0 },
                    side,
                    colour: Rgba([rng.gen_range(64..=255), rng.gen_range(64..=255), rng.gen_range(64..=255), 255]),
                }
            })
            .collect();
        Self {
            bodies,
            size,
            last_elapsed: 0.0,
        }
    }

    fn step(&mut self, dt: f32) {
        let width = self.size.width as f32;
        let height = self.size.height as f32;
        for body in &mut self.bodies {
            body.x += body.vx * dt;
            body.y += body.vy * dt;
            bounce(&mut body.x, &mut body.vx, (width - body.side).max(0.0));
            bounce(&mut body.y, &mut body.vy, (height - body.side).max(0.0));
        }
    }
}

fn bounce(position: &mut f32, velocity: &mut f32, limit: f32) {
    if *position < 0.0 {
        *position = -*position;
        *velocity = velocity.abs();
    }
    if *position > limit {
        *position = (2.0 * limit - *position).max(0.0);
        *velocity = -velocity.abs();
    }
}

impl Plugin for BouncingBoxes {
    fn configure(&mut self, size: SurfaceSize) {
        let sx = size.width as f32 / self.size.width.max(1) as f32;
        let sy = size.height as f32 / self.size.height.max(1) as f32;
        for body in &mut self.bodies {
            body.x *= sx;
            body.y *= sy;
            body.vx *= sx;
            body.vy *= sy;
        }
        self.size = size;
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError> {
        let elapsed = ctx.elapsed().as_secs_f32();
        let dt = (elapsed - self.last_elapsed).clamp(0.0, 0.1);
        self.last_elapsed = elapsed;
        self.step(dt);

        let canvas = ctx.canvas_mut();
        let (width, height) = canvas.dimensions();
        for pixel in canvas.pixels_mut() {
            *pixel = BACKGROUND;
        }
        for body in &self.bodies {
            let x0 = body.x.max(0.0) as u32;
            let y0 = body.y.max(0.0) as u32;
            let x1 = ((body.x + body.side) as u32).min(width);
            let y1 = ((body.y + body.side) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    canvas.put_pixel(x, y, body.colour);
                }
            }
        }
        Ok(())
    }

    fn preferred_frame_interval(&self) -> FrameInterval {
        FrameInterval::Unlimited
    }
}

pub(crate) fn create(
    _identity: &ModuleIdentity,
    size: SurfaceSize,
    _preview: bool,
) -> Result<Box<dyn Plugin>, PluginLoadError> {
    Ok(Box::new(BouncingBoxes::new(rand::random(), size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_stay_inside_the_surface() {
        let size = SurfaceSize::new(100, 60);
        let mut boxes = BouncingBoxes::new(3, size);
        for _ in 0..500 {
            boxes.step(0.05);
        }
        for body in &boxes.bodies {
            assert!(body.x >= 0.0 && body.x + body.side <= 100.0 + 0.001, "{body:?}");
            assert!(body.y >= 0.0 && body.y + body.side <= 60.0 + 0.001, "{body:?}");
        }
    }

    #[test]
    fn bounce_reflects_velocity() {
        let mut position = -2.0;
        let mut velocity = -5.0;
        bounce(&mut position, &mut velocity, 10.0);
        assert_eq!((position, velocity), (2.0, 5.0));

        let mut position = 12.0;
        let mut velocity = 5.0;
        bounce(&mut position, &mut velocity, 10.0);
        assert_eq!((position, velocity), (8.0, -5.0));
    }

    #[test]
    fn resize_scales_positions() {
        let mut boxes = BouncingBoxes::new(9, SurfaceSize::new(50, 50));
        let before = boxes.bodies[0];
        boxes.configure(SurfaceSize::new(100, 100));
        assert!((boxes.bodies[0].x - before.x * 2.0).abs() < 1e-3);
        assert_eq!(boxes.bodies[0].side, before.side);
    }

    #[test]
    fn unlimited_rate() {
        let boxes = BouncingBoxes::new(1, SurfaceSize::new(10, 10));
        assert!(boxes.preferred_frame_interval().is_unlimited());
    }
}
