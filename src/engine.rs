//! The simulation engine seam. The server core treats the engine as an
//! opaque collaborator: it advances on control input and renders to a raw
//! image, nothing more. `PlaygroundEngine` is the bundled implementation: a
//! keyboard-driven box in a walled arena, rendered top-down.

use crate::controls::ControlSnapshot;
use crate::error::InitError;

/// Raw RGB8 frame produced by an engine render.
#[derive(Clone, Debug)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait SimulationEngine: Send {
    /// Advance the simulation by `dt` seconds under the given control levels.
    fn step(&mut self, controls: &ControlSnapshot, dt: f32) -> Result<(), String>;

    /// Render the current state.
    fn render(&mut self) -> Result<RawImage, String>;
}

/// Builds the engine exactly once, on the simulation thread. Construction
/// may take seconds and may fail; both are the coordinator's problem.
pub type EngineFactory =
    Box<dyn FnOnce() -> Result<Box<dyn SimulationEngine>, InitError> + Send + 'static>;

const MIN_ARENA_EDGE: u32 = 64;
const BOX_SIZE: f32 = 48.0;
const WALL_THICKNESS: u32 = 8;
const FLOOR_CELL: u32 = 40;
const DRIVE_ACCEL: f32 = 900.0;
const FRICTION: f32 = 3.5;
const MAX_SPEED: f32 = 420.0;

const FLOOR_LIGHT: [u8; 3] = [64, 77, 102];
const FLOOR_DARK: [u8; 3] = [26, 38, 51];
const WALL_GRAY: [u8; 3] = [153, 153, 153];
const BOX_ORANGE: [u8; 3] = [230, 128, 51];

pub struct PlaygroundEngine {
    width: u32,
    height: u32,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

impl PlaygroundEngine {
    pub fn new(width: u32, height: u32) -> Result<Self, String> {
        if width < MIN_ARENA_EDGE || height < MIN_ARENA_EDGE {
            return Err(format!(
                "arena {width}x{height} is smaller than the {MIN_ARENA_EDGE}px minimum"
            ));
        }
        Ok(Self {
            width,
            height,
            x: (width as f32 - BOX_SIZE) * 0.5,
            y: (height as f32 - BOX_SIZE) * 0.5,
            vx: 0.0,
            vy: 0.0,
        })
    }

    /// Factory for the coordinator: boxes the engine behind the seam.
    pub fn factory(width: u32, height: u32) -> EngineFactory {
        Box::new(move || {
            let engine = Self::new(width, height).map_err(InitError::new)?;
            Ok(Box::new(engine) as Box<dyn SimulationEngine>)
        })
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    fn clamp_to_walls(&mut self) {
        let wall = WALL_THICKNESS as f32;
        let max_x = self.width as f32 - wall - BOX_SIZE;
        let max_y = self.height as f32 - wall - BOX_SIZE;
        if self.x < wall {
            self.x = wall;
            self.vx = 0.0;
        } else if self.x > max_x {
            self.x = max_x;
            self.vx = 0.0;
        }
        if self.y < wall {
            self.y = wall;
            self.vy = 0.0;
        } else if self.y > max_y {
            self.y = max_y;
            self.vy = 0.0;
        }
    }

    fn pixel_color(&self, px: u32, py: u32) -> [u8; 3] {
        let in_wall = px < WALL_THICKNESS
            || py < WALL_THICKNESS
            || px >= self.width - WALL_THICKNESS
            || py >= self.height - WALL_THICKNESS;
        if in_wall {
            return WALL_GRAY;
        }

        let fx = px as f32;
        let fy = py as f32;
        if fx >= self.x && fx < self.x + BOX_SIZE && fy >= self.y && fy < self.y + BOX_SIZE {
            return BOX_ORANGE;
        }

        if (px / FLOOR_CELL + py / FLOOR_CELL) % 2 == 0 {
            FLOOR_LIGHT
        } else {
            FLOOR_DARK
        }
    }
}

impl SimulationEngine for PlaygroundEngine {
    fn step(&mut self, controls: &ControlSnapshot, dt: f32) -> Result<(), String> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(format!("non-positive step dt: {dt}"));
        }

        let (ax, ay) = controls.drive_axes();
        self.vx += ax * DRIVE_ACCEL * dt;
        self.vy += ay * DRIVE_ACCEL * dt;

        // Exponential-ish friction decay, stable for any dt.
        let decay = 1.0 / (1.0 + FRICTION * dt);
        self.vx *= decay;
        self.vy *= decay;

        let speed = (self.vx * self.vx + self.vy * self.vy).sqrt();
        if speed > MAX_SPEED {
            let scale = MAX_SPEED / speed;
            self.vx *= scale;
            self.vy *= scale;
        }

        self.x += self.vx * dt;
        self.y += self.vy * dt;
        self.clamp_to_walls();
        Ok(())
    }

    fn render(&mut self) -> Result<RawImage, String> {
        let mut pixels = vec![0u8; (self.width * self.height * 3) as usize];
        for py in 0..self.height {
            for px in 0..self.width {
                let color = self.pixel_color(px, py);
                let offset = ((py * self.width + px) * 3) as usize;
                pixels[offset..offset + 3].copy_from_slice(&color);
            }
        }
        Ok(RawImage {
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}
