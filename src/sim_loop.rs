//! The producer loop: read controls, step the engine, render, encode,
//! publish. Runs on its own thread for the process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use crate::config::SimConfig;
use crate::controls::ControlState;
use crate::encode::encode_jpeg;
use crate::engine::SimulationEngine;
use crate::error::TickError;
use crate::frame::FrameSlot;

/// Consecutive failed ticks tolerated before the loop gives up. A single bad
/// tick leaves the last good frame in place; a run of them means the engine
/// is broken for good.
const MAX_CONSECUTIVE_TICK_FAILURES: u32 = 3;

pub(crate) fn run_simulation_loop(
    mut engine: Box<dyn SimulationEngine>,
    controls: Arc<ControlState>,
    slot: Arc<FrameSlot>,
    config: SimConfig,
    stop: Arc<AtomicBool>,
) {
    let tick_period = config.tick_period();
    let dt = config.substep_dt();
    let mut consecutive_failures = 0u32;
    let mut next_deadline = Instant::now() + tick_period;

    while !stop.load(Ordering::Relaxed) {
        match run_tick(engine.as_mut(), &controls, &slot, &config, dt) {
            Ok(_) => consecutive_failures = 0,
            Err(err) => {
                consecutive_failures += 1;
                warn!("tick failed ({consecutive_failures} consecutive): {err}");
                if consecutive_failures >= MAX_CONSECUTIVE_TICK_FAILURES {
                    error!(
                        "stopping simulation after {consecutive_failures} consecutive tick failures"
                    );
                    return;
                }
            }
        }

        // Drift-tolerant pacing: sleep out the remainder of the tick, but if
        // the tick overran, start the next one immediately and re-anchor the
        // deadline instead of compounding the delay.
        let now = Instant::now();
        if next_deadline > now {
            std::thread::sleep(next_deadline - now);
            next_deadline += tick_period;
        } else {
            next_deadline = now + tick_period;
        }
    }
}

fn run_tick(
    engine: &mut dyn SimulationEngine,
    controls: &ControlState,
    slot: &FrameSlot,
    config: &SimConfig,
    dt: f32,
) -> Result<u64, TickError> {
    let snapshot = controls.snapshot();
    for _ in 0..config.substeps {
        engine.step(&snapshot, dt).map_err(TickError::Step)?;
    }
    let raw = engine.render().map_err(TickError::Render)?;
    let bytes = encode_jpeg(&raw, config.jpeg_quality)?;
    Ok(slot.publish(bytes))
}
