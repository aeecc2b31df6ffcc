use std::time::Duration;

use tracing::warn;

/// Simulation and streaming knobs, clamped to sane ranges the way the trial
/// configs do it. Resolved once at startup; copied wherever needed.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Rendered frame dimensions.
    pub width: u32,
    pub height: u32,
    /// Ticks per second for the producer loop (step + render + encode +
    /// publish).
    pub tick_hz: f32,
    /// Engine sub-steps per tick. Higher values trade physics fidelity for
    /// throughput on cheap scenes.
    pub substeps: u32,
    /// JPEG quality for the wire frames.
    pub jpeg_quality: u8,
    /// Per-viewer emit rate. Clamped to the tick rate at the stream
    /// boundary; polling faster than frames are produced buys nothing.
    pub viewer_fps: f32,
    /// How often a not-yet-ready control channel is sent a loading notice.
    pub loading_notice_interval: Duration,
    /// How many loading notices a channel gets before it is closed.
    pub loading_notice_budget: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            tick_hz: 30.0,
            substeps: 2,
            jpeg_quality: 60,
            viewer_fps: 25.0,
            loading_notice_interval: Duration::from_millis(100),
            loading_notice_budget: 100,
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            width: resolve_env_u32("SIM_FRAME_WIDTH", base.width).clamp(64, 1920),
            height: resolve_env_u32("SIM_FRAME_HEIGHT", base.height).clamp(64, 1080),
            tick_hz: resolve_env_f32("SIM_TICK_HZ", base.tick_hz).clamp(1.0, 120.0),
            substeps: resolve_env_u32("SIM_SUBSTEPS", base.substeps).clamp(1, 16),
            jpeg_quality: resolve_env_u32("SIM_JPEG_QUALITY", base.jpeg_quality as u32)
                .clamp(10, 95) as u8,
            viewer_fps: resolve_env_f32("SIM_VIEWER_FPS", base.viewer_fps).clamp(1.0, 120.0),
            ..base
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz)
    }

    /// Simulated seconds advanced by a single engine sub-step.
    pub fn substep_dt(&self) -> f32 {
        1.0 / (self.tick_hz * self.substeps as f32)
    }

    pub fn viewer_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.viewer_fps.min(self.tick_hz))
    }
}

fn resolve_env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw_value) => match raw_value.parse::<u32>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("{name} must be a non-negative integer; got '{raw_value}'");
                default
            }
        },
        Err(_) => default,
    }
}

fn resolve_env_f32(name: &str, default: f32) -> f32 {
    match std::env::var(name) {
        Ok(raw_value) => match raw_value.parse::<f32>() {
            Ok(parsed) if parsed.is_finite() && parsed > 0.0 => parsed,
            _ => {
                warn!("{name} must be a positive number; got '{raw_value}'");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_period_never_outpaces_the_tick_rate() {
        let config = SimConfig {
            tick_hz: 10.0,
            viewer_fps: 60.0,
            ..SimConfig::default()
        };
        assert_eq!(config.viewer_period(), Duration::from_secs_f32(0.1));
    }

    #[test]
    fn substep_dt_divides_the_tick() {
        let config = SimConfig {
            tick_hz: 50.0,
            substeps: 4,
            ..SimConfig::default()
        };
        let expected = 1.0 / 200.0;
        assert!((config.substep_dt() - expected).abs() < 1e-6);
    }
}
