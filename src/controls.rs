use std::sync::Mutex;

/// The fixed set of input signals the simulation understands. Messages
/// naming anything else are ignored, not rejected, so newer clients can
/// speak a richer protocol against an older server.
pub const CONTROL_SIGNALS: [&str; 4] = ["ArrowUp", "ArrowDown", "ArrowLeft", "ArrowRight"];

/// A consistent copy of every signal level, taken once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlSnapshot {
    pressed: [bool; CONTROL_SIGNALS.len()],
}

impl ControlSnapshot {
    pub fn is_pressed(&self, signal: &str) -> bool {
        signal_index(signal)
            .map(|index| self.pressed[index])
            .unwrap_or(false)
    }

    pub fn any_pressed(&self) -> bool {
        self.pressed.iter().any(|&active| active)
    }

    /// Drive direction as (x, y) in screen coordinates: +x right, +y down.
    /// Opposing keys cancel out.
    pub fn drive_axes(&self) -> (f32, f32) {
        let mut x = 0.0;
        let mut y = 0.0;
        if self.is_pressed("ArrowRight") {
            x += 1.0;
        }
        if self.is_pressed("ArrowLeft") {
            x -= 1.0;
        }
        if self.is_pressed("ArrowDown") {
            y += 1.0;
        }
        if self.is_pressed("ArrowUp") {
            y -= 1.0;
        }
        (x, y)
    }
}

/// Level-triggered control state: written by inbound control messages, read
/// once per simulation tick. No history is kept. The lock is held only for
/// the copy, never across engine work.
#[derive(Debug, Default)]
pub struct ControlState {
    inner: Mutex<ControlSnapshot>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional overwrite. Unknown signal names are a silent no-op.
    pub fn set(&self, signal: &str, active: bool) {
        let Some(index) = signal_index(signal) else {
            return;
        };
        let mut inner = self.inner.lock().expect("control mutex poisoned");
        inner.pressed[index] = active;
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        *self.inner.lock().expect("control mutex poisoned")
    }

    /// Release every signal. Called when a control channel disconnects so no
    /// input stays stuck active against the simulation.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock().expect("control mutex poisoned");
        *inner = ControlSnapshot::default();
    }
}

fn signal_index(signal: &str) -> Option<usize> {
    CONTROL_SIGNALS.iter().position(|&known| known == signal)
}
