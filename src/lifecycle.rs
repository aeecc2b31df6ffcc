//! Lazy, exactly-once engine bring-up. Construction can take seconds (the
//! render backend loads lazily), so the first real request triggers it and
//! everyone else waits on an explicit readiness signal instead of polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::SimConfig;
use crate::controls::ControlState;
use crate::engine::EngineFactory;
use crate::error::InitError;
use crate::frame::{FrameReader, FrameSlot};
use crate::sim_loop::run_simulation_loop;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Initializing,
    Running,
    /// Construction failed. Terminal: the coordinator never rebuilds the
    /// engine within one process.
    Failed(InitError),
    /// The loop exited, either on request or after repeated tick failures.
    Stopped,
}

/// What a waiter learned from `await_ready`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    TimedOut,
    Failed(String),
}

pub struct LifecycleCoordinator {
    config: SimConfig,
    controls: Arc<ControlState>,
    slot: Arc<FrameSlot>,
    status_tx: Arc<watch::Sender<EngineStatus>>,
    stop: Arc<AtomicBool>,
    // Consumed by the one caller that launches construction; `None` means
    // construction has already been launched (or can never run again).
    factory: Mutex<Option<EngineFactory>>,
}

impl LifecycleCoordinator {
    pub fn new(config: SimConfig, factory: EngineFactory) -> Arc<Self> {
        let (status_tx, _) = watch::channel(EngineStatus::Uninitialized);
        Arc::new(Self {
            config,
            controls: Arc::new(ControlState::new()),
            slot: Arc::new(FrameSlot::new()),
            status_tx: Arc::new(status_tx),
            stop: Arc::new(AtomicBool::new(false)),
            factory: Mutex::new(Some(factory)),
        })
    }

    /// Idempotent: the first caller launches construction on the simulation
    /// thread; every later caller observes the same in-flight bring-up.
    pub fn ensure_started(&self) {
        let factory = self
            .factory
            .lock()
            .expect("engine factory mutex poisoned")
            .take();
        let Some(factory) = factory else {
            return;
        };

        self.status_tx.send_replace(EngineStatus::Initializing);
        let status_tx = Arc::clone(&self.status_tx);
        let controls = Arc::clone(&self.controls);
        let slot = Arc::clone(&self.slot);
        let stop = Arc::clone(&self.stop);
        let config = self.config.clone();

        let spawned = std::thread::Builder::new()
            .name("sim-loop".to_string())
            .spawn(move || {
                info!("constructing simulation engine");
                let engine = match factory() {
                    Ok(engine) => engine,
                    Err(err) => {
                        error!("{err}");
                        status_tx.send_replace(EngineStatus::Failed(err));
                        return;
                    }
                };
                status_tx.send_replace(EngineStatus::Running);
                info!("simulation engine running");
                run_simulation_loop(engine, controls, slot, config, stop);
                status_tx.send_replace(EngineStatus::Stopped);
                info!("simulation loop stopped");
            });

        if let Err(err) = spawned {
            let failure = InitError::new(format!("failed to spawn simulation thread: {err}"));
            error!("{failure}");
            self.status_tx.send_replace(EngineStatus::Failed(failure));
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.status_tx.borrow(), EngineStatus::Running)
    }

    /// Suspend until the engine is running, construction is observed to have
    /// failed, or `timeout` elapses, whichever comes first. Waiters wake
    /// immediately on a status change; nobody spins.
    pub async fn await_ready(&self, timeout: Duration) -> ReadyOutcome {
        let mut status_rx = self.status_tx.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = status_rx.borrow_and_update().clone();
            match current {
                EngineStatus::Running => return ReadyOutcome::Ready,
                EngineStatus::Failed(err) => return ReadyOutcome::Failed(err.to_string()),
                EngineStatus::Stopped => {
                    return ReadyOutcome::Failed("simulation loop stopped".to_string())
                }
                EngineStatus::Uninitialized | EngineStatus::Initializing => {}
            }
            match tokio::time::timeout_at(deadline, status_rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return ReadyOutcome::Failed("status channel closed".to_string()),
                Err(_) => return ReadyOutcome::TimedOut,
            }
        }
    }

    /// Ask the loop to exit after its current tick. Safe to call repeatedly
    /// and before the loop ever started.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn controls(&self) -> Arc<ControlState> {
        Arc::clone(&self.controls)
    }

    pub fn frame_reader(&self) -> FrameReader {
        self.slot.reader()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlSnapshot;
    use crate::engine::{RawImage, SimulationEngine};
    use std::sync::atomic::AtomicUsize;

    struct IdleEngine;

    impl SimulationEngine for IdleEngine {
        fn step(&mut self, _controls: &ControlSnapshot, _dt: f32) -> Result<(), String> {
            Ok(())
        }

        fn render(&mut self) -> Result<RawImage, String> {
            Ok(RawImage {
                width: 2,
                height: 2,
                pixels: vec![0u8; 2 * 2 * 3],
            })
        }
    }

    fn counting_factory(
        constructions: Arc<AtomicUsize>,
        build_delay: Duration,
    ) -> EngineFactory {
        Box::new(move || {
            std::thread::sleep(build_delay);
            constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(IdleEngine) as Box<dyn SimulationEngine>)
        })
    }

    fn failing_factory(message: &str) -> EngineFactory {
        let message = message.to_string();
        Box::new(move || Err(InitError::new(message)))
    }

    fn test_config() -> SimConfig {
        SimConfig {
            width: 64,
            height: 64,
            tick_hz: 100.0,
            substeps: 1,
            ..SimConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_started_constructs_exactly_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let coordinator = LifecycleCoordinator::new(
            test_config(),
            counting_factory(constructions.clone(), Duration::from_millis(30)),
        );

        let mut callers = Vec::new();
        for _ in 0..16 {
            let coordinator = Arc::clone(&coordinator);
            callers.push(tokio::spawn(async move {
                coordinator.ensure_started();
                coordinator.await_ready(Duration::from_secs(5)).await
            }));
        }
        for caller in callers {
            assert_eq!(caller.await.expect("caller completes"), ReadyOutcome::Ready);
        }

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn slow_construction_times_out_the_impatient_waiter_only() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let coordinator = LifecycleCoordinator::new(
            test_config(),
            counting_factory(constructions, Duration::from_millis(200)),
        );
        coordinator.ensure_started();

        let impatient = coordinator.await_ready(Duration::from_millis(20)).await;
        assert_eq!(impatient, ReadyOutcome::TimedOut);

        let patient = coordinator.await_ready(Duration::from_secs(5)).await;
        assert_eq!(patient, ReadyOutcome::Ready);
        assert!(coordinator.is_ready());
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn construction_failure_is_terminal_and_distinguishable() {
        let coordinator =
            LifecycleCoordinator::new(test_config(), failing_factory("backend missing"));
        coordinator.ensure_started();

        let outcome = coordinator.await_ready(Duration::from_secs(5)).await;
        match outcome {
            ReadyOutcome::Failed(reason) => assert!(reason.contains("backend missing")),
            other => panic!("expected failure outcome, got {other:?}"),
        }

        // A second demand must not relaunch construction.
        coordinator.ensure_started();
        assert!(!coordinator.is_ready());
        assert!(matches!(coordinator.status(), EngineStatus::Failed(_)));
    }

    #[tokio::test]
    async fn shutdown_moves_a_running_loop_to_stopped() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let coordinator = LifecycleCoordinator::new(
            test_config(),
            counting_factory(constructions, Duration::ZERO),
        );
        coordinator.ensure_started();
        assert_eq!(
            coordinator.await_ready(Duration::from_secs(5)).await,
            ReadyOutcome::Ready
        );

        coordinator.shutdown();
        let mut status_rx = coordinator.status_tx.subscribe();
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *status_rx.borrow_and_update() == EngineStatus::Stopped {
                    return;
                }
                if status_rx.changed().await.is_err() {
                    panic!("status channel closed before Stopped");
                }
            }
        })
        .await;
        assert!(stopped.is_ok(), "loop did not stop in time");
    }
}
