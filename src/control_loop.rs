//! Frame-driven control loop
//!
//! Runs the whole pipeline synchronously once per frame:
//!
//! ```text
//! InputSource ──► InputSampler ──► CommandThrottler ──► ActuatorRegistry ──► Actuator(s)
//!                  (FrameInput)      (Decision)           (fan-out)
//! ```
//!
//! Before any stick handling the exit trigger is checked, then the
//! start/stop trigger. A frame that toggled links does not dispatch.
//!
//! Nothing here retries. A failing move is either fatal or logged depending
//! on [`SinkFailurePolicy`]; a failing link toggle is always fatal, since
//! carrying on with an unknown link state risks uncommanded motion.
//!
//! Actuators whose link is down (stopped by the operator or never started)
//! are left out of the fan-out. That is not a failure.

use crate::actuator::{Actuator, ActuatorError, ControlMode};
use crate::controller::input::InputSource;
use crate::controller::sampler::InputSampler;
use crate::controller::stick::IntentPair;
use crate::throttle::{
    ActuatorRegistry, Clock, CommandThrottler, Decision, DispatchReason, EntityId,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What to do when an actuator rejects a move command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFailurePolicy {
    /// Stop the loop and hand the error to the host
    #[default]
    Abort,
    /// Log the failure and keep going with the next actuator/frame
    LogAndContinue,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Actuator '{name}' ({entity}) failed to move: {source}")]
    Dispatch {
        entity: EntityId,
        name: String,
        #[source]
        source: ActuatorError,
    },

    #[error("Failed to {action} link of '{name}' ({entity}): {source}")]
    ConnectionToggle {
        entity: EntityId,
        name: String,
        action: &'static str,
        #[source]
        source: ActuatorError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

// Counters reported periodically
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub dispatches: u64,
    pub keep_alives: u64,
    pub skipped: u64,
    pub toggles: u64,
    pub sink_failures: u64,
}

/// Host-side owner of the throttler and the actuator registry.
pub struct ControlLoop<H = Box<dyn Actuator>> {
    sampler: InputSampler,
    throttler: CommandThrottler,
    registry: ActuatorRegistry<H>,
    mode: ControlMode,
    sink_failure: SinkFailurePolicy,

    stats: LoopStats,
    window: LoopStats,
    last_stats_log: DateTime<Local>,
}

impl<H: Actuator> ControlLoop<H> {
    pub fn new(
        sampler: InputSampler,
        throttler: CommandThrottler,
        mode: ControlMode,
        sink_failure: SinkFailurePolicy,
    ) -> Self {
        info!(
            "Creating control loop: mode={}, sink_failure={:?}",
            mode, sink_failure
        );
        Self {
            sampler,
            throttler,
            registry: ActuatorRegistry::new(),
            mode,
            sink_failure,
            stats: LoopStats::default(),
            window: LoopStats::default(),
            last_stats_log: Local::now(),
        }
    }

    /// Wires an actuator into the shared decision. Duplicate ids are ignored.
    pub fn add(&mut self, id: EntityId, handle: H) -> bool {
        self.registry.add(id, handle)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<H> {
        self.registry.remove(id)
    }

    pub fn registry(&self) -> &ActuatorRegistry<H> {
        &self.registry
    }

    pub fn throttler(&self) -> &CommandThrottler {
        &self.throttler
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Runs one frame at `now`.
    pub fn tick(&mut self, input: &dyn InputSource, now: Instant) -> Result<LoopControl, ControlError> {
        let frame = self.sampler.sample(input);
        self.count(|s| s.frames += 1);

        if frame.exit {
            info!("Exit requested");
            return Ok(LoopControl::Exit);
        }

        if frame.start_stop {
            info!("Start/Stop requested");
            self.toggle_connections()?;
            self.count(|s| s.toggles += 1);
            self.maybe_log_stats();
            return Ok(LoopControl::Continue);
        }

        match self.throttler.decide(frame.intent, now) {
            Decision::Dispatch(reason) => {
                self.count(|s| s.dispatches += 1);
                if reason == DispatchReason::KeepAlive {
                    self.count(|s| s.keep_alives += 1);
                }
                self.fan_out(&frame.intent)?;
            }
            Decision::Skip(_) => self.count(|s| s.skipped += 1),
        }

        self.maybe_log_stats();
        Ok(LoopControl::Continue)
    }

    /// Stops every link that is still up. Errors are logged, not returned.
    pub fn shutdown(&mut self) {
        info!("Shutting down {} actuator(s)", self.registry.len());
        self.registry.for_each(|id, handle| {
            let name = handle.name().to_string();
            if let Some(connection) = handle.connection() {
                if connection.connected() {
                    if let Err(e) = connection.stop() {
                        error!("Error stopping link of '{}' ({}): {}", name, id, e);
                    }
                }
            }
        });
        info!(
            "Control loop finished: {} frames, {} dispatches ({} keep-alive), {} sink failures",
            self.stats.frames, self.stats.dispatches, self.stats.keep_alives, self.stats.sink_failures
        );
    }

    fn fan_out(&mut self, intent: &IntentPair) -> Result<(), ControlError> {
        let mode = self.mode;
        match self.sink_failure {
            SinkFailurePolicy::Abort => self.registry.try_for_each(|id, handle| {
                if link_down(handle) {
                    trace!("'{}' ({}) link is down, not moving", handle.name(), id);
                    return Ok(());
                }
                handle
                    .move_sticks(&intent.chassis, &intent.gimbal, mode)
                    .map_err(|source| ControlError::Dispatch {
                        entity: id,
                        name: handle.name().to_string(),
                        source,
                    })
            }),
            SinkFailurePolicy::LogAndContinue => {
                let mut failures = 0;
                self.registry.for_each(|id, handle| {
                    if link_down(handle) {
                        trace!("'{}' ({}) link is down, not moving", handle.name(), id);
                        return;
                    }
                    if let Err(e) = handle.move_sticks(&intent.chassis, &intent.gimbal, mode) {
                        warn!("Actuator '{}' ({}) failed to move: {}", handle.name(), id, e);
                        failures += 1;
                    }
                });
                self.count(|s| s.sink_failures += failures);
                Ok(())
            }
        }
    }

    fn toggle_connections(&mut self) -> Result<(), ControlError> {
        self.registry.try_for_each(|id, handle| {
            let name = handle.name().to_string();
            let Some(connection) = handle.connection() else {
                debug!("'{}' ({}) has no link to toggle", name, id);
                return Ok(());
            };

            let (action, result) = if connection.connected() {
                ("stop", connection.stop())
            } else {
                ("start", connection.start())
            };
            info!("Toggled link of '{}' ({}): {}", name, id, action);

            result.map_err(|source| ControlError::ConnectionToggle {
                entity: id,
                name,
                action,
                source,
            })
        })
    }

    fn count(&mut self, update: impl Fn(&mut LoopStats)) {
        update(&mut self.stats);
        update(&mut self.window);
    }

    fn maybe_log_stats(&mut self) {
        let now = Local::now();
        let log_interval = chrono::Duration::seconds(10);
        if now - self.last_stats_log > log_interval {
            info!(
                "Control loop stats: {} frames, {} dispatches ({} keep-alive), {} skipped in last {} seconds",
                self.window.frames,
                self.window.dispatches,
                self.window.keep_alives,
                self.window.skipped,
                log_interval.num_seconds()
            );
            self.window = LoopStats::default();
            self.last_stats_log = now;
        }
    }
}

// Only actuators with a link can be down; plain sinks always receive commands
fn link_down<H: Actuator>(handle: &mut H) -> bool {
    handle
        .connection()
        .is_some_and(|connection| !connection.connected())
}

/// Drives `control` at `frame_interval` until exit, cancellation or a fatal error.
///
/// Frames that overrun are skipped rather than bunched up.
pub async fn run_frames<H, I, C>(
    control: &mut ControlLoop<H>,
    input: &mut I,
    clock: &C,
    frame_interval: Duration,
    cancel: CancellationToken,
) -> Result<(), ControlError>
where
    H: Actuator,
    I: InputSource,
    C: Clock,
{
    info!("Starting frame loop at {:?} per frame", frame_interval);
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancellation requested, leaving frame loop");
                break;
            }

            _ = ticker.tick() => {
                input.poll();
                if control.tick(&*input, clock.now())? == LoopControl::Exit {
                    break;
                }
            }
        }
    }

    Ok(())
}
