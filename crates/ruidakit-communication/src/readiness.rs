//! Controller readiness polling
//!
//! Polls the status word and head position until the controller has been
//! idle and still for long enough. Optionally requires the controller to go
//! busy and then idle again, which is how a just-uploaded job is detected as
//! finished.

use crate::transport::UdpTransport;
use ruidakit_core::{MachineState, ReadinessError, Result};
use ruidakit_protocol::codec::{decode_coord, decode_status_bits};
use ruidakit_protocol::tables::{ADDR_POS_X, ADDR_POS_Y, ADDR_POS_Z, ADDR_STATUS};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_LEN: usize = 4;
const COORD_LEN: usize = 5;

/// When the controller counts as ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Busy must be seen set and then clear
    pub require_busy_transition: bool,
    /// Consecutive unchanged polls required
    pub stable_polls: u32,
    /// Minimum time the stable run must span
    pub min_stable: Duration,
    pub max_attempts: u32,
    pub poll_delay: Duration,
    /// Largest position change still counted as unchanged
    pub pos_tolerance_mm: f64,
    pub read_positions: bool,
    pub read_z: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            require_busy_transition: false,
            stable_polls: 3,
            min_stable: Duration::ZERO,
            max_attempts: 400,
            poll_delay: Duration::from_millis(500),
            pos_tolerance_mm: 1e-3,
            read_positions: true,
            read_z: false,
        }
    }
}

impl ReadinessPolicy {
    /// Policy for waiting out an uploaded job
    pub fn job_completion(min_stable: Duration) -> Self {
        Self {
            require_busy_transition: true,
            min_stable,
            ..Self::default()
        }
    }
}

/// Delay and clock source for polling
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

fn within(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        (None, None) => true,
        _ => false,
    }
}

fn unchanged(prev: &MachineState, state: &MachineState, tolerance: f64) -> bool {
    prev.status_bits == state.status_bits
        && within(prev.x, state.x, tolerance)
        && within(prev.y, state.y, tolerance)
        && within(prev.z, state.z, tolerance)
}

/// Polls a controller until it is ready
pub struct ReadinessMonitor<S: Sleeper = ThreadSleeper> {
    sleeper: S,
    last: Option<MachineState>,
}

impl Default for ReadinessMonitor<ThreadSleeper> {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessMonitor<ThreadSleeper> {
    pub fn new() -> Self {
        Self::with_sleeper(ThreadSleeper)
    }
}

impl<S: Sleeper> ReadinessMonitor<S> {
    pub fn with_sleeper(sleeper: S) -> Self {
        Self {
            sleeper,
            last: None,
        }
    }

    /// Last snapshot read from the controller
    pub fn last(&self) -> Option<MachineState> {
        self.last
    }

    /// Seed the last known position, used when offline
    pub fn set_last(&mut self, state: MachineState) {
        self.last = Some(state);
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Read one snapshot
    ///
    /// Returns `None` when the status word could not be read. Positions that
    /// fail to read are left as `None`.
    pub fn poll(
        &mut self,
        transport: &mut UdpTransport,
        policy: &ReadinessPolicy,
    ) -> Result<Option<MachineState>> {
        let Some(status) = transport.read_memory(ADDR_STATUS, STATUS_LEN)? else {
            return Ok(None);
        };
        let mut read_coord = |address: u16| -> Result<Option<f64>> {
            Ok(transport
                .read_memory(address, COORD_LEN)?
                .map(|data| decode_coord(&data)))
        };
        let (x, y) = if policy.read_positions {
            (read_coord(ADDR_POS_X)?, read_coord(ADDR_POS_Y)?)
        } else {
            (None, None)
        };
        let z = if policy.read_z {
            read_coord(ADDR_POS_Z)?
        } else {
            None
        };
        Ok(Some(MachineState::new(decode_status_bits(&status), x, y, z)))
    }

    /// Poll until `policy` is satisfied
    pub fn wait_until_ready(
        &mut self,
        transport: &mut UdpTransport,
        policy: &ReadinessPolicy,
    ) -> Result<MachineState> {
        if transport.is_offline() {
            let last = self.last.unwrap_or_default();
            return Ok(MachineState::new(0, last.x, last.y, last.z));
        }

        let mut previous: Option<MachineState> = None;
        let mut stable = 0u32;
        let mut run_start = self.sleeper.now();
        let mut seen_busy = false;

        for attempt in 1..=policy.max_attempts {
            let polled = match self.poll(transport, policy) {
                Ok(state) => state,
                Err(e) => {
                    warn!("[RUIDA UDP] Failed to poll machine state: {}", e);
                    None
                }
            };

            match polled {
                Some(state) => {
                    let now = self.sleeper.now();
                    match previous {
                        Some(prev) if unchanged(&prev, &state, policy.pos_tolerance_mm) => {
                            stable += 1
                        }
                        _ => {
                            stable = 1;
                            run_start = now;
                        }
                    }
                    let transition_done = seen_busy && !state.is_busy();
                    seen_busy |= state.is_busy();
                    previous = Some(state);
                    self.last = Some(state);

                    let flags = state.flags();
                    debug!(
                        "[RUIDA UDP] Status poll {}/{}: raw=0x{:08X} moving={} running={} part_end={} stable={}",
                        attempt,
                        policy.max_attempts,
                        flags.raw,
                        flags.moving,
                        flags.job_running,
                        flags.part_end,
                        stable
                    );

                    let elapsed = now.saturating_duration_since(run_start);
                    let stable_enough = stable >= policy.stable_polls && elapsed >= policy.min_stable;
                    let transition_ok = !policy.require_busy_transition || transition_done;
                    if stable_enough && transition_ok {
                        info!(
                            "[RUIDA UDP] Ready on attempt {}: status=0x{:08X} stable={} elapsed={:.2}s",
                            attempt,
                            state.status_bits,
                            stable,
                            elapsed.as_secs_f64()
                        );
                        return Ok(state);
                    }
                    if stable >= policy.stable_polls && elapsed < policy.min_stable {
                        debug!(
                            "[RUIDA UDP] Stable but waiting for {:.2}s (elapsed {:.2}s)",
                            policy.min_stable.as_secs_f64(),
                            elapsed.as_secs_f64()
                        );
                    }
                }
                None => {
                    let outstanding = policy.require_busy_transition
                        && !(seen_busy && previous.is_some_and(|p| !p.is_busy()));
                    if let (Some(last), false) = (previous, outstanding) {
                        debug!("[RUIDA UDP] Returning last known state after failed poll");
                        return Ok(last);
                    }
                    // The stable run restarts at the next successful poll
                    stable = 0;
                    previous = None;
                    run_start = self.sleeper.now();
                }
            }
            self.sleeper.sleep(policy.poll_delay);
        }

        Err(ReadinessError::NotReady {
            attempts: policy.max_attempts,
            last: self.last,
        }
        .into())
    }
}
