//! Ruida laser driver
//!
//! Drives the head interactively over the action port and uploads blocks of
//! planner moves as RD jobs. Every interactive command first waits for the
//! controller to be ready, so calls never overtake a running motion.

use crate::interfaces::{LaserInterface, RotaryInterface};
use crate::readiness::{ReadinessMonitor, ReadinessPolicy, Sleeper, ThreadSleeper};
use crate::transport::UdpTransport;
use ruidakit_core::{Command, CommandKind, JobError, MachineState, Result};
use ruidakit_protocol::codec::{encode_coord, encode_power, encode_signed_offset, hex_string, swizzle};
use ruidakit_protocol::job::{JobBuilder, Move, DEFAULT_FORCE_ABSOLUTE_EVERY};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const POWER_TOLERANCE: f64 = 1e-6;
const Z_TOLERANCE_MM: f64 = 1e-6;
const XY_TOLERANCE_MM: f64 = 1e-9;

/// Driver options
#[derive(Debug, Clone, PartialEq)]
pub struct LaserConfig {
    /// Never fire the laser; cuts run as travel
    pub movement_only: bool,
    pub air_assist: bool,
    /// Keep a swizzled copy of every uploaded job here
    pub save_rd_dir: Option<PathBuf>,
    pub force_absolute_every: usize,
    pub z_speed_mm_s: f64,
    /// Positive Z raises the bed towards the head
    pub z_positive_moves_bed_up: bool,
    /// Minimum idle time before an uploaded job counts as finished
    pub min_stable: Duration,
    /// Policy used before interactive commands
    pub readiness: ReadinessPolicy,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            movement_only: false,
            air_assist: true,
            save_rd_dir: None,
            force_absolute_every: DEFAULT_FORCE_ABSOLUTE_EVERY,
            z_speed_mm_s: 5.0,
            z_positive_moves_bed_up: true,
            min_stable: Duration::ZERO,
            readiness: ReadinessPolicy::default(),
        }
    }
}

/// Laser driven through a Ruida controller
pub struct RuidaLaser<S: Sleeper = ThreadSleeper> {
    transport: UdpTransport,
    monitor: ReadinessMonitor<S>,
    config: LaserConfig,
    x: f64,
    y: f64,
    z: f64,
    power: f64,
    last_speed_um: Option<i64>,
    movement_only_power_sent: bool,
    rd_job_counter: u32,
}

impl RuidaLaser<ThreadSleeper> {
    pub fn new(transport: UdpTransport, config: LaserConfig) -> Self {
        Self::with_monitor(transport, config, ReadinessMonitor::new())
    }
}

impl<S: Sleeper> RuidaLaser<S> {
    pub fn with_monitor(
        transport: UdpTransport,
        config: LaserConfig,
        monitor: ReadinessMonitor<S>,
    ) -> Self {
        info!(
            "[RUIDA UDP] Laser initialized for host={} port={} mode={} movement_only={}",
            transport.config().host,
            transport.config().port,
            transport.mode(),
            config.movement_only
        );
        Self {
            transport,
            monitor,
            config,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            power: 0.0,
            last_speed_um: None,
            movement_only_power_sent: false,
            rd_job_counter: 0,
        }
    }

    pub fn config(&self) -> &LaserConfig {
        &self.config
    }

    pub fn transport(&self) -> &UdpTransport {
        &self.transport
    }

    pub fn monitor(&self) -> &ReadinessMonitor<S> {
        &self.monitor
    }

    /// Last commanded position
    pub fn position(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    fn wait_for_ready(&mut self) -> Result<MachineState> {
        let policy = self.config.readiness.clone();
        self.monitor.wait_until_ready(&mut self.transport, &policy)
    }

    fn read_state(&mut self) -> Option<MachineState> {
        let policy = self.config.readiness.clone();
        match self.monitor.poll(&mut self.transport, &policy) {
            Ok(state) => state,
            Err(e) => {
                debug!("[RUIDA UDP] Status read failed: {}", e);
                None
            }
        }
    }

    fn log_status(&self, label: &str, state: &MachineState) {
        debug!("[RUIDA UDP] {}: {}", label, state.flags());
    }

    fn set_speed(&mut self, speed_mm_s: f64) -> Result<()> {
        let speed_um = (speed_mm_s * 1000.0).round() as i64;
        if self.last_speed_um == Some(speed_um) {
            return Ok(());
        }
        self.last_speed_um = Some(speed_um);
        let mut payload = vec![0xC9, 0x02];
        payload.extend_from_slice(&encode_coord(speed_mm_s));
        info!("[RUIDA UDP] SET_SPEED {:.3} mm/s", speed_mm_s);
        self.transport.send_packets(&payload, false)?;
        Ok(())
    }

    /// Move the head; `None` axes keep their last commanded value
    pub fn move_to(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed_mm_s: Option<f64>,
    ) -> Result<()> {
        self.wait_for_ready()?;
        if self.power != 0.0 {
            self.set_laser_power(0.0)?;
        }
        if let Some(speed) = speed_mm_s {
            self.set_speed(speed)?;
        }
        if let Some(z) = z {
            let delta = z - self.z;
            if delta.abs() > Z_TOLERANCE_MM {
                let mut payload = vec![0x80, 0x03];
                payload.extend_from_slice(&encode_signed_offset(delta));
                info!("[RUIDA UDP] MOVE_Z z={:.3} delta={:+.3}", z, delta);
                self.transport.send_packets(&payload, false)?;
            }
            self.z = z;
        }
        if x.is_none() && y.is_none() {
            return Ok(());
        }
        self.x = x.unwrap_or(self.x);
        self.y = y.unwrap_or(self.y);
        let mut payload = vec![0x88];
        payload.extend_from_slice(&encode_coord(self.x));
        payload.extend_from_slice(&encode_coord(self.y));
        info!(
            "[RUIDA UDP] MOVE x={:.3} y={:.3} z={:.3} speed={:?}",
            self.x, self.y, self.z, speed_mm_s
        );
        self.transport.send_packets(&payload, false)?;
        Ok(())
    }

    /// Cut to an XY target at the current power
    pub fn cut_line(&mut self, x: f64, y: f64, speed_mm_s: f64) -> Result<()> {
        self.wait_for_ready()?;
        self.x = x;
        self.y = y;
        self.set_speed(speed_mm_s)?;
        let mut payload = vec![0xA8];
        payload.extend_from_slice(&encode_coord(x));
        payload.extend_from_slice(&encode_coord(y));
        info!(
            "[RUIDA UDP] CUT_LINE x={:.3} y={:.3} speed={:.3} power={:.1}%",
            x, y, speed_mm_s, self.power
        );
        self.transport.send_packets(&payload, false)?;
        Ok(())
    }

    /// Set laser power; unchanged values are not resent
    pub fn set_laser_power(&mut self, power_pct: f64) -> Result<()> {
        self.wait_for_ready()?;

        if self.config.movement_only {
            info!(
                "[RUIDA UDP] movement-only: requested laser power {:.1}% (suppressed)",
                power_pct
            );
            if self.movement_only_power_sent {
                return Ok(());
            }
            info!("[RUIDA UDP] movement-only: sending single laser-off command");
            self.power = 0.0;
            self.movement_only_power_sent = true;
            let mut payload = vec![0xC7];
            payload.extend_from_slice(&encode_power(0.0));
            self.transport.send_packets(&payload, false)?;
            return Ok(());
        }

        if (self.power - power_pct).abs() <= POWER_TOLERANCE {
            return Ok(());
        }
        self.power = power_pct;
        let mut payload = vec![0xC7];
        payload.extend_from_slice(&encode_power(power_pct));
        info!("[RUIDA UDP] SET_LASER_POWER {:.1}%", power_pct);
        self.transport.send_packets(&payload, false)?;
        Ok(())
    }

    fn save_rd(&mut self, dir: &Path, payload: &[u8], job_z: Option<f64>) -> Result<PathBuf> {
        let io_error = |path: &Path, e: std::io::Error| JobError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        self.rd_job_counter += 1;
        let mut name = format!("job_{:03}", self.rd_job_counter);
        if let Some(z) = job_z {
            name.push_str(&format!("_z{:.3}", z));
        }
        let path = dir.join(format!("{}.rd", name));
        std::fs::write(&path, swizzle(payload, self.transport.magic()))
            .map_err(|e| io_error(&path, e))?;
        info!("[RUIDA UDP] Saved RD job to {}", path.display());
        Ok(path)
    }

    /// Build, upload and wait out one RD job
    pub fn send_rd_job(
        &mut self,
        moves: &[Move],
        job_z: Option<f64>,
        require_busy_transition: bool,
    ) -> Result<()> {
        if moves.is_empty() {
            return Ok(());
        }
        if let Some(state) = self.read_state() {
            self.log_status("Status before RD send", &state);
        }

        let moves: Vec<Move> = if self.config.movement_only {
            moves
                .iter()
                .map(|m| Move {
                    power_pct: 0.0,
                    ..*m
                })
                .collect()
        } else {
            moves.to_vec()
        };
        // Z offsets in the job are relative to where the head already is
        let builder = JobBuilder::new()
            .with_air_assist(self.config.air_assist)
            .with_job_z(job_z)
            .with_start_z(self.z)
            .with_force_absolute_every(self.config.force_absolute_every);
        let payload = builder.build(&moves)?;

        if let Some(dir) = self.config.save_rd_dir.clone() {
            self.save_rd(&dir, &payload, job_z)?;
        }
        match job_z {
            Some(z) => info!("[RUIDA UDP] Uploading RD job with {} moves z={:.3}", moves.len(), z),
            None => info!("[RUIDA UDP] Uploading RD job with {} moves", moves.len()),
        }
        if self.transport.is_offline() {
            debug!("[RUIDA UDP DRY RD] {}", hex_string(&payload));
        }
        self.transport.send_packets(&payload, false)?;
        self.z = builder.end_z(&moves);

        let policy = ReadinessPolicy {
            require_busy_transition,
            min_stable: self.config.min_stable,
            ..self.config.readiness.clone()
        };
        self.monitor.wait_until_ready(&mut self.transport, &policy)?;
        Ok(())
    }

    /// Run planner commands as RD jobs separated by rotations
    ///
    /// Planner coordinates are taken relative to the head position when the
    /// sequence starts. With `edge_length_mm` the Y axis is centred on the
    /// board edge.
    pub fn run_sequence_with_rotary<'a>(
        &mut self,
        commands: impl IntoIterator<Item = &'a Command>,
        rotary: &mut dyn RotaryInterface,
        travel_only: bool,
        edge_length_mm: Option<f64>,
    ) -> Result<()> {
        let initial = self.read_state();
        if let Some(state) = &initial {
            self.log_status("Initial status", state);
        }
        let origin_x = initial.and_then(|s| s.x).unwrap_or(0.0);
        let origin_y = initial.and_then(|s| s.y).unwrap_or(0.0);
        let mut run = SequenceRun::new(
            origin_x,
            origin_y,
            edge_length_mm.map_or(0.0, |e| e / 2.0),
            travel_only || self.config.movement_only,
        );

        for cmd in commands {
            match cmd.kind {
                CommandKind::Rotate => {
                    run.flush(self)?;
                    run.park(self)?;
                    run.current_z = run.last_set_z;
                    rotary.rotate_to(cmd.angle_deg.unwrap_or(0.0), cmd.speed_mm_s.unwrap_or(0.0))?;
                }
                CommandKind::SetLaserPower => {
                    if run.travel_only {
                        run.power = 0.0;
                    } else if let Some(power) = cmd.power_pct {
                        run.power = power;
                    }
                }
                CommandKind::Move | CommandKind::CutLine => run.push(self, cmd)?,
            }
        }
        run.flush(self)
    }

    /// Release the socket
    pub fn cleanup(&mut self) {
        self.transport.close();
    }
}

/// Cursor and block state of one sequence run
struct SequenceRun {
    origin_x: f64,
    origin_y: f64,
    y_center: f64,
    travel_only: bool,
    power: f64,
    speed: Option<f64>,
    cursor_x: f64,
    cursor_y: f64,
    current_z: Option<f64>,
    last_set_z: Option<f64>,
    origin_z: Option<f64>,
    origin_speed: Option<f64>,
    block: Vec<Move>,
    block_z: Option<f64>,
}

impl SequenceRun {
    fn new(origin_x: f64, origin_y: f64, y_center: f64, travel_only: bool) -> Self {
        Self {
            origin_x,
            origin_y,
            y_center,
            travel_only,
            power: 0.0,
            speed: None,
            cursor_x: origin_x,
            cursor_y: origin_y,
            current_z: None,
            last_set_z: None,
            origin_z: None,
            origin_speed: None,
            block: Vec::new(),
            block_z: None,
        }
    }

    fn push<S: Sleeper>(&mut self, laser: &mut RuidaLaser<S>, cmd: &Command) -> Result<()> {
        let is_move = cmd.kind == CommandKind::Move;
        let x = cmd.x.map_or(self.cursor_x, |x| self.origin_x + x);
        let y = cmd.y.map_or(self.cursor_y, |y| self.origin_y + (y - self.y_center));

        if let Some(z) = cmd.z {
            let z_changed = self
                .block_z
                .is_some_and(|bz| (z - bz).abs() > Z_TOLERANCE_MM);
            if z_changed && !self.block.is_empty() {
                let block_z = self.block_z;
                self.flush_block(laser, block_z)?;
            }
            self.current_z = Some(z);
            if is_move && self.origin_z.is_none() {
                self.origin_z = Some(z);
            }
            self.last_set_z = Some(z);
            self.block_z = Some(z);
        }
        if let Some(speed) = cmd.speed_mm_s {
            self.speed = Some(speed);
            if is_move && self.origin_speed.is_none() {
                self.origin_speed = Some(speed);
            }
        }
        let Some(speed) = self.speed else {
            return Ok(());
        };
        let is_cut = !is_move && !self.travel_only;
        self.block.push(Move {
            x,
            y,
            speed_mm_s: speed,
            power_pct: self.power,
            is_cut,
            z: None,
        });
        self.cursor_x = x;
        self.cursor_y = y;
        Ok(())
    }

    /// Upload the pending block and start a new one
    fn flush<S: Sleeper>(&mut self, laser: &mut RuidaLaser<S>) -> Result<()> {
        let block_z = self.block_z;
        self.flush_block(laser, block_z)?;
        self.block_z = None;
        Ok(())
    }

    fn flush_block<S: Sleeper>(
        &mut self,
        laser: &mut RuidaLaser<S>,
        block_z: Option<f64>,
    ) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let moves = std::mem::take(&mut self.block);
        let job_z = block_z.or(self.last_set_z);
        if let (Some(z), false) = (job_z, laser.transport.is_offline()) {
            let z_speed = laser.config.z_speed_mm_s;
            if let Err(e) = laser.move_to(None, None, Some(z), Some(z_speed)) {
                debug!("[RUIDA UDP] Pre-RD Z move failed; continuing with Z in the job: {}", e);
            }
        }
        laser.send_rd_job(&moves, job_z, true)
    }

    /// Return the head to the job origin before a rotation
    ///
    /// When both XY and Z must change, the bed moves closer only after
    /// translating away and away only before translating back.
    fn park<S: Sleeper>(&mut self, laser: &mut RuidaLaser<S>) -> Result<()> {
        let target_z = self.origin_z.or(self.last_set_z);
        let speed = self.origin_speed.or(self.speed);
        let need_xy = (self.cursor_x - self.origin_x).abs() > XY_TOLERANCE_MM
            || (self.cursor_y - self.origin_y).abs() > XY_TOLERANCE_MM;
        let need_z = target_z.is_some_and(|tz| {
            self.last_set_z
                .map_or(true, |lz| (lz - tz).abs() > Z_TOLERANCE_MM)
        });
        if !need_xy && !need_z {
            return Ok(());
        }
        let (ox, oy) = (self.origin_x, self.origin_y);

        if let (true, true, Some(current), Some(tz)) =
            (need_xy, need_z, self.current_z.or(self.last_set_z), target_z)
        {
            let closer = if laser.config.z_positive_moves_bed_up {
                tz > current
            } else {
                tz < current
            };
            if closer {
                laser.move_to(None, None, Some(tz), speed)?;
                laser.move_to(Some(ox), Some(oy), None, speed)?;
            } else {
                laser.move_to(Some(ox), Some(oy), None, speed)?;
                laser.move_to(None, None, Some(tz), speed)?;
            }
            self.set_parked(need_xy, target_z);
            return Ok(());
        }

        if need_z {
            let (px, py) = if need_xy { (Some(ox), Some(oy)) } else { (None, None) };
            laser.move_to(px, py, target_z, speed)?;
        } else {
            laser.move_to(Some(ox), Some(oy), target_z, speed)?;
        }
        self.set_parked(need_xy, target_z);
        Ok(())
    }

    fn set_parked(&mut self, moved_xy: bool, z: Option<f64>) {
        if moved_xy {
            self.cursor_x = self.origin_x;
            self.cursor_y = self.origin_y;
        }
        if z.is_some() {
            self.current_z = z;
            self.last_set_z = z;
            self.block_z = z;
        }
    }
}

impl<S: Sleeper> LaserInterface for RuidaLaser<S> {
    fn move_to(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed_mm_s: Option<f64>,
    ) -> Result<()> {
        Self::move_to(self, x, y, z, speed_mm_s)
    }

    fn cut_line(&mut self, x: f64, y: f64, speed_mm_s: f64) -> Result<()> {
        Self::cut_line(self, x, y, speed_mm_s)
    }

    fn set_laser_power(&mut self, power_pct: f64) -> Result<()> {
        Self::set_laser_power(self, power_pct)
    }

    fn cleanup(&mut self) {
        Self::cleanup(self)
    }
}
