//! Laser and rotary driver interfaces
//!
//! Planner commands are dispatched through these traits so that a real
//! controller and the in-memory dummies are interchangeable.

use parking_lot::Mutex;
use ruidakit_core::{Command, CommandKind, Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Motion and power control of the laser head
pub trait LaserInterface {
    /// Move to an absolute position; `None` axes keep their value
    fn move_to(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed_mm_s: Option<f64>,
    ) -> Result<()>;

    /// Cut to an XY target at the current power
    fn cut_line(&mut self, x: f64, y: f64, speed_mm_s: f64) -> Result<()>;

    fn set_laser_power(&mut self, power_pct: f64) -> Result<()>;

    /// Release any held resources
    fn cleanup(&mut self) {}
}

/// Rotary axis holding the workpiece
pub trait RotaryInterface {
    /// Rotate to an absolute angle at `speed_dps` degrees per second
    fn rotate_to(&mut self, angle_deg: f64, speed_dps: f64) -> Result<()>;

    fn cleanup(&mut self) {}
}

/// One call recorded by [`DummyLaser`]
#[derive(Debug, Clone, PartialEq)]
pub enum LaserCall {
    Move {
        x: f64,
        y: f64,
        z: f64,
        speed_mm_s: Option<f64>,
    },
    CutLine {
        x: f64,
        y: f64,
        speed_mm_s: f64,
    },
    SetLaserPower(f64),
}

/// In-memory laser that tracks state and logs
#[derive(Debug, Default)]
pub struct DummyLaser {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub power: f64,
    calls: Arc<Mutex<Vec<LaserCall>>>,
}

impl DummyLaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded calls
    pub fn calls(&self) -> Arc<Mutex<Vec<LaserCall>>> {
        Arc::clone(&self.calls)
    }
}

impl LaserInterface for DummyLaser {
    fn move_to(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed_mm_s: Option<f64>,
    ) -> Result<()> {
        if let Some(x) = x {
            self.x = x;
        }
        if let Some(y) = y {
            self.y = y;
        }
        if let Some(z) = z {
            self.z = z;
        }
        info!(
            "MOVE x={:.3} y={:.3} z={:.3} speed={:?}",
            self.x, self.y, self.z, speed_mm_s
        );
        self.calls.lock().push(LaserCall::Move {
            x: self.x,
            y: self.y,
            z: self.z,
            speed_mm_s,
        });
        Ok(())
    }

    fn cut_line(&mut self, x: f64, y: f64, speed_mm_s: f64) -> Result<()> {
        self.x = x;
        self.y = y;
        info!("CUT_LINE x={:.3} y={:.3} speed={:.3}", x, y, speed_mm_s);
        self.calls.lock().push(LaserCall::CutLine { x, y, speed_mm_s });
        Ok(())
    }

    fn set_laser_power(&mut self, power_pct: f64) -> Result<()> {
        self.power = power_pct;
        info!("SET_LASER_POWER {:.1}%", power_pct);
        self.calls.lock().push(LaserCall::SetLaserPower(power_pct));
        Ok(())
    }
}

/// In-memory rotary that tracks its angle
#[derive(Debug, Default)]
pub struct DummyRotary {
    pub angle_deg: f64,
    moves: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl DummyRotary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded `(angle, speed)` pairs
    pub fn moves(&self) -> Arc<Mutex<Vec<(f64, f64)>>> {
        Arc::clone(&self.moves)
    }
}

impl RotaryInterface for DummyRotary {
    fn rotate_to(&mut self, angle_deg: f64, speed_dps: f64) -> Result<()> {
        info!("ROTATE to {:.3} deg at {:.1} dps", angle_deg, speed_dps);
        self.angle_deg = angle_deg;
        self.moves.lock().push((angle_deg, speed_dps));
        Ok(())
    }
}

fn dispatch(
    command: &Command,
    laser: &mut dyn LaserInterface,
    rotary: &mut dyn RotaryInterface,
) -> Result<()> {
    match command.kind {
        CommandKind::Move => laser.move_to(command.x, command.y, command.z, command.speed_mm_s),
        CommandKind::CutLine => {
            let speed = command
                .speed_mm_s
                .ok_or_else(|| Error::other("CUT_LINE without speed_mm_s"))?;
            let (Some(x), Some(y)) = (command.x, command.y) else {
                return Err(Error::other("CUT_LINE without x/y"));
            };
            laser.cut_line(x, y, speed)
        }
        CommandKind::SetLaserPower => {
            let power = command
                .power_pct
                .ok_or_else(|| Error::other("SET_LASER_POWER without power_pct"))?;
            laser.set_laser_power(power)
        }
        CommandKind::Rotate => {
            let angle = command
                .angle_deg
                .ok_or_else(|| Error::other("ROTATE without angle_deg"))?;
            rotary.rotate_to(angle, command.speed_mm_s.unwrap_or(0.0))
        }
    }
}

/// Run planner commands in order against a laser and rotary
///
/// Both drivers are cleaned up afterwards, whether or not a command failed.
pub fn execute_commands<'a>(
    commands: impl IntoIterator<Item = &'a Command>,
    laser: &mut dyn LaserInterface,
    rotary: &mut dyn RotaryInterface,
) -> Result<()> {
    let mut result = Ok(());
    for command in commands {
        if !command.comment.is_empty() {
            debug!("# {}", command.comment);
        }
        result = dispatch(command, laser, rotary);
        if result.is_err() {
            break;
        }
    }
    laser.cleanup();
    rotary.cleanup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_dispatches_in_order() {
        let commands = vec![
            Command::travel().with_x(1.0).with_y(2.0).with_speed(100.0),
            Command::power(40.0),
            Command::cut(5.0, 2.0).with_speed(10.0),
            Command::rotate(90.0).with_speed(30.0),
            Command::travel().with_z(-1.0),
        ];
        let mut laser = DummyLaser::new();
        let mut rotary = DummyRotary::new();
        execute_commands(&commands, &mut laser, &mut rotary).unwrap();

        let calls = laser.calls();
        let calls = calls.lock();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            LaserCall::Move {
                x: 1.0,
                y: 2.0,
                z: 0.0,
                speed_mm_s: Some(100.0)
            }
        );
        assert_eq!(calls[1], LaserCall::SetLaserPower(40.0));
        assert_eq!(
            calls[3],
            LaserCall::Move {
                x: 5.0,
                y: 2.0,
                z: -1.0,
                speed_mm_s: None
            }
        );
        assert_eq!(*rotary.moves().lock(), vec![(90.0, 30.0)]);
        assert_eq!(rotary.angle_deg, 90.0);
    }

    #[test]
    fn test_cut_without_speed_is_rejected() {
        let commands = vec![Command::cut(1.0, 1.0), Command::power(10.0)];
        let mut laser = DummyLaser::new();
        let mut rotary = DummyRotary::new();
        let err = execute_commands(&commands, &mut laser, &mut rotary).unwrap_err();
        assert!(err.to_string().contains("CUT_LINE without speed_mm_s"));
        assert!(laser.calls().lock().is_empty());
    }
}
