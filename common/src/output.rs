use crate::types::{Axis, Direction};

/// Actuator drive lines.
///
/// `set_axis_output` must leave at most one of the axis' two lines asserted;
/// `Direction::Stopped` releases both.
pub trait ActuatorOutput: Send {
    fn set_axis_output(&mut self, axis: Axis, direction: Direction);
    fn set_power_enable(&mut self, enabled: bool);

    /// Called once per control-loop tick. Relay backends have nothing to do.
    fn update(&mut self) {}

    fn all_off(&mut self) {
        for axis in Axis::ALL {
            self.set_axis_output(axis, Direction::Stopped);
        }
        self.set_power_enable(false);
    }
}

/// Soft-start PWM duty for one H-bridge axis.
///
/// Every direction change restarts at zero duty; `step` then raises it by a
/// fixed amount per tick until it reaches `max_duty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyRamp {
    direction: Direction,
    duty: u32,
    max_duty: u32,
    step: u32,
}

impl DutyRamp {
    pub fn new(max_duty: u32, step: u32) -> Self {
        Self {
            direction: Direction::Stopped,
            duty: 0,
            max_duty,
            step: step.max(1),
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        self.duty = 0;
    }

    /// Advances one tick. Returns whether the duty changed.
    pub fn step(&mut self) -> bool {
        if !self.direction.is_moving() || self.duty >= self.max_duty {
            return false;
        }
        self.duty = self.duty.saturating_add(self.step).min(self.max_duty);
        true
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn duty(&self) -> u32 {
        self.duty
    }

    /// `(extend, retract)` input duties. The inactive input is held low.
    pub fn channel_duties(&self) -> (u32, u32) {
        match self.direction {
            Direction::Stopped => (0, 0),
            Direction::Extending => (self.duty, 0),
            Direction::Retracting => (0, self.duty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_climbs_to_max_then_holds() {
        let mut ramp = DutyRamp::new(1023, 64);
        ramp.set_direction(Direction::Extending);
        assert_eq!(ramp.channel_duties(), (0, 0));

        let steps = std::iter::from_fn(|| ramp.step().then_some(())).count();
        assert_eq!(steps, 16);
        assert_eq!(ramp.duty(), 1023);
        assert_eq!(ramp.channel_duties(), (1023, 0));
        assert!(!ramp.step());
    }

    #[test]
    fn direction_change_restarts_from_zero() {
        let mut ramp = DutyRamp::new(1023, 64);
        ramp.set_direction(Direction::Extending);
        ramp.step();
        ramp.step();
        assert_eq!(ramp.duty(), 128);

        ramp.set_direction(Direction::Retracting);
        assert_eq!(ramp.duty(), 0);
        ramp.step();
        assert_eq!(ramp.channel_duties(), (0, 64));

        ramp.set_direction(Direction::Stopped);
        assert!(!ramp.step());
        assert_eq!(ramp.channel_duties(), (0, 0));
    }
}
