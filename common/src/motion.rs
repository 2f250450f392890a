use crate::{
    config::{AxisLimits, MotionConfig},
    types::{Axis, Direction, JogDirection, LivePosition, MotionStatus},
};

pub const IDLE_COMMAND: &str = "IDLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    DriveAxis(Axis, Direction),
    PowerEnable(bool),
    PersistPosition(LivePosition),
    PersistLimits(AxisLimits),
}

/// How a moving axis' displacement is computed when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// Time actually elapsed since the axis started, at `now_ms`.
    Elapsed(u64),
    /// The duration the preset move scheduled for the axis.
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisMotion {
    direction: JogDirection,
    start_ms: u64,
    scheduled_ms: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisState {
    position_ms: i32,
    max_ms: i32,
    motion: Option<AxisMotion>,
}

impl AxisState {
    fn direction(&self) -> Direction {
        self.motion
            .map(|motion| motion.direction.into())
            .unwrap_or(Direction::Stopped)
    }

    fn displaced(&self, direction: JogDirection, displacement_ms: u64) -> i32 {
        let displacement = i64::try_from(displacement_ms).unwrap_or(i64::MAX);
        let base = i64::from(self.position_ms);
        let moved = match direction {
            JogDirection::Extend => base.saturating_add(displacement),
            JogDirection::Retract => base.saturating_sub(displacement),
        };
        clamp_position(moved, self.max_ms)
    }

    fn live(&self, now_ms: u64) -> i32 {
        match self.motion {
            Some(motion) => self.displaced(motion.direction, now_ms.saturating_sub(motion.start_ms)),
            None => self.position_ms,
        }
    }

    fn is_due(&self, now_ms: u64) -> bool {
        match self.motion {
            Some(AxisMotion {
                start_ms,
                scheduled_ms: Some(scheduled_ms),
                ..
            }) => now_ms.saturating_sub(start_ms) >= u64::from(scheduled_ms),
            _ => false,
        }
    }
}

fn clamp_position(value: i64, max_ms: i32) -> i32 {
    let clamped = value.clamp(0, i64::from(max_ms.max(0)));
    i32::try_from(clamped).unwrap_or(max_ms)
}

/// Time-integrated position tracker for the head and foot actuators.
///
/// The engine never touches hardware or storage. Every mutating call takes the
/// current monotonic time and returns the actions the caller must carry out.
#[derive(Debug, Clone)]
pub struct MotionEngine {
    pub config: MotionConfig,
    axes: [AxisState; 2],
    preset_active: bool,
    active_command: String,
}

impl MotionEngine {
    pub fn new(mut config: MotionConfig, mut limits: AxisLimits, position: LivePosition) -> Self {
        config.sanitize();
        limits.sanitize(&config);
        Self {
            config,
            axes: [
                AxisState {
                    position_ms: position.head_ms,
                    max_ms: limits.head_max_ms,
                    motion: None,
                },
                AxisState {
                    position_ms: position.foot_ms,
                    max_ms: limits.foot_max_ms,
                    motion: None,
                },
            ],
            preset_active: false,
            active_command: IDLE_COMMAND.to_string(),
        }
    }

    fn axis(&self, axis: Axis) -> &AxisState {
        &self.axes[axis.index()]
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisState {
        &mut self.axes[axis.index()]
    }

    pub fn limits(&self) -> AxisLimits {
        AxisLimits {
            head_max_ms: self.axis(Axis::Head).max_ms,
            foot_max_ms: self.axis(Axis::Foot).max_ms,
        }
    }

    pub fn direction(&self, axis: Axis) -> Direction {
        self.axis(axis).direction()
    }

    pub fn is_moving(&self) -> bool {
        self.axes.iter().any(|state| state.motion.is_some())
    }

    pub fn is_preset_active(&self) -> bool {
        self.preset_active
    }

    pub fn active_command(&self) -> &str {
        &self.active_command
    }

    pub fn set_active_command(&mut self, label: &str) {
        self.active_command = label.to_string();
    }

    /// Synced position, excluding any motion still in flight.
    pub fn stored_position(&self) -> LivePosition {
        LivePosition {
            head_ms: self.axis(Axis::Head).position_ms,
            foot_ms: self.axis(Axis::Foot).position_ms,
        }
    }

    pub fn live_position(&self, now_ms: u64) -> LivePosition {
        LivePosition {
            head_ms: self.axis(Axis::Head).live(now_ms),
            foot_ms: self.axis(Axis::Foot).live(now_ms),
        }
    }

    pub fn status(&self, now_ms: u64) -> MotionStatus {
        let limits = self.limits();
        MotionStatus {
            position: self.live_position(now_ms),
            head_direction: self.direction(Axis::Head),
            foot_direction: self.direction(Axis::Foot),
            head_max_ms: limits.head_max_ms,
            foot_max_ms: limits.foot_max_ms,
            preset_active: self.preset_active,
            active_command: self.active_command.clone(),
        }
    }

    pub fn stop(&mut self, now_ms: u64) -> Vec<EngineAction> {
        let actions = self.sync_state(now_ms);
        self.active_command = IDLE_COMMAND.to_string();
        actions
    }

    pub fn jog(&mut self, axis: Axis, direction: JogDirection, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = self.sync_state(now_ms);
        actions.push(EngineAction::PowerEnable(true));
        self.start_axis(axis, direction, None, now_ms, &mut actions);
        actions
    }

    pub fn jog_all(&mut self, direction: JogDirection, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = self.sync_state(now_ms);
        actions.push(EngineAction::PowerEnable(true));
        for axis in Axis::ALL {
            self.start_axis(axis, direction, None, now_ms, &mut actions);
        }
        actions
    }

    /// Schedules a timed move toward `(head_ms, foot_ms)`.
    ///
    /// Returns the longest scheduled duration, which is 0 when both axes are
    /// already within the deadband of their targets.
    pub fn move_to(&mut self, head_ms: i32, foot_ms: i32, now_ms: u64) -> (u32, Vec<EngineAction>) {
        let mut actions = self.sync_state(now_ms);
        actions.push(EngineAction::PowerEnable(true));

        let mut max_wait_ms = 0u32;
        for (axis, requested) in [(Axis::Head, head_ms), (Axis::Foot, foot_ms)] {
            let state = self.axis(axis);
            let target = requested.clamp(0, state.max_ms);
            let diff = i64::from(target) - i64::from(state.position_ms);
            if diff.abs() <= i64::from(self.config.deadband_ms) {
                continue;
            }

            let mut scheduled = u32::try_from(diff.unsigned_abs()).unwrap_or(u32::MAX);
            if target == 0 || target == state.max_ms {
                scheduled = scheduled.saturating_add(self.config.overdrive_ms);
            }
            self.start_axis(
                axis,
                JogDirection::from_delta(diff),
                Some(scheduled),
                now_ms,
                &mut actions,
            );
            max_wait_ms = max_wait_ms.max(scheduled);
        }

        if max_wait_ms == 0 {
            actions.push(EngineAction::PowerEnable(false));
        } else {
            self.preset_active = true;
        }
        (max_wait_ms, actions)
    }

    /// Completes scheduled axes. A no-op unless a preset move is running.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineAction> {
        if !self.preset_active {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for axis in Axis::ALL {
            if self.axis(axis).is_due(now_ms) {
                self.finalize_axis(axis, Finalization::Scheduled);
                actions.push(EngineAction::DriveAxis(axis, Direction::Stopped));
            }
        }

        if !self.is_moving() {
            actions.extend(self.sync_state(now_ms));
            self.active_command = IDLE_COMMAND.to_string();
        }
        actions
    }

    /// Applies new travel limits. Motion in progress keeps running.
    ///
    /// A stored position above its new limit is pulled down only while the bed
    /// is idle; a moving axis is clamped when it stops.
    pub fn set_limits(&mut self, head_max_ms: i32, foot_max_ms: i32) -> Vec<EngineAction> {
        let mut limits = AxisLimits {
            head_max_ms,
            foot_max_ms,
        };
        limits.sanitize(&self.config);

        let idle = !self.is_moving();
        let mut clamped = false;
        for axis in Axis::ALL {
            let max_ms = limits.get(axis);
            let state = self.axis_mut(axis);
            state.max_ms = max_ms;
            if idle && state.position_ms > max_ms {
                state.position_ms = max_ms;
                clamped = true;
            }
        }

        let mut actions = vec![EngineAction::PersistLimits(limits)];
        if clamped {
            actions.push(EngineAction::PersistPosition(self.stored_position()));
        }
        actions
    }

    /// Stops one axis, folding its motion into the stored position.
    ///
    /// Returns whether the axis was moving.
    pub fn finalize_axis(&mut self, axis: Axis, finalization: Finalization) -> bool {
        let state = self.axis_mut(axis);
        let Some(motion) = state.motion.take() else {
            return false;
        };

        let displacement_ms = match finalization {
            Finalization::Elapsed(now_ms) => now_ms.saturating_sub(motion.start_ms),
            Finalization::Scheduled => motion.scheduled_ms.map(u64::from).unwrap_or(0),
        };
        state.position_ms = state.displaced(motion.direction, displacement_ms);
        true
    }

    fn sync_state(&mut self, now_ms: u64) -> Vec<EngineAction> {
        let mut was_moving = false;
        for axis in Axis::ALL {
            was_moving |= self.finalize_axis(axis, Finalization::Elapsed(now_ms));
        }

        let mut actions: Vec<EngineAction> = Axis::ALL
            .into_iter()
            .map(|axis| EngineAction::DriveAxis(axis, Direction::Stopped))
            .collect();
        actions.push(EngineAction::PowerEnable(false));

        if was_moving || self.preset_active {
            actions.push(EngineAction::PersistPosition(self.stored_position()));
        }
        self.preset_active = false;
        actions
    }

    fn start_axis(
        &mut self,
        axis: Axis,
        direction: JogDirection,
        scheduled_ms: Option<u32>,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) {
        self.axis_mut(axis).motion = Some(AxisMotion {
            direction,
            start_ms: now_ms,
            scheduled_ms,
        });
        actions.push(EngineAction::DriveAxis(axis, direction.into()));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine_at(head_ms: i32, foot_ms: i32) -> MotionEngine {
        MotionEngine::new(
            MotionConfig::default(),
            AxisLimits::default(),
            LivePosition { head_ms, foot_ms },
        )
    }

    fn persisted(actions: &[EngineAction]) -> Option<LivePosition> {
        actions.iter().find_map(|action| match action {
            EngineAction::PersistPosition(position) => Some(*position),
            _ => None,
        })
    }

    #[test]
    fn move_to_clamps_targets_into_travel_range() {
        let mut engine = engine_at(5_000, 5_000);
        let (max_wait, actions) = engine.move_to(-500, 99_999, 0);

        assert_eq!(engine.direction(Axis::Head), Direction::Retracting);
        assert_eq!(engine.direction(Axis::Foot), Direction::Extending);
        // head: 5000 to 0 plus overdrive; foot: 5000 to 40000 plus overdrive
        assert_eq!(max_wait, 45_000);
        assert!(actions.contains(&EngineAction::DriveAxis(Axis::Head, Direction::Retracting)));

        engine.tick(45_000);
        assert_eq!(engine.live_position(45_000), LivePosition { head_ms: 0, foot_ms: 40_000 });
    }

    #[test]
    fn deadband_leaves_axis_untouched() {
        let mut engine = engine_at(5_000, 5_000);
        let (max_wait, actions) = engine.move_to(5_100, 4_900, 0);

        assert_eq!(max_wait, 0);
        assert!(!engine.is_moving());
        assert!(!engine.is_preset_active());
        assert_eq!(actions.last(), Some(&EngineAction::PowerEnable(false)));

        let (max_wait, _) = engine.move_to(5_101, 5_000, 0);
        assert_eq!(max_wait, 101);
        assert_eq!(engine.direction(Axis::Foot), Direction::Stopped);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut engine = engine_at(0, 0);
        engine.jog(Axis::Head, JogDirection::Extend, 1_000);

        let first = engine.stop(3_500);
        let after_first = (engine.stored_position(), engine.status(3_500));
        let second = engine.stop(9_000);

        assert_eq!(persisted(&first), Some(LivePosition { head_ms: 2_500, foot_ms: 0 }));
        assert_eq!(persisted(&second), None);
        assert_eq!((engine.stored_position(), engine.status(3_500)), after_first);
    }

    #[test]
    fn live_position_is_monotone_and_saturates() {
        let mut engine = engine_at(0, 40_000);
        engine.jog(Axis::Head, JogDirection::Extend, 0);
        engine.jog_all(JogDirection::Extend, 0);

        let samples: Vec<i32> = (0..=30)
            .map(|second| engine.live_position(second * 1_000).head_ms)
            .collect();
        assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*samples.last().unwrap(), 25_000);
        assert_eq!(engine.live_position(5_000).foot_ms, 40_000);

        engine.stop(30_000);
        engine.jog(Axis::Head, JogDirection::Retract, 30_000);
        assert_eq!(engine.live_position(40_000).head_ms, 15_000);
        assert_eq!(engine.live_position(90_000).head_ms, 0);
    }

    #[test]
    fn end_stop_targets_get_overdrive() {
        let mut engine = engine_at(5_000, 5_000);
        let (max_wait, _) = engine.move_to(0, 5_000, 0);
        assert_eq!(max_wait, 15_000);

        let mut engine = engine_at(5_000, 5_000);
        let (max_wait, _) = engine.move_to(25_000, 5_000, 0);
        assert_eq!(max_wait, 30_000);

        let mut engine = engine_at(5_000, 5_000);
        let (max_wait, _) = engine.move_to(8_000, 6_000, 0);
        assert_eq!(max_wait, 3_000);
    }

    #[test]
    fn axes_complete_independently() {
        let mut engine = engine_at(0, 0);
        let (max_wait, _) = engine.move_to(3_000, 9_000, 0);
        assert_eq!(max_wait, 9_000);

        assert!(engine.tick(2_990).is_empty());

        let actions = engine.tick(3_000);
        assert_eq!(actions, vec![EngineAction::DriveAxis(Axis::Head, Direction::Stopped)]);
        assert_eq!(engine.direction(Axis::Head), Direction::Stopped);
        assert_eq!(engine.direction(Axis::Foot), Direction::Extending);
        assert!(engine.is_preset_active());

        let actions = engine.tick(9_004);
        assert!(actions.contains(&EngineAction::PowerEnable(false)));
        assert_eq!(persisted(&actions), Some(LivePosition { head_ms: 3_000, foot_ms: 9_000 }));
        assert!(!engine.is_preset_active());
        assert_eq!(engine.active_command(), IDLE_COMMAND);
    }

    #[test]
    fn tick_completion_uses_scheduled_duration() {
        let mut engine = engine_at(0, 0);
        engine.move_to(3_000, 0, 0);
        // the loop fired late; displacement is still the scheduled 3000
        let actions = engine.tick(3_037);
        assert_eq!(persisted(&actions), Some(LivePosition { head_ms: 3_000, foot_ms: 0 }));
    }

    #[test]
    fn stop_and_tick_disagree_by_at_most_one_tick() {
        let tick = MotionConfig::default().tick_period_ms;

        let mut ticked = engine_at(0, 0);
        ticked.move_to(3_000, 0, 0);
        let mut now = 0;
        while ticked.is_preset_active() {
            now += tick;
            ticked.tick(now);
        }

        let mut stopped = engine_at(0, 0);
        stopped.move_to(3_000, 0, 0);
        stopped.stop(3_000 + tick - 1);

        let difference = stopped.stored_position().head_ms - ticked.stored_position().head_ms;
        assert!(u64::from(difference.unsigned_abs()) <= tick);
    }

    #[test]
    fn all_up_scenario_persists_live_position_on_stop() {
        let mut engine = engine_at(0, 0);
        engine.jog_all(JogDirection::Extend, 1_000);
        assert_eq!(engine.live_position(6_000), LivePosition { head_ms: 5_000, foot_ms: 5_000 });

        let actions = engine.stop(6_000);
        assert_eq!(persisted(&actions), Some(LivePosition { head_ms: 5_000, foot_ms: 5_000 }));
        assert_eq!(
            &actions[..3],
            &[
                EngineAction::DriveAxis(Axis::Head, Direction::Stopped),
                EngineAction::DriveAxis(Axis::Foot, Direction::Stopped),
                EngineAction::PowerEnable(false),
            ]
        );
    }

    #[test]
    fn jog_cancels_running_preset() {
        let mut engine = engine_at(0, 0);
        engine.move_to(10_000, 10_000, 0);
        let actions = engine.jog(Axis::Foot, JogDirection::Retract, 4_000);

        assert!(!engine.is_preset_active());
        assert_eq!(persisted(&actions), Some(LivePosition { head_ms: 4_000, foot_ms: 4_000 }));
        assert_eq!(engine.direction(Axis::Head), Direction::Stopped);
        assert_eq!(engine.direction(Axis::Foot), Direction::Retracting);
        assert!(engine.tick(20_000).is_empty());
    }

    #[test]
    fn set_limits_clamps_and_pulls_positions_down() {
        let mut engine = engine_at(20_000, 1_000);
        let actions = engine.set_limits(12_000, 100_000);

        assert_eq!(
            actions,
            vec![
                EngineAction::PersistLimits(AxisLimits {
                    head_max_ms: 12_000,
                    foot_max_ms: 60_000
                }),
                EngineAction::PersistPosition(LivePosition {
                    head_ms: 12_000,
                    foot_ms: 1_000
                }),
            ]
        );

        let actions = engine.set_limits(1, 30_000);
        assert_eq!(engine.limits().head_max_ms, 5_000);
        assert_eq!(engine.stored_position().head_ms, 5_000);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn set_limits_during_jog_defers_clamp_to_stop() {
        let mut engine = engine_at(20_000, 0);
        engine.jog(Axis::Head, JogDirection::Retract, 0);

        let actions = engine.set_limits(10_000, 40_000);
        assert_eq!(persisted(&actions), None);
        assert!(engine.is_moving());
        assert_eq!(engine.stored_position().head_ms, 20_000);
        // integration origin is untouched; the result is clamped to the new limit
        assert_eq!(engine.live_position(4_000).head_ms, 10_000);
        assert_eq!(engine.live_position(15_000).head_ms, 5_000);

        let actions = engine.stop(15_000);
        assert_eq!(persisted(&actions), Some(LivePosition { head_ms: 5_000, foot_ms: 0 }));
    }

    #[test]
    fn inverted_limit_band_does_not_panic() {
        let config = MotionConfig {
            min_limit_ms: 60_000,
            max_limit_ms: 5_000,
            ..MotionConfig::default()
        };
        let mut engine = MotionEngine::new(config, AxisLimits::default(), LivePosition::default());
        engine.set_limits(1, 90_000);
        assert_eq!(
            engine.limits(),
            AxisLimits {
                head_max_ms: 5_000,
                foot_max_ms: 60_000
            }
        );
    }

    #[test]
    fn loaded_position_is_not_validated() {
        let engine = engine_at(30_000, -5);
        assert_eq!(engine.stored_position(), LivePosition { head_ms: 30_000, foot_ms: -5 });
        assert_eq!(engine.live_position(0), LivePosition { head_ms: 30_000, foot_ms: -5 });
    }
}
