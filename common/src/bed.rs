use std::sync::{Arc, Mutex};

use crate::{
    clock::Clock,
    command::{BedCommand, CommandOutcome},
    config::{AxisLimits, MotionConfig},
    error::{BedError, StoreError},
    motion::{EngineAction, MotionEngine, IDLE_COMMAND},
    output::ActuatorOutput,
    presets::{Preset, PresetSlot},
    store::{PositionStore, KEY_FOOT_MAX, KEY_FOOT_POS, KEY_HEAD_MAX, KEY_HEAD_POS},
    types::{Axis, BedSnapshot, JogDirection, LivePosition},
};

const ACTIVE_MOVE_TO: &str = "MOVE_TO";

struct BedInner<O, S> {
    engine: MotionEngine,
    output: O,
    store: S,
}

/// The bed controller: motion engine, actuator outputs and persistent store
/// behind one lock.
///
/// Every public operation takes the lock, samples the clock, runs the engine
/// and carries out the resulting actions before releasing it.
pub struct Bed<O, S> {
    inner: Mutex<BedInner<O, S>>,
    clock: Arc<dyn Clock>,
}

impl<O: ActuatorOutput, S: PositionStore> Bed<O, S> {
    pub fn begin(
        mut config: MotionConfig,
        mut output: O,
        mut store: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        config.sanitize();
        output.all_off();
        ensure_factory_defaults(&mut store);

        let defaults = AxisLimits::default();
        let mut limits = AxisLimits {
            head_max_ms: store.get_i32(KEY_HEAD_MAX, defaults.head_max_ms),
            foot_max_ms: store.get_i32(KEY_FOOT_MAX, defaults.foot_max_ms),
        };
        limits.sanitize(&config);
        persist_limits(&mut store, limits);

        let position = LivePosition {
            head_ms: store.get_i32(KEY_HEAD_POS, 0),
            foot_ms: store.get_i32(KEY_FOOT_POS, 0),
        };
        log::info!(
            "bed ready: head {}/{} ms, foot {}/{} ms",
            position.head_ms,
            limits.head_max_ms,
            position.foot_ms,
            limits.foot_max_ms
        );

        Self {
            inner: Mutex::new(BedInner {
                engine: MotionEngine::new(config, limits, position),
                output,
                store,
            }),
            clock,
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut BedInner<O, S>, u64) -> T) -> Result<T, BedError> {
        let Ok(mut inner) = self.inner.lock() else {
            log::warn!("bed state lock poisoned; skipping operation");
            return Err(BedError::LockUnavailable);
        };
        let now_ms = self.clock.now_ms();
        Ok(f(&mut inner, now_ms))
    }

    /// Runs a parsed wire command. `label` is only used by `SET_<slot>_LABEL`.
    pub fn execute(&self, command: BedCommand, label: Option<&str>) -> Result<CommandOutcome, BedError> {
        self.with_inner(|inner, now_ms| {
            let max_wait_ms = match command {
                BedCommand::Stop => {
                    inner.run(|engine| engine.stop(now_ms));
                    0
                }
                BedCommand::Jog(axis, direction) => {
                    inner.run(|engine| engine.jog(axis, direction, now_ms));
                    0
                }
                BedCommand::JogAll(direction) => {
                    inner.run(|engine| engine.jog_all(direction, now_ms));
                    0
                }
                BedCommand::Flat => inner.move_to(0, 0, now_ms),
                BedCommand::Max => {
                    let limits = inner.engine.limits();
                    inner.move_to(limits.head_max_ms, limits.foot_max_ms, now_ms)
                }
                BedCommand::ApplyPreset(slot) => {
                    let preset = read_preset(&inner.store, slot);
                    inner.move_to(preset.head_ms, preset.foot_ms, now_ms)
                }
                BedCommand::SavePosition(slot) => {
                    inner.save_preset(slot, None, now_ms);
                    0
                }
                BedCommand::SaveLabel(slot) => {
                    inner.save_preset(slot, label, now_ms);
                    0
                }
                BedCommand::ResetPreset(slot) => {
                    inner.reset_preset(slot);
                    0
                }
            };

            if !matches!(command, BedCommand::ResetPreset(_)) {
                inner.record_active(&command.to_string());
            }
            log::info!("command {command}: max wait {max_wait_ms} ms");

            CommandOutcome {
                command,
                max_wait_ms,
                signal: command.signal(),
            }
        })
    }

    pub fn stop(&self) -> Result<(), BedError> {
        self.execute(BedCommand::Stop, None).map(|_| ())
    }

    pub fn jog(&self, axis: Axis, direction: JogDirection) -> Result<(), BedError> {
        self.execute(BedCommand::Jog(axis, direction), None).map(|_| ())
    }

    pub fn jog_all(&self, direction: JogDirection) -> Result<(), BedError> {
        self.execute(BedCommand::JogAll(direction), None).map(|_| ())
    }

    /// Drives both axes toward a slot's stored targets; returns the longest wait.
    pub fn apply_preset(&self, slot: PresetSlot) -> Result<u32, BedError> {
        self.execute(BedCommand::ApplyPreset(slot), None)
            .map(|outcome| outcome.max_wait_ms)
    }

    pub fn move_to(&self, head_ms: i32, foot_ms: i32) -> Result<u32, BedError> {
        self.with_inner(|inner, now_ms| {
            let max_wait_ms = inner.move_to(head_ms, foot_ms, now_ms);
            inner.record_active(ACTIVE_MOVE_TO);
            max_wait_ms
        })
    }

    /// Stops the bed and stores its position in `slot`. A non-empty label is stored too.
    pub fn save_preset(&self, slot: PresetSlot, label: Option<&str>) -> Result<(), BedError> {
        let command = match label {
            Some(_) => BedCommand::SaveLabel(slot),
            None => BedCommand::SavePosition(slot),
        };
        self.execute(command, label).map(|_| ())
    }

    pub fn reset_preset(&self, slot: PresetSlot) -> Result<(), BedError> {
        self.execute(BedCommand::ResetPreset(slot), None).map(|_| ())
    }

    /// Writes factory presets and limits if the store has never been initialized.
    pub fn ensure_factory_defaults(&self) -> Result<bool, BedError> {
        self.with_inner(|inner, _| ensure_factory_defaults(&mut inner.store))
    }

    pub fn preset(&self, slot: PresetSlot) -> Result<Preset, BedError> {
        self.with_inner(|inner, _| read_preset(&inner.store, slot))
    }

    pub fn presets(&self) -> Result<Vec<(PresetSlot, Preset)>, BedError> {
        self.with_inner(|inner, _| read_presets(&inner.store))
    }

    pub fn live_position(&self) -> Result<LivePosition, BedError> {
        self.with_inner(|inner, now_ms| inner.engine.live_position(now_ms))
    }

    pub fn limits(&self) -> Result<AxisLimits, BedError> {
        self.with_inner(|inner, _| inner.engine.limits())
    }

    pub fn set_limits(&self, head_max_ms: i32, foot_max_ms: i32) -> Result<AxisLimits, BedError> {
        self.with_inner(|inner, _| {
            inner.run(|engine| engine.set_limits(head_max_ms, foot_max_ms));
            let limits = inner.engine.limits();
            log::info!(
                "limits set: head {} ms, foot {} ms",
                limits.head_max_ms,
                limits.foot_max_ms
            );
            limits
        })
    }

    /// Control-loop entry point; steps the outputs and completes scheduled axes.
    pub fn tick(&self) -> Result<(), BedError> {
        self.with_inner(|inner, now_ms| {
            inner.output.update();
            if !inner.engine.is_preset_active() {
                return;
            }
            inner.run(|engine| engine.tick(now_ms));
            if !inner.engine.is_preset_active() {
                let position = inner.engine.stored_position();
                log::info!(
                    "preset move complete at head {} ms, foot {} ms",
                    position.head_ms,
                    position.foot_ms
                );
            }
        })
    }

    pub fn snapshot(&self) -> Result<BedSnapshot, BedError> {
        self.with_inner(|inner, now_ms| BedSnapshot {
            motion: inner.engine.status(now_ms),
            presets: read_presets(&inner.store),
        })
    }
}

impl<O: ActuatorOutput, S: PositionStore> BedInner<O, S> {
    fn run(&mut self, op: impl FnOnce(&mut MotionEngine) -> Vec<EngineAction>) {
        let actions = op(&mut self.engine);
        self.apply(actions);
    }

    fn apply(&mut self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::DriveAxis(axis, direction) => {
                    self.output.set_axis_output(axis, direction)
                }
                EngineAction::PowerEnable(enabled) => self.output.set_power_enable(enabled),
                EngineAction::PersistPosition(position) => {
                    warn_on_failure(self.store.set_i32(KEY_HEAD_POS, position.head_ms));
                    warn_on_failure(self.store.set_i32(KEY_FOOT_POS, position.foot_ms));
                }
                EngineAction::PersistLimits(limits) => persist_limits(&mut self.store, limits),
            }
        }
    }

    fn move_to(&mut self, head_ms: i32, foot_ms: i32, now_ms: u64) -> u32 {
        let (max_wait_ms, actions) = self.engine.move_to(head_ms, foot_ms, now_ms);
        self.apply(actions);
        max_wait_ms
    }

    fn record_active(&mut self, name: &str) {
        let label = if self.engine.is_moving() {
            name
        } else {
            IDLE_COMMAND
        };
        self.engine.set_active_command(label);
    }

    fn save_preset(&mut self, slot: PresetSlot, label: Option<&str>, now_ms: u64) {
        self.run(|engine| engine.stop(now_ms));
        let position = self.engine.stored_position();
        warn_on_failure(self.store.set_i32(&slot.head_key(), position.head_ms));
        warn_on_failure(self.store.set_i32(&slot.foot_key(), position.foot_ms));

        if let Some(label) = label.map(str::trim).filter(|label| !label.is_empty()) {
            warn_on_failure(self.store.set_string(&slot.label_key(), label));
        }
        log::info!(
            "saved {} at head {} ms, foot {} ms",
            slot.prefix(),
            position.head_ms,
            position.foot_ms
        );
    }

    fn reset_preset(&mut self, slot: PresetSlot) {
        write_preset(&mut self.store, slot, &slot.factory_default());
        log::info!("reset {} to factory position", slot.prefix());
    }
}

fn warn_on_failure(result: Result<(), StoreError>) {
    if let Err(err) = result {
        log::warn!("{err}");
    }
}

fn persist_limits<S: PositionStore>(store: &mut S, limits: AxisLimits) {
    warn_on_failure(store.set_i32(KEY_HEAD_MAX, limits.head_max_ms));
    warn_on_failure(store.set_i32(KEY_FOOT_MAX, limits.foot_max_ms));
}

fn write_preset<S: PositionStore>(store: &mut S, slot: PresetSlot, preset: &Preset) {
    warn_on_failure(store.set_i32(&slot.head_key(), preset.head_ms));
    warn_on_failure(store.set_i32(&slot.foot_key(), preset.foot_ms));
    warn_on_failure(store.set_string(&slot.label_key(), &preset.label));
}

fn read_preset<S: PositionStore>(store: &S, slot: PresetSlot) -> Preset {
    let defaults = slot.factory_default();
    Preset {
        head_ms: store.get_i32(&slot.head_key(), defaults.head_ms),
        foot_ms: store.get_i32(&slot.foot_key(), defaults.foot_ms),
        label: store.get_string(&slot.label_key()).unwrap_or(defaults.label),
    }
}

fn read_presets<S: PositionStore>(store: &S) -> Vec<(PresetSlot, Preset)> {
    PresetSlot::ALL
        .into_iter()
        .map(|slot| (slot, read_preset(store, slot)))
        .collect()
}

fn ensure_factory_defaults<S: PositionStore>(store: &mut S) -> bool {
    if store.contains(&PresetSlot::ZeroGravity.label_key()) {
        return false;
    }

    for slot in PresetSlot::ALL {
        write_preset(store, slot, &slot.factory_default());
    }
    persist_limits(store, AxisLimits::default());
    log::info!("initialized factory presets");
    true
}
