pub mod bed;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod motion;
pub mod output;
pub mod presets;
pub mod store;
pub mod topics;
pub mod types;

pub use bed::Bed;
pub use clock::{Clock, MonotonicClock};
pub use command::{BedCommand, CommandOutcome, CommandRequest};
pub use config::{AxisLimits, MotionConfig, NetworkConfig, RuntimeConfig};
pub use error::{BedError, CommandError, StoreError};
pub use motion::{EngineAction, Finalization, MotionEngine, IDLE_COMMAND};
pub use output::{ActuatorOutput, DutyRamp};
pub use presets::{Preset, PresetSlot};
pub use store::{MemoryStore, PositionStore};
pub use topics::*;
pub use types::{
    boot_epoch, Axis, BedSnapshot, BedStatusPayload, Direction, JogDirection, LimitsPayload,
    LivePosition, MotionStatus, SlotSignal,
};
