use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::presets::{Preset, PresetSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Head,
    Foot,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Head, Axis::Foot];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "HEAD",
            Self::Foot => "FOOT",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Head => 0,
            Self::Foot => 1,
        }
    }
}

/// Requested travel direction for a jog or a scheduled move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JogDirection {
    Extend,
    Retract,
}

impl JogDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extend => "UP",
            Self::Retract => "DOWN",
        }
    }

    pub(crate) fn from_delta(delta: i64) -> Self {
        if delta > 0 {
            Self::Extend
        } else {
            Self::Retract
        }
    }
}

/// Commanded state of one axis, as seen by the actuator outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Stopped,
    Extending,
    Retracting,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Extending => "UP",
            Self::Retracting => "DOWN",
        }
    }

    pub fn is_moving(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl From<JogDirection> for Direction {
    fn from(direction: JogDirection) -> Self {
        match direction {
            JogDirection::Extend => Self::Extending,
            JogDirection::Retract => Self::Retracting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LivePosition {
    pub head_ms: i32,
    pub foot_ms: i32,
}

/// Engine-level view used by telemetry and status responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionStatus {
    pub position: LivePosition,
    pub head_direction: Direction,
    pub foot_direction: Direction,
    pub head_max_ms: i32,
    pub foot_max_ms: i32,
    pub preset_active: bool,
    pub active_command: String,
}

/// Everything a transport needs to render a response, read under one lock.
#[derive(Debug, Clone)]
pub struct BedSnapshot {
    pub motion: MotionStatus,
    pub presets: Vec<(PresetSlot, Preset)>,
}

/// Which slot a save/reset command touched, so a UI can refresh just that slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSignal {
    SavedPosition,
    SavedLabel,
    Reset,
}

impl SlotSignal {
    pub fn key(self) -> &'static str {
        match self {
            Self::SavedPosition => "saved_pos",
            Self::SavedLabel => "saved_label",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BedStatusPayload {
    #[serde(rename = "bootTime")]
    pub boot_time: i64,
    pub uptime: u64,
    #[serde(rename = "headPos")]
    pub head_pos: f64,
    #[serde(rename = "footPos")]
    pub foot_pos: f64,
    #[serde(rename = "maxWait")]
    pub max_wait: u32,
    #[serde(rename = "headMaxMs")]
    pub head_max_ms: i32,
    #[serde(rename = "footMaxMs")]
    pub foot_max_ms: i32,
    #[serde(rename = "headDir")]
    pub head_dir: &'static str,
    #[serde(rename = "footDir")]
    pub foot_dir: &'static str,
    #[serde(rename = "presetActive")]
    pub preset_active: bool,
    #[serde(rename = "activeCommand")]
    pub active_command: String,
    #[serde(flatten)]
    pub slots: BTreeMap<String, serde_json::Value>,
}

impl BedStatusPayload {
    pub fn new(
        snapshot: &BedSnapshot,
        boot_time: i64,
        uptime: u64,
        max_wait: u32,
        signal: Option<(SlotSignal, PresetSlot)>,
    ) -> Self {
        let motion = &snapshot.motion;
        let mut slots = BTreeMap::new();
        for (slot, preset) in &snapshot.presets {
            slots.insert(slot.head_key(), preset.head_ms.into());
            slots.insert(slot.foot_key(), preset.foot_ms.into());
            slots.insert(slot.label_key(), preset.label.clone().into());
        }
        if let Some((signal, slot)) = signal {
            slots.insert(signal.key().to_string(), slot.prefix().into());
        }

        Self {
            boot_time,
            uptime,
            head_pos: f64::from(motion.position.head_ms) / 1000.0,
            foot_pos: f64::from(motion.position.foot_ms) / 1000.0,
            max_wait,
            head_max_ms: motion.head_max_ms,
            foot_max_ms: motion.foot_max_ms,
            head_dir: motion.head_direction.as_str(),
            foot_dir: motion.foot_direction.as_str(),
            preset_active: motion.preset_active,
            active_command: motion.active_command.clone(),
            slots,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsPayload {
    #[serde(rename = "headMaxMs")]
    pub head_max_ms: i32,
    #[serde(rename = "footMaxMs")]
    pub foot_max_ms: i32,
}

// 2020-01-01T00:00:00Z; anything earlier means SNTP has not synced yet.
const WALL_CLOCK_SYNCED_EPOCH: i64 = 1_577_836_800;

/// Epoch second the device booted at, or 0 while the wall clock is unsynced.
pub fn boot_epoch(now: DateTime<Utc>, uptime_s: u64) -> i64 {
    let now_epoch = now.timestamp();
    if now_epoch < WALL_CLOCK_SYNCED_EPOCH {
        return 0;
    }
    now_epoch.saturating_sub(i64::try_from(uptime_s).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::AxisLimits;

    fn snapshot() -> BedSnapshot {
        BedSnapshot {
            motion: MotionStatus {
                position: LivePosition {
                    head_ms: 12_340,
                    foot_ms: 500,
                },
                head_direction: Direction::Extending,
                foot_direction: Direction::Stopped,
                head_max_ms: AxisLimits::default().head_max_ms,
                foot_max_ms: AxisLimits::default().foot_max_ms,
                preset_active: false,
                active_command: "HEAD_UP".to_string(),
            },
            presets: PresetSlot::ALL
                .iter()
                .map(|slot| (*slot, slot.factory_default()))
                .collect(),
        }
    }

    #[test]
    fn status_payload_reports_seconds_and_slot_fields() {
        let payload = BedStatusPayload::new(
            &snapshot(),
            1_700_000_000,
            42,
            0,
            Some((SlotSignal::SavedPosition, PresetSlot::Slot1)),
        );
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["headPos"], serde_json::json!(12.34));
        assert_eq!(json["footPos"], serde_json::json!(0.5));
        assert_eq!(json["headDir"], "UP");
        assert_eq!(json["footDir"], "STOPPED");
        assert_eq!(json["zg_head"], 10_000);
        assert_eq!(json["legs_foot"], 43_000);
        assert_eq!(json["snore_label"], "Anti-Snore");
        assert_eq!(json["saved_pos"], "p1");
        assert_eq!(json["maxWait"], 0);
    }

    #[test]
    fn boot_epoch_is_zero_until_clock_synced() {
        let unsynced = Utc.with_ymd_and_hms(1970, 1, 1, 0, 10, 0).unwrap();
        assert_eq!(boot_epoch(unsynced, 30), 0);

        let synced = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        assert_eq!(boot_epoch(synced, 60), synced.timestamp() - 60);
    }
}
