use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::CommandError,
    presets::PresetSlot,
    types::{Axis, JogDirection, SlotSignal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedCommand {
    Stop,
    Jog(Axis, JogDirection),
    JogAll(JogDirection),
    Flat,
    Max,
    ApplyPreset(PresetSlot),
    SavePosition(PresetSlot),
    SaveLabel(PresetSlot),
    ResetPreset(PresetSlot),
}

impl BedCommand {
    pub fn signal(&self) -> Option<(SlotSignal, PresetSlot)> {
        match *self {
            Self::SavePosition(slot) => Some((SlotSignal::SavedPosition, slot)),
            Self::SaveLabel(slot) => Some((SlotSignal::SavedLabel, slot)),
            Self::ResetPreset(slot) => Some((SlotSignal::Reset, slot)),
            _ => None,
        }
    }
}

impl fmt::Display for BedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("STOP"),
            Self::Jog(axis, direction) => write!(f, "{}_{}", axis.as_str(), direction.as_str()),
            Self::JogAll(direction) => write!(f, "ALL_{}", direction.as_str()),
            Self::Flat => f.write_str("FLAT"),
            Self::Max => f.write_str("MAX"),
            Self::ApplyPreset(slot) => f.write_str(slot.run_command()),
            Self::SavePosition(slot) => write!(f, "SET_{}_POS", slot.token()),
            Self::SaveLabel(slot) => write!(f, "SET_{}_LABEL", slot.token()),
            Self::ResetPreset(slot) => write!(f, "RESET_{}", slot.token()),
        }
    }
}

impl FromStr for BedCommand {
    type Err = CommandError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(CommandError::Empty);
        }

        let command = match name.as_str() {
            "STOP" => Some(Self::Stop),
            "HEAD_UP" => Some(Self::Jog(Axis::Head, JogDirection::Extend)),
            "HEAD_DOWN" => Some(Self::Jog(Axis::Head, JogDirection::Retract)),
            "FOOT_UP" => Some(Self::Jog(Axis::Foot, JogDirection::Extend)),
            "FOOT_DOWN" => Some(Self::Jog(Axis::Foot, JogDirection::Retract)),
            "ALL_UP" => Some(Self::JogAll(JogDirection::Extend)),
            "ALL_DOWN" => Some(Self::JogAll(JogDirection::Retract)),
            "FLAT" => Some(Self::Flat),
            "MAX" => Some(Self::Max),
            other => PresetSlot::from_run_command(other)
                .map(Self::ApplyPreset)
                .or_else(|| parse_slot_command(other)),
        };
        command.ok_or(CommandError::Unknown(name))
    }
}

fn parse_slot_command(name: &str) -> Option<BedCommand> {
    if let Some(token) = name.strip_prefix("RESET_") {
        return PresetSlot::from_token(token).map(BedCommand::ResetPreset);
    }

    let rest = name.strip_prefix("SET_")?;
    if let Some(token) = rest.strip_suffix("_POS") {
        PresetSlot::from_token(token).map(BedCommand::SavePosition)
    } else if let Some(token) = rest.strip_suffix("_LABEL") {
        PresetSlot::from_token(token).map(BedCommand::SaveLabel)
    } else {
        None
    }
}

/// Body of `POST /rpc/Bed.Command` and of MQTT command messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CommandRequest {
    /// Accepts either a JSON request or a bare command name.
    pub fn from_payload(payload: &str) -> Self {
        let trimmed = payload.trim();
        serde_json::from_str(trimmed).unwrap_or_else(|_| Self {
            cmd: trimmed.to_string(),
            label: None,
        })
    }

    pub fn parse(&self) -> Result<BedCommand, CommandError> {
        self.cmd.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: BedCommand,
    pub max_wait_ms: u32,
    pub signal: Option<(SlotSignal, PresetSlot)>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_motion_commands_case_insensitively() {
        assert_eq!(" stop ".parse::<BedCommand>(), Ok(BedCommand::Stop));
        assert_eq!(
            "head_down".parse::<BedCommand>(),
            Ok(BedCommand::Jog(Axis::Head, JogDirection::Retract))
        );
        assert_eq!(
            "ALL_UP".parse::<BedCommand>(),
            Ok(BedCommand::JogAll(JogDirection::Extend))
        );
        assert_eq!("Flat".parse::<BedCommand>(), Ok(BedCommand::Flat));
        assert_eq!(
            "anti_snore".parse::<BedCommand>(),
            Ok(BedCommand::ApplyPreset(PresetSlot::AntiSnore))
        );
    }

    #[test]
    fn parses_slot_commands() {
        assert_eq!(
            "SET_ZG_POS".parse::<BedCommand>(),
            Ok(BedCommand::SavePosition(PresetSlot::ZeroGravity))
        );
        assert_eq!(
            "set_legs_label".parse::<BedCommand>(),
            Ok(BedCommand::SaveLabel(PresetSlot::LegsUp))
        );
        assert_eq!(
            "RESET_P2".parse::<BedCommand>(),
            Ok(BedCommand::ResetPreset(PresetSlot::Slot2))
        );
    }

    #[test]
    fn rejects_unknown_and_empty_names() {
        assert_eq!("   ".parse::<BedCommand>(), Err(CommandError::Empty));
        assert_eq!(
            "SET_ZERO_G_POS".parse::<BedCommand>(),
            Err(CommandError::Unknown("SET_ZERO_G_POS".to_string()))
        );
        assert_eq!(
            "RESET_".parse::<BedCommand>(),
            Err(CommandError::Unknown("RESET_".to_string()))
        );
    }

    #[test]
    fn display_round_trips_wire_names() {
        for name in [
            "STOP", "HEAD_UP", "FOOT_DOWN", "ALL_DOWN", "MAX", "ZERO_G", "LEGS_UP", "P1",
            "SET_SNORE_POS", "SET_P1_LABEL", "RESET_ZG",
        ] {
            let command: BedCommand = name.parse().unwrap();
            assert_eq!(command.to_string(), name);
        }
    }

    #[test]
    fn payload_accepts_json_or_bare_name() {
        assert_eq!(
            CommandRequest::from_payload(r#"{"cmd":"SET_P1_LABEL","label":"Reading"}"#),
            CommandRequest {
                cmd: "SET_P1_LABEL".to_string(),
                label: Some("Reading".to_string()),
            }
        );
        assert_eq!(CommandRequest::from_payload(" flat\n").cmd, "flat");
        assert_eq!(
            CommandRequest::from_payload("flat").parse(),
            Ok(BedCommand::Flat)
        );
    }
}
