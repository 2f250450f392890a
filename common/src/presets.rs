use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetSlot {
    ZeroGravity,
    AntiSnore,
    LegsUp,
    Slot1,
    Slot2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub head_ms: i32,
    pub foot_ms: i32,
    pub label: String,
}

impl PresetSlot {
    pub const ALL: [PresetSlot; 5] = [
        PresetSlot::ZeroGravity,
        PresetSlot::AntiSnore,
        PresetSlot::LegsUp,
        PresetSlot::Slot1,
        PresetSlot::Slot2,
    ];

    /// Store key prefix, also the value of the save/reset signal keys.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::ZeroGravity => "zg",
            Self::AntiSnore => "snore",
            Self::LegsUp => "legs",
            Self::Slot1 => "p1",
            Self::Slot2 => "p2",
        }
    }

    /// Token used inside `SET_<TOKEN>_POS`, `SET_<TOKEN>_LABEL` and `RESET_<TOKEN>`.
    pub fn token(self) -> &'static str {
        match self {
            Self::ZeroGravity => "ZG",
            Self::AntiSnore => "SNORE",
            Self::LegsUp => "LEGS",
            Self::Slot1 => "P1",
            Self::Slot2 => "P2",
        }
    }

    /// Command name that drives the bed to this slot.
    pub fn run_command(self) -> &'static str {
        match self {
            Self::ZeroGravity => "ZERO_G",
            Self::AntiSnore => "ANTI_SNORE",
            Self::LegsUp => "LEGS_UP",
            Self::Slot1 => "P1",
            Self::Slot2 => "P2",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.token().eq_ignore_ascii_case(token))
    }

    pub fn from_run_command(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.run_command().eq_ignore_ascii_case(name))
    }

    pub fn head_key(self) -> String {
        format!("{}_head", self.prefix())
    }

    pub fn foot_key(self) -> String {
        format!("{}_foot", self.prefix())
    }

    pub fn label_key(self) -> String {
        format!("{}_label", self.prefix())
    }

    pub fn factory_default(self) -> Preset {
        let (head_ms, foot_ms, label) = match self {
            Self::ZeroGravity => (10_000, 40_000, "Zero G"),
            Self::AntiSnore => (10_000, 0, "Anti-Snore"),
            Self::LegsUp => (0, 43_000, "Legs Up"),
            Self::Slot1 => (0, 0, "P1"),
            Self::Slot2 => (0, 0, "P2"),
        };
        Preset {
            head_ms,
            foot_ms,
            label: label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn keys_follow_slot_prefix() {
        assert_eq!(PresetSlot::LegsUp.head_key(), "legs_head");
        assert_eq!(PresetSlot::Slot2.foot_key(), "p2_foot");
        assert_eq!(PresetSlot::ZeroGravity.label_key(), "zg_label");
    }

    #[test]
    fn tokens_resolve_case_insensitively() {
        assert_eq!(PresetSlot::from_token("snore"), Some(PresetSlot::AntiSnore));
        assert_eq!(
            PresetSlot::from_run_command("zero_g"),
            Some(PresetSlot::ZeroGravity)
        );
        assert_eq!(PresetSlot::from_token("ANTI_SNORE"), None);
    }

    #[test]
    fn factory_table_matches_shipping_positions() {
        let defaults: Vec<_> = PresetSlot::ALL
            .iter()
            .map(|slot| slot.factory_default())
            .map(|preset| (preset.head_ms, preset.foot_ms))
            .collect();
        assert_eq!(
            defaults,
            vec![(10_000, 40_000), (10_000, 0), (0, 43_000), (0, 0), (0, 0)]
        );
    }
}
