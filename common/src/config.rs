use serde::{Deserialize, Serialize};

use crate::types::Axis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    pub deadband_ms: i32,
    pub overdrive_ms: u32,
    pub tick_period_ms: u64,
    pub min_limit_ms: i32,
    pub max_limit_ms: i32,
    pub state_publish_interval_ms: u64,
}

impl MotionConfig {
    /// Repairs values a hand-edited runtime document can get wrong.
    pub fn sanitize(&mut self) {
        if self.min_limit_ms > self.max_limit_ms {
            std::mem::swap(&mut self.min_limit_ms, &mut self.max_limit_ms);
        }
        self.min_limit_ms = self.min_limit_ms.max(0);
        self.max_limit_ms = self.max_limit_ms.max(self.min_limit_ms);
        self.deadband_ms = self.deadband_ms.max(0);
        self.tick_period_ms = self.tick_period_ms.max(1);
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            deadband_ms: 100,
            overdrive_ms: 10_000,
            tick_period_ms: 10,
            min_limit_ms: 5_000,
            max_limit_ms: 60_000,
            state_publish_interval_ms: 10_000,
        }
    }
}

/// Full-travel time of each actuator, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisLimits {
    pub head_max_ms: i32,
    pub foot_max_ms: i32,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            head_max_ms: 25_000,
            foot_max_ms: 40_000,
        }
    }
}

impl AxisLimits {
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Head => self.head_max_ms,
            Axis::Foot => self.foot_max_ms,
        }
    }

    /// Clamps both limits into the configured band. `config` should already be
    /// sanitized; an inverted band resolves to its upper bound instead of panicking.
    pub fn sanitize(&mut self, config: &MotionConfig) {
        let into_band = |value: i32| value.max(config.min_limit_ms).min(config.max_limit_ms);
        self.head_max_ms = into_band(self.head_max_ms);
        self.foot_max_ms = into_band(self.foot_max_ms);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 8080,
            mqtt_host: String::new(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

impl NetworkConfig {
    pub fn mqtt_enabled(&self) -> bool {
        !self.mqtt_host.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_into_safety_band() {
        let config = MotionConfig::default();
        let mut limits = AxisLimits {
            head_max_ms: 1_000,
            foot_max_ms: 90_000,
        };
        limits.sanitize(&config);
        assert_eq!(limits.head_max_ms, 5_000);
        assert_eq!(limits.foot_max_ms, 60_000);
    }

    #[test]
    fn motion_config_sanitize_repairs_inverted_band() {
        let mut config: MotionConfig = serde_json::from_str(
            r#"{"deadband_ms":-50,"overdrive_ms":10000,"tick_period_ms":0,"min_limit_ms":60000,"max_limit_ms":5000,"state_publish_interval_ms":10000}"#,
        )
        .unwrap();
        config.sanitize();
        assert_eq!((config.min_limit_ms, config.max_limit_ms), (5_000, 60_000));
        assert_eq!(config.deadband_ms, 0);
        assert_eq!(config.tick_period_ms, 1);

        let mut limits = AxisLimits {
            head_max_ms: 70_000,
            foot_max_ms: 100,
        };
        limits.sanitize(&config);
        assert_eq!(limits.head_max_ms, 60_000);
        assert_eq!(limits.foot_max_ms, 5_000);
    }

    #[test]
    fn runtime_config_fills_missing_sections() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"network":{"wifi_ssid":"bedroom","wifi_pass":"x","http_port":80,"mqtt_host":"","mqtt_port":1883,"mqtt_user":"","mqtt_pass":""}}"#)
                .unwrap();
        assert_eq!(config.network.http_port, 80);
        assert_eq!(config.motion.deadband_ms, 100);
        assert!(!config.network.mqtt_enabled());
    }
}
