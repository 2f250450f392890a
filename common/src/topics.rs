pub const TOPIC_CONTROLLER_STATE: &str = "bed/controller/state";

pub const TOPIC_CMD_COMMAND: &str = "bed/cmnd/command";

pub const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
