pub const TOPIC_UNIT_POWER: &str = "hvac/unit/state/power";
pub const TOPIC_UNIT_MODE: &str = "hvac/unit/state/mode";
pub const TOPIC_UNIT_ROOM_TEMP: &str = "hvac/unit/state/room_temperature";
pub const TOPIC_UNIT_TARGET_TEMP: &str = "hvac/unit/state/target_temperature";

pub const TOPIC_UNIT_CMD_POWER: &str = "hvac/unit/cmnd/power";
pub const TOPIC_UNIT_CMD_MODE: &str = "hvac/unit/cmnd/mode";
pub const TOPIC_UNIT_CMD_TEMPERATURE: &str = "hvac/unit/cmnd/temperature";

pub const TOPIC_BRIDGE_STATE: &str = "hvac/bridge/state";
pub const TOPIC_BRIDGE_CMD_TARGET_STATE: &str = "hvac/bridge/cmnd/target_state";
pub const TOPIC_BRIDGE_CMD_TARGET_TEMP: &str = "hvac/bridge/cmnd/target_temperature";
pub const TOPIC_BRIDGE_CMD_DISPLAY_UNITS: &str = "hvac/bridge/cmnd/display_units";
