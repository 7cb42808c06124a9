//! Error codes carried in the `error_code` field of failed results.

/// The addressed platform entity does not exist.
pub const ENTITY_NOT_FOUND: &str = "PLATFORM_ENTITY_COMMAND_ERROR";

/// The entity exists but the action it was asked to perform failed.
pub const ENTITY_ACTION_FAILED: &str = "PLATFORM_ENTITY_ACTION_ERROR";

/// The radio stack rejected the operation; `zigbee_error_code` and
/// `zigbee_error_message` carry its own code and message.
pub const RADIO: &str = "zigbee_error";

pub const INVALID_COMMAND: &str = "invalid_command";
pub const UNKNOWN_COMMAND: &str = "unknown_command";
pub const DEVICE_NOT_FOUND: &str = "device_not_found";
pub const GROUP_NOT_FOUND: &str = "group_not_found";
pub const INTERNAL_ERROR: &str = "internal_error";
