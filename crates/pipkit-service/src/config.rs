use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_ID: &str = "com.fishjam.foregroundservice.channel";
pub const DEFAULT_CHANNEL_NAME: &str = "Fishjam Notifications";
pub const DEFAULT_NOTIFICATION_TITLE: &str = "[PLACEHOLDER] Tap to return to the call.";
pub const DEFAULT_NOTIFICATION_CONTENT: &str = "[PLACEHOLDER] Your video call is ongoing";

/// What the caller wants the foreground service to cover.
///
/// Every key is optional on the wire; missing flags are `false` and missing
/// strings take the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForegroundServiceConfig {
    pub enable_camera: bool,
    pub enable_microphone: bool,
    pub enable_screen_sharing: bool,
    pub channel_id: String,
    pub channel_name: String,
    pub notification_title: String,
    pub notification_content: String,
}

impl Default for ForegroundServiceConfig {
    fn default() -> Self {
        Self {
            enable_camera: false,
            enable_microphone: false,
            enable_screen_sharing: false,
            channel_id: DEFAULT_CHANNEL_ID.to_owned(),
            channel_name: DEFAULT_CHANNEL_NAME.to_owned(),
            notification_title: DEFAULT_NOTIFICATION_TITLE.to_owned(),
            notification_content: DEFAULT_NOTIFICATION_CONTENT.to_owned(),
        }
    }
}
