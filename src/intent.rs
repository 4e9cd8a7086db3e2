use std::fmt;

/// Voice command intents reported by the speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SystemStart,
    SystemStop,
    ObjectGuide,
    EnvDanger,
    EnvSafe,
    EnvMenu,
    EnvAlertOff,
    EnvAlertOn,
    LocationMenu,
    LocationSummary,
    LocationAddress,
    LocationLandmark,
    LocationFacility,
    UploadImage,
    RepeatLast,
    TtsSlower,
    TtsFaster,
    TtsReset,
    UiBack,
    Unknown,
}

impl Intent {
    /// Unrecognised names map to [`Intent::Unknown`]
    pub fn from_wire(name: &str) -> Intent {
        match name.trim() {
            "system_start" => Intent::SystemStart,
            "system_stop" => Intent::SystemStop,
            "object_guide" => Intent::ObjectGuide,
            "env_danger" => Intent::EnvDanger,
            "env_safe" => Intent::EnvSafe,
            "env_menu" => Intent::EnvMenu,
            "env_alert_off" => Intent::EnvAlertOff,
            "env_alert_on" => Intent::EnvAlertOn,
            "location_menu" => Intent::LocationMenu,
            "location_summary" => Intent::LocationSummary,
            "location_address" => Intent::LocationAddress,
            "location_landmark" => Intent::LocationLandmark,
            "location_facility" => Intent::LocationFacility,
            "upload_image" => Intent::UploadImage,
            "repeat_last" => Intent::RepeatLast,
            // the speech backend emits the short forms
            "tts_slower" | "tts_slow" => Intent::TtsSlower,
            "tts_faster" | "tts_fast" => Intent::TtsFaster,
            "tts_reset" | "tts_normal" => Intent::TtsReset,
            "ui_back" => Intent::UiBack,
            _ => Intent::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SystemStart => "system_start",
            Intent::SystemStop => "system_stop",
            Intent::ObjectGuide => "object_guide",
            Intent::EnvDanger => "env_danger",
            Intent::EnvSafe => "env_safe",
            Intent::EnvMenu => "env_menu",
            Intent::EnvAlertOff => "env_alert_off",
            Intent::EnvAlertOn => "env_alert_on",
            Intent::LocationMenu => "location_menu",
            Intent::LocationSummary => "location_summary",
            Intent::LocationAddress => "location_address",
            Intent::LocationLandmark => "location_landmark",
            Intent::LocationFacility => "location_facility",
            Intent::UploadImage => "upload_image",
            Intent::RepeatLast => "repeat_last",
            Intent::TtsSlower => "tts_slower",
            Intent::TtsFaster => "tts_faster",
            Intent::TtsReset => "tts_reset",
            Intent::UiBack => "ui_back",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
