use tracing::*;

pub const NO_VALUE: &str = "-";
pub const NO_ALERT: &str = "없음";
pub const STATUS_IDLE: &str = "대기 중...";
pub const STATUS_DETECTING: &str = "📡 감지 중...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Menu {
    #[default]
    Main,
    Environment,
    Location,
    Facility,
}

impl Menu {
    /// Spoken when the menu is opened
    pub fn prompt(&self) -> Option<&'static str> {
        match self {
            Menu::Main => None,
            Menu::Environment => Some("환경 안내 모드입니다."),
            Menu::Location => Some("위치 안내입니다. 요약, 주소, 건물, 시설 중 선택하세요."),
            Menu::Facility => Some("주변 시설을 선택하세요."),
        }
    }
}

/// Text labels shown to a sighted companion, published through the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBoard {
    pub status: String,
    pub objects: String,
    pub environment: String,
    pub alert: String,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            status: STATUS_IDLE.to_owned(),
            objects: NO_VALUE.to_owned(),
            environment: NO_VALUE.to_owned(),
            alert: NO_ALERT.to_owned(),
        }
    }
}

impl StatusBoard {
    pub fn set_status(&mut self, text: &str) {
        Self::update("status", &mut self.status, text);
    }

    pub fn set_objects(&mut self, text: &str) {
        Self::update("objects", &mut self.objects, text);
    }

    pub fn set_environment(&mut self, text: &str) {
        Self::update("environment", &mut self.environment, text);
    }

    pub fn set_alert(&mut self, text: &str) {
        Self::update("alert", &mut self.alert, text);
    }

    pub fn clear(&mut self) {
        self.set_status(STATUS_IDLE);
        self.set_objects(NO_VALUE);
        self.set_environment(NO_VALUE);
        self.set_alert(NO_ALERT);
    }

    fn update(label: &'static str, slot: &mut String, text: &str) {
        if slot.as_str() != text {
            info!(target: "walk_guide::board", label, "{}", text);
            *slot = text.to_owned();
        }
    }
}
