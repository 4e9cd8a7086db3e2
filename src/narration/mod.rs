mod command_engine;
mod narrator;
mod silent_engine;

pub use command_engine::CommandSpeechEngine;
pub use narrator::{Narrator, SpeechRate, SPEAK_COOLDOWN_MS};
pub use silent_engine::SilentSpeechEngine;

use crate::configuration::{SpeechConfig, SpeechEngineKind};
use crate::error::GuideResult;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Urgency {
    #[default]
    Info,
    /// Hazard warnings, spoken faster
    Warn,
    /// System notices
    Sys,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Multiplier over the engine's base speed
    pub rate: f32,
    pub urgency: Urgency,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn speak(&mut self, utterance: &Utterance) -> GuideResult<()>;

    /// Stops whatever is currently being spoken
    async fn cancel(&mut self) -> GuideResult<()>;
}

pub fn create_speech_engine(config: &SpeechConfig) -> Box<dyn SpeechEngine> {
    match config.engine {
        SpeechEngineKind::Command => Box::new(CommandSpeechEngine::new(
            &config.program,
            &config.voice,
            config.base_words_per_minute,
        )),
        SpeechEngineKind::Silent => Box::new(SilentSpeechEngine),
    }
}
