use super::{SpeechEngine, Urgency, Utterance};
use crate::clock::{Clock, Timestamp};
use crate::error::GuideResult;
use std::sync::Arc;
use tracing::*;

/// Identical text is not repeated within this window
pub const SPEAK_COOLDOWN_MS: Timestamp = 5_000;

/// Speech rate kept in tenths so repeated steps never drift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechRate {
    tenths: u32,
}

impl SpeechRate {
    const DEFAULT_TENTHS: u32 = 11;
    const MIN_TENTHS: u32 = 7;
    const MAX_TENTHS: u32 = 16;
    const WARN_BOOST_TENTHS: u32 = 2;
    const WARN_MAX_TENTHS: u32 = 14;

    pub fn adjusted(self, delta_tenths: i32) -> Self {
        let tenths = (self.tenths as i32 + delta_tenths)
            .clamp(Self::MIN_TENTHS as i32, Self::MAX_TENTHS as i32);
        Self {
            tenths: tenths as u32,
        }
    }

    pub fn value(self) -> f32 {
        self.tenths as f32 / 10.0
    }

    pub fn for_urgency(self, urgency: Urgency) -> f32 {
        match urgency {
            Urgency::Warn => {
                let boosted = (self.tenths + Self::WARN_BOOST_TENTHS).min(Self::WARN_MAX_TENTHS);
                boosted as f32 / 10.0
            }
            Urgency::Info | Urgency::Sys => self.value(),
        }
    }
}

impl Default for SpeechRate {
    fn default() -> Self {
        Self {
            tenths: Self::DEFAULT_TENTHS,
        }
    }
}

pub struct Narrator {
    engine: Box<dyn SpeechEngine>,
    clock: Arc<dyn Clock>,
    rate: SpeechRate,
    last_spoken: Option<String>,
    last_speak_time: Timestamp,
}

impl Narrator {
    pub fn new(engine: Box<dyn SpeechEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            rate: SpeechRate::default(),
            last_spoken: None,
            last_speak_time: 0,
        }
    }

    /// Speaks `text`, interrupting any previous utterance.
    ///
    /// Returns `false` when the text was empty or is a repeat of the last
    /// utterance inside the cooldown window.
    pub async fn speak(&mut self, text: &str, urgency: Urgency) -> GuideResult<bool> {
        if text.is_empty() {
            return Ok(false);
        }

        let now = self.clock.now_ms();
        if self.last_spoken.as_deref() == Some(text)
            && now.saturating_sub(self.last_speak_time) < SPEAK_COOLDOWN_MS
        {
            debug!("Skipping repeated utterance {:?}", text);
            return Ok(false);
        }

        self.last_speak_time = now;
        self.last_spoken = Some(text.to_owned());

        let utterance = Utterance {
            text: text.to_owned(),
            rate: self.rate.for_urgency(urgency),
            urgency,
        };
        info!(?urgency, rate = utterance.rate, "Speaking {:?}", text);

        self.engine.cancel().await?;
        self.engine.speak(&utterance).await?;
        Ok(true)
    }

    pub async fn repeat_last(&mut self) -> GuideResult<bool> {
        match self.last_spoken.clone() {
            Some(text) => self.speak(&text, Urgency::Info).await,
            None => Ok(false),
        }
    }

    pub async fn change_rate(&mut self, delta_tenths: i32) -> GuideResult<bool> {
        self.rate = self.rate.adjusted(delta_tenths);
        let notice = format!("말하는 속도를 {:.1}배로 조정했습니다.", self.rate.value());
        self.speak(&notice, Urgency::Sys).await
    }

    pub async fn reset_rate(&mut self) -> GuideResult<bool> {
        self.rate = SpeechRate::default();
        self.speak("말하는 속도를 기본값으로 되돌렸습니다.", Urgency::Sys)
            .await
    }

    pub fn rate(&self) -> SpeechRate {
        self.rate
    }

    pub fn last_spoken(&self) -> Option<&str> {
        self.last_spoken.as_deref()
    }
}
