use super::{SpeechEngine, Utterance};
use crate::error::GuideResult;
use async_trait::async_trait;
use tracing::*;

/// Logs utterances instead of speaking them
pub struct SilentSpeechEngine;

#[async_trait]
impl SpeechEngine for SilentSpeechEngine {
    async fn speak(&mut self, utterance: &Utterance) -> GuideResult<()> {
        info!(rate = utterance.rate, "(silent) {}", utterance.text);
        Ok(())
    }

    async fn cancel(&mut self) -> GuideResult<()> {
        Ok(())
    }
}
