use super::{SpeechEngine, Utterance};
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::*;

/// Speaks through an espeak compatible program (`-v voice -s wpm text`).
///
/// Utterances run in the background; a new one kills the previous child.
pub struct CommandSpeechEngine {
    program: String,
    voice: String,
    base_words_per_minute: u32,
    current: Option<Child>,
}

impl CommandSpeechEngine {
    pub fn new(program: &str, voice: &str, base_words_per_minute: u32) -> Self {
        Self {
            program: program.to_owned(),
            voice: voice.to_owned(),
            base_words_per_minute,
            current: None,
        }
    }

    fn words_per_minute(&self, rate: f32) -> u32 {
        (self.base_words_per_minute as f32 * rate).round() as u32
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    async fn speak(&mut self, utterance: &Utterance) -> GuideResult<()> {
        self.cancel().await?;
        let child = Command::new(&self.program)
            .arg("-v")
            .arg(&self.voice)
            .arg("-s")
            .arg(self.words_per_minute(utterance.rate).to_string())
            .arg(&utterance.text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                GuideError::SpeechEngineError(format!("failed to start {}: {}", self.program, err))
            })?;
        self.current = Some(child);
        Ok(())
    }

    async fn cancel(&mut self) -> GuideResult<()> {
        if let Some(mut child) = self.current.take() {
            if child.try_wait()?.is_none() {
                trace!("Interrupting previous utterance");
                if let Err(err) = child.kill().await {
                    warn!("Failed to stop speech process: {}", err);
                }
            }
        }
        Ok(())
    }
}
