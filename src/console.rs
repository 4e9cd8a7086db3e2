use crate::error::{GuideError, GuideResult};
use crate::intent::Intent;
use crate::location::FacilityCategory;
use crate::microphone::VoiceRecorder;
use crate::session::{Command, SessionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::*;

const HELP: &str = "commands: start, stop, object, env, danger, safe, toggle, alert on|off, \
location, summary, address, landmark, facility [CODE], upload [PATH], voice, slower, faster, \
normal, repeat, back, quit";

const LINE_QUEUE_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Session(Command),
    Voice,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, GuideError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let argument = words.collect::<Vec<_>>().join(" ");

        let intent = |intent| Ok(Some(ConsoleCommand::Session(Command::Intent(intent))));
        match word.to_lowercase().as_str() {
            "start" => intent(Intent::SystemStart),
            "stop" => intent(Intent::SystemStop),
            "object" => intent(Intent::ObjectGuide),
            "env" => intent(Intent::EnvMenu),
            "danger" => intent(Intent::EnvDanger),
            "safe" => intent(Intent::EnvSafe),
            "toggle" => Ok(Some(ConsoleCommand::Session(Command::ToggleEnvAlert))),
            "alert" => match argument.as_str() {
                "on" => intent(Intent::EnvAlertOn),
                "off" => intent(Intent::EnvAlertOff),
                _ => Ok(Some(ConsoleCommand::Help)),
            },
            "location" => intent(Intent::LocationMenu),
            "summary" => intent(Intent::LocationSummary),
            "address" => intent(Intent::LocationAddress),
            "landmark" => intent(Intent::LocationLandmark),
            "facility" if argument.is_empty() => intent(Intent::LocationFacility),
            "facility" => {
                let category: FacilityCategory = argument.parse()?;
                Ok(Some(ConsoleCommand::Session(Command::Facility(category))))
            }
            "upload" if argument.is_empty() => intent(Intent::UploadImage),
            "upload" => Ok(Some(ConsoleCommand::Session(Command::UploadFile(
                PathBuf::from(argument),
            )))),
            "voice" => Ok(Some(ConsoleCommand::Voice)),
            "slower" => intent(Intent::TtsSlower),
            "faster" => intent(Intent::TtsFaster),
            "normal" => intent(Intent::TtsReset),
            "repeat" => intent(Intent::RepeatLast),
            "back" => intent(Intent::UiBack),
            "quit" | "exit" => Ok(Some(ConsoleCommand::Quit)),
            _ => Ok(Some(ConsoleCommand::Help)),
        }
    }
}

/// Forwards stdin lines from a plain thread.
///
/// A pending read can't be cancelled, so the thread is left blocked on exit
/// instead of holding up runtime shutdown.
pub fn spawn_stdin_reader() -> GuideResult<mpsc::Receiver<String>> {
    let (sender, receiver) = mpsc::channel(LINE_QUEUE_SIZE);
    std::thread::Builder::new()
        .name("stdin".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if sender.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(receiver)
}

/// Handles console lines until `quit` or end of input
pub async fn run_console(
    mut lines: mpsc::Receiver<String>,
    events: mpsc::Sender<SessionEvent>,
    recorder: Arc<VoiceRecorder>,
) -> anyhow::Result<()> {
    println!("{}", HELP);
    while let Some(line) = lines.recv().await {
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("Invalid command {:?}: {}", line, e);
                continue;
            }
        };
        match command {
            ConsoleCommand::Session(command) => {
                debug!(?command, "Console command");
                events
                    .send(SessionEvent::Command(command))
                    .await
                    .map_err(|_| GuideError::SessionClosed)?;
            }
            ConsoleCommand::Voice => start_voice_command(recorder.clone(), events.clone()),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
        }
    }
    info!("Console closed");
    Ok(())
}

fn start_voice_command(recorder: Arc<VoiceRecorder>, events: mpsc::Sender<SessionEvent>) {
    tokio::spawn(async move {
        let event = match recorder.record().await {
            Ok(audio) => SessionEvent::VoiceClip(audio),
            Err(GuideError::RecordingInProgress) => {
                info!("Already recording a voice command");
                return;
            }
            Err(e) => {
                error!("Failed to record voice command: {}", e);
                SessionEvent::MicrophoneFailed
            }
        };
        if events.send(event).await.is_err() {
            warn!("Session closed before voice command was delivered");
        }
    });
}
