use crate::alert::{decide, extract_hazard, AlertAction, AlertState};
use crate::backend::{GuideBackend, InferMode, InferenceResponse, MessageResponse};
use crate::camera::SharedFrameSource;
use crate::clock::Clock;
use crate::configuration::AppConfig;
use crate::error::{GuideError, GuideResult};
use crate::intent::Intent;
use crate::location::{FacilityCategory, LocationCache, LocationQuery};
use crate::narration::{Narrator, Urgency};
use crate::ui_state::{Menu, StatusBoard, NO_ALERT, NO_VALUE, STATUS_DETECTING};
use base64::{engine::general_purpose, Engine};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::*;

const SYSTEM_STARTED: &str = "시스템을 시작합니다.";
const SYSTEM_STOPPED: &str = "시스템을 종료합니다.";
const NETWORK_UNSTABLE: &str = "네트워크 연결이 불안정합니다.";
const MICROPHONE_REQUIRED: &str = "마이크 권한이 필요합니다.";
const PLEASE_REPEAT: &str = "다시 말씀해 주세요.";
const ALERTS_PAUSED: &str = "경고를 중단합니다.";
const ALERTS_RESUMED: &str = "경고를 다시 시작합니다.";
const ALERTS_OFF: &str = "경고가 해제되었습니다.";
const ALERTS_ON: &str = "경고가 다시 시작됩니다.";
const LOCATING: &str = "현재 위치를 확인 중입니다.";
const LOCATION_FAILED: &str = "위치 정보를 가져오지 못했습니다.";
const IMAGE_REQUIRED: &str = "이미지를 선택해주세요.";
const CAMERA_UNAVAILABLE: &str = "카메라를 사용할 수 없습니다.";

/// One manual backend request and one location request
const REQUEST_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    ToggleEnvAlert,
    Facility(FacilityCategory),
    UploadFile(PathBuf),
}

#[derive(Debug)]
pub enum SessionEvent {
    Command(Command),
    /// Frame from the capture loop, `done` fires once it was processed
    Frame {
        frame: Vec<u8>,
        done: oneshot::Sender<()>,
    },
    VoiceClip(Vec<u8>),
    MicrophoneFailed,
    Shutdown,
}

/// Reply to a manual request that ran outside the session task
#[derive(Debug)]
enum RequestOutcome {
    NearbyObjects(GuideResult<MessageResponse>),
    EnvDanger(GuideResult<MessageResponse>),
    EnvSafe(GuideResult<MessageResponse>),
    Location(GuideResult<MessageResponse>),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub environment_keywords: Vec<String>,
    pub annotated_image_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            environment_keywords: config
                .alerts
                .environment_keywords
                .iter()
                .map(|keyword| keyword.trim())
                .filter(|keyword| !keyword.is_empty())
                .map(str::to_owned)
                .collect(),
            annotated_image_dir: config.output.annotated_image_dir.clone(),
        }
    }
}

/// Owns all per-session state. Events are handled one at a time so the
/// alert state only ever has a single writer.
///
/// Manual object/environment queries and location queries run as spawned
/// requests, at most one of each kind. Commands for a kind that is still in
/// flight are dropped.
pub struct GuideSession {
    settings: SessionSettings,
    backend: Arc<dyn GuideBackend>,
    narrator: Narrator,
    clock: Arc<dyn Clock>,
    frames: SharedFrameSource,
    location: LocationCache,
    capture: watch::Sender<bool>,
    alert: AlertState,
    board: StatusBoard,
    menu: Menu,
    running: bool,
    api_busy: bool,
    location_busy: bool,
    outcome_sender: mpsc::Sender<RequestOutcome>,
    outcomes: mpsc::Receiver<RequestOutcome>,
}

impl GuideSession {
    pub fn new(
        settings: SessionSettings,
        backend: Arc<dyn GuideBackend>,
        narrator: Narrator,
        clock: Arc<dyn Clock>,
        frames: SharedFrameSource,
        location: LocationCache,
        capture: watch::Sender<bool>,
    ) -> Self {
        let (outcome_sender, outcomes) = mpsc::channel(REQUEST_SLOTS);
        Self {
            settings,
            backend,
            narrator,
            clock,
            frames,
            location,
            capture,
            alert: AlertState::default(),
            board: StatusBoard::default(),
            menu: Menu::Main,
            running: false,
            api_busy: false,
            location_busy: false,
            outcome_sender,
            outcomes,
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> GuideResult<()> {
        info!("Guide session ready");
        loop {
            let res = select! {
                event = events.recv() => match event {
                    Some(SessionEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
                Some(outcome) = self.outcomes.recv() => {
                    self.apply_outcome(outcome).await;
                    Ok(())
                }
            };
            if let Err(e) = res {
                error!("Error in guide session: {}", e);
            }
        }
        if self.running {
            self.stop_system().await;
        }
        info!("Guide session stopped");
        Ok(())
    }

    async fn handle_event(&mut self, event: SessionEvent) -> GuideResult<()> {
        match event {
            SessionEvent::Command(command) => self.handle_command(command).await,
            SessionEvent::Frame { frame, done } => {
                let res = self.process_frame(frame).await;
                // capture loop may have stopped waiting
                _ = done.send(());
                res
            }
            SessionEvent::VoiceClip(audio) => {
                self.handle_voice_clip(audio).await;
                Ok(())
            }
            SessionEvent::MicrophoneFailed => {
                self.say(MICROPHONE_REQUIRED, Urgency::Sys).await;
                Ok(())
            }
            SessionEvent::Shutdown => Ok(()),
        }
    }

    pub async fn handle_command(&mut self, command: Command) -> GuideResult<()> {
        match command {
            Command::Intent(intent) => self.handle_intent(intent).await?,
            Command::ToggleEnvAlert => self.toggle_env_alert().await,
            Command::Facility(category) => {
                self.fetch_location(LocationQuery::Facility(category)).await
            }
            Command::UploadFile(path) => self.upload_file(&path).await?,
        }
        Ok(())
    }

    pub async fn handle_intent(&mut self, intent: Intent) -> GuideResult<()> {
        info!(%intent, "Handling intent");
        match intent {
            Intent::SystemStart => self.start_system().await,
            Intent::SystemStop => self.stop_system().await,
            Intent::ObjectGuide => self.manual_object_guide(),
            Intent::EnvDanger => self.fetch_env_danger(),
            Intent::EnvSafe => self.fetch_env_safe(),
            Intent::EnvMenu => self.show_menu(Menu::Environment).await,
            Intent::EnvAlertOff => self.set_env_alert(false).await,
            Intent::EnvAlertOn => self.set_env_alert(true).await,
            Intent::LocationMenu => self.show_menu(Menu::Location).await,
            Intent::LocationSummary => self.fetch_location(LocationQuery::Summary).await,
            Intent::LocationAddress => self.fetch_location(LocationQuery::Address).await,
            Intent::LocationLandmark => self.fetch_location(LocationQuery::Landmark).await,
            Intent::LocationFacility => self.show_menu(Menu::Facility).await,
            Intent::UploadImage => self.upload_current_frame().await?,
            Intent::RepeatLast => log_speech(self.narrator.repeat_last().await),
            Intent::TtsSlower => log_speech(self.narrator.change_rate(-1).await),
            Intent::TtsFaster => log_speech(self.narrator.change_rate(1).await),
            Intent::TtsReset => log_speech(self.narrator.reset_rate().await),
            Intent::UiBack => self.show_menu(Menu::Main).await,
            Intent::Unknown => self.say(PLEASE_REPEAT, Urgency::Sys).await,
        }
        Ok(())
    }

    pub async fn start_system(&mut self) {
        if !self.running {
            self.running = true;
            self.capture.send_replace(true);
        }
        self.board.set_status(STATUS_DETECTING);
        self.show_menu(Menu::Main).await;
        self.say(SYSTEM_STARTED, Urgency::Info).await;
    }

    pub async fn stop_system(&mut self) {
        self.running = false;
        self.capture.send_replace(false);
        self.show_menu(Menu::Main).await;
        self.board.clear();
        self.alert.reset();
        self.say(SYSTEM_STOPPED, Urgency::Info).await;
    }

    /// Realtime frame from the capture loop
    pub async fn process_frame(&mut self, frame: Vec<u8>) -> GuideResult<()> {
        if !self.running {
            trace!("Dropping frame, system stopped");
            return Ok(());
        }
        match self.backend.infer(frame, InferMode::Realtime).await {
            Ok(response) => self.handle_inference(response).await,
            Err(err) => {
                self.network_failure(err).await;
                Ok(())
            }
        }
    }

    async fn upload_file(&mut self, path: &Path) -> GuideResult<()> {
        let image = match tokio::fs::read(path).await {
            Ok(image) => image,
            Err(err) => {
                warn!("Failed to read image {:?}: {}", path, err);
                self.say(IMAGE_REQUIRED, Urgency::Sys).await;
                return Ok(());
            }
        };
        self.upload(image).await
    }

    async fn upload_current_frame(&mut self) -> GuideResult<()> {
        let image = match self.frames.grab().await {
            Ok(image) => image,
            Err(err) => {
                warn!("Failed to capture frame: {}", err);
                self.say(CAMERA_UNAVAILABLE, Urgency::Sys).await;
                return Ok(());
            }
        };
        self.upload(image).await
    }

    async fn upload(&mut self, image: Vec<u8>) -> GuideResult<()> {
        match self.backend.infer(image, InferMode::Upload).await {
            Ok(response) => self.handle_inference(response).await,
            Err(err) => {
                self.network_failure(err).await;
                Ok(())
            }
        }
    }

    async fn handle_inference(&mut self, response: InferenceResponse) -> GuideResult<()> {
        match response.warnings.first() {
            Some(first) => {
                self.board.set_objects(first);
                self.say(first, Urgency::Warn).await;
            }
            None => self.board.set_objects(NO_VALUE),
        }

        let signal = extract_hazard(&response.warnings, &self.settings.environment_keywords)
            .map(str::to_owned);
        self.board.set_environment(signal.as_deref().unwrap_or(NO_VALUE));
        self.board.set_alert(signal.as_deref().unwrap_or(NO_ALERT));
        self.process_environment(signal.as_deref()).await;

        if let Some(image) = response.image.as_deref() {
            self.save_annotated_image(image).await?;
        }
        Ok(())
    }

    async fn process_environment(&mut self, signal: Option<&str>) {
        let now = self.clock.now_ms();
        let (action, next) = decide(signal, now, std::mem::take(&mut self.alert));
        self.alert = next;
        match action {
            AlertAction::Announce(text) => {
                self.board.set_alert(&text);
                self.say(&text, Urgency::Warn).await;
            }
            AlertAction::Reset => info!("Environment hazard released"),
            AlertAction::None => (),
        }
    }

    async fn save_annotated_image(&self, image: &str) -> GuideResult<PathBuf> {
        let data = general_purpose::STANDARD.decode(image)?;
        tokio::fs::create_dir_all(&self.settings.annotated_image_dir).await?;
        let file_name = format!(
            "result-{}.jpg",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
        );
        let path = self.settings.annotated_image_dir.join(file_name);
        tokio::fs::write(&path, data).await?;
        info!("Saved annotated image to {:?}", path);
        Ok(path)
    }

    fn manual_object_guide(&mut self) {
        if self.begin_api_request() {
            let backend = self.backend.clone();
            self.spawn_request(async move {
                RequestOutcome::NearbyObjects(backend.nearby_objects().await)
            });
        }
    }

    fn fetch_env_danger(&mut self) {
        if self.begin_api_request() {
            let backend = self.backend.clone();
            self.spawn_request(async move {
                RequestOutcome::EnvDanger(backend.env_danger().await)
            });
        }
    }

    fn fetch_env_safe(&mut self) {
        if self.begin_api_request() {
            let backend = self.backend.clone();
            self.spawn_request(async move {
                RequestOutcome::EnvSafe(backend.env_safe().await)
            });
        }
    }

    fn begin_api_request(&mut self) -> bool {
        if self.api_busy {
            debug!("Backend request in flight, dropping command");
            return false;
        }
        self.api_busy = true;
        true
    }

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = RequestOutcome> + Send + 'static,
    {
        let outcomes = self.outcome_sender.clone();
        tokio::spawn(async move {
            if outcomes.send(request.await).await.is_err() {
                debug!("Session closed before request finished");
            }
        });
    }

    async fn apply_outcome(&mut self, outcome: RequestOutcome) {
        match outcome {
            RequestOutcome::NearbyObjects(response) => {
                self.api_busy = false;
                match response {
                    Ok(response) => {
                        let message = message_text(response);
                        self.board.set_objects(or_placeholder(&message));
                        self.board.set_alert(or_placeholder(&message));
                        self.say(&message, Urgency::Info).await;
                    }
                    Err(err) => self.network_failure(err).await,
                }
            }
            RequestOutcome::EnvDanger(response) => {
                self.api_busy = false;
                self.report_environment(response, Urgency::Warn).await;
            }
            RequestOutcome::EnvSafe(response) => {
                self.api_busy = false;
                self.report_environment(response, Urgency::Info).await;
            }
            RequestOutcome::Location(response) => {
                self.location_busy = false;
                match response {
                    Ok(response) => {
                        let message = message_text(response);
                        self.say(&message, Urgency::Info).await;
                    }
                    Err(err) => self.network_failure(err).await,
                }
            }
        }
    }

    async fn report_environment(
        &mut self,
        response: GuideResult<MessageResponse>,
        urgency: Urgency,
    ) {
        match response {
            Ok(response) => {
                let message = message_text(response);
                self.board.set_environment(or_placeholder(&message));
                self.board.set_alert(or_placeholder(&message));
                self.say(&message, urgency).await;
            }
            Err(err) => self.network_failure(err).await,
        }
    }

    async fn toggle_env_alert(&mut self) {
        let muted = self.alert.toggle_muted();
        info!(muted, "Environment alerts toggled");
        let notice = if muted { ALERTS_PAUSED } else { ALERTS_RESUMED };
        self.say(notice, Urgency::Sys).await;
        match self.backend.toggle_env_alerts().await {
            Ok(response) => debug!(enabled = response.enabled, "Backend environment alerts"),
            Err(err) => self.network_failure(err).await,
        }
    }

    async fn set_env_alert(&mut self, enabled: bool) {
        self.alert.set_muted(!enabled);
        info!(muted = !enabled, "Environment alerts set");
        let notice = if enabled { ALERTS_ON } else { ALERTS_OFF };
        self.say(notice, Urgency::Sys).await;
    }

    async fn fetch_location(&mut self, query: LocationQuery) {
        if self.location_busy {
            debug!("Location request in flight, dropping command");
            return;
        }
        let now = self.clock.now_ms();
        let position = match self.location.cached(now) {
            Some(position) => position,
            None => {
                self.say(LOCATING, Urgency::Sys).await;
                match self.location.refresh(now).await {
                    Ok(position) => position,
                    Err(err) => {
                        warn!("Failed to acquire position: {}", err);
                        self.say(LOCATION_FAILED, Urgency::Sys).await;
                        return;
                    }
                }
            }
        };
        self.location_busy = true;
        let backend = self.backend.clone();
        self.spawn_request(async move {
            RequestOutcome::Location(backend.identity(&query, position).await)
        });
    }

    pub async fn handle_voice_clip(&mut self, audio: Vec<u8>) {
        match self.backend.transcribe(audio).await {
            Ok(response) => {
                let intent = Intent::from_wire(response.intent.as_deref().unwrap_or_default());
                if let Err(err) = self.handle_intent(intent).await {
                    error!("Failed to handle voice command {}: {}", intent, err);
                }
            }
            Err(err) => self.network_failure(err).await,
        }
    }

    async fn show_menu(&mut self, menu: Menu) {
        debug!(?menu, "Showing menu");
        self.menu = menu;
        if let Some(prompt) = menu.prompt() {
            self.say(prompt, Urgency::Info).await;
        }
    }

    async fn network_failure(&mut self, err: GuideError) {
        warn!("Backend request failed: {}", err);
        self.say(NETWORK_UNSTABLE, Urgency::Sys).await;
    }

    async fn say(&mut self, text: &str, urgency: Urgency) {
        log_speech(self.narrator.speak(text, urgency).await);
    }

    pub fn alert_state(&self) -> &AlertState {
        &self.alert
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn menu(&self) -> Menu {
        self.menu
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

fn log_speech(result: GuideResult<bool>) {
    if let Err(err) = result {
        error!("Failed to narrate: {}", err);
    }
}

fn message_text(response: MessageResponse) -> String {
    response.message.unwrap_or_default()
}

fn or_placeholder(text: &str) -> &str {
    if text.is_empty() {
        NO_VALUE
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HealthResponse, SttResponse, ToggleResponse};
    use crate::camera::FrameSource;
    use crate::clock::ManualClock;
    use crate::location::{Coordinates, FixedLocationProvider};
    use crate::narration::testing::{spoken_texts, RecordingSpeechEngine, SpokenLog};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempdir::TempDir;

    const STAIRS: &str = "stairs environment detected. Please be cautious.";
    const BICYCLE: &str = "왼쪽에서 자전거가 다가옵니다";
    const NEARBY_OBJECTS: &str = "Nearby objects detected: 사람 1persons";
    const SEOUL: Coordinates = Coordinates {
        lat: 37.5665,
        lng: 126.978,
    };

    #[derive(Default)]
    struct FakeBackend {
        inferences: Mutex<VecDeque<InferenceResponse>>,
        infer_modes: Mutex<Vec<InferMode>>,
        offline: AtomicBool,
        intent: Mutex<Option<String>>,
        identity_calls: Mutex<Vec<(LocationQuery, Coordinates)>>,
        toggles: AtomicUsize,
        danger_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn queue_warnings(&self, warnings: &[&str]) {
            self.inferences.lock().unwrap().push_back(InferenceResponse {
                warnings: warnings.iter().map(|w| w.to_string()).collect(),
                ..Default::default()
            });
        }

        fn check(&self) -> GuideResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(GuideError::BackendStatus {
                    endpoint: "/api/test".to_owned(),
                    status: 503,
                });
            }
            Ok(())
        }
    }

    fn message(text: &str) -> GuideResult<MessageResponse> {
        Ok(MessageResponse {
            message: Some(text.to_owned()),
        })
    }

    #[async_trait]
    impl GuideBackend for FakeBackend {
        async fn infer(&self, _frame: Vec<u8>, mode: InferMode) -> GuideResult<InferenceResponse> {
            self.check()?;
            self.infer_modes.lock().unwrap().push(mode);
            Ok(self
                .inferences
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn transcribe(&self, _audio: Vec<u8>) -> GuideResult<SttResponse> {
            self.check()?;
            Ok(SttResponse {
                intent: self.intent.lock().unwrap().clone(),
                ..Default::default()
            })
        }

        async fn identity(
            &self,
            query: &LocationQuery,
            position: Coordinates,
        ) -> GuideResult<MessageResponse> {
            self.check()?;
            self.identity_calls.lock().unwrap().push((*query, position));
            message(&format!("{} 결과", query.endpoint()))
        }

        async fn nearby_objects(&self) -> GuideResult<MessageResponse> {
            self.check()?;
            message(NEARBY_OBJECTS)
        }

        async fn env_danger(&self) -> GuideResult<MessageResponse> {
            self.check()?;
            self.danger_calls.fetch_add(1, Ordering::SeqCst);
            message("계단 detected front.")
        }

        async fn env_safe(&self) -> GuideResult<MessageResponse> {
            self.check()?;
            Ok(MessageResponse::default())
        }

        async fn toggle_env_alerts(&self) -> GuideResult<ToggleResponse> {
            self.check()?;
            self.toggles.fetch_add(1, Ordering::SeqCst);
            Ok(ToggleResponse {
                enabled: false,
                message: None,
            })
        }

        async fn health(&self) -> GuideResult<HealthResponse> {
            Ok(HealthResponse {
                status: "ok".to_owned(),
                message: None,
            })
        }
    }

    struct FixedFrame;

    impl FrameSource for FixedFrame {
        fn capture(&mut self) -> GuideResult<Vec<u8>> {
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }
    }

    struct Harness {
        session: GuideSession,
        backend: Arc<FakeBackend>,
        clock: Arc<ManualClock>,
        spoken: SpokenLog,
        capture: watch::Receiver<bool>,
        temp_dir: TempDir,
    }

    fn harness_with_position(position: Option<Coordinates>) -> Harness {
        let temp_dir = TempDir::new("walk_guide_session").unwrap();
        let backend = Arc::new(FakeBackend::default());
        let clock = Arc::new(ManualClock::default());
        clock.set(1_000_000);
        let engine = RecordingSpeechEngine::default();
        let spoken = engine.spoken.clone();
        let narrator = Narrator::new(Box::new(engine), clock.clone());
        let location = LocationCache::new(Box::new(FixedLocationProvider::new(position)), 30_000);
        let (capture_sender, capture) = watch::channel(false);
        let settings = SessionSettings {
            environment_keywords: vec!["환경".to_owned(), "environment".to_owned()],
            annotated_image_dir: temp_dir.path().join("results"),
        };
        let session = GuideSession::new(
            settings,
            backend.clone(),
            narrator,
            clock.clone(),
            SharedFrameSource::new(Box::new(FixedFrame)),
            location,
            capture_sender,
        );
        Harness {
            session,
            backend,
            clock,
            spoken,
            capture,
            temp_dir,
        }
    }

    fn harness() -> Harness {
        harness_with_position(Some(SEOUL))
    }

    /// Waits for the next spawned request and applies its reply
    async fn settle(session: &mut GuideSession) {
        let outcome = session.outcomes.recv().await.unwrap();
        session.apply_outcome(outcome).await;
    }

    fn count(spoken: &SpokenLog, text: &str) -> usize {
        spoken_texts(spoken).iter().filter(|t| *t == text).count()
    }

    #[tokio::test]
    async fn start_and_stop_system() {
        let mut h = harness();
        h.session.start_system().await;
        assert!(h.session.is_running());
        assert!(*h.capture.borrow());
        assert_eq!(h.session.board().status, STATUS_DETECTING);

        h.backend.queue_warnings(&[STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();
        assert!(!h.session.alert_state().is_idle());

        h.session.stop_system().await;
        assert!(!h.session.is_running());
        assert!(!*h.capture.borrow());
        assert_eq!(h.session.board(), &StatusBoard::default());
        assert_eq!(h.session.alert_state(), &AlertState::default());
        assert_eq!(
            spoken_texts(&h.spoken),
            vec![SYSTEM_STARTED, STAIRS, SYSTEM_STOPPED]
        );
    }

    #[tokio::test]
    async fn frames_are_dropped_while_stopped() {
        let mut h = harness();
        h.session.process_frame(vec![1]).await.unwrap();
        assert!(h.backend.infer_modes.lock().unwrap().is_empty());
        assert!(spoken_texts(&h.spoken).is_empty());
    }

    #[tokio::test]
    async fn persisting_hazard_is_not_repeated() {
        let mut h = harness();
        h.session.start_system().await;

        h.backend.queue_warnings(&[STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();
        assert_eq!(h.session.board().alert, STAIRS);
        assert_eq!(h.session.board().environment, STAIRS);

        // past the narration cooldown but inside the repeat window
        h.clock.advance(6_000);
        h.backend.queue_warnings(&[BICYCLE, STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();
        assert_eq!(h.session.board().objects, BICYCLE);
        assert_eq!(count(&h.spoken, STAIRS), 1);
        assert_eq!(count(&h.spoken, BICYCLE), 1);

        h.clock.advance(25_000);
        h.backend.queue_warnings(&[BICYCLE, STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();
        assert_eq!(count(&h.spoken, STAIRS), 2);
    }

    #[tokio::test]
    async fn hazard_released_after_absence() {
        let mut h = harness();
        h.session.start_system().await;
        h.backend.queue_warnings(&[STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();

        h.clock.advance(1_000);
        h.session.process_frame(vec![1]).await.unwrap();
        assert!(!h.session.alert_state().is_idle());
        assert_eq!(h.session.board().alert, NO_ALERT);
        assert_eq!(h.session.board().objects, NO_VALUE);

        h.clock.advance(25_000);
        h.session.process_frame(vec![1]).await.unwrap();
        assert!(h.session.alert_state().is_idle());
    }

    #[tokio::test]
    async fn toggled_mute_silences_repeats() {
        let mut h = harness();
        h.session.start_system().await;
        h.backend.queue_warnings(&[BICYCLE, STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();

        h.session
            .handle_command(Command::ToggleEnvAlert)
            .await
            .unwrap();
        assert!(h.session.alert_state().muted);
        assert_eq!(h.backend.toggles.load(Ordering::SeqCst), 1);
        assert_eq!(count(&h.spoken, ALERTS_PAUSED), 1);

        h.clock.advance(40_000);
        h.backend.queue_warnings(&[BICYCLE, STAIRS]);
        h.session.process_frame(vec![1]).await.unwrap();
        assert_eq!(count(&h.spoken, STAIRS), 1);

        h.session
            .handle_intent(Intent::EnvAlertOn)
            .await
            .unwrap();
        assert!(!h.session.alert_state().muted);
        assert_eq!(count(&h.spoken, ALERTS_ON), 1);
    }

    #[tokio::test]
    async fn network_failure_is_announced_once() {
        let mut h = harness();
        h.session.start_system().await;
        h.backend.offline.store(true, Ordering::SeqCst);

        h.session.process_frame(vec![1]).await.unwrap();
        h.clock.advance(900);
        h.session.process_frame(vec![1]).await.unwrap();

        assert_eq!(count(&h.spoken, NETWORK_UNSTABLE), 1);
        assert!(h.session.alert_state().is_idle());
    }

    #[tokio::test]
    async fn voice_commands_are_routed() {
        let mut h = harness();
        *h.backend.intent.lock().unwrap() = Some("tts_slow".to_owned());
        h.session.handle_voice_clip(vec![0; 16]).await;
        assert_eq!(
            spoken_texts(&h.spoken).last().map(String::as_str),
            Some("말하는 속도를 1.0배로 조정했습니다.")
        );

        *h.backend.intent.lock().unwrap() = None;
        h.session.handle_voice_clip(vec![0; 16]).await;
        assert_eq!(count(&h.spoken, PLEASE_REPEAT), 1);

        *h.backend.intent.lock().unwrap() = Some("location_menu".to_owned());
        h.session.handle_voice_clip(vec![0; 16]).await;
        assert_eq!(h.session.menu(), Menu::Location);
    }

    #[tokio::test]
    async fn location_is_cached() {
        let mut h = harness();
        h.session
            .handle_intent(Intent::LocationSummary)
            .await
            .unwrap();
        settle(&mut h.session).await;
        h.clock.advance(10_000);
        h.session
            .handle_command(Command::Facility(FacilityCategory::Pharmacy))
            .await
            .unwrap();
        settle(&mut h.session).await;

        assert_eq!(count(&h.spoken, LOCATING), 1);
        assert_eq!(
            *h.backend.identity_calls.lock().unwrap(),
            vec![
                (LocationQuery::Summary, SEOUL),
                (
                    LocationQuery::Facility(FacilityCategory::Pharmacy),
                    SEOUL
                )
            ]
        );
        assert_eq!(count(&h.spoken, "/api/identity/summary 결과"), 1);

        h.clock.advance(30_000);
        h.session
            .handle_intent(Intent::LocationAddress)
            .await
            .unwrap();
        settle(&mut h.session).await;
        assert_eq!(count(&h.spoken, LOCATING), 2);
    }

    #[tokio::test]
    async fn missing_location_is_reported() {
        let mut h = harness_with_position(None);
        h.session
            .handle_intent(Intent::LocationLandmark)
            .await
            .unwrap();
        assert_eq!(spoken_texts(&h.spoken), vec![LOCATING, LOCATION_FAILED]);
        assert!(h.backend.identity_calls.lock().unwrap().is_empty());

        h.session
            .handle_intent(Intent::LocationLandmark)
            .await
            .unwrap();
        assert_eq!(count(&h.spoken, LOCATION_FAILED), 2);
    }

    #[tokio::test]
    async fn location_query_in_flight_drops_new_ones() {
        let mut h = harness();
        h.session
            .handle_intent(Intent::LocationSummary)
            .await
            .unwrap();
        h.session
            .handle_intent(Intent::LocationAddress)
            .await
            .unwrap();
        settle(&mut h.session).await;

        assert!(h.session.outcomes.try_recv().is_err());
        assert_eq!(
            *h.backend.identity_calls.lock().unwrap(),
            vec![(LocationQuery::Summary, SEOUL)]
        );

        h.session
            .handle_intent(Intent::LocationAddress)
            .await
            .unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.backend.identity_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn manual_queries_update_board() {
        let mut h = harness();
        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.session.board().environment, "계단 detected front.");
        assert_eq!(h.spoken.lock().unwrap()[0].urgency, Urgency::Warn);

        h.session.handle_intent(Intent::EnvSafe).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.session.board().environment, NO_VALUE);

        h.session.handle_intent(Intent::ObjectGuide).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.session.board().objects, NEARBY_OBJECTS);
    }

    #[tokio::test]
    async fn manual_query_in_flight_drops_new_ones() {
        let mut h = harness();
        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        h.session.handle_intent(Intent::ObjectGuide).await.unwrap();
        h.session.handle_intent(Intent::EnvSafe).await.unwrap();
        settle(&mut h.session).await;

        assert!(h.session.outcomes.try_recv().is_err());
        assert_eq!(h.backend.danger_calls.load(Ordering::SeqCst), 1);
        assert_eq!(spoken_texts(&h.spoken), vec!["계단 detected front."]);
        assert_eq!(h.session.board().objects, NO_VALUE);

        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.backend.danger_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manual_query_failure_frees_the_slot() {
        let mut h = harness();
        h.backend.offline.store(true, Ordering::SeqCst);
        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(spoken_texts(&h.spoken), vec![NETWORK_UNSTABLE]);

        h.backend.offline.store(false, Ordering::SeqCst);
        h.session.handle_intent(Intent::EnvDanger).await.unwrap();
        settle(&mut h.session).await;
        assert_eq!(h.backend.danger_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.board().environment, "계단 detected front.");
    }

    #[tokio::test]
    async fn upload_saves_annotated_image() {
        let mut h = harness();
        h.backend
            .inferences
            .lock()
            .unwrap()
            .push_back(InferenceResponse {
                image: Some(general_purpose::STANDARD.encode([1u8, 2, 3])),
                ..Default::default()
            });

        h.session
            .handle_intent(Intent::UploadImage)
            .await
            .unwrap();
        assert_eq!(
            *h.backend.infer_modes.lock().unwrap(),
            vec![InferMode::Upload]
        );

        let saved: Vec<_> = std::fs::read_dir(h.temp_dir.path().join("results"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unreadable_upload_file() {
        let mut h = harness();
        h.session
            .handle_command(Command::UploadFile(PathBuf::from(
                "/nonexistent/walk_guide/photo.jpg",
            )))
            .await
            .unwrap();
        assert_eq!(spoken_texts(&h.spoken), vec![IMAGE_REQUIRED]);
        assert!(h.backend.infer_modes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn menus_and_back() {
        let mut h = harness();
        h.session.handle_intent(Intent::EnvMenu).await.unwrap();
        assert_eq!(h.session.menu(), Menu::Environment);
        h.session
            .handle_intent(Intent::LocationFacility)
            .await
            .unwrap();
        assert_eq!(h.session.menu(), Menu::Facility);
        h.session.handle_intent(Intent::UiBack).await.unwrap();
        assert_eq!(h.session.menu(), Menu::Main);
        assert_eq!(
            spoken_texts(&h.spoken),
            vec![
                Menu::Environment.prompt().unwrap(),
                Menu::Facility.prompt().unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn event_loop_processes_frames_and_shuts_down() {
        let h = harness();
        let backend = h.backend.clone();
        let capture = h.capture.clone();
        let spoken = h.spoken.clone();
        let (sender, receiver) = mpsc::channel(8);
        let task = tokio::spawn(h.session.run(receiver));

        sender
            .send(SessionEvent::Command(Command::Intent(Intent::SystemStart)))
            .await
            .unwrap();
        backend.queue_warnings(&[STAIRS]);
        let (done, processed) = oneshot::channel();
        sender
            .send(SessionEvent::Frame {
                frame: vec![1],
                done,
            })
            .await
            .unwrap();
        processed.await.unwrap();
        assert_eq!(
            *backend.infer_modes.lock().unwrap(),
            vec![InferMode::Realtime]
        );
        assert!(*capture.borrow());

        sender
            .send(SessionEvent::Command(Command::Intent(Intent::ObjectGuide)))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while count(&spoken, NEARBY_OBJECTS) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        sender.send(SessionEvent::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
        assert!(!*capture.borrow());
    }
}
