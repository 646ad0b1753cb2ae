use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    GeminiClient, GuardedHttpClient, HtmlFileExporter, TerminalSpeechEngine, TomlConfigStore,
};
use crate::app::{GenerationOrchestrator, SourceAcquirer, SpeechPacer};
use crate::domain::{
    AppConfig, ArtifactKind, ArtifactSession, DomainError, GenerationEvent, SanitizedArtifact,
    SourceInput, SpeechEvent, SpeechState,
};
use crate::infrastructure::init_logging;
use crate::ports::{ArtifactExporter, ConfigStore, HttpClient};

type Orchestrator = GenerationOrchestrator<GeminiClient<GuardedHttpClient>>;

/// Wires the adapters to the services and owns the user-facing error.
pub struct AppController {
    config: RwLock<AppConfig>,
    config_store: Arc<TomlConfigStore>,
    http: Arc<GuardedHttpClient>,
    acquirer: SourceAcquirer<GuardedHttpClient>,
    /// `None` until an API key is configured.
    orchestrator: Option<Orchestrator>,
    pacer: SpeechPacer<TerminalSpeechEngine>,
    last_error: RwLock<Option<String>>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Load configuration, start logging and build the services.
    ///
    /// `config_dir` overrides the OS config directory. Must be called inside
    /// a Tokio runtime.
    pub fn new(config_dir: Option<PathBuf>) -> Result<Self, DomainError> {
        let config_store = Arc::new(match config_dir {
            Some(dir) => TomlConfigStore::with_data_dir(dir)?,
            None => TomlConfigStore::new()?,
        });
        let config = config_store.load()?;

        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
            config.logging.max_files,
        )?;
        info!("Cogni-Flow starting up");

        let http = Arc::new(GuardedHttpClient::new(&config.network)?);
        let acquirer = SourceAcquirer::new(Arc::clone(&http), &config.source);

        let orchestrator = match config.model.resolve_api_key() {
            Ok(key) => Some(GenerationOrchestrator::from_config(
                Arc::new(GeminiClient::new(Arc::clone(&http), key)),
                &config.model,
                &config.generation,
            )),
            Err(e) => {
                warn!(error = %e, "Generation unavailable");
                None
            }
        };

        // Paced faster than the fallback estimate so real end events arrive first.
        let engine = Arc::new(TerminalSpeechEngine::new(config.speech.fallback_ms_per_char / 2));
        let pacer = SpeechPacer::new(engine, config.speech.clone())?;

        info!(
            offline = config.network.offline,
            endpoints = config.model.endpoints.len(),
            generation_ready = orchestrator.is_some(),
            "AppController initialized"
        );

        Ok(Self {
            config: RwLock::new(config),
            config_store,
            http,
            acquirer,
            orchestrator,
            pacer,
            last_error: RwLock::new(None),
            _log_guard: log_guard,
        })
    }

    // ---- configuration ----

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Persist `config`. Offline mode applies immediately; other settings
    /// take effect on the next start.
    pub fn update_config(&self, config: AppConfig) -> Result<(), DomainError> {
        self.http.set_offline(config.network.offline);
        self.config_store.save(&config)?;
        *self.config.write() = config;
        info!("Configuration updated");
        Ok(())
    }

    pub fn is_network_blocked(&self) -> bool {
        self.http.is_network_blocked()
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_store.config_path()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config_store.logs_dir()
    }

    // ---- generation ----

    fn orchestrator(&self) -> Result<&Orchestrator, DomainError> {
        match &self.orchestrator {
            Some(orchestrator) => Ok(orchestrator),
            None => Err(self
                .config
                .read()
                .model
                .resolve_api_key()
                .err()
                .unwrap_or_else(|| {
                    DomainError::Config("API key changed; restart to use it".to_string())
                })),
        }
    }

    /// Resolve `input` and generate every artifact from it.
    ///
    /// Reading aloud is stopped first since the notes are about to change.
    pub async fn generate(&self, input: &SourceInput) -> Result<ArtifactSession, DomainError> {
        let result: Result<ArtifactSession, DomainError> = async {
            let orchestrator = self.orchestrator()?;
            if orchestrator.is_running() {
                return Err(DomainError::GenerationInProgress);
            }
            let document = self.acquirer.acquire(input).await?;
            self.pacer.stop();
            orchestrator.generate(&document).await?;
            Ok(orchestrator.session())
        }
        .await;

        self.track(result)
    }

    pub fn subscribe_generation(&self) -> Result<broadcast::Receiver<GenerationEvent>, DomainError> {
        Ok(self.orchestrator()?.subscribe())
    }

    pub fn cancel_generation(&self) {
        if let Some(orchestrator) = &self.orchestrator {
            orchestrator.cancel();
        }
    }

    pub fn session(&self) -> ArtifactSession {
        self.orchestrator
            .as_ref()
            .map(Orchestrator::session)
            .unwrap_or_default()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Result<SanitizedArtifact, DomainError> {
        self.session()
            .get(kind)
            .cloned()
            .ok_or(DomainError::ArtifactMissing(kind))
    }

    /// Switch the visible artifact. Leaving the current view ends read-aloud.
    pub fn select_view(&self, kind: ArtifactKind) -> Result<(), DomainError> {
        let result = self.orchestrator().and_then(|o| o.select_view(kind));
        if result.is_ok() {
            self.pacer.stop();
        }
        self.track(result)
    }

    /// Write every generated artifact to `dir`, the configured export
    /// directory, or the store default, in that order of preference.
    pub fn export_all(&self, dir: Option<&Path>) -> Result<Vec<PathBuf>, DomainError> {
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| self.config.read().output.export_dir.clone())
            .unwrap_or_else(|| self.config_store.default_export_dir());
        let exporter = HtmlFileExporter::new(dir);

        let session = self.session();
        let result = session
            .artifacts()
            .map(|artifact| exporter.export(artifact))
            .collect::<Result<Vec<_>, _>>();
        self.track(result)
    }

    // ---- read-aloud ----

    pub fn subscribe_speech(&self) -> broadcast::Receiver<SpeechEvent> {
        self.pacer.subscribe()
    }

    pub fn speech_state(&self) -> SpeechState {
        self.pacer.state()
    }

    /// Read the generated notes aloud from the start.
    pub fn read_notes(&self) -> Result<(), DomainError> {
        let result = self
            .session()
            .get(ArtifactKind::Notes)
            .ok_or(DomainError::NoContent)
            .and_then(|notes| self.pacer.play(notes.safe_markup()));
        self.track(result)
    }

    /// Read arbitrary notes markup, e.g. a previously exported file.
    pub fn read_markup(&self, markup: &str) -> Result<(), DomainError> {
        let result = self.pacer.play(markup);
        self.track(result)
    }

    /// The single play button.
    pub fn toggle_speech(&self) -> Result<SpeechState, DomainError> {
        let notes = self
            .session()
            .get(ArtifactKind::Notes)
            .map(|n| n.safe_markup().to_string())
            .unwrap_or_default();
        let result = self.pacer.toggle(&notes);
        self.track(result)
    }

    pub fn pause_speech(&self) -> Result<(), DomainError> {
        self.track(self.pacer.pause())
    }

    pub fn resume_speech(&self) -> Result<(), DomainError> {
        self.track(self.pacer.resume())
    }

    pub fn stop_speech(&self) {
        self.pacer.stop();
    }

    pub fn rewind_speech(&self) -> Result<(), DomainError> {
        self.track(self.pacer.rewind())
    }

    pub fn skip_speech(&self) -> Result<(), DomainError> {
        self.track(self.pacer.skip())
    }

    pub fn set_speech_rate(&self, rate: f32) -> Result<f32, DomainError> {
        self.track(self.pacer.set_rate(rate))
    }

    pub fn speech_rate(&self) -> f32 {
        self.pacer.rate()
    }

    // ---- error surface ----

    /// The message currently shown to the user, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn dismiss_error(&self) {
        self.last_error.write().take();
    }

    fn track<T>(&self, result: Result<T, DomainError>) -> Result<T, DomainError> {
        if let Err(e) = &result {
            report_error(&self.last_error, e);
        }
        result
    }
}

/// Replace the displayed error; errors never stack.
fn report_error(slot: &RwLock<Option<String>>, error: &DomainError) {
    warn!(error = %error, input_error = error.is_input_error(), "Reporting error to user");
    *slot.write() = Some(error.user_message());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NOTES_HTML: &str = "<h2>Cell biology</h2><p>Cells are the basic unit of life and every organism is built from them.</p><p>Mitochondria release energy from food.</p>";

    /// Controller whose model endpoint is `server`, with no delay between
    /// kinds and a slow enough terminal voice to stop mid-sentence.
    fn controller_for(server: &MockServer, dir: &tempfile::TempDir) -> AppController {
        std::fs::write(
            dir.path().join("config.toml"),
            format!(
                "[logging]\nfile_logging = false\n\n\
                 [model]\nbase_url = \"{}\"\nendpoints = [\"test-model\"]\n\
                 api_key = \"test-key\"\napi_key_env = \"COGNIFLOW_TEST_UNSET_KEY_VAR\"\n\n\
                 [generation]\nkind_delay_ms = 0\n\n\
                 [speech]\nfallback_ms_per_char = 20\nfallback_slack_ms = 0\n",
                server.uri()
            ),
        )
        .unwrap();
        AppController::new(Some(dir.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_new_error_replaces_previous() {
        let slot = RwLock::new(None);
        report_error(
            &slot,
            &DomainError::UrlFetch {
                url: "https://example.com".to_string(),
            },
        );
        report_error(&slot, &DomainError::NoContent);

        let shown = slot.read().clone().unwrap();
        assert_eq!(shown, "No content to read. Generate some notes first!");
    }

    #[test]
    fn test_input_error_message_is_actionable() {
        let slot = RwLock::new(None);
        report_error(
            &slot,
            &DomainError::InsufficientContent {
                actual: 3,
                minimum: 50,
            },
        );
        assert!(slot.read().as_deref().unwrap().contains("at least 50"));
    }

    #[tokio::test]
    async fn test_controller_with_temp_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[logging]\nfile_logging = false\n\n[network]\noffline = true\n\n[model]\napi_key_env = \"COGNIFLOW_TEST_UNSET_KEY_VAR\"\n",
        )
        .unwrap();

        let controller = AppController::new(Some(dir.path().to_path_buf())).unwrap();
        assert!(controller.is_network_blocked());
        assert_eq!(controller.speech_state(), SpeechState::Idle);

        // Generation needs a key; the error lands on the error surface.
        let err = controller
            .generate(&SourceInput::Pasted("x".repeat(80)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
        assert!(controller.last_error().unwrap().contains("COGNIFLOW_TEST_UNSET_KEY_VAR"));

        controller.dismiss_error();
        assert!(controller.last_error().is_none());

        assert!(matches!(controller.read_notes(), Err(DomainError::NoContent)));
        assert!(matches!(
            controller.artifact(ArtifactKind::Quiz),
            Err(DomainError::ArtifactMissing(ArtifactKind::Quiz))
        ));

        controller.read_markup("<p>Hello there.</p><p>Bye.</p>").unwrap();
        assert_eq!(controller.speech_state(), SpeechState::Playing);
        controller.stop_speech();
        assert_eq!(controller.speech_state(), SpeechState::Idle);

        let mut config = controller.config();
        config.network.offline = false;
        controller.update_config(config).unwrap();
        assert!(!controller.is_network_blocked());
        assert!(std::fs::read_to_string(controller.config_path())
            .unwrap()
            .contains("offline = false"));
    }

    #[tokio::test]
    async fn test_view_change_stops_read_aloud() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": NOTES_HTML}]}}]
            })))
            .mount(&server)
            .await;
        let dir = tempfile::TempDir::new().unwrap();
        let controller = controller_for(&server, &dir);

        let source = "Cells are the basic unit of life. ".repeat(4);
        let session = controller.generate(&SourceInput::Pasted(source)).await.unwrap();
        assert_eq!(session.active_view(), Some(ArtifactKind::Notes));

        let mut events = controller.subscribe_speech();
        controller.read_notes().unwrap();
        assert_eq!(controller.speech_state(), SpeechState::Playing);

        controller.select_view(ArtifactKind::Quiz).unwrap();
        assert_eq!(controller.speech_state(), SpeechState::Idle);
        assert_eq!(controller.session().active_view(), Some(ArtifactKind::Quiz));

        // Outlast the first sentence and its fallback timer.
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mut sentences_started = 0;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SpeechEvent::Completed), "stopped session completed");
            if matches!(event, SpeechEvent::SentenceStarted { .. }) {
                sentences_started += 1;
            }
        }
        assert_eq!(sentences_started, 1);
        assert_eq!(controller.speech_state(), SpeechState::Idle);
    }
}
