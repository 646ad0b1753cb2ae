use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::domain::config::{GenerationConfig, ModelConfig};
use crate::domain::response::sanitize;
use crate::domain::{
    ArtifactKind, ArtifactSession, DomainError, GenerationEvent, GenerationRequest, ModelEndpoint,
    SamplingConfig, SanitizedArtifact, SourceDocument,
};
use crate::ports::CompletionClient;

/// Acceptance gates and pacing for one run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationPolicy {
    pub min_raw_chars: usize,
    pub min_clean_chars: usize,
    pub kind_delay: Duration,
}

impl From<&GenerationConfig> for GenerationPolicy {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            min_raw_chars: config.min_raw_chars,
            min_clean_chars: config.min_clean_chars,
            kind_delay: Duration::from_millis(config.kind_delay_ms),
        }
    }
}

/// Clears the running flag however the run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Produces the four study artifacts from a source document.
///
/// Kinds are generated one after another in [`ArtifactKind::ALL`] order.
/// Within a kind, endpoints are tried in priority order and the first
/// acceptable response wins. If every endpoint fails for a kind the run
/// stops there; artifacts stored earlier in the run stay available.
pub struct GenerationOrchestrator<C: CompletionClient> {
    client: Arc<C>,
    endpoints: Vec<ModelEndpoint>,
    sampling: SamplingConfig,
    policy: GenerationPolicy,
    session: RwLock<ArtifactSession>,
    running: AtomicBool,
    cancelled: AtomicBool,
    events: broadcast::Sender<GenerationEvent>,
}

impl<C: CompletionClient> GenerationOrchestrator<C> {
    pub fn new(
        client: Arc<C>,
        endpoints: Vec<ModelEndpoint>,
        sampling: SamplingConfig,
        policy: GenerationPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client,
            endpoints,
            sampling,
            policy,
            session: RwLock::new(ArtifactSession::new()),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            events,
        }
    }

    pub fn from_config(client: Arc<C>, model: &ModelConfig, generation: &GenerationConfig) -> Self {
        Self::new(
            client,
            model.model_endpoints(),
            model.sampling(),
            GenerationPolicy::from(generation),
        )
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the stored artifacts and the active view.
    pub fn session(&self) -> ArtifactSession {
        self.session.read().clone()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<SanitizedArtifact> {
        self.session.read().get(kind).cloned()
    }

    /// Switch the active view to an artifact that has been generated.
    pub fn select_view(&self, kind: ArtifactKind) -> Result<(), DomainError> {
        let mut session = self.session.write();
        if session.get(kind).is_none() {
            return Err(DomainError::ArtifactMissing(kind));
        }
        session.select(kind);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the current run before its next artifact kind starts.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Generation cancel requested");
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Generate every artifact kind for `source`.
    ///
    /// The previous session is discarded when the run starts.
    pub async fn generate(&self, source: &SourceDocument) -> Result<(), DomainError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DomainError::GenerationInProgress);
        }
        let _guard = RunGuard(&self.running);
        self.cancelled.store(false, Ordering::SeqCst);

        if self.endpoints.is_empty() {
            return Err(DomainError::NoEndpoints);
        }

        *self.session.write() = ArtifactSession::new();
        info!(
            source_chars = source.char_len(),
            endpoints = self.endpoints.len(),
            "Generation run started"
        );
        self.emit(GenerationEvent::RunStarted {
            source_chars: source.char_len(),
        });

        let last = ArtifactKind::ALL.len() - 1;
        for (position, kind) in ArtifactKind::ALL.into_iter().enumerate() {
            if self.cancelled.swap(false, Ordering::SeqCst) {
                info!(kind = %kind, "Generation cancelled");
                self.emit(GenerationEvent::Cancelled { kind });
                return Err(DomainError::GenerationCancelled { kind });
            }

            self.emit(GenerationEvent::KindStarted {
                kind,
                message: kind.progress_message().to_string(),
            });

            let request = GenerationRequest::new(kind, source);
            match self.try_endpoints(&request).await {
                Ok(artifact) => {
                    info!(
                        kind = %kind,
                        endpoint = artifact.endpoint(),
                        chars = artifact.char_len(),
                        "Artifact generated"
                    );
                    self.emit(GenerationEvent::KindCompleted {
                        kind,
                        endpoint: artifact.endpoint().to_string(),
                        chars: artifact.char_len(),
                    });
                    self.session.write().store(artifact);
                }
                Err(cause) => {
                    error!(kind = %kind, error = %cause, "All endpoints failed");
                    self.emit(GenerationEvent::RunFailed {
                        kind,
                        reason: cause.to_string(),
                    });
                    return Err(DomainError::Generation {
                        kind,
                        cause: Box::new(cause),
                    });
                }
            }

            if position < last && !self.policy.kind_delay.is_zero() {
                tokio::time::sleep(self.policy.kind_delay).await;
            }
        }

        self.session.write().select(ArtifactKind::Notes);
        info!("Generation run completed");
        self.emit(GenerationEvent::RunCompleted);
        Ok(())
    }

    /// First acceptable artifact across the endpoints, or the last failure.
    async fn try_endpoints(
        &self,
        request: &GenerationRequest,
    ) -> Result<SanitizedArtifact, DomainError> {
        let total = self.endpoints.len();
        let mut last_error = DomainError::NoEndpoints;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let attempt = index + 1;
            debug!(kind = %request.kind, endpoint = %endpoint.name, attempt, total, "Trying endpoint");
            self.emit(GenerationEvent::EndpointAttempt {
                kind: request.kind,
                attempt,
                total,
                endpoint: endpoint.name.clone(),
            });

            match self.attempt(endpoint, request).await {
                Ok(markup) => {
                    return Ok(SanitizedArtifact::new(request.kind, markup, endpoint.name.clone()))
                }
                Err(e) => {
                    warn!(
                        kind = %request.kind,
                        endpoint = %endpoint.name,
                        attempt,
                        error = %e,
                        "Endpoint failed"
                    );
                    self.emit(GenerationEvent::EndpointFailed {
                        kind: request.kind,
                        attempt,
                        endpoint: endpoint.name.clone(),
                        reason: e.to_string(),
                    });
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// One call to one endpoint, gated before and after sanitizing.
    async fn attempt(
        &self,
        endpoint: &ModelEndpoint,
        request: &GenerationRequest,
    ) -> Result<String, DomainError> {
        let raw = self.client.complete(endpoint, request, &self.sampling).await?;
        let raw_chars = raw.chars().count();
        if raw_chars < self.policy.min_raw_chars {
            return Err(DomainError::ResponseTooShort {
                stage: "Raw",
                actual: raw_chars,
                minimum: self.policy.min_raw_chars,
            });
        }

        let clean = sanitize(&raw);
        let clean_chars = clean.chars().count();
        if clean_chars < self.policy.min_clean_chars {
            return Err(DomainError::ResponseTooShort {
                stage: "Sanitized",
                actual: clean_chars,
                minimum: self.policy.min_clean_chars,
            });
        }
        Ok(clean)
    }

    fn emit(&self, event: GenerationEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::MAX_SOURCE_CHARS;
    use crate::domain::SourceOrigin;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    type Responder =
        Box<dyn Fn(&ModelEndpoint, &GenerationRequest) -> Result<String, DomainError> + Send + Sync>;

    /// Completion client answering from a closure and logging every call.
    struct MockCompletion {
        respond: Responder,
        calls: Mutex<Vec<(String, ArtifactKind)>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockCompletion {
        fn new(
            respond: impl Fn(&ModelEndpoint, &GenerationRequest) -> Result<String, DomainError>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                calls: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, ArtifactKind)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompletion {
        async fn complete(
            &self,
            endpoint: &ModelEndpoint,
            request: &GenerationRequest,
            _sampling: &SamplingConfig,
        ) -> Result<String, DomainError> {
            self.calls.lock().push((endpoint.name.clone(), request.kind));
            self.prompts.lock().push(request.prompt.clone());
            (self.respond)(endpoint, request)
        }
    }

    fn good_markup(kind: ArtifactKind) -> String {
        format!(
            "<h2>{}</h2><p>{}</p>",
            kind,
            "Rivers shape landscapes through erosion. ".repeat(4)
        )
    }

    fn endpoints() -> Vec<ModelEndpoint> {
        ["A", "B", "C"]
            .into_iter()
            .map(|name| ModelEndpoint::new(name, format!("https://models.test/{name}")))
            .collect()
    }

    fn orchestrator(client: Arc<MockCompletion>) -> GenerationOrchestrator<MockCompletion> {
        GenerationOrchestrator::new(
            client,
            endpoints(),
            SamplingConfig::default(),
            GenerationPolicy::from(&GenerationConfig::default()),
        )
    }

    fn source() -> SourceDocument {
        SourceDocument::new(
            &"Rivers carry sediment from mountains to the sea, carving valleys and building deltas. "
                .repeat(6),
            SourceOrigin::Pasted,
        )
        .unwrap()
    }

    fn api_error() -> DomainError {
        DomainError::Api {
            status: 500,
            message: "internal".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_in_priority_order() {
        let client = MockCompletion::new(|endpoint, request| match endpoint.name.as_str() {
            "A" => Err(api_error()),
            "B" => Ok("too short".to_string()),
            _ => Ok(good_markup(request.kind)),
        });
        let orchestrator = orchestrator(Arc::clone(&client));

        orchestrator.generate(&source()).await.unwrap();

        let notes_calls: Vec<_> = client
            .calls()
            .into_iter()
            .filter(|(_, kind)| *kind == ArtifactKind::Notes)
            .map(|(name, _)| name)
            .collect();
        assert_eq!(notes_calls, ["A", "B", "C"]);
        assert_eq!(
            orchestrator.artifact(ArtifactKind::Notes).unwrap().endpoint(),
            "C"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acceptable_endpoint_wins() {
        let client = MockCompletion::new(|_, request| Ok(good_markup(request.kind)));
        let orchestrator = orchestrator(Arc::clone(&client));

        orchestrator.generate(&source()).await.unwrap();

        assert_eq!(client.calls().len(), 4);
        assert!(client.calls().iter().all(|(name, _)| name == "A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_aborts_run_and_keeps_earlier_artifacts() {
        let client = MockCompletion::new(|_, request| match request.kind {
            ArtifactKind::Mindmap => Err(DomainError::MissingCompletionText),
            kind => Ok(good_markup(kind)),
        });
        let orchestrator = orchestrator(Arc::clone(&client));

        let err = orchestrator.generate(&source()).await.unwrap_err();
        match &err {
            DomainError::Generation { kind, cause } => {
                assert_eq!(*kind, ArtifactKind::Mindmap);
                assert!(matches!(**cause, DomainError::MissingCompletionText));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("mind map"));

        let session = orchestrator.session();
        assert!(session.get(ArtifactKind::Notes).is_some());
        assert!(session.get(ArtifactKind::Mindmap).is_none());
        assert_eq!(session.active_view(), None);

        let kinds: Vec<_> = client.calls().into_iter().map(|(_, kind)| kind).collect();
        assert!(!kinds.contains(&ArtifactKind::Quiz));
        assert!(!kinds.contains(&ArtifactKind::Flashcard));
        assert_eq!(kinds.len(), 1 + 3);
        assert!(!orchestrator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_sanitized_output_fails_over() {
        // Long enough raw, but only a short fragment survives the commentary cut.
        let padded = format!(
            "<div>only a small fragment</div>{}",
            " Here is some commentary the model added after the markup ends.".repeat(2)
        );
        let client = MockCompletion::new(move |endpoint, request| match endpoint.name.as_str() {
            "A" => Ok(padded.clone()),
            _ => Ok(good_markup(request.kind)),
        });
        let orchestrator = orchestrator(Arc::clone(&client));

        orchestrator.generate(&source()).await.unwrap();
        assert_eq!(
            orchestrator.artifact(ArtifactKind::Quiz).unwrap().endpoint(),
            "B"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_source_capped() {
        let long_source = "ж".repeat(MAX_SOURCE_CHARS + 10_000);
        let doc = SourceDocument::new(&long_source, SourceOrigin::Pasted).unwrap();
        let client = MockCompletion::new(|_, request| Ok(good_markup(request.kind)));
        let orchestrator = orchestrator(Arc::clone(&client));

        orchestrator.generate(&doc).await.unwrap();

        let prompts = client.prompts.lock().clone();
        assert_eq!(prompts.len(), 4);
        for prompt in prompts {
            assert_eq!(prompt.chars().filter(|&c| c == 'ж').count(), MAX_SOURCE_CHARS);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_run() {
        let client = MockCompletion::new(|_, request| {
            Ok(format!(
                "```html\n{}\n```",
                good_markup(request.kind)
            ))
        });
        let orchestrator = orchestrator(Arc::clone(&client));
        let mut events = orchestrator.subscribe();
        let started = Instant::now();

        orchestrator.generate(&source()).await.unwrap();

        // Delay between kinds, none after the last.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));

        let session = orchestrator.session();
        assert!(session.is_complete());
        assert_eq!(session.active_view(), Some(ArtifactKind::Notes));
        for artifact in session.artifacts() {
            assert!(artifact.char_len() >= 50);
            assert!(!artifact.markup().contains("```"));
            assert!(artifact.markup().starts_with("<h2>"));
        }

        assert!(matches!(
            events.recv().await.unwrap(),
            GenerationEvent::RunStarted { .. }
        ));
        let mut completed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let GenerationEvent::KindCompleted { kind, .. } = event {
                completed.push(kind);
            }
        }
        assert_eq!(completed, ArtifactKind::ALL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_kinds() {
        let client = MockCompletion::new(|_, request| Ok(good_markup(request.kind)));
        let orchestrator = Arc::new(orchestrator(Arc::clone(&client)));
        let mut events = orchestrator.subscribe();

        let run = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.generate(&source()).await })
        };

        loop {
            if let GenerationEvent::KindCompleted {
                kind: ArtifactKind::Notes,
                ..
            } = events.recv().await.unwrap()
            {
                break;
            }
        }
        orchestrator.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            DomainError::GenerationCancelled {
                kind: ArtifactKind::Mindmap
            }
        ));
        assert!(orchestrator.artifact(ArtifactKind::Notes).is_some());
        assert_eq!(client.calls().len(), 1);
        assert!(!orchestrator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_rejected_while_running() {
        let client = MockCompletion::new(|_, request| Ok(good_markup(request.kind)));
        let orchestrator = Arc::new(orchestrator(Arc::clone(&client)));
        let mut events = orchestrator.subscribe();

        let run = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.generate(&source()).await })
        };
        assert!(matches!(
            events.recv().await.unwrap(),
            GenerationEvent::RunStarted { .. }
        ));

        let err = orchestrator.generate(&source()).await.unwrap_err();
        assert!(matches!(err, DomainError::GenerationInProgress));

        run.await.unwrap().unwrap();
        assert!(orchestrator.session().is_complete());
    }

    #[tokio::test]
    async fn test_select_view_requires_artifact() {
        let client = MockCompletion::new(|_, _| Err(api_error()));
        let orchestrator = orchestrator(client);
        assert!(matches!(
            orchestrator.select_view(ArtifactKind::Quiz),
            Err(DomainError::ArtifactMissing(ArtifactKind::Quiz))
        ));
    }

    #[tokio::test]
    async fn test_no_endpoints() {
        let client = MockCompletion::new(|_, _| Err(api_error()));
        let orchestrator = GenerationOrchestrator::new(
            client,
            Vec::new(),
            SamplingConfig::default(),
            GenerationPolicy::from(&GenerationConfig::default()),
        );
        assert!(matches!(
            orchestrator.generate(&source()).await,
            Err(DomainError::NoEndpoints)
        ));
        assert!(!orchestrator.is_running());
    }
}
