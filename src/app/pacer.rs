use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::config::SpeechConfig;
use crate::domain::segment::{extract_speech_text, split_sentences};
use crate::domain::speech::{clamp_rate, fallback_delay, select_voice};
use crate::domain::{
    DomainError, EngineEvent, SpeechEvent, SpeechSession, SpeechState, Utterance,
};
use crate::ports::SpeechEngine;

/// Sentences moved back by one rewind.
const REWIND_SENTENCES: usize = 2;

/// What caused an advance to the next sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceTrigger {
    EngineEnded,
    FallbackTimer,
}

struct PacerInner {
    session: Option<SpeechSession>,
    state: SpeechState,
    rate: f32,
    /// Utterance whose end advances the session. Anything else is stale.
    current_utterance: Option<u64>,
    next_utterance_id: u64,
    fallback: Option<JoinHandle<()>>,
    /// Set when a rate change lands while paused.
    restart_on_resume: bool,
}

impl PacerInner {
    fn stop_fallback(&mut self) {
        if let Some(timer) = self.fallback.take() {
            timer.abort();
        }
    }
}

struct Shared<E: SpeechEngine> {
    this: Weak<Shared<E>>,
    engine: Arc<E>,
    config: SpeechConfig,
    voice: Option<String>,
    runtime: Handle,
    inner: Mutex<PacerInner>,
    events: broadcast::Sender<SpeechEvent>,
}

/// Reads notes aloud one sentence at a time.
///
/// Every move to the next sentence goes through one transition, fired either
/// by the engine's end event or by a per-utterance fallback timer for engines
/// that never report the end. Whichever fires first wins; the other is
/// ignored because it refers to an utterance that is no longer current.
pub struct SpeechPacer<E: SpeechEngine + 'static> {
    shared: Arc<Shared<E>>,
}

impl<E: SpeechEngine + 'static> Clone for SpeechPacer<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: SpeechEngine + 'static> SpeechPacer<E> {
    /// Create a pacer and start listening to `engine`. Must be called inside
    /// a Tokio runtime.
    pub fn new(engine: Arc<E>, config: SpeechConfig) -> Result<Self, DomainError> {
        let runtime = Handle::try_current()
            .map_err(|e| DomainError::SpeechEngine(format!("No async runtime: {}", e)))?;

        let voice = select_voice(&engine.voices(), &config.preferred_voice_markers)
            .map(|v| v.name.clone());
        info!(voice = ?voice, supports_pause = engine.supports_pause(), "Speech pacer ready");

        let (events, _) = broadcast::channel(64);
        let engine_events = engine.subscribe();
        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            engine,
            inner: Mutex::new(PacerInner {
                session: None,
                state: SpeechState::Idle,
                rate: clamp_rate(config.rate),
                current_utterance: None,
                next_utterance_id: 1,
                fallback: None,
                restart_on_resume: false,
            }),
            config,
            voice,
            runtime,
            events,
        });

        shared
            .runtime
            .spawn(listen(Arc::downgrade(&shared), engine_events));

        Ok(Self { shared })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> SpeechState {
        self.shared.inner.lock().state
    }

    /// Index of the sentence being read, 0 when idle.
    pub fn current_index(&self) -> usize {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map_or(0, SpeechSession::index)
    }

    pub fn sentence_count(&self) -> usize {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map_or(0, SpeechSession::len)
    }

    pub fn rate(&self) -> f32 {
        self.shared.inner.lock().rate
    }

    /// Start reading `notes_markup` from the first sentence, replacing any
    /// session in progress.
    pub fn play(&self, notes_markup: &str) -> Result<(), DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        shared.teardown(&mut inner);

        let text = extract_speech_text(notes_markup);
        if text.trim().is_empty() {
            return Err(DomainError::NoContent);
        }
        let session = SpeechSession::new(split_sentences(&text, shared.config.max_chunk_chars));
        if session.is_empty() {
            return Err(DomainError::NoSentences);
        }

        info!(sentences = session.len(), rate = inner.rate, "Read-aloud started");
        inner.session = Some(session);
        shared.set_state(&mut inner, SpeechState::Playing);
        shared.speak_current(&mut inner)
    }

    /// Pause in place. Engines without real pause restart the sentence on
    /// resume.
    pub fn pause(&self) -> Result<(), DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !inner.state.can_pause() {
            return Err(DomainError::SpeechStateTransition {
                from: inner.state,
                to: SpeechState::Paused,
            });
        }

        inner.stop_fallback();
        if shared.engine.supports_pause() {
            shared.engine.pause();
        } else {
            shared.engine.cancel();
            inner.restart_on_resume = true;
        }
        shared.set_state(&mut inner, SpeechState::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !inner.state.can_resume() {
            return Err(DomainError::SpeechStateTransition {
                from: inner.state,
                to: SpeechState::Playing,
            });
        }

        shared.set_state(&mut inner, SpeechState::Playing);
        if inner.restart_on_resume {
            return shared.restart(&mut inner);
        }

        shared.engine.resume();
        let remaining_text = inner
            .session
            .as_ref()
            .and_then(SpeechSession::current)
            .map(str::to_string);
        if let (Some(text), Some(id)) = (remaining_text, inner.current_utterance) {
            shared.arm_fallback(&mut inner, id, &text);
        }
        Ok(())
    }

    /// Cancel speech and drop the session. Safe in any state.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if inner.state.is_active() {
            info!(index = ?inner.session.as_ref().map(SpeechSession::index), "Read-aloud stopped");
        }
        shared.teardown(&mut inner);
    }

    /// Go back two sentences (not before the first) and read from there.
    pub fn rewind(&self) -> Result<(), DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        shared.require_active(&inner)?;

        if let Some(session) = inner.session.as_mut() {
            session.rewind(REWIND_SENTENCES);
            debug!(index = session.index(), "Rewind");
        }
        shared.restart(&mut inner)
    }

    /// Jump to the next sentence.
    pub fn skip(&self) -> Result<(), DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        shared.require_active(&inner)?;

        if let Some(session) = inner.session.as_mut() {
            session.advance();
            debug!(index = session.index(), "Skip");
        }
        shared.restart(&mut inner)
    }

    /// Change the playback rate. A playing sentence restarts at the new
    /// rate; a paused one restarts on resume.
    pub fn set_rate(&self, rate: f32) -> Result<f32, DomainError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        let rate = clamp_rate(rate);
        if (inner.rate - rate).abs() < f32::EPSILON {
            return Ok(rate);
        }

        inner.rate = rate;
        shared.emit(SpeechEvent::RateChanged { rate });
        debug!(rate, "Rate changed");

        match inner.state {
            SpeechState::Playing => shared.restart(&mut inner)?,
            SpeechState::Paused => inner.restart_on_resume = true,
            SpeechState::Idle => {}
        }
        Ok(rate)
    }

    /// Single play button: stop while playing, resume while paused, start
    /// while idle.
    pub fn toggle(&self, notes_markup: &str) -> Result<SpeechState, DomainError> {
        match self.state() {
            SpeechState::Playing => self.stop(),
            SpeechState::Paused => self.resume()?,
            SpeechState::Idle => self.play(notes_markup)?,
        }
        Ok(self.state())
    }
}

impl<E: SpeechEngine + 'static> Shared<E> {
    fn emit(&self, event: SpeechEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, inner: &mut PacerInner, to: SpeechState) {
        let from = inner.state;
        if from != to {
            inner.state = to;
            self.emit(SpeechEvent::StateChanged { from, to });
        }
    }

    fn require_active(&self, inner: &PacerInner) -> Result<(), DomainError> {
        if inner.state.is_active() {
            Ok(())
        } else {
            Err(DomainError::SpeechStateTransition {
                from: inner.state,
                to: SpeechState::Playing,
            })
        }
    }

    /// Cancel the engine and clear every piece of session state.
    fn teardown(&self, inner: &mut PacerInner) {
        self.engine.cancel();
        inner.stop_fallback();
        inner.session = None;
        inner.current_utterance = None;
        inner.restart_on_resume = false;
        self.set_state(inner, SpeechState::Idle);
    }

    /// Speak the current sentence from its start, or finish if there is none.
    fn restart(&self, inner: &mut PacerInner) -> Result<(), DomainError> {
        self.engine.cancel();
        inner.stop_fallback();
        inner.current_utterance = None;
        inner.restart_on_resume = false;
        self.set_state(inner, SpeechState::Playing);
        self.speak_current(inner)
    }

    fn speak_current(&self, inner: &mut PacerInner) -> Result<(), DomainError> {
        let Some(session) = inner.session.as_ref() else {
            return Err(DomainError::NoContent);
        };
        if session.is_finished() {
            self.complete(inner);
            return Ok(());
        }
        let text = session.current().unwrap_or_default().to_string();
        let (index, total) = (session.index(), session.len());

        let id = inner.next_utterance_id;
        inner.next_utterance_id += 1;
        let utterance = Utterance {
            id,
            text: text.clone(),
            rate: inner.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
            voice: self.voice.clone(),
        };

        if let Err(e) = self.engine.speak(&utterance) {
            warn!(error = %e, "Speech engine rejected utterance");
            self.emit(SpeechEvent::Error {
                message: e.to_string(),
            });
            self.teardown(inner);
            return Err(e);
        }

        inner.current_utterance = Some(id);
        self.arm_fallback(inner, id, &text);
        debug!(index, total, utterance_id = id, "Sentence started");
        self.emit(SpeechEvent::SentenceStarted { index, total, text });
        Ok(())
    }

    fn arm_fallback(&self, inner: &mut PacerInner, utterance_id: u64, text: &str) {
        inner.stop_fallback();
        let delay = fallback_delay(
            text.chars().count(),
            inner.rate,
            self.config.fallback_ms_per_char,
            self.config.fallback_slack_ms,
        );
        let weak = self.this.clone();
        inner.fallback = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.advance(utterance_id, AdvanceTrigger::FallbackTimer);
            }
        }));
    }

    /// The single move-to-next-sentence transition.
    fn advance(&self, utterance_id: u64, trigger: AdvanceTrigger) {
        let mut inner = self.inner.lock();
        if inner.state != SpeechState::Playing || inner.current_utterance != Some(utterance_id) {
            debug!(utterance_id, ?trigger, "Ignoring stale advance");
            return;
        }

        match trigger {
            AdvanceTrigger::EngineEnded => inner.stop_fallback(),
            AdvanceTrigger::FallbackTimer => {
                // Running inside the timer task itself; just forget the handle.
                inner.fallback = None;
                warn!(utterance_id, "No end event from speech engine, advancing on timer");
                self.engine.cancel();
            }
        }

        inner.current_utterance = None;
        if let Some(session) = inner.session.as_mut() {
            session.advance();
        }
        if let Err(e) = self.speak_current(&mut inner) {
            warn!(error = %e, "Could not continue reading");
        }
    }

    fn complete(&self, inner: &mut PacerInner) {
        info!("Read-aloud finished");
        inner.stop_fallback();
        inner.session = None;
        inner.current_utterance = None;
        inner.restart_on_resume = false;
        self.set_state(inner, SpeechState::Idle);
        self.emit(SpeechEvent::Completed);
    }

    fn engine_error(&self, utterance_id: u64, message: String) {
        let mut inner = self.inner.lock();
        if inner.current_utterance != Some(utterance_id) {
            return;
        }
        warn!(utterance_id, error = %message, "Speech engine error, resetting");
        self.emit(SpeechEvent::Error { message });
        self.teardown(&mut inner);
    }
}

impl<E: SpeechEngine> Drop for Shared<E> {
    fn drop(&mut self) {
        self.engine.cancel();
        self.inner.get_mut().stop_fallback();
    }
}

async fn listen<E: SpeechEngine + 'static>(
    shared: Weak<Shared<E>>,
    mut events: broadcast::Receiver<EngineEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Speech listener lagged behind engine events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match event {
            EngineEvent::Started { utterance_id } => debug!(utterance_id, "Engine started utterance"),
            EngineEvent::Ended { utterance_id } => {
                shared.advance(utterance_id, AdvanceTrigger::EngineEnded)
            }
            EngineEvent::Error {
                utterance_id,
                message,
            } => shared.engine_error(utterance_id, message),
        }
    }
    debug!("Speech listener stopped");
}
