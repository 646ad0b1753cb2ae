use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::speech::clamp_rate;
use crate::domain::{DomainError, EngineEvent, Utterance, VoiceInfo};
use crate::ports::SpeechEngine;

const VOICE_NAME: &str = "Terminal";
const VOICE_LANG: &str = "en-US";

/// The utterance currently being "spoken".
struct Playback {
    utterance_id: u64,
    remaining: Duration,
    /// Set while the clock is running; `None` while paused.
    resumed_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl Playback {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Speech engine for terminals without a synthesizer.
///
/// Each utterance is echoed to stdout and "lasts" as long as it would take
/// to say at `ms_per_char` scaled by the utterance rate. Pause freezes the
/// remaining time, so resume continues the same utterance.
pub struct TerminalSpeechEngine {
    current: Arc<Mutex<Option<Playback>>>,
    events: broadcast::Sender<EngineEvent>,
    ms_per_char: u64,
    echo: bool,
}

impl TerminalSpeechEngine {
    pub fn new(ms_per_char: u64) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            current: Arc::new(Mutex::new(None)),
            events,
            ms_per_char,
            echo: true,
        }
    }

    /// Engine that only times utterances and prints nothing.
    pub fn silent(ms_per_char: u64) -> Self {
        let mut engine = Self::new(ms_per_char);
        engine.echo = false;
        engine
    }

    fn duration_for(&self, utterance: &Utterance) -> Duration {
        let chars = utterance.text.chars().count() as f64;
        let ms = chars * self.ms_per_char as f64 / f64::from(clamp_rate(utterance.rate));
        Duration::from_millis(ms.ceil() as u64)
    }

    fn spawn_timer(&self, handle: &Handle, utterance_id: u64, after: Duration) -> JoinHandle<()> {
        let current = Arc::clone(&self.current);
        let events = self.events.clone();
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            let finished = {
                let mut guard = current.lock();
                match guard.as_ref() {
                    Some(p) if p.utterance_id == utterance_id => {
                        *guard = None;
                        true
                    }
                    _ => false,
                }
            };
            if finished {
                let _ = events.send(EngineEvent::Ended { utterance_id });
            }
        })
    }
}

impl SpeechEngine for TerminalSpeechEngine {
    fn speak(&self, utterance: &Utterance) -> Result<(), DomainError> {
        let handle = Handle::try_current()
            .map_err(|e| DomainError::SpeechEngine(format!("No async runtime: {}", e)))?;

        self.cancel();

        if self.echo {
            let mut out = std::io::stdout().lock();
            if let Err(e) = writeln!(out, "  {}", utterance.text) {
                warn!(error = %e, "Failed to echo utterance");
            }
        }

        let duration = self.duration_for(utterance);
        debug!(utterance_id = utterance.id, ?duration, "Speaking");

        let timer = self.spawn_timer(&handle, utterance.id, duration);
        *self.current.lock() = Some(Playback {
            utterance_id: utterance.id,
            remaining: duration,
            resumed_at: Some(Instant::now()),
            timer: Some(timer),
        });

        let _ = self.events.send(EngineEvent::Started {
            utterance_id: utterance.id,
        });
        Ok(())
    }

    fn pause(&self) {
        let mut guard = self.current.lock();
        if let Some(playback) = guard.as_mut() {
            if let Some(resumed_at) = playback.resumed_at.take() {
                playback.stop_timer();
                playback.remaining = playback.remaining.saturating_sub(resumed_at.elapsed());
                debug!(utterance_id = playback.utterance_id, remaining = ?playback.remaining, "Paused");
            }
        }
    }

    fn resume(&self) {
        let Ok(handle) = Handle::try_current() else {
            warn!("Resume requested outside the async runtime");
            return;
        };
        let mut guard = self.current.lock();
        if let Some(playback) = guard.as_mut() {
            if playback.resumed_at.is_none() {
                playback.timer =
                    Some(self.spawn_timer(&handle, playback.utterance_id, playback.remaining));
                playback.resumed_at = Some(Instant::now());
                debug!(utterance_id = playback.utterance_id, "Resumed");
            }
        }
    }

    fn cancel(&self) {
        if let Some(mut playback) = self.current.lock().take() {
            playback.stop_timer();
            debug!(utterance_id = playback.utterance_id, "Cancelled");
        }
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo {
            name: VOICE_NAME.to_string(),
            lang: VOICE_LANG.to_string(),
        }]
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

impl Drop for TerminalSpeechEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(id: u64, text: &str, rate: f32) -> Utterance {
        Utterance {
            id,
            text: text.to_string(),
            rate,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        }
    }

    #[test]
    fn test_silent_keeps_pacing() {
        let engine = TerminalSpeechEngine::silent(25);
        assert!(!engine.echo);
        assert_eq!(engine.ms_per_char, 25);
        assert!(TerminalSpeechEngine::new(25).echo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_utterance_ends_after_duration() {
        let engine = TerminalSpeechEngine::silent(10);
        let mut events = engine.subscribe();

        engine.speak(&utterance(1, "0123456789", 1.0)).unwrap();
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Started { utterance_id: 1 });

        let start = Instant::now();
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Ended { utterance_id: 1 });
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_shortens_duration() {
        let engine = TerminalSpeechEngine::silent(10);
        assert_eq!(
            engine.duration_for(&utterance(1, "0123456789", 2.0)),
            Duration::from_millis(50)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_keeps_remaining_time() {
        let engine = TerminalSpeechEngine::silent(10);
        let mut events = engine.subscribe();
        engine.speak(&utterance(7, "0123456789", 1.0)).unwrap();
        let _ = events.recv().await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.pause();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());

        let start = Instant::now();
        engine.resume();
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Ended { utterance_id: 7 });
        assert_eq!(start.elapsed(), Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_end_event() {
        let engine = TerminalSpeechEngine::silent(10);
        let mut events = engine.subscribe();
        engine.speak(&utterance(3, "hello", 1.0)).unwrap();
        let _ = events.recv().await;

        engine.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_replaces_current_utterance() {
        let engine = TerminalSpeechEngine::silent(10);
        let mut events = engine.subscribe();
        engine.speak(&utterance(1, "first utterance", 1.0)).unwrap();
        engine.speak(&utterance(2, "second", 1.0)).unwrap();

        assert_eq!(events.recv().await.unwrap(), EngineEvent::Started { utterance_id: 1 });
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Started { utterance_id: 2 });
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Ended { utterance_id: 2 });
    }

    #[test]
    fn test_speak_without_runtime_fails() {
        let engine = TerminalSpeechEngine::silent(10);
        assert!(matches!(
            engine.speak(&utterance(1, "x", 1.0)),
            Err(DomainError::SpeechEngine(_))
        ));
    }
}
