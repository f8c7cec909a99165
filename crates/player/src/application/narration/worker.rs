//! Narration worker
//!
//! One task owns the [`NarrationQueue`] and starts at most one clip at a time.
//! Draining is cooperative: a fixed tick plus the completion of the previous
//! clip. Each clip runs on its own task with a child cancellation token, and
//! completions are tagged with a generation so a clip cancelled by `clear`
//! cannot finish a clip started after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use sleuth_domain::{PlaybackHandle, DEFAULT_MAX_NARRATION_CHARS};
use sleuth_shared::SynthesisRequest;

use super::queue::{EnqueueOutcome, NarrationQueue};
use crate::infrastructure::audio::{AudioPlaybackEngine, ClipOutcome};
use crate::ports::outbound::{AudioError, SpeechSynthesisPort, TimeProvider};

pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct NarrationConfig {
    pub enabled: bool,
    pub max_chars: usize,
    pub drain_interval: Duration,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: DEFAULT_MAX_NARRATION_CHARS,
            drain_interval: Duration::from_millis(DEFAULT_DRAIN_INTERVAL_MS),
        }
    }
}

enum NarrationCommand {
    Enqueue {
        character: String,
        text: String,
        voice_id: Option<String>,
    },
    Clear,
    SetEnabled(bool),
}

struct ClipFinished {
    generation: u64,
    outcome: ClipOutcome,
}

struct ActiveClip {
    generation: u64,
    cancel: CancellationToken,
}

/// Handle to the narration worker. Cheap to clone.
#[derive(Clone)]
pub struct NarrationService {
    commands: mpsc::UnboundedSender<NarrationCommand>,
    playback: watch::Receiver<Option<PlaybackHandle>>,
    enabled: Arc<AtomicBool>,
    engine: Arc<AudioPlaybackEngine>,
    shutdown: CancellationToken,
}

impl NarrationService {
    pub fn spawn(
        engine: Arc<AudioPlaybackEngine>,
        synthesizer: Arc<dyn SpeechSynthesisPort>,
        clock: Arc<dyn TimeProvider>,
        config: NarrationConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        let worker = NarrationWorker {
            queue: NarrationQueue::new(config.enabled, config.max_chars),
            engine: engine.clone(),
            synthesizer,
            clock,
            playback: playback_tx,
            clip: None,
            generation: 0,
            finished: finished_tx,
            shutdown: shutdown.clone(),
        };
        let drain_interval = config.drain_interval.max(Duration::from_millis(1));
        tokio::spawn(worker.run(commands_rx, finished_rx, drain_interval));

        Self {
            commands: commands_tx,
            playback: playback_rx,
            enabled: Arc::new(AtomicBool::new(config.enabled)),
            engine,
            shutdown,
        }
    }

    pub fn enqueue(
        &self,
        character: impl Into<String>,
        text: impl Into<String>,
        voice_id: Option<String>,
    ) {
        self.command(NarrationCommand::Enqueue {
            character: character.into(),
            text: text.into(),
            voice_id,
        });
    }

    /// Empty the queue and cancel the clip in flight.
    pub fn clear(&self) {
        self.command(NarrationCommand::Clear);
    }

    /// Disabling clears the queue and silences the current clip.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.command(NarrationCommand::SetEnabled(enabled));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Must follow a user action on gesture-gated platforms; nothing plays before it.
    pub fn initialize_audio(&self) -> Result<(), AudioError> {
        self.engine.initialize_audio()
    }

    pub fn is_audio_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    pub fn playback(&self) -> Option<PlaybackHandle> {
        self.playback.borrow().clone()
    }

    pub fn watch_playback(&self) -> watch::Receiver<Option<PlaybackHandle>> {
        self.playback.clone()
    }

    pub fn current_speaking_character(&self) -> Option<String> {
        self.playback
            .borrow()
            .as_ref()
            .map(|handle| handle.character.clone())
    }

    pub fn current_speech_text(&self) -> Option<String> {
        self.playback
            .borrow()
            .as_ref()
            .map(|handle| handle.text.clone())
    }

    /// Stop the worker and any clip in flight.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn command(&self, command: NarrationCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Narration worker has stopped; command dropped");
        }
    }
}

struct NarrationWorker {
    queue: NarrationQueue,
    engine: Arc<AudioPlaybackEngine>,
    synthesizer: Arc<dyn SpeechSynthesisPort>,
    clock: Arc<dyn TimeProvider>,
    playback: watch::Sender<Option<PlaybackHandle>>,
    clip: Option<ActiveClip>,
    generation: u64,
    finished: mpsc::UnboundedSender<ClipFinished>,
    shutdown: CancellationToken,
}

impl NarrationWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<NarrationCommand>,
        mut finished: mpsc::UnboundedReceiver<ClipFinished>,
        drain_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(done) = finished.recv() => {
                    self.on_clip_finished(done);
                    self.drain();
                }
                _ = ticker.tick() => self.drain(),
            }
        }

        self.stop_clip();
        tracing::debug!("Narration worker stopped");
    }

    fn handle(&mut self, command: NarrationCommand) {
        match command {
            NarrationCommand::Enqueue {
                character,
                text,
                voice_id,
            } => match self.queue.enqueue(&character, &text, voice_id) {
                EnqueueOutcome::Queued => {
                    tracing::debug!(character = %character, queued = self.queue.len(), "Narration queued");
                }
                EnqueueOutcome::Duplicate => {
                    tracing::debug!(character = %character, "Duplicate narration dropped");
                }
                EnqueueOutcome::Disabled | EnqueueOutcome::Blank => {}
            },
            NarrationCommand::Clear => {
                self.queue.clear();
                self.stop_clip();
                tracing::debug!("Narration cleared");
            }
            NarrationCommand::SetEnabled(enabled) => {
                self.queue.set_enabled(enabled);
                if !enabled {
                    self.stop_clip();
                }
                tracing::info!(enabled, "Narration toggled");
            }
        }
    }

    fn drain(&mut self) {
        if self.clip.is_some() || self.queue.is_empty() || !self.engine.is_initialized() {
            return;
        }
        let Some(item) = self.queue.start_next(self.clock.now()) else {
            return;
        };
        self.playback.send_replace(self.queue.playing().cloned());

        self.generation += 1;
        let generation = self.generation;
        let cancel = self.shutdown.child_token();
        self.clip = Some(ActiveClip {
            generation,
            cancel: cancel.clone(),
        });

        tracing::debug!(
            character = %item.character,
            generation,
            remaining = self.queue.len(),
            "Starting narration clip"
        );

        let request = SynthesisRequest {
            text: item.text,
            character: item.character,
            voice_id: item.voice_id,
        };
        let engine = self.engine.clone();
        let synthesizer = self.synthesizer.clone();
        let finished = self.finished.clone();
        tokio::spawn(async move {
            let outcome = play_clip(&engine, synthesizer.as_ref(), request, &cancel).await;
            let _ = finished.send(ClipFinished {
                generation,
                outcome,
            });
        });
    }

    fn on_clip_finished(&mut self, done: ClipFinished) {
        match &self.clip {
            Some(clip) if clip.generation == done.generation => {}
            _ => {
                tracing::debug!(generation = done.generation, "Ignoring completion of a cleared clip");
                return;
            }
        }
        self.clip = None;
        self.queue.finish();
        self.playback.send_replace(None);

        match done.outcome {
            ClipOutcome::Completed { played, skipped } => {
                tracing::debug!(played, skipped, "Narration clip finished");
            }
            ClipOutcome::Cancelled => tracing::debug!("Narration clip cancelled"),
            ClipOutcome::Failed(e) => tracing::error!("Narration clip failed: {}", e),
        }
    }

    /// Cancel the clip in flight and null the handle now, not when its task notices.
    fn stop_clip(&mut self) {
        if let Some(clip) = self.clip.take() {
            clip.cancel.cancel();
            // Silenced here, before any later clip can start on the same output
            self.engine.cancel_all();
        }
        self.playback.send_replace(None);
    }
}

async fn play_clip(
    engine: &AudioPlaybackEngine,
    synthesizer: &dyn SpeechSynthesisPort,
    request: SynthesisRequest,
    cancel: &CancellationToken,
) -> ClipOutcome {
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return ClipOutcome::Cancelled,
        result = synthesizer.stream_speech(request) => match result {
            Ok(stream) => stream,
            Err(e) => return ClipOutcome::Failed(e.into()),
        },
    };
    engine.play_stream(stream, cancel).await
}
