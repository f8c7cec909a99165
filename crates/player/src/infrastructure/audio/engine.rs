//! Audio playback engine
//!
//! Owns the process-wide output context and plays streamed synthesis clips
//! chunk by chunk. Each chunk is awaited before the next one is decoded, so a
//! clip never overlaps itself.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use sleuth_shared::SYNTHESIS_SAMPLE_RATE;

use super::decoder::decode_pcm16_base64;
use crate::ports::outbound::{
    AudioChunkStream, AudioError, AudioOutputFactory, AudioOutputPort, SynthesisError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// How a clip ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipOutcome {
    Completed { played: usize, skipped: usize },
    Cancelled,
    Failed(PlaybackError),
}

pub struct AudioPlaybackEngine {
    factory: Arc<dyn AudioOutputFactory>,
    output: Mutex<Option<Arc<dyn AudioOutputPort>>>,
}

impl AudioPlaybackEngine {
    pub fn new(factory: Arc<dyn AudioOutputFactory>) -> Self {
        Self {
            factory,
            output: Mutex::new(None),
        }
    }

    /// Create the output context on first call and resume it if suspended.
    ///
    /// Must be triggered by an explicit user action on platforms that gate
    /// audio behind a gesture. Later calls only resume.
    pub fn initialize_audio(&self) -> Result<(), AudioError> {
        let mut slot = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let output = match slot.as_ref() {
            Some(output) => output.clone(),
            None => {
                let output = self.factory.create()?;
                tracing::info!("Audio output initialized");
                *slot = Some(output.clone());
                output
            }
        };
        drop(slot);

        if output.is_suspended() {
            output.resume()?;
            tracing::debug!("Resumed suspended audio output");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn output(&self) -> Option<Arc<dyn AudioOutputPort>> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Play one decoded buffer at the synthesis sample rate.
    pub async fn play_chunk(&self, samples: Vec<f32>) -> Result<(), AudioError> {
        let output = self.output().ok_or(AudioError::NotInitialized)?;
        output.play_buffer(samples, SYNTHESIS_SAMPLE_RATE).await
    }

    /// Play a streamed clip in arrival order until it ends, fails, or `cancel` fires.
    ///
    /// Undecodable chunks are skipped. Chunks arriving after cancellation are
    /// never played. Cancelling does not stop the output; call [`Self::cancel_all`].
    pub async fn play_stream(
        &self,
        mut stream: AudioChunkStream,
        cancel: &CancellationToken,
    ) -> ClipOutcome {
        let mut played = 0;
        let mut skipped = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ClipOutcome::Cancelled,
                next = stream.next() => next,
            };

            let chunk = match next {
                None => return ClipOutcome::Completed { played, skipped },
                Some(Ok(chunk)) => chunk,
                Some(Err(SynthesisError::InvalidChunk(reason))) => {
                    tracing::warn!("Skipping invalid synthesis chunk: {}", reason);
                    skipped += 1;
                    continue;
                }
                Some(Err(e)) => return ClipOutcome::Failed(e.into()),
            };

            let samples = match decode_pcm16_base64(&chunk.audio) {
                Ok(samples) if samples.is_empty() => continue,
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!("Skipping undecodable audio chunk: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ClipOutcome::Cancelled,
                result = self.play_chunk(samples) => {
                    if let Err(e) = result {
                        return ClipOutcome::Failed(e.into());
                    }
                }
            }
            played += 1;
        }
    }

    /// Silence whatever is sounding right now.
    pub fn cancel_all(&self) {
        if let Some(output) = self.output() {
            output.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use futures_util::stream;

    use sleuth_shared::SynthesisChunk;

    use super::*;
    use crate::infrastructure::audio::{ClockedOutput, ClockedOutputFactory};
    use crate::ports::outbound::audio_output_port::MockAudioOutputFactory;

    fn chunk(samples: usize) -> Result<SynthesisChunk, SynthesisError> {
        let bytes = vec![0u8; samples * 2];
        Ok(SynthesisChunk {
            audio: STANDARD.encode(bytes),
        })
    }

    fn engine_with(output: Arc<ClockedOutput>) -> AudioPlaybackEngine {
        AudioPlaybackEngine::new(Arc::new(ClockedOutputFactory::new(output)))
    }

    #[tokio::test]
    async fn play_before_initialize_is_rejected() {
        let engine = engine_with(Arc::new(ClockedOutput::new()));

        assert!(!engine.is_initialized());
        assert_eq!(
            engine.play_chunk(vec![0.0; 4]).await,
            Err(AudioError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn initialize_resumes_suspended_output() {
        let output = Arc::new(ClockedOutput::suspended());
        let engine = engine_with(output.clone());

        engine.initialize_audio().expect("initializes");

        assert!(engine.is_initialized());
        assert!(!output.is_suspended());
    }

    #[test]
    fn output_is_created_once() {
        let mut factory = MockAudioOutputFactory::new();
        factory
            .expect_create()
            .times(1)
            .returning(|| Ok(Arc::new(ClockedOutput::new())));
        let engine = AudioPlaybackEngine::new(Arc::new(factory));

        engine.initialize_audio().expect("first");
        engine.initialize_audio().expect("second");
    }

    #[test]
    fn factory_failure_leaves_engine_uninitialized() {
        let mut factory = MockAudioOutputFactory::new();
        factory
            .expect_create()
            .returning(|| Err(AudioError::Unavailable("no device".into())));
        let engine = AudioPlaybackEngine::new(Arc::new(factory));

        assert!(engine.initialize_audio().is_err());
        assert!(!engine.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_plays_in_order_and_skips_bad_chunks() {
        let output = Arc::new(ClockedOutput::new());
        let engine = engine_with(output.clone());
        engine.initialize_audio().expect("initializes");

        let chunks = stream::iter(vec![
            chunk(2_400),
            Ok(SynthesisChunk {
                audio: "%%%".into(),
            }),
            Err(SynthesisError::InvalidChunk("not json".into())),
            chunk(4_800),
        ])
        .boxed();
        let started = tokio::time::Instant::now();

        let outcome = engine
            .play_stream(chunks, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            ClipOutcome::Completed {
                played: 2,
                skipped: 2
            }
        );
        assert_eq!(output.played_samples(), 7_200);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_stream_fails_the_clip() {
        let engine = engine_with(Arc::new(ClockedOutput::new()));
        engine.initialize_audio().expect("initializes");

        let chunks = stream::iter(vec![
            chunk(240),
            Err(SynthesisError::Stream("connection reset".into())),
            chunk(240),
        ])
        .boxed();

        let outcome = engine
            .play_stream(chunks, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            ClipOutcome::Failed(PlaybackError::Synthesis(SynthesisError::Stream(
                "connection reset".into()
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_clip_and_swallows_late_chunks() {
        let output = Arc::new(ClockedOutput::new());
        let engine = Arc::new(engine_with(output.clone()));
        engine.initialize_audio().expect("initializes");

        let cancel = CancellationToken::new();
        let chunks = stream::iter(vec![chunk(24_000), chunk(24_000)]).boxed();
        let playing = {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.play_stream(chunks, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        assert_eq!(playing.await.expect("joined"), ClipOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(output.played_samples(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_clip_leaves_other_buffers_sounding() {
        let output = Arc::new(ClockedOutput::new());
        let engine = Arc::new(engine_with(output.clone()));
        engine.initialize_audio().expect("initializes");

        let cancel = CancellationToken::new();
        let chunks = stream::iter(vec![chunk(24_000)]).boxed();
        let clip = {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.play_stream(chunks, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let other = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play_chunk(vec![0.0; 24_000]).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        cancel.cancel();
        assert_eq!(clip.await.expect("joined"), ClipOutcome::Cancelled);
        other.await.expect("joined").expect("played");

        assert_eq!(output.played_samples(), 24_000);
        assert_eq!(output.stopped_buffers(), 0);
    }
}
