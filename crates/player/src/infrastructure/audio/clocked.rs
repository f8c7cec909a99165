//! Device-less audio output.
//!
//! Plays nothing but takes exactly as long as the buffer would take to sound,
//! so narration pacing is identical with and without a sound card. Used by the
//! headless binary and by tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::ports::outbound::{AudioError, AudioOutputFactory, AudioOutputPort};

#[derive(Debug, Default)]
pub struct ClockedOutput {
    suspended: AtomicBool,
    stop: Notify,
    played_samples: AtomicUsize,
    stopped_buffers: AtomicUsize,
}

impl ClockedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts suspended, the way a browser audio context does before a user gesture.
    pub fn suspended() -> Self {
        Self {
            suspended: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Samples of buffers that played to completion.
    pub fn played_samples(&self) -> usize {
        self.played_samples.load(Ordering::SeqCst)
    }

    /// Buffers cut short by `stop`.
    pub fn stopped_buffers(&self) -> usize {
        self.stopped_buffers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutputPort for ClockedOutput {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn resume(&self) -> Result<(), AudioError> {
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn play_buffer(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError> {
        if self.is_suspended() {
            return Err(AudioError::Device("output is suspended".into()));
        }
        if sample_rate == 0 {
            return Err(AudioError::Device("sample rate must be positive".into()));
        }

        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));
        let stopped = self.stop.notified();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                self.played_samples.fetch_add(samples.len(), Ordering::SeqCst);
            }
            _ = stopped => {
                self.stopped_buffers.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

/// Hands out one shared [`ClockedOutput`].
#[derive(Debug, Clone, Default)]
pub struct ClockedOutputFactory {
    output: Arc<ClockedOutput>,
}

impl ClockedOutputFactory {
    pub fn new(output: Arc<ClockedOutput>) -> Self {
        Self { output }
    }
}

impl AudioOutputFactory for ClockedOutputFactory {
    fn create(&self) -> Result<Arc<dyn AudioOutputPort>, AudioError> {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn buffer_takes_its_duration() {
        let output = ClockedOutput::new();
        let started = tokio::time::Instant::now();

        output
            .play_buffer(vec![0.0; 24_000], 24_000)
            .await
            .expect("plays");

        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(output.played_samples(), 24_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cuts_the_buffer_short() {
        let output = Arc::new(ClockedOutput::new());
        let playing = {
            let output = output.clone();
            tokio::spawn(async move { output.play_buffer(vec![0.0; 240_000], 24_000).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        output.stop();
        playing.await.expect("joined").expect("played");

        assert_eq!(output.played_samples(), 0);
        assert_eq!(output.stopped_buffers(), 1);
    }

    #[tokio::test]
    async fn suspended_output_refuses_until_resumed() {
        let output = ClockedOutput::suspended();
        assert!(output.play_buffer(vec![0.0; 10], 24_000).await.is_err());

        output.resume().expect("resumes");
        assert!(!output.is_suspended());
        assert!(output.play_buffer(vec![0.0; 10], 24_000).await.is_ok());
    }
}
