//! Sound card output via cpal.
//!
//! cpal streams are not `Send` on every host, so the stream lives on a
//! dedicated thread for its whole life and is driven through a command
//! channel. Samples are handed to the audio callback through a shared queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::Notify;

use crate::ports::outbound::{AudioError, AudioOutputFactory, AudioOutputPort};

enum DeviceCommand {
    Play,
    Shutdown,
}

struct SharedBuffer {
    samples: Mutex<VecDeque<f32>>,
    drained: Notify,
}

impl SharedBuffer {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mono output on the default device, opened at a fixed sample rate.
pub struct CpalOutput {
    buffer: Arc<SharedBuffer>,
    control: std_mpsc::Sender<DeviceCommand>,
    suspended: AtomicBool,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open the default output device. The stream starts paused.
    pub fn open(sample_rate: u32) -> Result<Self, AudioError> {
        let buffer = Arc::new(SharedBuffer {
            samples: Mutex::new(VecDeque::new()),
            drained: Notify::new(),
        });
        let (control, commands) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let callback_buffer = buffer.clone();
        std::thread::Builder::new()
            .name("sleuth-audio".into())
            .spawn(move || {
                let stream = match build_stream(sample_rate, callback_buffer) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(command) = commands.recv() {
                    match command {
                        DeviceCommand::Play => {
                            if let Err(e) = stream.play() {
                                tracing::warn!("Failed to start audio stream: {}", e);
                            }
                        }
                        DeviceCommand::Shutdown => break,
                    }
                }
                tracing::debug!("Audio thread exiting");
            })
            .map_err(|e| AudioError::Unavailable(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Unavailable("audio thread exited early".into()))??;

        tracing::info!(sample_rate, "Opened audio output device");
        Ok(Self {
            buffer,
            control,
            suspended: AtomicBool::new(true),
            sample_rate,
        })
    }

    fn command(&self, command: DeviceCommand) -> Result<(), AudioError> {
        self.control
            .send(command)
            .map_err(|_| AudioError::Unavailable("audio thread is gone".into()))
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.control.send(DeviceCommand::Shutdown);
    }
}

fn build_stream(sample_rate: u32, buffer: Arc<SharedBuffer>) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Unavailable("no output device found".into()))?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = buffer.lock();
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
                if queue.is_empty() {
                    drop(queue);
                    buffer.drained.notify_waiters();
                }
            },
            |err| tracing::error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Device(format!("failed to build output stream: {e}")))?;

    stream
        .pause()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    Ok(stream)
}

#[async_trait]
impl AudioOutputPort for CpalOutput {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn resume(&self) -> Result<(), AudioError> {
        self.command(DeviceCommand::Play)?;
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn play_buffer(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError> {
        if self.is_suspended() {
            return Err(AudioError::Device("output is suspended".into()));
        }
        if sample_rate != self.sample_rate {
            return Err(AudioError::Device(format!(
                "device opened at {} Hz, buffer is {} Hz",
                self.sample_rate, sample_rate
            )));
        }

        self.buffer.lock().extend(samples);
        loop {
            let drained = self.buffer.drained.notified();
            if self.buffer.lock().is_empty() {
                return Ok(());
            }
            drained.await;
        }
    }

    fn stop(&self) {
        self.buffer.lock().clear();
        self.buffer.drained.notify_waiters();
    }
}

/// Opens the device on first use.
#[derive(Debug, Clone, Copy)]
pub struct CpalOutputFactory {
    sample_rate: u32,
}

impl CpalOutputFactory {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl AudioOutputFactory for CpalOutputFactory {
    fn create(&self) -> Result<Arc<dyn AudioOutputPort>, AudioError> {
        Ok(Arc::new(CpalOutput::open(self.sample_rate)?))
    }
}
