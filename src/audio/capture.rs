//! Microphone capture via `cpal`.
//!
//! [`AudioFrameSource`] is the seam between the capture controller and a live
//! input device.  A source pushes [`SourceEvent`]s into an unbounded channel:
//! fixed-size [`AudioFrame`]s in arrival order, non-fatal overrun warnings,
//! and at most one fatal [`DeviceError`].
//!
//! [`CpalSource`] is the production implementation.  The cpal stream lives on
//! a dedicated `audio-capture` thread (cpal streams are not `Send` on every
//! platform), which keeps the source itself `Send` and lets `stop` tear the
//! stream down from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SizedSample, StreamConfig};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::buffer::{f32_to_i16, u16_to_i16, FrameAssembler};
use super::frame::AudioFrame;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Fatal capture-device failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("another capture session already owns the input device")]
    Busy,

    #[error("this source is already capturing")]
    AlreadyActive,

    #[error("device does not support {sample_rate} Hz input")]
    UnsupportedConfig { sample_rate: u32 },

    #[error("failed to enumerate input devices: {0}")]
    Enumerate(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(String),

    #[error("failed to start audio stream: {0}")]
    PlayStream(String),

    #[error("audio device disconnected")]
    Disconnected,

    #[error("audio capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// SourceEvent / AudioFrameSource
// ---------------------------------------------------------------------------

/// Everything a source can report to the capture controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One complete frame of `frame_size` mono samples.
    Frame(AudioFrame),
    /// The device reported an overrun or other recoverable glitch.
    Overrun(String),
    /// The device failed; no further frames will follow.
    Failed(DeviceError),
}

/// Sender half handed to a source on [`AudioFrameSource::start`].
pub type FrameSender = UnboundedSender<SourceEvent>;

/// A live audio input delivering fixed-size mono PCM16 frames.
///
/// # Contract
///
/// - Frames are sent in strict arrival order, exactly once each.
/// - Frames are never dropped for backpressure; the channel is unbounded.
/// - `stop` halts capture, releases the device and is idempotent.
pub trait AudioFrameSource: Send {
    /// Begin capturing `frame_size`-sample frames at `sample_rate` Hz.
    fn start(
        &mut self,
        frame_size: usize,
        sample_rate: u32,
        events: FrameSender,
    ) -> Result<(), DeviceError>;

    /// Halt capture and release the device.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// DeviceLease
// ---------------------------------------------------------------------------

static DEVICE_IN_USE: AtomicBool = AtomicBool::new(false);

/// RAII claim on the process's single capture slot.
///
/// Only one capture may own the physical input at a time; the claim is
/// released when the lease is dropped.
#[derive(Debug)]
pub struct DeviceLease {
    _private: (),
}

impl DeviceLease {
    /// Claim the capture slot, failing with [`DeviceError::Busy`] if taken.
    pub fn acquire() -> Result<Self, DeviceError> {
        DEVICE_IN_USE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| DeviceError::Busy)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        DEVICE_IN_USE.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
    _lease: DeviceLease,
}

/// [`AudioFrameSource`] backed by a cpal input stream.
///
/// # Example
///
/// ```rust,no_run
/// use speech_assess::audio::{AudioFrameSource, CpalSource};
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let mut source = CpalSource::new(None);
/// source.start(512, 16_000, tx).unwrap();
/// // ... frames arrive on `rx` ...
/// source.stop();
/// ```
pub struct CpalSource {
    device_name: Option<String>,
    worker: Option<CaptureWorker>,
}

impl CpalSource {
    /// Capture from the named device, or the system default when `None`.
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            worker: None,
        }
    }

    /// List input device names so the CLI can offer a selector.
    pub fn list_devices() -> Result<Vec<String>, DeviceError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| DeviceError::Enumerate(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Whether a capture thread is currently running.
    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

impl AudioFrameSource for CpalSource {
    fn start(
        &mut self,
        frame_size: usize,
        sample_rate: u32,
        events: FrameSender,
    ) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::AlreadyActive);
        }
        let lease = DeviceLease::acquire()?;

        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), DeviceError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), frame_size, sample_rate, events)
                {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::PlayStream(err.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Park until stop() signals or the source is dropped.
                let _ = stop_rx.recv();
                if let Err(err) = stream.pause() {
                    log::debug!("failed to pause audio stream: {err}");
                }
                drop(stream);
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("audio capture started ({sample_rate} Hz, {frame_size}-sample frames)");
                self.worker = Some(CaptureWorker {
                    stop_tx,
                    handle,
                    _lease: lease,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::Thread("capture thread exited during start".into()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                log::warn!("audio capture thread panicked");
            }
            log::debug!("audio capture stopped");
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Stream construction
// ---------------------------------------------------------------------------

fn select_device(name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    match name {
        Some(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| DeviceError::Enumerate(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))
        }
        None => host.default_input_device().ok_or(DeviceError::NoDevice),
    }
}

/// Pick a supported input configuration at `sample_rate`, preferring mono
/// and native `i16` samples.
fn select_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat), DeviceError> {
    let rate = SampleRate(sample_rate);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| DeviceError::Enumerate(e.to_string()))?;

    let best = ranges
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| {
            matches!(
                r.sample_format(),
                SampleFormat::I16 | SampleFormat::F32 | SampleFormat::U16
            )
        })
        .min_by_key(|r| {
            let format_rank = match r.sample_format() {
                SampleFormat::I16 => 0,
                SampleFormat::F32 => 1,
                _ => 2,
            };
            (r.channels(), format_rank)
        })
        .ok_or(DeviceError::UnsupportedConfig { sample_rate })?;

    let supported = best.with_sample_rate(rate);
    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn open_stream(
    device_name: Option<&str>,
    frame_size: usize,
    sample_rate: u32,
    events: FrameSender,
) -> Result<cpal::Stream, DeviceError> {
    let device = select_device(device_name)?;
    let (config, format) = select_config(&device, sample_rate)?;
    log::debug!(
        "input config: device={:?} format={format:?} rate={}Hz channels={}",
        device.name().ok(),
        config.sample_rate.0,
        config.channels
    );

    let assembler = Arc::new(Mutex::new(FrameAssembler::new(frame_size, sample_rate)));
    match format {
        SampleFormat::I16 => build_stream::<i16, _>(&device, &config, assembler, events, |s| s),
        SampleFormat::F32 => build_stream::<f32, _>(&device, &config, assembler, events, f32_to_i16),
        SampleFormat::U16 => build_stream::<u16, _>(&device, &config, assembler, events, u16_to_i16),
        other => Err(DeviceError::BuildStream(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_stream<T, C>(
    device: &cpal::Device,
    config: &StreamConfig,
    assembler: Arc<Mutex<FrameAssembler>>,
    events: FrameSender,
    convert: C,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    C: Fn(T) -> i16 + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let frame_tx = events.clone();
    let error_tx = events;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Block rather than try_lock: a frame must never be skipped.
                let mut assembler = match assembler.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                assembler.push_interleaved(data, channels, &convert, |frame| {
                    // Receiver gone means the controller already stopped.
                    let _ = frame_tx.send(SourceEvent::Frame(frame));
                });
            },
            move |err: cpal::StreamError| match err {
                cpal::StreamError::DeviceNotAvailable => {
                    log::error!("cpal stream error: device not available");
                    let _ = error_tx.send(SourceEvent::Failed(DeviceError::Disconnected));
                }
                other => {
                    log::warn!("cpal stream warning: {other}");
                    let _ = error_tx.send(SourceEvent::Overrun(other.to_string()));
                }
            },
            None,
        )
        .map_err(|e| DeviceError::BuildStream(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
