//! Application entry point: record until silence, then score pronunciation.
//!
//! # Sequence
//!
//! 1. Parse CLI arguments, initialise logging, load `.env` files.
//! 2. Load [`AppConfig`] and apply CLI overrides and environment credentials.
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. Record from the microphone until silence, timeout or Ctrl-C.
//! 5. Write the WAV; unless `--record-only`, validate it, submit it for
//!    assessment and save the JSON result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use speech_assess::{
    assess::{load_reference_text, AzureAssessor, PronunciationAssessor},
    audio::{AudioValidator, CpalSource, DeviceError, EnergyClassifier, RecordingSink},
    config::{AppConfig, AppPaths},
    pipeline::{CancelPolicy, CaptureController, CaptureError, CaptureSession, CaptureSettings},
};

/// Record speech until you stop talking, then get a pronunciation score.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// WAV file to write the recording to
    #[arg(short, long, default_value = "test_vad.wav")]
    output: PathBuf,

    /// Settings file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum recording length in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Seconds of silence that end the recording
    #[arg(long)]
    silence_duration: Option<f64>,

    /// VAD confidence (0.0-1.0) at or above which audio counts as speech
    #[arg(long)]
    threshold: Option<f32>,

    /// Capture sample rate (8000 or 16000)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Samples per VAD frame
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Input device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Text file with the sentence to read aloud
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Where to save the assessment result JSON
    #[arg(long)]
    result: Option<PathBuf>,

    /// Only record; skip validation and assessment
    #[arg(long)]
    record_only: bool,
}

impl Args {
    fn apply_to(&self, config: &mut AppConfig) {
        let audio = &mut config.audio;
        if let Some(rate) = self.sample_rate {
            audio.sample_rate = rate;
            if self.chunk_size.is_none() {
                audio.chunk_size = if rate == 8_000 { 256 } else { 512 };
            }
        }
        if let Some(chunk) = self.chunk_size {
            audio.chunk_size = chunk;
        }
        if let Some(secs) = self.max_duration {
            audio.max_duration_secs = secs;
        }
        if let Some(secs) = self.silence_duration {
            audio.silence_duration_secs = secs;
        }
        if let Some(threshold) = self.threshold {
            audio.silence_threshold = threshold;
        }
        if let Some(device) = &self.device {
            audio.device = Some(device.clone());
        }
        if let Some(path) = &self.reference {
            config.assessment.reference_text_file = path.clone();
        }
        if let Some(path) = &self.result {
            config.assessment.result_file = path.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths = AppPaths::new();
    paths.load_env_files();

    if args.list_devices {
        for name in CpalSource::list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    // 2. Configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    args.apply_to(&mut config);
    config.assessment.apply_env();

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(&args, &config))
}

async fn run(args: &Args, config: &AppConfig) -> Result<()> {
    // 4. Capture
    let settings = CaptureSettings::from(&config.audio);
    let classifier = Arc::new(EnergyClassifier::new(settings.frame_size));
    let source = CpalSource::new(config.audio.device.as_deref());
    let mut controller = CaptureController::new(settings.clone(), Box::new(source), classifier)
        .context("invalid audio settings")?;

    let canceller = controller.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Ctrl-C received, finishing the recording");
            canceller.cancel(CancelPolicy::KeepAudio);
        }
    });

    println!(
        "Recording... speak now (stops after {:.1}s of silence or {:.0}s total, Ctrl-C to stop)",
        settings.silence_duration_secs, settings.max_duration_secs
    );

    let sink = RecordingSink::new(settings.sample_rate);
    let session = match controller.run().await {
        Ok(session) => session,
        Err(CaptureError::Device(err)) => {
            return Err(device_failure(err, controller.take_session(), &sink, &args.output));
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(reason) = session.stop_reason() {
        println!("Recording stopped ({}).", reason.label());
    }

    // 5. Persist
    let artifact = sink.finalize(session)?;
    artifact
        .write_to(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if args.record_only {
        return Ok(());
    }

    AudioValidator::from(&config.validation)
        .validate_file(&args.output)
        .context("recording is not suitable for assessment")?;

    let reference = load_reference_text(&config.assessment.reference_text_file)?;
    let assessor = AzureAssessor::from_config(&config.assessment)?;

    log::info!("Processing pronunciation assessment...");
    let Some(result) = assessor.assess(&artifact, &reference).await? else {
        bail!("the speech service could not recognise any speech in the recording");
    };

    println!("Recognized:    {}", result.recognized_text);
    println!("Pronunciation: {:.1}", result.pronunciation_score);
    println!("Accuracy:      {:.1}", result.accuracy_score);
    println!("Fluency:       {:.1}", result.fluency_score);
    println!("Completeness:  {:.1}", result.completeness_score);

    result.save_to(&config.assessment.result_file)?;
    Ok(())
}

/// Save whatever was captured before the device failed, then report the
/// device error.  A failed save is logged and never replaces that error.
fn device_failure(
    err: DeviceError,
    partial: Option<CaptureSession>,
    sink: &RecordingSink,
    output: &Path,
) -> anyhow::Error {
    if let Some(partial) = partial.filter(|s| !s.frames().is_empty()) {
        match sink.finalize(partial).and_then(|a| a.write_to(output)) {
            Ok(()) => log::warn!("partial recording saved to {}", output.display()),
            Err(e) => log::warn!(
                "could not save partial recording to {}: {e}",
                output.display()
            ),
        }
    }
    anyhow::Error::new(err).context("recording failed")
}
