use crate::configuration::VoiceCommandConfig;
use crate::error::{GuideError, GuideResult};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::*;

enum VoiceSource {
    DefaultInputDevice,
    WavFile(PathBuf),
}

/// Records short voice commands as WAV files.
///
/// Only one recording runs at a time.
pub struct VoiceRecorder {
    source: VoiceSource,
    duration: Duration,
    recording: AtomicBool,
}

impl VoiceRecorder {
    pub fn from_config(config: &VoiceCommandConfig) -> Self {
        let source = match &config.wav_file {
            Some(path) => VoiceSource::WavFile(path.clone()),
            None => VoiceSource::DefaultInputDevice,
        };
        Self {
            source,
            duration: Duration::from_secs(config.record_secs),
            recording: AtomicBool::new(false),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub async fn record(&self) -> GuideResult<Vec<u8>> {
        if self.recording.swap(true, Ordering::SeqCst) {
            return Err(GuideError::RecordingInProgress);
        }
        let result = match &self.source {
            VoiceSource::WavFile(path) => {
                info!("Using voice command from {:?}", path);
                tokio::fs::read(path).await.map_err(GuideError::from)
            }
            VoiceSource::DefaultInputDevice => {
                let duration = self.duration;
                info!("Listening for {:?}", duration);
                match tokio::task::spawn_blocking(move || record_default_device(duration)).await {
                    Ok(result) => result,
                    Err(err) => Err(err.into()),
                }
            }
        };
        self.recording.store(false, Ordering::SeqCst);
        result
    }
}

/// Encodes mono float samples as 16 bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> GuideResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(int_sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(feature = "microphone")]
fn record_default_device(duration: Duration) -> GuideResult<Vec<u8>> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};

    let mic_error = |err: &dyn std::fmt::Display| GuideError::MicrophoneError(err.to_string());

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| GuideError::MicrophoneError("no input device available".to_owned()))?;
    let config = device
        .default_input_config()
        .map_err(|err| mic_error(&err))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    debug!(sample_rate, channels, "Recording from {:?}", device.name().ok());

    let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let samples = samples.clone();
            device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_mono(&samples, data, channels)
                },
                |err| error!("Microphone stream error: {}", err),
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let samples = samples.clone();
            device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let float: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    push_mono(&samples, &float, channels)
                },
                |err| error!("Microphone stream error: {}", err),
                None,
            )
        }
        other => {
            return Err(GuideError::MicrophoneError(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|err| mic_error(&err))?;

    stream.play().map_err(|err| mic_error(&err))?;
    std::thread::sleep(duration);
    drop(stream);

    let samples = samples
        .lock()
        .map_err(|_| GuideError::MicrophoneError("sample buffer poisoned".to_owned()))?;
    debug!("Recorded {} samples", samples.len());
    encode_wav(&samples, sample_rate)
}

#[cfg(not(feature = "microphone"))]
fn record_default_device(_duration: Duration) -> GuideResult<Vec<u8>> {
    Err(GuideError::MicrophoneError(
        "built without microphone support, configure voice_command.wav_file".to_owned(),
    ))
}

#[cfg(feature = "microphone")]
fn push_mono(buffer: &std::sync::Mutex<Vec<f32>>, data: &[f32], channels: usize) {
    if let Ok(mut buffer) = buffer.lock() {
        buffer.extend(
            data.chunks(channels.max(1))
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
    }
}
