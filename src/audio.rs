// src/audio.rs

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

/// Device-side playback sink: `resume` begins pulling, `pause` stops it,
/// dropping the sink closes the device stream.
pub trait OutputSink {
    fn resume(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;
}

/// Default output device plus the stream config the engine asked for.
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
}

/// Find the default audio output device and check it can honor the track's
/// format: f32 samples at the track's rate and channel count.
pub fn setup_output_device(sample_rate: u32, channels: usize) -> Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;

    let default_config = device.default_output_config()?;
    if default_config.sample_format() != SampleFormat::F32 {
        return Err(anyhow!(
            "output device does not offer f32 samples (got {:?})",
            default_config.sample_format()
        ));
    }

    let config = StreamConfig {
        channels: channels as u16,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    log::info!("output device: {} channels at {} Hz", channels, sample_rate);

    Ok(OutputConfig { device, config })
}

/// cpal-backed sink. Opened without pulling; the stream starts on `resume`.
pub struct CpalSink {
    stream: Stream,
}

impl OutputSink for CpalSink {
    fn resume(&mut self) -> Result<()> {
        self.stream.play().context("resuming output stream")
    }

    fn pause(&mut self) -> Result<()> {
        self.stream.pause().context("pausing output stream")
    }
}

/// Open the default device and register the pull callback.
pub fn open_sink(
    sample_rate: u32,
    channels: usize,
    mut on_pull: impl FnMut(&mut [f32]) + Send + 'static,
) -> Result<CpalSink> {
    let OutputConfig { device, config } = setup_output_device(sample_rate, channels)?;
    let err_fn = |err| log::error!("output stream error: {err}");

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| on_pull(data),
        err_fn,
        None,
    )?;

    // Hosts differ on whether a fresh stream runs; the engine's pull gate
    // keeps it silent either way, so a failed pause is not fatal here.
    if let Err(err) = stream.pause() {
        log::debug!("could not pause fresh output stream: {err}");
    }

    Ok(CpalSink { stream })
}
