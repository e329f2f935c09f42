// src/engine/mod.rs

pub mod store;
pub(crate) mod transport;

pub use store::TrackStore;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::audio::{self, OutputSink};
use crate::source::{BlockSource, FileSource};
use crate::spectrum::{SpectrumAnalyzer, WINDOW_SIZE};
use transport::Transport;

/// Pre-size for the callback scratch buffer, in interleaved samples; the
/// first callback resizes if the device uses a different period.
const SCRATCH_PRESIZE: usize = 4096;

/// Loaded track summary, serializable for display or JSON dumps.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackInfo {
    pub sample_count: usize,
    pub sample_rate: u32,
    pub channel_count: usize,
    pub block_count: usize,
    pub window_size: usize,
    pub duration_secs: f64,
}

/// State shared between the controller and the output callback. The store is
/// immutable after construction and read without locking; everything mutable
/// lives behind the one transport mutex.
struct Shared {
    store: TrackStore,
    transport: Mutex<Transport>,
}

/// In-memory playback engine over one decoded multi-channel track.
///
/// Construction ingests the whole file and computes a spectrum block per
/// channel per analysis window. Construction failures leave the engine in a
/// permanently unusable state that every operation reports through sentinel
/// returns; nothing panics across the engine boundary.
pub struct SoundEngine {
    shared: Option<Arc<Shared>>,
    output: Option<Box<dyn OutputSink>>,
}

impl SoundEngine {
    /// Decode `path` into memory and analyze it. Never fails outright: check
    /// `is_loaded` afterwards.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match FileSource::open(path) {
            Ok(source) => Self::from_source(source),
            Err(err) => {
                log::error!("could not open {}: {err:#}", path.display());
                Self::unusable()
            }
        }
    }

    /// Same contract as `new` over any block source.
    pub fn from_source<S: BlockSource>(mut source: S) -> Self {
        let mut analyzer = SpectrumAnalyzer::new(WINDOW_SIZE);
        match TrackStore::ingest(&mut source, &mut analyzer) {
            Ok(store) => Self {
                shared: Some(Arc::new(Shared {
                    store,
                    transport: Mutex::new(Transport::new(Instant::now())),
                })),
                output: None,
            },
            Err(err) => {
                log::error!("ingestion failed: {err:#}");
                Self::unusable()
            }
        }
    }

    fn unusable() -> Self {
        Self {
            shared: None,
            output: None,
        }
    }

    fn require_loaded(&self) -> Result<Arc<Shared>> {
        self.shared
            .clone()
            .ok_or_else(|| anyhow!("no track is loaded"))
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.is_some()
    }

    // --- QUERIES (lock-free over the immutable store) ---

    pub fn sample_count(&self) -> usize {
        self.shared
            .as_ref()
            .map(|s| s.store.sample_count())
            .unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared
            .as_ref()
            .map(|s| s.store.sample_rate())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.shared
            .as_ref()
            .map(|s| s.store.channel_count())
            .unwrap_or(0)
    }

    pub fn window_size(&self) -> usize {
        self.shared
            .as_ref()
            .map(|s| s.store.window_size())
            .unwrap_or(0)
    }

    pub fn channel_samples(&self, channel: usize) -> Option<&[f32]> {
        self.shared.as_ref()?.store.channel_samples(channel)
    }

    pub fn spectrum_at(&self, channel: usize, position: usize) -> Option<&[f32]> {
        self.shared.as_ref()?.store.spectrum_at(channel, position)
    }

    pub fn channel_energy(&self, channel: usize, position: usize) -> Option<f32> {
        self.shared.as_ref()?.store.channel_energy(channel, position)
    }

    pub fn info(&self) -> Option<TrackInfo> {
        let store = &self.shared.as_ref()?.store;
        Some(TrackInfo {
            sample_count: store.sample_count(),
            sample_rate: store.sample_rate(),
            channel_count: store.channel_count(),
            block_count: store.block_count(),
            window_size: store.window_size(),
            duration_secs: store.sample_count() as f64 / store.sample_rate().max(1) as f64,
        })
    }

    // --- OUTPUT LIFECYCLE ---

    /// Open the default output device at the track's sample rate and channel
    /// count with f32 samples, and register the pull callback. The device
    /// stays silent until `start`. On failure the engine keeps no output and
    /// the call may be retried.
    pub fn prepare_output(&mut self) -> Result<()> {
        let shared = self.require_loaded()?;
        if self.output.is_some() {
            return Err(anyhow!("output is already prepared; close it first"));
        }

        let pull_shared = shared.clone();
        let sink = audio::open_sink(
            shared.store.sample_rate(),
            shared.store.channel_count(),
            move |data: &mut [f32]| match pull_shared.transport.lock() {
                Ok(mut t) => t.mix_into(&pull_shared.store, data, Instant::now()),
                Err(_) => data.fill(0.0),
            },
        )?;
        self.attach_sink(Box::new(sink), shared)
    }

    /// Attach a pre-built sink that pulls via `render`. The seam for
    /// alternative backends and tests.
    pub fn prepare_output_with(&mut self, sink: Box<dyn OutputSink>) -> Result<()> {
        let shared = self.require_loaded()?;
        if self.output.is_some() {
            return Err(anyhow!("output is already prepared; close it first"));
        }
        self.attach_sink(sink, shared)
    }

    fn attach_sink(&mut self, sink: Box<dyn OutputSink>, shared: Arc<Shared>) -> Result<()> {
        {
            let mut t = shared
                .transport
                .lock()
                .map_err(|_| anyhow!("engine state lock poisoned"))?;
            t.reset_for_output(SCRATCH_PRESIZE);
        }
        self.output = Some(sink);
        Ok(())
    }

    /// Release the output device. Refused while playing.
    pub fn close_output(&mut self) -> Result<()> {
        let shared = self.require_loaded()?;
        if self.output.is_none() {
            return Err(anyhow!("output is not ready"));
        }
        let t = shared
            .transport
            .lock()
            .map_err(|_| anyhow!("engine state lock poisoned"))?;
        if t.playing {
            return Err(anyhow!("stream is playing; stop it before closing output"));
        }
        drop(t);
        // Dropping the sink closes the device stream.
        self.output = None;
        Ok(())
    }

    pub fn is_output_ready(&self) -> bool {
        self.output.is_some()
    }

    // --- TRANSPORT ---

    /// Resume playback from the current position. A no-op when already
    /// playing; changing position mid-play takes `start_at`.
    pub fn start(&mut self) -> Result<()> {
        let shared = self.require_loaded()?;
        let sink = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow!("output is not ready; call prepare_output first"))?;
        {
            let t = shared
                .transport
                .lock()
                .map_err(|_| anyhow!("engine state lock poisoned"))?;
            if t.playing {
                return Ok(());
            }
        }
        sink.resume()?;
        let mut t = shared
            .transport
            .lock()
            .map_err(|_| anyhow!("engine state lock poisoned"))?;
        t.playing = true;
        t.pulling = true;
        Ok(())
    }

    /// Seek to `position` and play from there, also while already playing.
    /// Fails without side effects when the target is past the end.
    pub fn start_at(&mut self, position: usize) -> Result<()> {
        let shared = self.require_loaded()?;
        if position >= shared.store.sample_count() {
            return Err(anyhow!(
                "start position {position} is past the end of the stream"
            ));
        }
        let sink = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow!("output is not ready; call prepare_output first"))?;
        sink.resume()?;
        let mut t = shared
            .transport
            .lock()
            .map_err(|_| anyhow!("engine state lock poisoned"))?;
        t.position = position;
        t.playing = true;
        t.pulling = true;
        Ok(())
    }

    /// Pause playback, keeping the position. Fails when already stopped.
    pub fn stop(&mut self) -> Result<()> {
        let shared = self.require_loaded()?;
        let sink = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow!("output is not ready"))?;
        {
            let t = shared
                .transport
                .lock()
                .map_err(|_| anyhow!("engine state lock poisoned"))?;
            if !t.playing {
                return Err(anyhow!("stream is already stopped"));
            }
        }
        sink.pause()?;
        let mut t = shared
            .transport
            .lock()
            .map_err(|_| anyhow!("engine state lock poisoned"))?;
        t.playing = false;
        t.pulling = false;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.shared
            .as_ref()
            .and_then(|s| s.transport.lock().ok().map(|t| t.playing))
            .unwrap_or(false)
    }

    pub fn position(&self) -> usize {
        self.shared
            .as_ref()
            .and_then(|s| s.transport.lock().ok().map(|t| t.position))
            .unwrap_or(0)
    }

    /// Pull entry point for sinks: fill `out` with the next interleaved
    /// samples, or silence. Never fails; a poisoned lock degrades to silence.
    pub fn render(&self, out: &mut [f32]) {
        match &self.shared {
            Some(shared) => match shared.transport.lock() {
                Ok(mut t) => t.mix_into(&shared.store, out, Instant::now()),
                Err(_) => out.fill(0.0),
            },
            None => out.fill(0.0),
        }
    }

    // --- HEARTBEAT ---

    /// Arm or disarm the dead-man switch. `threshold_ms` of 0 keeps the
    /// previous threshold (500 ms until set).
    pub fn set_heartbeat(&self, enabled: bool, threshold_ms: u64) {
        if let Some(shared) = &self.shared {
            if let Ok(mut t) = shared.transport.lock() {
                t.heartbeat.set_active(enabled, threshold_ms, Instant::now());
            }
        }
    }

    pub fn is_heartbeat_enabled(&self) -> bool {
        self.shared
            .as_ref()
            .and_then(|s| s.transport.lock().ok().map(|t| t.heartbeat.enabled()))
            .unwrap_or(false)
    }

    /// Liveness signal from the controlling context. Stored only while the
    /// watchdog is armed and playback is active; otherwise a no-op.
    pub fn heartbeat(&self) {
        if let Some(shared) = &self.shared {
            if let Ok(mut t) = shared.transport.lock() {
                if t.playing && t.heartbeat.enabled() {
                    t.heartbeat.signal(Instant::now());
                }
            }
        }
    }
}
