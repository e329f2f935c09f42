// src/engine/transport.rs

use std::time::Instant;

use crate::engine::store::TrackStore;
use crate::heartbeat::Heartbeat;

/// Mutable playback state, serialized under the engine's single mutex.
///
/// `pulling` is the sink gate: the device stream keeps invoking the callback,
/// and a closed gate means it receives deterministic silence. The watchdog
/// and end-of-stream close the gate from inside the callback; `start`/`stop`
/// toggle it from the controller side.
pub struct Transport {
    pub position: usize,
    pub playing: bool,
    pub pulling: bool,
    pub heartbeat: Heartbeat,
    scratch: Vec<f32>,
}

impl Transport {
    pub fn new(now: Instant) -> Self {
        Self {
            position: 0,
            playing: false,
            pulling: false,
            heartbeat: Heartbeat::new(now),
            scratch: Vec::new(),
        }
    }

    pub fn reset_for_output(&mut self, callback_len: usize) {
        self.position = 0;
        self.playing = false;
        self.pulling = false;
        self.scratch = vec![0.0; callback_len];
    }

    /// Body of the output callback: fill `out` (interleaved f32) from the
    /// store and advance the position. Runs for the whole callback under the
    /// engine lock; never fails, always leaves `out` fully defined.
    pub fn mix_into(&mut self, store: &TrackStore, out: &mut [f32], now: Instant) {
        out.fill(0.0);

        if self.heartbeat.enabled() {
            if self.heartbeat.should_mute(now) {
                // Liveness lost: mute without touching the playing flag, so a
                // fresh signal resumes from the same position.
                self.pulling = false;
                return;
            }
            if self.playing {
                self.pulling = true;
            }
        }

        if !self.playing || !self.pulling {
            return;
        }

        if self.position >= store.sample_count() {
            self.playing = false;
            self.pulling = false;
            return;
        }

        let channel_count = store.channel_count();
        let frames = out.len() / channel_count;
        let remaining = store.sample_count() - self.position;
        let produced = frames.min(remaining);

        if self.scratch.len() != out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let channels = store.channels();
        for frame in 0..produced {
            let base = frame * channel_count;
            for (ch, samples) in channels.iter().enumerate() {
                self.scratch[base + ch] = samples[self.position + frame];
            }
        }
        for slot in self.scratch[produced * channel_count..].iter_mut() {
            *slot = 0.0;
        }

        // Full-volume additive mix; with a single source this is a copy, but
        // the destination stays mixable.
        for (slot, &sample) in out.iter_mut().zip(self.scratch.iter()) {
            *slot += sample;
        }

        self.position += produced;
        if self.position >= store.sample_count() {
            self.playing = false;
            self.pulling = false;
        }
    }
}
