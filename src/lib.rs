// src/lib.rs

pub mod audio;
pub mod engine;
pub mod heartbeat;
pub mod source;
pub mod spectrum;

pub use audio::{CpalSink, OutputSink};
pub use engine::{SoundEngine, TrackInfo};
pub use heartbeat::Heartbeat;
pub use source::{BlockSource, FileSource, MemorySource};
pub use spectrum::{SpectrumAnalyzer, WINDOW_SIZE};
