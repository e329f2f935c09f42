// src/source.rs

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// A multi-channel source read in fixed-size planar blocks.
///
/// `read_block` fills one pre-sized buffer per channel and returns the number
/// of frames actually written; a short count means the source is exhausted
/// and no further reads will produce data.
pub trait BlockSource {
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn read_block(&mut self, block: &mut [Vec<f32>]) -> Result<usize>;
}

/// Block source over buffers already decoded into planar memory.
pub struct MemorySource {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    cursor: usize,
}

impl MemorySource {
    /// Channels longer than the shortest one are truncated so every channel
    /// serves the same number of frames.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
            cursor: 0,
        }
    }
}

impl BlockSource for MemorySource {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, block: &mut [Vec<f32>]) -> Result<usize> {
        let want = block.first().map(|b| b.len()).unwrap_or(0);
        let available = self
            .channels
            .first()
            .map(|c| c.len() - self.cursor)
            .unwrap_or(0);
        let frames = want.min(available);

        for (out, channel) in block.iter_mut().zip(self.channels.iter()) {
            out[..frames].copy_from_slice(&channel[self.cursor..self.cursor + frames]);
        }
        self.cursor += frames;
        Ok(frames)
    }
}

/// Block source backed by a symphonia format reader.
///
/// Packets decode into arbitrary-length runs, so decoded frames are staged in
/// a planar FIFO and handed out in exact window-sized blocks.
pub struct FileSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<VecDeque<f32>>,
    exhausted: bool,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let probed = get_probe().format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("no supported audio track")?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .context("source is missing a sample rate")?;
        let channels = track
            .codec_params
            .channels
            .context("source is missing a channel layout")?
            .count();
        if channels == 0 {
            bail!("source reports zero channels");
        }

        let decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            sample_buf: None,
            pending: vec![VecDeque::new(); channels],
            exhausted: false,
        })
    }

    fn buffered(&self) -> usize {
        self.pending.iter().map(|q| q.len()).min().unwrap_or(0)
    }

    /// Decode one more packet into the planar FIFO. End of stream and broken
    /// tail packets mark the source exhausted rather than failing the read.
    fn refill(&mut self) {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                self.exhausted = true;
                return;
            }
            Err(SymphoniaError::IoError(_)) => {
                self.exhausted = true;
                return;
            }
            Err(err) => {
                log::warn!("stopping decode after format error: {err}");
                self.exhausted = true;
                return;
            }
        };

        if packet.track_id() != self.track_id {
            return;
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                if self.sample_buf.is_none() {
                    let capacity = decoded.capacity() as u64;
                    self.sample_buf = Some(SampleBuffer::<f32>::new(capacity, *decoded.spec()));
                }
                if let Some(buf) = self.sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    for frame in buf.samples().chunks_exact(self.channels) {
                        for (queue, &sample) in self.pending.iter_mut().zip(frame.iter()) {
                            queue.push_back(sample);
                        }
                    }
                }
            }
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => {
                // Skip the bad packet and keep going.
            }
            Err(err) => {
                log::warn!("stopping decode after decoder error: {err}");
                self.exhausted = true;
            }
        }
    }
}

impl BlockSource for FileSource {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, block: &mut [Vec<f32>]) -> Result<usize> {
        let want = block.first().map(|b| b.len()).unwrap_or(0);
        while !self.exhausted && self.buffered() < want {
            self.refill();
        }

        let frames = self.buffered().min(want);
        for (out, queue) in block.iter_mut().zip(self.pending.iter_mut()) {
            for slot in out.iter_mut().take(frames) {
                *slot = queue.pop_front().unwrap_or(0.0);
            }
        }
        Ok(frames)
    }
}
