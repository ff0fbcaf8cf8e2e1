use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use atomic_float::{AtomicF32, AtomicF64};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use signalsmith_stretch::Stretch;

pub const MIN_RATE: f32 = 0.3;
pub const MAX_RATE: f32 = 1.5;

#[derive(Debug)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>, // per-channel samples at the output rate
    pub source_rate: u32,        // sample rate of the asset these samples came from
}

impl AudioBuffer {
    pub fn from_channels(channels: Vec<Vec<f32>>, source_rate: u32) -> Self {
        let channels = if channels.is_empty() {
            vec![Vec::new()]
        } else {
            channels
        };
        Self {
            channels,
            source_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len().max(1)
    }

    fn sample(&self, ch: usize, i: usize) -> f32 {
        self.channels
            .get(ch)
            .and_then(|c| c.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    fn interleave_into(&self, from: usize, to: usize, out: &mut Vec<f32>) {
        for i in from..to {
            for ch in 0..self.channel_count() {
                out.push(self.sample(ch, i));
            }
        }
    }
}

/// Largest callback block the stretch buffers are sized for up front.
const MAX_BLOCK_FRAMES: usize = 8192;

/// State shared between the control thread and the audio callback.
///
/// Seeks are requested by writing `seek_target` and bumping `seek_gen`; the
/// callback is the only writer of `play_pos` and `seek_origin`.
///
/// A new [`Stretcher`] is parked in `stretcher_slot` and announced by bumping
/// `stretcher_gen`. The callback swaps it with its own, so the previous one
/// is dropped on the control thread by the next install.
pub struct SharedAudio {
    pub samples: ArcSwapOption<AudioBuffer>,
    pub vol: AtomicF32, // 0.0..1.0 linear gain
    pub rate: AtomicF32, // tempo, pitch preserved
    pub playing: AtomicBool,
    pub play_pos: AtomicF64, // output-rate frames, fractional
    pub seek_origin: AtomicF64,
    pub seek_target: AtomicF64,
    pub seek_gen: AtomicU64,
    pub applied_seek_gen: AtomicU64,
    stretcher_slot: Mutex<Option<Stretcher>>,
    stretcher_gen: AtomicU64,
    pub out_channels: usize,
    pub out_sample_rate: u32,
}

/// Time-stretcher for one channel layout, with its scratch buffers sized for
/// `MAX_BLOCK_FRAMES` at the fastest rate.
struct Stretcher {
    stretch: Stretch,
    channels: usize,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl Stretcher {
    fn new(channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let stretch = Stretch::preset_default(channels as u32, sample_rate);
        let max_in = (MAX_BLOCK_FRAMES as f32 * MAX_RATE).ceil() as usize + 1;
        let in_frames = stretch.input_latency().max(max_in);
        Self {
            stretch,
            channels,
            input: Vec::with_capacity(in_frames * channels),
            output: Vec::with_capacity(MAX_BLOCK_FRAMES * channels),
        }
    }

    /// Run `[from, to)` of `buf` through the stretcher into `frames` output
    /// frames, interleaved in `self.output`.
    fn process(
        &mut self,
        buf: &AudioBuffer,
        from: usize,
        to: usize,
        frames: usize,
        rate: f64,
        primed: &mut bool,
    ) {
        let Stretcher {
            stretch,
            channels,
            input,
            output,
        } = self;
        if !*primed {
            // Pre-roll so the stretched output starts aligned with the seek point.
            stretch.reset();
            let in_lat = stretch.input_latency();
            input.clear();
            buf.interleave_into(from, (from + in_lat).min(buf.len()), input);
            input.resize(in_lat * *channels, 0.0);
            stretch.seek(&input[..], rate);
            *primed = true;
        }
        input.clear();
        buf.interleave_into(from, to, input);
        output.clear();
        output.resize(frames * *channels, 0.0);
        stretch.process(&input[..], &mut output[..]);
    }
}

#[derive(Default)]
struct RenderState {
    stretcher: Option<Stretcher>,
    stretcher_gen: u64,
    primed: bool,
    seek_gen: u64,
}

impl RenderState {
    /// Pick up a stretcher installed by the control thread. Never blocks;
    /// a contended slot is retried on the next block.
    fn adopt_stretcher(&mut self, shared: &SharedAudio) {
        if shared.stretcher_gen.load(Ordering::Acquire) == self.stretcher_gen {
            return;
        }
        let Ok(mut slot) = shared.stretcher_slot.try_lock() else {
            return;
        };
        std::mem::swap(&mut *slot, &mut self.stretcher);
        self.stretcher_gen = shared.stretcher_gen.load(Ordering::Acquire);
        self.primed = false;
    }
}

fn map_channel(out_ch: usize, src_channels: usize) -> usize {
    if src_channels == 1 {
        0
    } else if out_ch < src_channels {
        out_ch
    } else {
        src_channels - 1
    }
}

/// Fill one interleaved output block. Advances the play position by
/// `frames * rate` source frames while playing.
fn render_block(shared: &SharedAudio, state: &mut RenderState, out: &mut [f32]) {
    out.fill(0.0);
    state.adopt_stretcher(shared);
    let seek_gen = shared.seek_gen.load(Ordering::Acquire);
    if seek_gen != state.seek_gen {
        let target = shared.seek_target.load(Ordering::Relaxed);
        shared.play_pos.store(target, Ordering::Relaxed);
        shared.seek_origin.store(target, Ordering::Relaxed);
        shared.applied_seek_gen.store(seek_gen, Ordering::Release);
        state.seek_gen = seek_gen;
        state.primed = false;
    }
    if !shared.playing.load(Ordering::Relaxed) {
        return;
    }
    let channels = shared.out_channels.max(1);
    let frames = out.len() / channels;
    let maybe_samples = shared.samples.load();
    let Some(buf) = maybe_samples.as_ref() else {
        return;
    };
    let len = buf.len();
    let mut pos = shared.play_pos.load(Ordering::Relaxed);
    if !pos.is_finite() || pos < 0.0 {
        pos = 0.0;
    }
    if frames == 0 || pos >= len as f64 {
        return;
    }
    let rate = shared.rate.load(Ordering::Relaxed).clamp(MIN_RATE, MAX_RATE) as f64;
    let vol = shared.vol.load(Ordering::Relaxed);
    let next = (pos + frames as f64 * rate).min(len as f64);
    let i0 = pos.floor() as usize;
    let i1 = (next.floor() as usize).clamp(i0, len);
    let src_channels = buf.channel_count();

    // Without a stretcher for this layout (not yet handed over) play unstretched.
    let stretcher = match state.stretcher.as_mut() {
        Some(s) if (rate - 1.0).abs() >= 1e-6 && s.channels == src_channels => Some(s),
        _ => None,
    };
    match stretcher {
        Some(stretcher) => {
            stretcher.process(buf, i0, i1, frames, rate, &mut state.primed);
            for (frame, src) in out
                .chunks_mut(channels)
                .zip(stretcher.output.chunks(src_channels))
            {
                for (out_ch, s) in frame.iter_mut().enumerate() {
                    *s = src[map_channel(out_ch, src_channels)];
                }
            }
        }
        None => {
            state.primed = false;
            for (k, frame) in out.chunks_mut(channels).enumerate() {
                let i = i0 + k;
                if i >= i1 {
                    break;
                }
                for (out_ch, s) in frame.iter_mut().enumerate() {
                    *s = buf.sample(map_channel(out_ch, src_channels), i);
                }
            }
        }
    }
    for s in out.iter_mut() {
        *s = (*s * vol).clamp(-1.0, 1.0);
    }
    shared.play_pos.store(next, Ordering::Relaxed);
}

pub struct AudioEngine {
    _stream: Option<cpal::Stream>,
    test_render: Option<Mutex<RenderState>>,
    pub shared: Arc<SharedAudio>,
}

impl AudioEngine {
    fn new_shared(out_channels: usize, out_sample_rate: u32) -> Arc<SharedAudio> {
        Arc::new(SharedAudio {
            samples: ArcSwapOption::from(None),
            vol: AtomicF32::new(1.0),
            rate: AtomicF32::new(1.0),
            playing: AtomicBool::new(false),
            play_pos: AtomicF64::new(0.0),
            seek_origin: AtomicF64::new(0.0),
            seek_target: AtomicF64::new(0.0),
            seek_gen: AtomicU64::new(0),
            applied_seek_gen: AtomicU64::new(0),
            stretcher_slot: Mutex::new(None),
            stretcher_gen: AtomicU64::new(0),
            out_channels,
            out_sample_rate,
        })
    }

    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No default output device")?;
        let cfg = device
            .default_output_config()
            .context("No default output config")?;

        let shared = Self::new_shared(cfg.channels() as usize, cfg.sample_rate());
        log::info!(
            "audio_out sr={} ch={} fmt={:?}",
            cfg.sample_rate(),
            cfg.channels(),
            cfg.sample_format()
        );

        let stream = match cfg.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &cfg.into(), shared.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &cfg.into(), shared.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &cfg.into(), shared.clone())?
            }
            _ => anyhow::bail!("Unsupported sample format"),
        };

        Ok(Self {
            _stream: Some(stream),
            test_render: None,
            shared,
        })
    }

    /// Engine without an output device. Audio only advances through
    /// [`AudioEngine::render_for_test`].
    pub fn new_for_test() -> Self {
        Self {
            _stream: None,
            test_render: Some(Mutex::new(RenderState::default())),
            shared: Self::new_shared(2, 48_000),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        cfg: &cpal::StreamConfig,
        shared: Arc<SharedAudio>,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let err_fn = |e| log::error!("cpal stream error: {e}");
        let mut state = RenderState::default();
        let mut scratch: Vec<f32> = Vec::with_capacity(MAX_BLOCK_FRAMES * shared.out_channels);
        let stream = device.build_output_stream(
            cfg,
            move |data: &mut [T], _| {
                scratch.resize(data.len(), 0.0);
                render_block(&shared, &mut state, &mut scratch);
                for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(s);
                }
            },
            err_fn,
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }

    /// Render `frames` output frames on the calling thread, returning the
    /// interleaved block. Returns an empty block on an engine with a device.
    pub fn render_for_test(&self, frames: usize) -> Vec<f32> {
        let Some(state) = self.test_render.as_ref() else {
            return Vec::new();
        };
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = vec![0.0f32; frames * self.shared.out_channels.max(1)];
        render_block(&self.shared, &mut state, &mut out);
        out
    }

    pub fn out_sample_rate(&self) -> u32 {
        self.shared.out_sample_rate
    }

    /// Replace the buffer and rewind to its first frame. The time-stretcher
    /// for the buffer's channel layout is built here, off the render thread.
    pub fn set_samples(&self, samples: Arc<AudioBuffer>) {
        self.install_stretcher(samples.channel_count());
        self.shared.samples.store(Some(samples));
        self.seek_to_frame(0);
    }

    fn install_stretcher(&self, channels: usize) {
        let stretcher = Stretcher::new(channels, self.shared.out_sample_rate);
        let mut slot = self
            .shared
            .stretcher_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(stretcher);
        self.shared.stretcher_gen.fetch_add(1, Ordering::Release);
    }

    pub fn play(&self) {
        if self.shared.samples.load().is_none() {
            return;
        }
        self.shared.playing.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.shared.playing.store(false, Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    /// Restart rendering at `frame`, counted in the asset's own sample rate.
    /// The elapsed-frames clock restarts from zero.
    pub fn seek_to_frame(&self, frame: u64) {
        let target = match self.shared.samples.load().as_ref() {
            Some(buf) if buf.source_rate > 0 => {
                let scale = self.shared.out_sample_rate as f64 / buf.source_rate as f64;
                (frame as f64 * scale).min(buf.len() as f64)
            }
            _ => 0.0,
        };
        self.shared.seek_target.store(target, Ordering::Relaxed);
        self.shared.seek_gen.fetch_add(1, Ordering::Release);
    }

    /// Source frames rendered since the last seek, in the asset's sample rate.
    /// Reads zero until the render side has picked up a pending seek.
    pub fn elapsed_frames(&self) -> u64 {
        let requested = self.shared.seek_gen.load(Ordering::Acquire);
        let applied = self.shared.applied_seek_gen.load(Ordering::Acquire);
        if requested != applied {
            return 0;
        }
        let source_rate = match self.shared.samples.load().as_ref() {
            Some(buf) if buf.source_rate > 0 => buf.source_rate,
            _ => return 0,
        };
        let pos = self.shared.play_pos.load(Ordering::Relaxed);
        let origin = self.shared.seek_origin.load(Ordering::Relaxed);
        let out_frames = (pos - origin).max(0.0);
        let scale = source_rate as f64 / self.shared.out_sample_rate.max(1) as f64;
        (out_frames * scale).round() as u64
    }

    pub fn set_volume(&self, v: f32) {
        self.shared.vol.store(v.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    pub fn set_rate(&self, rate: f32) {
        self.shared
            .rate
            .store(rate.clamp(MIN_RATE, MAX_RATE), Ordering::Relaxed);
    }
}
