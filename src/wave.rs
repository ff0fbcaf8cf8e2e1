pub const DEFAULT_ENVELOPE_BUCKETS: usize = 500;

/// Peak magnitudes for display, tagged with the asset they were computed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformEnvelope {
    pub asset_id: u64,
    pub peaks: Vec<f32>, // each in [0, 1]
}

impl WaveformEnvelope {
    pub fn empty(asset_id: u64) -> Self {
        Self {
            asset_id,
            peaks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// Window width used for `len` samples split into `buckets` windows.
pub fn envelope_window(len: usize, buckets: usize) -> usize {
    (len / buckets.max(1)).max(1)
}

/// Max-abs peak per window of `envelope_window(len, buckets)` samples.
///
/// The output has `ceil(len / window)` entries, so it can be shorter than
/// `buckets` for short inputs and slightly longer or shorter otherwise.
pub fn build_peak_envelope(samples: &[f32], buckets: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let window = envelope_window(samples.len(), buckets);
    samples
        .chunks(window)
        .map(|chunk| {
            chunk
                .iter()
                .filter(|v| v.is_finite())
                .fold(0.0f32, |acc, &v| acc.max(v.abs()))
                .min(1.0)
        })
        .collect()
}

/// Average all channels into one. A single channel is returned as a copy.
pub fn downmix_mono(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [only] => only.clone(),
        _ => {
            let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
            let scale = 1.0 / channels.len() as f32;
            (0..len)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

pub fn resample_linear(mono: &[f32], in_sr: u32, out_sr: u32) -> Vec<f32> {
    if in_sr == out_sr || mono.is_empty() {
        return mono.to_vec();
    }
    if in_sr == 0 || out_sr == 0 {
        return mono.to_vec();
    }
    let ratio = out_sr as f64 / in_sr as f64;
    let out_len = ((mono.len() as f64) * ratio).ceil() as usize;
    if out_len == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(out_len);
    let len = mono.len();
    for i in 0..out_len {
        let src_pos = (i as f64) / ratio;
        let i0 = src_pos.floor() as usize;
        if i0 >= len {
            out.push(mono[len - 1]);
            continue;
        }
        let i1 = (i0 + 1).min(len.saturating_sub(1));
        let t = (src_pos - i0 as f64).clamp(0.0, 1.0) as f32;
        out.push(mono[i0] * (1.0 - t) + mono[i1] * t);
    }
    out
}

pub fn resample_channels(chans: &[Vec<f32>], in_sr: u32, out_sr: u32) -> Vec<Vec<f32>> {
    chans
        .iter()
        .map(|c| resample_linear(c, in_sr, out_sr))
        .collect()
}
