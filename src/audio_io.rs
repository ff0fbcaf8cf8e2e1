use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, ProbeResult};
use symphonia::default::{get_codecs, get_probe};

use crate::error::LoadError;

pub const SUPPORTED_EXTS: &[&str] = &["wav", "mp3", "m4a", "mp4", "aac", "ogg", "flac"];

/// Fully decoded PCM at the file's native sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>, // per-channel samples in [-1, 1]
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTS.iter().any(|e| ext.eq_ignore_ascii_case(e))
}

pub fn is_supported_audio_path(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(is_supported_extension)
        .unwrap_or(false)
}

fn io_trace(event: &str, path: &Path, sample_rate: u32, channels: usize, frames: usize) {
    log::debug!(
        "io_trace event={event} path=\"{}\" sr={sample_rate} ch={channels} frames={frames}",
        path.display()
    );
}

fn sanitize_non_finite(path: &Path, channels: &mut [Vec<f32>]) {
    let mut replaced = 0usize;
    for ch in channels.iter_mut() {
        for v in ch.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
                replaced += 1;
            }
        }
    }
    if replaced > 0 {
        log::warn!(
            "io_pcm_sanitize path=\"{}\" replaced_non_finite={replaced}",
            path.display()
        );
    }
}

fn open_file(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => LoadError::Missing {
            path: path.to_path_buf(),
        },
        _ => LoadError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    })
}

type OpenedDecoder = (
    Box<dyn symphonia::core::formats::FormatReader>,
    Box<dyn symphonia::core::codecs::Decoder>,
    u32,
    u32,
);

fn open_decoder(path: &Path) -> Result<OpenedDecoder, LoadError> {
    let ext_hint = path.extension().and_then(|s| s.to_str());
    let probe_once = |hint_ext: Option<&str>| -> Result<ProbeResult, LoadError> {
        let file = open_file(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = hint_ext {
            hint.with_extension(ext);
        }
        get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| LoadError::Unsupported {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
    };
    // A wrong extension should not hide a readable container.
    let probed = match probe_once(ext_hint) {
        Ok(v) => v,
        Err(LoadError::Unsupported { .. }) if ext_hint.is_some() => probe_once(None)?,
        Err(err) => return Err(err),
    };
    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| LoadError::Unsupported {
            path: path.to_path_buf(),
            reason: "no default track".to_string(),
        })?
        .clone();
    let decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| LoadError::Unsupported {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    let sample_rate_hint = track.codec_params.sample_rate.unwrap_or(0);
    Ok((format, decoder, track.id, sample_rate_hint))
}

fn corrupt(path: &Path, err: SymphoniaError) -> LoadError {
    LoadError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Decode the whole default track into per-channel buffers.
///
/// Isolated bad packets are skipped; a stream that yields no frames at all is
/// reported as [`LoadError::Empty`] (or `Corrupt` if every packet failed).
pub fn decode_audio_multi(path: &Path) -> Result<DecodedAudio, LoadError> {
    let (mut format, mut decoder, track_id, mut sample_rate) = open_decoder(path)?;
    let mut chans: Vec<Vec<f32>> = Vec::new();
    let mut decode_errors = 0u32;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::DecodeError(_)) => {
                decode_errors = decode_errors.saturating_add(1);
                continue;
            }
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(corrupt(path, err)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                decode_errors = decode_errors.saturating_add(1);
                continue;
            }
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(corrupt(path, err)),
        };
        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        let channels = decoded.spec().channels.count().max(1);
        if chans.is_empty() {
            chans = vec![Vec::new(); channels];
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks(channels) {
            for (ci, &v) in frame.iter().enumerate() {
                if let Some(ch) = chans.get_mut(ci) {
                    ch.push(v);
                }
            }
        }
    }
    let frames = chans.first().map(|c| c.len()).unwrap_or(0);
    if frames == 0 {
        if decode_errors > 0 {
            return Err(LoadError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("{decode_errors} undecodable packets"),
            });
        }
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    if sample_rate == 0 {
        return Err(LoadError::Corrupt {
            path: path.to_path_buf(),
            reason: "unknown sample rate".to_string(),
        });
    }
    if decode_errors > 0 {
        log::warn!(
            "decode_skipped path=\"{}\" errors={decode_errors}",
            path.display()
        );
    }
    sanitize_non_finite(path, &mut chans);
    io_trace("decode_multi", path, sample_rate, chans.len(), frames);
    Ok(DecodedAudio {
        channels: chans,
        sample_rate,
    })
}
