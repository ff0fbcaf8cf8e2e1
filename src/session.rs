//! Playback session: owns the current asset, transport state, loop markers
//! and the published waveform envelope.
//!
//! All methods run on one control thread. Decoding (for [`Session::load_file`])
//! and envelope extraction happen on worker threads and are handed back
//! through channels drained by [`Session::pump`]; results for an asset or job
//! that has since been replaced are dropped.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::audio::{AudioBuffer, AudioEngine, MAX_RATE, MIN_RATE};
use crate::audio_io::{self, DecodedAudio};
use crate::config::PlayerConfig;
use crate::error::LoadError;
use crate::loop_markers::LoopMarkers;
use crate::poller::{evaluate_tick, PositionPoller, TickAction};
use crate::wave::{build_peak_envelope, downmix_mono, resample_channels, WaveformEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Empty,
    Stopped,
    Playing,
    Paused,
}

/// A successfully opened file. Replaced wholesale by the next load.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub id: u64,
    pub path: PathBuf,
    pub sample_rate: f64,
    pub frames: u64,
    pub channels: u16,
}

impl AudioAsset {
    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.frames as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    pub fn frame_at(&self, time: f64) -> u64 {
        (time * self.sample_rate).round().max(0.0) as u64
    }

    pub fn time_at(&self, frame: u64) -> f64 {
        if self.sample_rate > 0.0 {
            frame as f64 / self.sample_rate
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub playback_rate: f32,
    pub volume: f32,
    /// Asset frame the render clock was last restarted from.
    pub seek_offset_frames: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            playback_rate: 1.0,
            volume: 1.0,
            seek_offset_frames: 0,
        }
    }
}

/// Notifications sent to every subscriber after a committed change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Loaded(AudioAsset),
    LoadFailed(String),
    StateChanged(PlayerState),
    Position(f64),
    MarkersChanged(LoopMarkers),
    EnvelopeReady { asset_id: u64, len: usize },
    RateChanged(f32),
    VolumeChanged(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing, or the tick was not due.
    Idle,
    Advanced(f64),
    Wrapped { from: f64, to: f64 },
    Finished,
}

struct PreparedAudio {
    path: PathBuf,
    sample_rate: u32,
    frames: u64,
    channels: u16,
    playback: Arc<AudioBuffer>,
    source: Vec<Vec<f32>>,
}

/// Events queued per subscriber before further ones are dropped.
pub const OBSERVER_QUEUE: usize = 256;

fn prepare_decoded(path: &Path, decoded: DecodedAudio, out_sr: u32) -> PreparedAudio {
    let playback = resample_channels(&decoded.channels, decoded.sample_rate, out_sr);
    PreparedAudio {
        path: path.to_path_buf(),
        sample_rate: decoded.sample_rate,
        frames: decoded.frames() as u64,
        channels: decoded.channel_count() as u16,
        playback: Arc::new(AudioBuffer::from_channels(playback, decoded.sample_rate)),
        source: decoded.channels,
    }
}

fn prepare_audio(path: &Path, out_sr: u32) -> Result<PreparedAudio, LoadError> {
    let decoded = audio_io::decode_audio_multi(path)?;
    Ok(prepare_decoded(path, decoded, out_sr))
}

/// Worker body for [`Session::load_file`]. Returns `None` once a newer load
/// has been requested, skipping the resample of a result nobody will use.
fn prepare_for_job(
    path: &Path,
    out_sr: u32,
    job_id: u64,
    latest_job: &AtomicU64,
) -> Option<Result<PreparedAudio, LoadError>> {
    let decoded = audio_io::decode_audio_multi(path);
    if latest_job.load(Ordering::Acquire) != job_id {
        log::debug!("load_stale job={job_id} path=\"{}\"", path.display());
        return None;
    }
    Some(decoded.map(|d| prepare_decoded(path, d, out_sr)))
}

/// Run an envelope computation for `asset_id`. A panicking job yields an
/// empty envelope that still carries the asset id.
fn run_envelope_job(asset_id: u64, job: impl FnOnce() -> Vec<f32>) -> WaveformEnvelope {
    let peaks = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
        log::warn!("envelope_failed id={asset_id}");
        Vec::new()
    });
    WaveformEnvelope { asset_id, peaks }
}

struct LoadResult {
    job_id: u64,
    result: Result<PreparedAudio, LoadError>,
}

struct PendingLoad {
    path: PathBuf,
    rx: Receiver<LoadResult>,
}

pub struct Session {
    engine: AudioEngine,
    state: PlayerState,
    asset: Option<AudioAsset>,
    playback: PlaybackState,
    markers: LoopMarkers,
    envelope: Arc<ArcSwap<WaveformEnvelope>>,
    envelope_buckets: usize,
    envelope_tx: Sender<WaveformEnvelope>,
    envelope_rx: Receiver<WaveformEnvelope>,
    envelope_pending: Option<u64>,
    poller: PositionPoller,
    next_asset_id: u64,
    load_job: Arc<AtomicU64>,
    pending_load: Option<PendingLoad>,
    last_error: Option<String>,
    observers: Vec<SyncSender<SessionEvent>>,
}

impl Session {
    pub fn new(engine: AudioEngine, config: &PlayerConfig) -> Self {
        let (envelope_tx, envelope_rx) = mpsc::channel();
        let playback = PlaybackState {
            playback_rate: config.initial_rate(),
            volume: config.initial_volume(),
            ..PlaybackState::default()
        };
        engine.set_rate(playback.playback_rate);
        engine.set_volume(playback.volume);
        Self {
            engine,
            state: PlayerState::Empty,
            asset: None,
            playback,
            markers: LoopMarkers::new(),
            envelope: Arc::new(ArcSwap::from_pointee(WaveformEnvelope::default())),
            envelope_buckets: config.envelope_buckets(),
            envelope_tx,
            envelope_rx,
            envelope_pending: None,
            poller: PositionPoller::new(config.tick_interval()),
            next_asset_id: 0,
            load_job: Arc::new(AtomicU64::new(0)),
            pending_load: None,
            last_error: None,
            observers: Vec::new(),
        }
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn asset(&self) -> Option<&AudioAsset> {
        self.asset.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.asset.as_ref().map(|a| a.duration()).unwrap_or(0.0)
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn markers(&self) -> &LoopMarkers {
        &self.markers
    }

    pub fn envelope(&self) -> Arc<WaveformEnvelope> {
        self.envelope.load_full()
    }

    /// Shared handle for readers on other threads.
    pub fn envelope_slot(&self) -> Arc<ArcSwap<WaveformEnvelope>> {
        Arc::clone(&self.envelope)
    }

    pub fn is_envelope_pending(&self) -> bool {
        self.envelope_pending.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// New event stream. Each subscriber buffers up to [`OBSERVER_QUEUE`]
    /// events; while full, newer events are dropped for that subscriber only.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::sync_channel(OBSERVER_QUEUE);
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn next_job_id(&self) -> u64 {
        self.load_job.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn set_state(&mut self, state: PlayerState) {
        self.playback.is_playing = state == PlayerState::Playing;
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    // ---- loading -------------------------------------------------------

    /// Decode `path` on a worker thread. The result is applied by a later
    /// [`Session::pump`]; a newer load supersedes this one.
    pub fn load_file(&mut self, path: impl Into<PathBuf>) -> u64 {
        let path = path.into();
        let job_id = self.next_job_id();
        let out_sr = self.engine.out_sample_rate();
        let (tx, rx) = mpsc::channel::<LoadResult>();
        let worker_path = path.clone();
        let latest_job = Arc::clone(&self.load_job);
        std::thread::spawn(move || {
            if let Some(result) = prepare_for_job(&worker_path, out_sr, job_id, &latest_job) {
                let _ = tx.send(LoadResult { job_id, result });
            }
        });
        log::debug!("load_queued job={job_id} path=\"{}\"", path.display());
        self.pending_load = Some(PendingLoad { path, rx });
        job_id
    }

    /// Decode and apply `path` on the calling thread. On failure nothing but
    /// the error message changes.
    pub fn load_file_blocking(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        self.next_job_id();
        self.pending_load = None;
        match prepare_audio(path.as_ref(), self.engine.out_sample_rate()) {
            Ok(prepared) => {
                self.apply_prepared(prepared);
                Ok(())
            }
            Err(err) => {
                self.fail_load(&err);
                Err(err)
            }
        }
    }

    fn apply_prepared(&mut self, prepared: PreparedAudio) {
        self.engine.stop();
        self.poller.stop();
        self.next_asset_id = self.next_asset_id.wrapping_add(1);
        let asset = AudioAsset {
            id: self.next_asset_id,
            path: prepared.path,
            sample_rate: prepared.sample_rate as f64,
            frames: prepared.frames,
            channels: prepared.channels,
        };
        self.engine.set_samples(prepared.playback);
        self.playback.current_time = 0.0;
        self.playback.seek_offset_frames = 0;
        self.markers.reset();
        self.envelope
            .store(Arc::new(WaveformEnvelope::empty(asset.id)));
        self.spawn_envelope(asset.id, prepared.source);
        self.last_error = None;
        log::info!(
            "load_ok id={} path=\"{}\" sr={} ch={} frames={}",
            asset.id,
            asset.path.display(),
            asset.sample_rate,
            asset.channels,
            asset.frames
        );
        self.asset = Some(asset.clone());
        self.set_state(PlayerState::Stopped);
        self.emit(SessionEvent::Loaded(asset));
        self.emit(SessionEvent::MarkersChanged(self.markers));
        self.emit(SessionEvent::Position(0.0));
    }

    fn fail_load(&mut self, err: &LoadError) {
        let message = err.to_string();
        log::warn!("load_failed path=\"{}\" err=\"{message}\"", err.path().display());
        self.last_error = Some(message.clone());
        self.emit(SessionEvent::LoadFailed(message));
    }

    fn spawn_envelope(&mut self, asset_id: u64, source: Vec<Vec<f32>>) {
        self.envelope_pending = Some(asset_id);
        let buckets = self.envelope_buckets;
        let tx = self.envelope_tx.clone();
        std::thread::spawn(move || {
            let env = run_envelope_job(asset_id, || {
                build_peak_envelope(&downmix_mono(&source), buckets)
            });
            let _ = tx.send(env);
        });
    }

    /// Publish `env` if it belongs to the current asset; stale results are dropped.
    fn apply_envelope(&mut self, env: WaveformEnvelope) -> bool {
        let current = self.asset.as_ref().map(|a| a.id);
        if current != Some(env.asset_id) {
            log::debug!("envelope_stale id={} current={current:?}", env.asset_id);
            return false;
        }
        if self.envelope_pending == Some(env.asset_id) {
            self.envelope_pending = None;
        }
        let asset_id = env.asset_id;
        let len = env.peaks.len();
        self.envelope.store(Arc::new(env));
        self.emit(SessionEvent::EnvelopeReady { asset_id, len });
        true
    }

    /// Apply finished background work (decode and envelope results).
    pub fn pump(&mut self) {
        let mut finished: Option<Result<LoadResult, PathBuf>> = None;
        if let Some(pending) = &self.pending_load {
            match pending.rx.try_recv() {
                Ok(res) => finished = Some(Ok(res)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = Some(Err(pending.path.clone())),
            }
        }
        match finished {
            Some(Ok(res)) => {
                self.pending_load = None;
                if res.job_id == self.load_job.load(Ordering::Acquire) {
                    match res.result {
                        Ok(prepared) => self.apply_prepared(prepared),
                        Err(err) => self.fail_load(&err),
                    }
                }
            }
            Some(Err(path)) => {
                self.pending_load = None;
                self.fail_load(&LoadError::Corrupt {
                    path,
                    reason: "decoder stopped unexpectedly".to_string(),
                });
            }
            None => {}
        }
        while let Ok(env) = self.envelope_rx.try_recv() {
            self.apply_envelope(env);
        }
    }

    // ---- transport -----------------------------------------------------

    pub fn play(&mut self) {
        let Some(asset) = &self.asset else {
            log::debug!("play ignored: no asset");
            return;
        };
        if self.state == PlayerState::Playing {
            return;
        }
        let frame = asset.frame_at(self.playback.current_time);
        self.playback.seek_offset_frames = frame;
        self.engine.seek_to_frame(frame);
        self.engine.play();
        self.poller.start(Instant::now());
        self.set_state(PlayerState::Playing);
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let t = self.clock_time().min(self.duration());
        self.engine.stop();
        self.poller.stop();
        self.playback.current_time = t;
        self.set_state(PlayerState::Paused);
        self.emit(SessionEvent::Position(t));
    }

    pub fn toggle_play_pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Move to `t` seconds (clamped to the asset). Keeps the current
    /// playing/paused state.
    pub fn seek(&mut self, t: f64) {
        let Some(asset) = &self.asset else {
            log::debug!("seek ignored: no asset");
            return;
        };
        let t = if t.is_finite() { t } else { 0.0 };
        let t = t.clamp(0.0, asset.duration());
        let frame = asset.frame_at(t);
        self.playback.seek_offset_frames = frame;
        self.engine.seek_to_frame(frame);
        self.playback.current_time = t;
        self.emit(SessionEvent::Position(t));
    }

    pub fn jump_to_start(&mut self) {
        let target = self.markers.start().unwrap_or(0.0);
        self.seek(target);
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        if !rate.is_finite() {
            return;
        }
        let rate = rate.clamp(MIN_RATE, MAX_RATE);
        self.engine.set_rate(rate);
        if self.playback.playback_rate != rate {
            self.playback.playback_rate = rate;
            self.emit(SessionEvent::RateChanged(rate));
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.engine.set_volume(volume);
        if self.playback.volume != volume {
            self.playback.volume = volume;
            self.emit(SessionEvent::VolumeChanged(volume));
        }
    }

    // ---- loop markers --------------------------------------------------

    pub fn set_clicked_time(&mut self, t: f64) {
        let Some(asset) = &self.asset else {
            return;
        };
        let duration = asset.duration();
        self.markers.set_clicked_time(t, duration);
        self.emit(SessionEvent::MarkersChanged(self.markers));
    }

    pub fn commit_start(&mut self) {
        if self.markers.commit_start() {
            self.emit(SessionEvent::MarkersChanged(self.markers));
        }
    }

    pub fn commit_end(&mut self) {
        if self.markers.commit_end() {
            self.emit(SessionEvent::MarkersChanged(self.markers));
        }
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
        self.emit(SessionEvent::MarkersChanged(self.markers));
    }

    // ---- position polling ----------------------------------------------

    fn clock_time(&self) -> f64 {
        match &self.asset {
            Some(asset) => {
                asset.time_at(self.engine.elapsed_frames() + self.playback.seek_offset_frames)
            }
            None => 0.0,
        }
    }

    /// One poller step: sample the render clock, then publish the position,
    /// wrap the loop, or finish the track. Does nothing unless playing.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != PlayerState::Playing {
            return TickOutcome::Idle;
        }
        let duration = self.duration();
        let now = self.clock_time();
        match evaluate_tick(now, &self.markers, duration) {
            TickAction::WrapTo(start) => {
                log::debug!("loop_wrap from={now:.3} to={start:.3}");
                self.seek(start);
                TickOutcome::Wrapped {
                    from: now,
                    to: start,
                }
            }
            TickAction::EndOfTrack => {
                self.finish_track();
                TickOutcome::Finished
            }
            TickAction::Publish(t) => {
                self.playback.current_time = t;
                self.emit(SessionEvent::Position(t));
                TickOutcome::Advanced(t)
            }
        }
    }

    fn finish_track(&mut self) {
        log::debug!("track_end duration={:.3}", self.duration());
        self.engine.stop();
        self.poller.stop();
        self.playback.current_time = 0.0;
        self.playback.seek_offset_frames = 0;
        self.engine.seek_to_frame(0);
        self.set_state(PlayerState::Stopped);
        self.emit(SessionEvent::Position(0.0));
    }

    /// Cooperative scheduler step: drain background results, then run a
    /// poller tick if one is due at `now`.
    pub fn update(&mut self, now: Instant) -> TickOutcome {
        self.pump();
        if self.poller.poll_due(now) {
            self.tick()
        } else {
            TickOutcome::Idle
        }
    }

    /// How long a host may sleep before the next [`Session::update`] matters.
    pub fn next_wakeup(&self, now: Instant) -> Option<Duration> {
        self.poller.time_until_due(now)
    }

    pub fn tick_interval(&self) -> Duration {
        self.poller.interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tone(tag: &str, secs: f32) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "abwave_session_{tag}_{}.wav",
            std::process::id()
        ));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        let frames = (48_000.0 * secs) as usize;
        for i in 0..frames {
            let t = i as f32 / 48_000.0;
            let v = (t * 220.0 * std::f32::consts::TAU).sin() * 0.5;
            writer.write_sample((v * i16::MAX as f32) as i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
        path
    }

    fn session() -> Session {
        Session::new(AudioEngine::new_for_test(), &PlayerConfig::default())
    }

    #[test]
    fn stale_envelope_is_discarded() {
        let a = write_tone("stale_a", 0.5);
        let b = write_tone("stale_b", 0.5);
        let mut s = session();
        s.load_file_blocking(&a).expect("load a");
        let first = s.asset().map(|x| x.id).expect("asset a");
        s.load_file_blocking(&b).expect("load b");
        let second = s.asset().map(|x| x.id).expect("asset b");
        assert_ne!(first, second);

        let stale = WaveformEnvelope {
            asset_id: first,
            peaks: vec![0.9; 3],
        };
        assert!(!s.apply_envelope(stale));
        assert_eq!(s.envelope().asset_id, second);
        assert_ne!(s.envelope().peaks, vec![0.9; 3]);

        let fresh = WaveformEnvelope {
            asset_id: second,
            peaks: vec![0.1, 0.2],
        };
        assert!(s.apply_envelope(fresh));
        assert_eq!(s.envelope().peaks, vec![0.1, 0.2]);
        assert!(!s.is_envelope_pending());

        let slot = s.envelope_slot();
        let seen = std::thread::spawn(move || slot.load().peaks.clone())
            .join()
            .expect("reader thread");
        assert_eq!(seen, vec![0.1, 0.2]);
    }

    #[test]
    fn superseded_async_load_is_ignored() {
        let a = write_tone("async_a", 0.25);
        let b = write_tone("async_b", 0.5);
        let mut s = session();
        s.load_file(&a);
        s.load_file(&b);
        let deadline = Instant::now() + Duration::from_secs(10);
        while s.is_loading() && Instant::now() < deadline {
            s.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
        let asset = s.asset().expect("loaded");
        assert_eq!(asset.path, b);
        assert_eq!(asset.id, 1);
        assert_eq!(s.state(), PlayerState::Stopped);
    }

    #[test]
    fn operations_without_asset_are_noops() {
        let mut s = session();
        s.play();
        s.seek(3.0);
        s.set_clicked_time(1.0);
        s.commit_start();
        s.jump_to_start();
        assert_eq!(s.state(), PlayerState::Empty);
        assert_eq!(s.playback().current_time, 0.0);
        assert_eq!(s.markers().clicked_time(), None);
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn observers_see_committed_changes() {
        let path = write_tone("observe", 0.5);
        let mut s = session();
        let rx = s.subscribe();
        s.load_file_blocking(&path).expect("load");
        s.set_volume(0.5);
        s.play();
        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Loaded(a) if a.path == path)));
        assert!(events.contains(&SessionEvent::VolumeChanged(0.5)));
        assert!(events.contains(&SessionEvent::StateChanged(PlayerState::Playing)));
    }

    #[test]
    fn panicking_envelope_job_degrades_to_empty() {
        let path = write_tone("envelope_panic", 0.25);
        let mut s = session();
        s.load_file_blocking(&path).expect("load");
        let id = s.asset().map(|a| a.id).expect("asset");

        let env = run_envelope_job(id, || panic!("peak scan blew up"));
        assert_eq!(env.asset_id, id);
        assert!(env.peaks.is_empty());

        let rx = s.subscribe();
        assert!(s.apply_envelope(env));
        assert_eq!(s.envelope().asset_id, id);
        assert!(s.envelope().is_empty());
        assert!(!s.is_envelope_pending());
        assert!(rx
            .try_iter()
            .any(|e| e == SessionEvent::EnvelopeReady { asset_id: id, len: 0 }));

        let ok = run_envelope_job(id, || vec![0.25, 0.5]);
        assert_eq!(ok.peaks, vec![0.25, 0.5]);
    }

    #[test]
    fn stale_load_job_skips_resampling() {
        let path = write_tone("stale_job", 0.25);
        let latest = AtomicU64::new(7);
        assert!(prepare_for_job(&path, 44_100, 6, &latest).is_none());

        let prepared = prepare_for_job(&path, 44_100, 7, &latest)
            .expect("current job produces a result")
            .expect("decode");
        assert_eq!(prepared.sample_rate, 48_000);
        assert_eq!(prepared.frames, 12_000);
        assert!((prepared.playback.len() as i64 - 11_025).abs() <= 1);

        let missing = path.with_file_name("abwave_no_such_file.wav");
        assert!(matches!(
            prepare_for_job(&missing, 44_100, 7, &latest),
            Some(Err(LoadError::Missing { .. }))
        ));
    }

    #[test]
    fn slow_subscriber_queue_is_bounded() {
        let mut s = session();
        let rx = s.subscribe();
        for i in 0..(OBSERVER_QUEUE * 2) {
            s.set_volume(if i % 2 == 0 { 0.1 } else { 0.2 });
        }
        assert_eq!(s.observers.len(), 1);
        assert_eq!(rx.try_iter().count(), OBSERVER_QUEUE);

        s.set_volume(0.9);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![SessionEvent::VolumeChanged(0.9)]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut s = session();
        let rx = s.subscribe();
        drop(rx);
        s.set_volume(0.2);
        assert!(s.observers.is_empty());
    }
}
