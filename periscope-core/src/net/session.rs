//! Session supervisor.
//!
//! [`ScreenSession`] owns the whole pipeline and drives it through
//! connection episodes:
//!
//! ```text
//!               ┌────────────────────────── lost (non-fatal error)
//!               ▼                                      │
//!  connect ──► episode select loop ────────────────────┤
//!  (retries)    │ socket read ─► reassemble ─► submit  │
//!               │ input event / touch tick ─► write    │
//!               │ video completion ─► present clock    │
//!               │ stall deadline ─► tear down episode  │
//!               └──► stop flag ─► clean exit
//! ```
//!
//! Errors split two ways: anything [`ScreenError::is_fatal`] ends the
//! session with `Err`; everything else ends only the current episode,
//! and the supervisor redials with a fresh attempt budget. Decode
//! workers, the presenter and the audio pump are spawned once and
//! survive across episodes; reset fences carry the new epoch to the
//! workers so stale work is recognisable.

use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, warn};

use crate::codec::ScreenCodec;
use crate::config::SessionConfig;
use crate::error::ScreenError;
use crate::input::{input_pair, InputChannel, InputReceiver};
use crate::media::audio::{AudioPlaybackQueue, AudioPump, AudioSink};
use crate::media::backend::{AudioCodecFactory, VideoCodecFactory};
use crate::media::dispatch::{AudioDispatcher, VideoCompletion, VideoDispatcher};
use crate::media::present::{PresentationClock, Presenter, RenderSink};
use crate::media::types::MediaKind;
use crate::net::controller::{with_default_port, ConnectionController, ConnectionState, TcpDialer};
use crate::protocol::event::InputEvent;
use crate::reassembler::FrameReassembler;
use crate::stats::{SessionStats, StatsTracker};

/// Socket read granularity.
const READ_CHUNK: usize = 64 * 1024;

/// Cadence of stats snapshots on the watch channel.
const STATS_PUBLISH_PERIOD: Duration = Duration::from_millis(500);

// ── SessionHandles ───────────────────────────────────────────────

/// Everything a frontend needs while the session task runs.
pub struct SessionHandles {
    /// Connection phase; render `state.to_string()` directly.
    pub state: watch::Receiver<ConnectionState>,
    /// Periodic statistics snapshots.
    pub stats: watch::Receiver<SessionStats>,
    /// Outbound input handle.
    pub input: InputChannel,
    stop: Arc<AtomicBool>,
    view_offset: Arc<AtomicI8>,
}

impl SessionHandles {
    /// Ask the session to exit at its next loop wakeup. Takes effect
    /// even if called before the session task is scheduled.
    pub fn stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Turn the viewed picture by `quarter_turns` (positive is
    /// clockwise). Returns the new accumulated offset, always in
    /// `0..=3`. Applies from the next decoded frame on.
    pub fn rotate_view(&self, quarter_turns: i8) -> i8 {
        let mut applied = 0;
        let _ = self
            .view_offset
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                applied = ((current as i16 + quarter_turns as i16).rem_euclid(4)) as i8;
                Some(applied)
            });
        applied
    }

    /// Current view rotation offset in quarter turns.
    pub fn view_offset(&self) -> i8 {
        self.view_offset.load(Ordering::SeqCst)
    }
}

// ── ScreenSession ────────────────────────────────────────────────

/// The engine: dials, reassembles, decodes, presents, and sends
/// input, reconnecting on stream loss until stopped or a fatal error.
pub struct ScreenSession {
    config: SessionConfig,
    controller: ConnectionController,
    video_factory: Arc<dyn VideoCodecFactory>,
    audio_factory: Arc<dyn AudioCodecFactory>,
    render_sink: Box<dyn RenderSink>,
    audio_sink: Box<dyn AudioSink>,
    input_channel: InputChannel,
    input_rx: InputReceiver,
    view_offset: Arc<AtomicI8>,
    running: Arc<AtomicBool>,
    stats_tx: watch::Sender<SessionStats>,
    stats_rx: watch::Receiver<SessionStats>,
}

impl ScreenSession {
    /// Build a session for `host` (port defaults to the stream port
    /// when absent). Nothing happens until [`run`](Self::run).
    pub fn new(
        host: &str,
        config: SessionConfig,
        video_factory: Arc<dyn VideoCodecFactory>,
        audio_factory: Arc<dyn AudioCodecFactory>,
        render_sink: Box<dyn RenderSink>,
        audio_sink: Box<dyn AudioSink>,
    ) -> Self {
        let controller = ConnectionController::new(
            Box::new(TcpDialer),
            with_default_port(host),
            config.connect_attempts,
            config.connect_timeout,
        );
        let (input_channel, input_rx) = input_pair();
        let (stats_tx, stats_rx) = watch::channel(SessionStats::default());

        Self {
            config,
            controller,
            video_factory,
            audio_factory,
            render_sink,
            audio_sink,
            input_channel,
            input_rx,
            view_offset: Arc::new(AtomicI8::new(0)),
            running: Arc::new(AtomicBool::new(true)),
            stats_tx,
            stats_rx,
        }
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.controller.state_receiver()
    }

    pub fn stats_receiver(&self) -> watch::Receiver<SessionStats> {
        self.stats_rx.clone()
    }

    pub fn input(&self) -> InputChannel {
        self.input_channel.clone()
    }

    /// Flip to `false` to stop the session.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Bundle of everything a frontend keeps after spawning
    /// [`run`](Self::run).
    pub fn handles(&self) -> SessionHandles {
        SessionHandles {
            state: self.state_receiver(),
            stats: self.stats_receiver(),
            input: self.input(),
            stop: Arc::clone(&self.running),
            view_offset: Arc::clone(&self.view_offset),
        }
    }

    /// Drive the session until stopped or a fatal error.
    ///
    /// Intended to be spawned; the caller keeps
    /// [`handles`](Self::handles) and awaits the task for the final
    /// result.
    pub async fn run(self) -> Result<(), ScreenError> {
        let ScreenSession {
            config,
            mut controller,
            video_factory,
            audio_factory,
            render_sink,
            audio_sink,
            input_channel: _input_channel,
            mut input_rx,
            view_offset,
            running,
            stats_tx,
            stats_rx: _stats_rx,
        } = self;

        let clock = Arc::new(PresentationClock::new());
        let queue = Arc::new(AudioPlaybackQueue::new(
            config.audio_ceiling,
            config.audio_priming,
        ));

        let presenter = Presenter::new(Arc::clone(&clock), render_sink, config.display_tick);
        let presenter_stop = presenter.stop_handle();
        let presenter_task = tokio::spawn(presenter.run());

        let pump = AudioPump::new(Arc::clone(&queue), audio_sink, config.audio_poll);
        let pump_stop = pump.stop_handle();
        let pump_task = tokio::spawn(pump.run());

        let (video, completions, video_task) =
            VideoDispatcher::spawn(video_factory, Arc::clone(&view_offset));
        let (audio, audio_task) = AudioDispatcher::spawn(audio_factory, Arc::clone(&queue));

        let mut pipe = Pipeline {
            video,
            audio,
            completions,
            video_task,
            audio_task,
            clock,
            queue,
            reassembler: FrameReassembler::new(config.max_payload),
            tracker: StatsTracker::new(config.fps_window),
            baseline: CounterBaseline::default(),
        };

        let mut epoch = 0u64;
        let result = loop {
            if !running.load(Ordering::SeqCst) {
                info!("session stopped");
                break Ok(());
            }

            let stream = match controller.connect_episode().await {
                Ok(stream) => stream,
                Err(e) => break Err(e),
            };

            // Fresh episode: new epoch, clean stream state, stale
            // input discarded, counters re-baselined.
            epoch += 1;
            pipe.reassembler.reset();
            pipe.tracker.reset();
            pipe.baseline = CounterBaseline {
                failures: pipe.video.failures() + pipe.audio.failures(),
                dropped_audio: pipe.queue.dropped_bytes(),
            };
            input_rx.clear_stale();
            if pipe.video.reset(epoch).await.is_err() || pipe.audio.reset(epoch).await.is_err() {
                break Err(harvest_dead_worker(&mut pipe).await);
            }
            let _ = stats_tx.send(pipe.tracker.snapshot());

            match run_episode(
                stream,
                epoch,
                &config,
                &running,
                &mut input_rx,
                &mut pipe,
                &stats_tx,
            )
            .await
            {
                Ok(()) => {
                    info!("session stopped");
                    break Ok(());
                }
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => {
                    warn!(error = %e, "connection lost, redialing");
                    if let Err(violation) = controller.mark_lost() {
                        break Err(violation);
                    }
                }
            }
        };

        // Tear down the long-lived tasks: stop flags for the tick
        // loops, channel closure for the workers.
        presenter_stop.store(false, Ordering::SeqCst);
        pump_stop.store(false, Ordering::SeqCst);
        let Pipeline {
            video,
            audio,
            completions,
            video_task,
            audio_task,
            ..
        } = pipe;
        drop(video);
        drop(audio);
        drop(completions);
        if !video_task.is_finished() {
            let _ = video_task.await;
        }
        if !audio_task.is_finished() {
            let _ = audio_task.await;
        }
        let _ = presenter_task.await;
        let _ = pump_task.await;

        match &result {
            // Connect exhaustion already left the state at `Failed`.
            Err(ScreenError::ConnectFailed { .. }) => {}
            _ => controller.shut_down(),
        }
        result
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

/// The long-lived pipeline pieces, grouped so the episode loop can
/// borrow them as one unit.
struct Pipeline {
    video: VideoDispatcher,
    audio: AudioDispatcher,
    completions: mpsc::UnboundedReceiver<VideoCompletion>,
    video_task: JoinHandle<Result<(), ScreenError>>,
    audio_task: JoinHandle<Result<(), ScreenError>>,
    clock: Arc<PresentationClock>,
    queue: Arc<AudioPlaybackQueue>,
    reassembler: FrameReassembler,
    tracker: StatsTracker,
    baseline: CounterBaseline,
}

/// Worker counters are cumulative across episodes; the stats snapshot
/// subtracts the value seen at episode start.
#[derive(Default, Clone, Copy)]
struct CounterBaseline {
    failures: u64,
    dropped_audio: u64,
}

/// One connection episode. `Ok(())` means the stop flag was seen;
/// every other exit is an error, fatal or not.
///
/// The stall deadline advances only when the reassembler consumes a
/// whole frame; socket bytes alone are not liveness.
async fn run_episode(
    stream: TcpStream,
    epoch: u64,
    config: &SessionConfig,
    running: &AtomicBool,
    input_rx: &mut InputReceiver,
    pipe: &mut Pipeline,
    stats_tx: &watch::Sender<SessionStats>,
) -> Result<(), ScreenError> {
    let input_state = input_rx.state();
    let (mut reader, writer) = stream.into_split();
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut outbound = FramedWrite::new(writer, ScreenCodec::new(config.max_payload));

    let mut touch_flush = tokio::time::interval(config.touch_flush);
    touch_flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_tick = tokio::time::interval(STATS_PUBLISH_PERIOD);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stall = tokio::time::sleep(config.stall_timeout);
    tokio::pin!(stall);

    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        tokio::select! {
            read = reader.read_buf(&mut read_buf) => {
                if read? == 0 {
                    return Err(ScreenError::Connection(
                        std::io::ErrorKind::UnexpectedEof.into(),
                    ));
                }

                let consumed_before = pipe.reassembler.frames_consumed();
                pipe.reassembler.feed(&read_buf);
                read_buf.clear();
                while let Some(payload) = pipe.reassembler.next()? {
                    match payload.kind {
                        MediaKind::Video => {
                            pipe.tracker.record_frame(payload.data.len());
                            if pipe
                                .video
                                .submit(epoch, payload.data, payload.orientation)
                                .await
                                .is_err()
                            {
                                // Lane gone; the worker arm below
                                // reports the real cause.
                                break;
                            }
                        }
                        MediaKind::Audio => {
                            if pipe.audio.submit(epoch, payload.data).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                // Liveness is whole frames, not socket traffic: bytes
                // that never complete a frame do not move the
                // deadline.
                if pipe.reassembler.frames_consumed() > consumed_before {
                    stall
                        .as_mut()
                        .reset(tokio::time::Instant::now() + config.stall_timeout);
                }
            }

            event = input_rx.recv() => {
                if let Some(event) = event {
                    outbound.send(event).await?;
                }
            }

            _ = touch_flush.tick() => {
                if let Some(touch) = input_state.take_pending_touch() {
                    outbound.send(InputEvent::Touch(touch)).await?;
                }
            }

            Some(done) = pipe.completions.recv() => {
                if done.epoch == epoch {
                    pipe.tracker
                        .record_dimensions(done.picture.width, done.picture.height);
                    input_state.update_source_dims(done.picture.width, done.picture.height);
                    pipe.clock.publish(done.picture);
                } else {
                    debug!(
                        stale = done.epoch,
                        current = epoch,
                        "dropping completion from previous episode"
                    );
                }
            }

            _ = stats_tick.tick() => {
                publish_stats(pipe, stats_tx);
            }

            _ = &mut stall => {
                return Err(ScreenError::StreamStalled(config.stall_timeout));
            }

            res = &mut pipe.video_task => {
                return Err(worker_ended("video", res));
            }

            res = &mut pipe.audio_task => {
                return Err(worker_ended("audio", res));
            }
        }
    }
}

fn publish_stats(pipe: &mut Pipeline, stats_tx: &watch::Sender<SessionStats>) {
    pipe.tracker.set_resyncs(pipe.reassembler.resyncs());
    let failures = pipe.video.failures() + pipe.audio.failures();
    pipe.tracker
        .set_decode_failures(failures.saturating_sub(pipe.baseline.failures));
    pipe.tracker.set_dropped_audio_bytes(
        pipe.queue
            .dropped_bytes()
            .saturating_sub(pipe.baseline.dropped_audio),
    );
    let _ = stats_tx.send(pipe.tracker.snapshot());
}

/// Translate a finished worker task into the session's error.
fn worker_ended(
    lane: &str,
    res: Result<Result<(), ScreenError>, JoinError>,
) -> ScreenError {
    match res {
        Ok(Err(e)) => e,
        Ok(Ok(())) => ScreenError::ChannelClosed,
        Err(join) => {
            error!(lane, error = %join, "decode worker aborted");
            ScreenError::ChannelClosed
        }
    }
}

/// A dispatcher send failed outside the select loop; find out why
/// from whichever worker actually exited.
async fn harvest_dead_worker(pipe: &mut Pipeline) -> ScreenError {
    if pipe.video_task.is_finished() {
        return worker_ended("video", (&mut pipe.video_task).await);
    }
    if pipe.audio_task.is_finished() {
        return worker_ended("audio", (&mut pipe.audio_task).await);
    }
    ScreenError::ChannelClosed
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::media::backend::{
        AudioDecoder, AudioResampler, DecodeStep, PictureConverter, VideoDecoder,
    };
    use crate::media::types::{DecodedPicture, RawPicture, RawSamples};

    struct SwallowVideoDecoder;

    impl VideoDecoder for SwallowVideoDecoder {
        fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawPicture>, CodecError> {
            Ok(DecodeStep {
                consumed: input.len(),
                output: None,
            })
        }
    }

    struct NullConverter;

    impl PictureConverter for NullConverter {
        fn convert(&mut self, _raw: &RawPicture, _dst: &mut [u8]) -> Result<(), CodecError> {
            Ok(())
        }
    }

    struct NullVideoFactory;

    impl VideoCodecFactory for NullVideoFactory {
        fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, CodecError> {
            Ok(Box::new(SwallowVideoDecoder))
        }
        fn create_converter(&self) -> Result<Box<dyn PictureConverter>, CodecError> {
            Ok(Box::new(NullConverter))
        }
    }

    struct SwallowAudioDecoder;

    impl AudioDecoder for SwallowAudioDecoder {
        fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawSamples>, CodecError> {
            Ok(DecodeStep {
                consumed: input.len(),
                output: None,
            })
        }
    }

    struct NullResampler;

    impl AudioResampler for NullResampler {
        fn resample(&mut self, _samples: &RawSamples) -> Result<Vec<u8>, CodecError> {
            Ok(Vec::new())
        }
    }

    struct NullAudioFactory;

    impl AudioCodecFactory for NullAudioFactory {
        fn create_decoder(&self) -> Result<Box<dyn AudioDecoder>, CodecError> {
            Ok(Box::new(SwallowAudioDecoder))
        }
        fn create_resampler(&self) -> Result<Box<dyn AudioResampler>, CodecError> {
            Ok(Box::new(NullResampler))
        }
    }

    struct NullRender;

    impl RenderSink for NullRender {
        fn present(&mut self, _picture: &DecodedPicture) {}
    }

    struct NullAudio;

    impl AudioSink for NullAudio {
        fn free_capacity(&self) -> usize {
            1 << 20
        }
        fn write(&mut self, _pcm: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_session(host: &str, config: SessionConfig) -> ScreenSession {
        ScreenSession::new(
            host,
            config,
            Arc::new(NullVideoFactory),
            Arc::new(NullAudioFactory),
            Box::new(NullRender),
            Box::new(NullAudio),
        )
    }

    #[tokio::test]
    async fn stop_before_run_exits_clean() {
        let session = test_session("127.0.0.1:9", SessionConfig::default());
        let handles = session.handles();
        handles.stop();

        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(*handles.state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_exhaustion_is_fatal() {
        // Nothing listens on the discard port; localhost refuses
        // instantly, so the episode burns its budget without waiting
        // for the per-attempt deadline.
        let config = SessionConfig {
            connect_attempts: 2,
            connect_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };
        let session = test_session("127.0.0.1:9", config);
        let handles = session.handles();

        let err = tokio::time::timeout(Duration::from_secs(10), session.run())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::ConnectFailed { attempts: 2, .. }
        ));
        assert!(handles.state.borrow().is_failed());
    }

    #[test]
    fn rotate_view_wraps_quarter_turns() {
        let session = test_session("host", SessionConfig::default());
        let handles = session.handles();

        assert_eq!(handles.rotate_view(1), 1);
        assert_eq!(handles.rotate_view(2), 3);
        assert_eq!(handles.rotate_view(1), 0);
        assert_eq!(handles.rotate_view(-1), 3);
        assert_eq!(handles.view_offset(), 3);
    }
}
