//! Decode workers.
//!
//! One worker task per media lane keeps codec latency off the network
//! loop. Jobs flow through a depth-1 channel, so at most one payload
//! per lane is ever waiting: when a lane falls behind, the session's
//! `submit().await` blocks and TCP backpressure does the shedding at
//! the sender, frames-in-flight stay bounded, and memory cannot grow
//! with a slow decoder.
//!
//! ```text
//!  session ──submit()──► [jobs (1)] ──► video worker ──► completions ──► session
//!                                          │
//!                                          └─ decoder → converter → DecodedPicture
//!
//!  session ──submit()──► [jobs (1)] ──► audio worker ──push()──► AudioPlaybackQueue
//! ```
//!
//! Connection episodes are fenced with reset jobs
//! ([`VideoJob::Reset`], [`AudioJob::Reset`]): the worker drops its
//! codec handles (fresh decoder state per episode) and adopts the new
//! epoch. Payloads and completions both carry the epoch they belong
//! to, so anything queued across a reconnect is recognisably stale
//! and discarded instead of bleeding into the new episode.

use std::sync::atomic::{AtomicI8, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CodecError, ScreenError};
use crate::media::audio::AudioPlaybackQueue;
use crate::media::backend::{AudioCodecFactory, PictureConverter, VideoCodecFactory, VideoDecoder};
use crate::media::types::{AudioChunk, DecodedPicture, Orientation, RawPicture};

/// Depth of each lane's job channel. Depth 1 is the in-flight bound
/// the pipeline's backpressure is built on; raising it trades latency
/// for burst tolerance.
const JOB_DEPTH: usize = 1;

// ── Jobs ─────────────────────────────────────────────────────────

/// Work item for the video lane.
#[derive(Debug)]
pub enum VideoJob {
    /// A complete encoded payload.
    Payload {
        epoch: u64,
        data: Bytes,
        orientation: Orientation,
    },
    /// Fence between connection episodes: drop codec state, adopt
    /// `epoch` for everything that follows.
    Reset { epoch: u64 },
}

/// Work item for the audio lane. Orientation is a picture property;
/// audio jobs carry none.
#[derive(Debug)]
pub enum AudioJob {
    /// A complete encoded payload.
    Payload { epoch: u64, data: Bytes },
    /// Fence between connection episodes, same contract as
    /// [`VideoJob::Reset`].
    Reset { epoch: u64 },
}

/// A decoded picture leaving the video lane.
#[derive(Debug, Clone)]
pub struct VideoCompletion {
    /// Episode the source payload belonged to.
    pub epoch: u64,
    pub picture: Arc<DecodedPicture>,
}

// ── VideoDispatcher ──────────────────────────────────────────────

/// Session-side handle to the video decode worker.
pub struct VideoDispatcher {
    jobs: mpsc::Sender<VideoJob>,
    failures: Arc<AtomicU64>,
}

impl VideoDispatcher {
    /// Spawn the worker task.
    ///
    /// Returns the handle, the completion stream, and the worker's
    /// join handle. The worker runs until the dispatcher is dropped
    /// or codec creation fails; the latter is fatal and surfaces
    /// through the join handle. The completion channel is unbounded,
    /// but production is structurally bounded by the depth-1 job
    /// channel, so it cannot grow without the session falling behind
    /// on a handful of messages.
    ///
    /// `view_offset` is the user rotation in quarter turns, added to
    /// each frame's stream orientation at completion time.
    pub fn spawn(
        factory: Arc<dyn VideoCodecFactory>,
        view_offset: Arc<AtomicI8>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<VideoCompletion>,
        JoinHandle<Result<(), ScreenError>>,
    ) {
        let (jobs_tx, jobs_rx) = mpsc::channel(JOB_DEPTH);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(video_worker(
            jobs_rx,
            factory,
            view_offset,
            done_tx,
            Arc::clone(&failures),
        ));

        (
            Self {
                jobs: jobs_tx,
                failures,
            },
            done_rx,
            task,
        )
    }

    /// Queue a payload. Blocks while the lane already has one
    /// waiting; this await is the pipeline's backpressure valve.
    pub async fn submit(
        &self,
        epoch: u64,
        data: Bytes,
        orientation: Orientation,
    ) -> Result<(), ScreenError> {
        self.jobs
            .send(VideoJob::Payload {
                epoch,
                data,
                orientation,
            })
            .await?;
        Ok(())
    }

    /// Fence the start of connection episode `epoch`.
    pub async fn reset(&self, epoch: u64) -> Result<(), ScreenError> {
        self.jobs.send(VideoJob::Reset { epoch }).await?;
        Ok(())
    }

    /// Payloads the decoder rejected since spawn.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

// ── AudioDispatcher ──────────────────────────────────────────────

/// Session-side handle to the audio decode worker.
///
/// Unlike video there is no completion channel: decoded chunks go
/// straight into the shared [`AudioPlaybackQueue`], which the worker
/// also clears when it processes a reset fence.
pub struct AudioDispatcher {
    jobs: mpsc::Sender<AudioJob>,
    failures: Arc<AtomicU64>,
}

impl AudioDispatcher {
    pub fn spawn(
        factory: Arc<dyn AudioCodecFactory>,
        queue: Arc<AudioPlaybackQueue>,
    ) -> (Self, JoinHandle<Result<(), ScreenError>>) {
        let (jobs_tx, jobs_rx) = mpsc::channel(JOB_DEPTH);
        let failures = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(audio_worker(
            jobs_rx,
            factory,
            queue,
            Arc::clone(&failures),
        ));

        (
            Self {
                jobs: jobs_tx,
                failures,
            },
            task,
        )
    }

    /// Queue a payload; blocks while the lane is busy.
    pub async fn submit(&self, epoch: u64, data: Bytes) -> Result<(), ScreenError> {
        self.jobs.send(AudioJob::Payload { epoch, data }).await?;
        Ok(())
    }

    /// Fence the start of connection episode `epoch`.
    pub async fn reset(&self, epoch: u64) -> Result<(), ScreenError> {
        self.jobs.send(AudioJob::Reset { epoch }).await?;
        Ok(())
    }

    /// Payloads the decoder rejected since spawn.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

// ── Video lane ───────────────────────────────────────────────────

/// Per-episode video decode state: codec handles plus the reused
/// conversion buffer.
struct VideoLane {
    decoder: Box<dyn VideoDecoder>,
    converter: Box<dyn PictureConverter>,
    /// Conversion target, reallocated only when picture dimensions
    /// change.
    rgb: Vec<u8>,
    dims: (u32, u32),
}

impl VideoLane {
    fn create(factory: &dyn VideoCodecFactory) -> Result<Self, CodecError> {
        Ok(Self {
            decoder: factory.create_decoder()?,
            converter: factory.create_converter()?,
            rgb: Vec::new(),
            dims: (0, 0),
        })
    }

    /// Feed one payload through the decoder until it is used up,
    /// converting every picture it produces.
    ///
    /// The decoder may consume any prefix per call; the remainder is
    /// fed again. A call that neither consumes nor produces would
    /// never terminate, so it is an error; a call that produces
    /// without consuming ends the payload after its output is taken.
    fn decode_payload(
        &mut self,
        data: &[u8],
        orientation: Orientation,
    ) -> Result<Vec<Arc<DecodedPicture>>, CodecError> {
        let mut pictures = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let step = self.decoder.decode(rest)?;
            let produced = step.output.is_some();
            if let Some(raw) = step.output {
                pictures.push(self.convert(&raw, orientation)?);
            }
            if step.consumed == 0 {
                if !produced {
                    return Err(CodecError::Stalled(rest.len()));
                }
                break;
            }
            rest = &rest[step.consumed.min(rest.len())..];
        }

        Ok(pictures)
    }

    fn convert(
        &mut self,
        raw: &RawPicture,
        orientation: Orientation,
    ) -> Result<Arc<DecodedPicture>, CodecError> {
        let needed = self.converter.output_len(raw);
        if self.dims != (raw.width, raw.height) || self.rgb.len() != needed {
            debug!(
                width = raw.width,
                height = raw.height,
                "picture dimensions changed, reallocating conversion buffer"
            );
            self.rgb = vec![0u8; needed];
            self.dims = (raw.width, raw.height);
        }

        self.converter.convert(raw, &mut self.rgb)?;

        Ok(Arc::new(DecodedPicture {
            width: raw.width,
            height: raw.height,
            data: self.rgb.clone(),
            orientation,
        }))
    }
}

async fn video_worker(
    mut jobs: mpsc::Receiver<VideoJob>,
    factory: Arc<dyn VideoCodecFactory>,
    view_offset: Arc<AtomicI8>,
    completions: mpsc::UnboundedSender<VideoCompletion>,
    failures: Arc<AtomicU64>,
) -> Result<(), ScreenError> {
    let mut lane: Option<VideoLane> = None;
    let mut epoch = 0u64;

    while let Some(job) = jobs.recv().await {
        match job {
            VideoJob::Reset { epoch: next } => {
                lane = None;
                epoch = next;
            }
            VideoJob::Payload {
                epoch: job_epoch,
                data,
                orientation,
            } => {
                if job_epoch != epoch {
                    // Queued across a reset; its decoder state is gone.
                    continue;
                }
                if lane.is_none() {
                    lane =
                        Some(VideoLane::create(factory.as_ref()).map_err(ScreenError::CodecInit)?);
                }
                let Some(active) = lane.as_mut() else {
                    continue;
                };

                let shown = orientation.turned(view_offset.load(Ordering::Relaxed));
                match active.decode_payload(&data, shown) {
                    Ok(pictures) => {
                        for picture in pictures {
                            if completions
                                .send(VideoCompletion { epoch, picture })
                                .is_err()
                            {
                                // Session is gone; nothing left to do.
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, bytes = data.len(), "video payload rejected");
                    }
                }
            }
        }
    }

    Ok(())
}

// ── Audio lane ───────────────────────────────────────────────────

async fn audio_worker(
    mut jobs: mpsc::Receiver<AudioJob>,
    factory: Arc<dyn AudioCodecFactory>,
    queue: Arc<AudioPlaybackQueue>,
    failures: Arc<AtomicU64>,
) -> Result<(), ScreenError> {
    let mut decoder = None;
    let mut resampler = None;
    let mut epoch = 0u64;

    while let Some(job) = jobs.recv().await {
        match job {
            AudioJob::Reset { epoch: next } => {
                decoder = None;
                resampler = None;
                epoch = next;
                // Chunks from the old episode must not play into the
                // new one, and priming starts over.
                queue.clear();
            }
            AudioJob::Payload {
                epoch: job_epoch,
                data,
            } => {
                if job_epoch != epoch {
                    continue;
                }
                if decoder.is_none() {
                    decoder = Some(factory.create_decoder().map_err(ScreenError::CodecInit)?);
                }
                if resampler.is_none() {
                    resampler = Some(factory.create_resampler().map_err(ScreenError::CodecInit)?);
                }
                let (Some(dec), Some(rs)) = (decoder.as_mut(), resampler.as_mut()) else {
                    continue;
                };

                let mut rest = &data[..];
                while !rest.is_empty() {
                    let step = match dec.decode(rest) {
                        Ok(step) => step,
                        Err(e) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %e, bytes = data.len(), "audio payload rejected");
                            break;
                        }
                    };
                    let produced = step.output.is_some();
                    if let Some(raw) = step.output {
                        match rs.resample(&raw) {
                            Ok(pcm) => queue.push(AudioChunk { data: pcm }),
                            Err(e) => {
                                failures.fetch_add(1, Ordering::Relaxed);
                                warn!(error = %e, "audio resample failed");
                            }
                        }
                    }
                    if step.consumed == 0 {
                        if !produced {
                            failures.fetch_add(1, Ordering::Relaxed);
                            warn!(bytes = rest.len(), "audio decoder stalled, payload dropped");
                        }
                        break;
                    }
                    rest = &rest[step.consumed.min(rest.len())..];
                }
            }
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backend::{AudioDecoder, AudioResampler, DecodeStep};
    use crate::media::types::RawSamples;
    use std::sync::Mutex;
    use std::time::Duration;

    // Consumes at most `unit` bytes per call and emits one picture
    // per call, so multi-step payloads exercise the feed loop. The
    // picture size is read per call, letting tests change it mid-run.
    struct ChunkedDecoder {
        unit: usize,
        dims: Arc<Mutex<(u32, u32)>>,
    }

    impl VideoDecoder for ChunkedDecoder {
        fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawPicture>, CodecError> {
            let consumed = input.len().min(self.unit);
            let (width, height) = *self.dims.lock().unwrap();
            Ok(DecodeStep {
                consumed,
                output: Some(RawPicture {
                    width,
                    height,
                    planes: vec![input[..consumed].to_vec()],
                    strides: vec![consumed],
                }),
            })
        }
    }

    #[derive(Default)]
    struct ConvertLog {
        // (dst pointer, dst len) per call.
        calls: Vec<(usize, usize)>,
    }

    struct RecordingConverter {
        log: Arc<Mutex<ConvertLog>>,
    }

    impl PictureConverter for RecordingConverter {
        fn convert(&mut self, _raw: &RawPicture, dst: &mut [u8]) -> Result<(), CodecError> {
            dst.fill(0x5A);
            self.log
                .lock()
                .unwrap()
                .calls
                .push((dst.as_ptr() as usize, dst.len()));
            Ok(())
        }
    }

    struct FakeVideoFactory {
        unit: usize,
        dims: Arc<Mutex<(u32, u32)>>,
        log: Arc<Mutex<ConvertLog>>,
        fail_init: bool,
    }

    impl VideoCodecFactory for FakeVideoFactory {
        fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, CodecError> {
            if self.fail_init {
                return Err(CodecError::Init("no decoder available".into()));
            }
            Ok(Box::new(ChunkedDecoder {
                unit: self.unit,
                dims: Arc::clone(&self.dims),
            }))
        }

        fn create_converter(&self) -> Result<Box<dyn PictureConverter>, CodecError> {
            Ok(Box::new(RecordingConverter {
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn fake_factory(unit: usize) -> (Arc<FakeVideoFactory>, Arc<Mutex<ConvertLog>>, Arc<Mutex<(u32, u32)>>) {
        let log = Arc::new(Mutex::new(ConvertLog::default()));
        let dims = Arc::new(Mutex::new((4u32, 2u32)));
        let factory = Arc::new(FakeVideoFactory {
            unit,
            dims: Arc::clone(&dims),
            log: Arc::clone(&log),
            fail_init: false,
        });
        (factory, log, dims)
    }

    #[test]
    fn lane_feeds_decoder_until_payload_consumed() {
        let (factory, _log, _dims) = fake_factory(10);
        let mut lane = VideoLane::create(factory.as_ref()).unwrap();

        // 25 bytes at 10 per step = 3 decoder calls, 3 pictures.
        let pictures = lane
            .decode_payload(&[0u8; 25], Orientation::Deg0)
            .unwrap();
        assert_eq!(pictures.len(), 3);
    }

    #[test]
    fn lane_reuses_conversion_buffer_until_resize() {
        let (factory, log, dims) = fake_factory(64);
        let mut lane = VideoLane::create(factory.as_ref()).unwrap();

        lane.decode_payload(&[0u8; 16], Orientation::Deg0).unwrap();
        lane.decode_payload(&[0u8; 16], Orientation::Deg0).unwrap();
        // Same 4x2 size twice: the conversion target must be the
        // same allocation.
        {
            let calls = &log.lock().unwrap().calls;
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0], calls[1]);
            assert_eq!(calls[0].1, 4 * 2 * 3);
        }

        // Dimension change in the running stream swaps in one fresh
        // buffer, which is then reused again.
        *dims.lock().unwrap() = (8, 4);
        lane.decode_payload(&[0u8; 16], Orientation::Deg0).unwrap();
        lane.decode_payload(&[0u8; 16], Orientation::Deg0).unwrap();
        let calls = &log.lock().unwrap().calls;
        assert_eq!(calls[2].1, 8 * 4 * 3);
        assert_eq!(calls[2], calls[3]);
    }

    struct StallingDecoder;

    impl VideoDecoder for StallingDecoder {
        fn decode(&mut self, _input: &[u8]) -> Result<DecodeStep<RawPicture>, CodecError> {
            Ok(DecodeStep {
                consumed: 0,
                output: None,
            })
        }
    }

    struct StallingFactory {
        log: Arc<Mutex<ConvertLog>>,
    }

    impl VideoCodecFactory for StallingFactory {
        fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, CodecError> {
            Ok(Box::new(StallingDecoder))
        }
        fn create_converter(&self) -> Result<Box<dyn PictureConverter>, CodecError> {
            Ok(Box::new(RecordingConverter {
                log: Arc::clone(&self.log),
            }))
        }
    }

    #[test]
    fn lane_rejects_zero_progress_decoder() {
        let factory = StallingFactory {
            log: Arc::new(Mutex::new(ConvertLog::default())),
        };
        let mut lane = VideoLane::create(&factory).unwrap();
        let err = lane
            .decode_payload(&[0u8; 8], Orientation::Deg0)
            .unwrap_err();
        assert!(matches!(err, CodecError::Stalled(8)));
    }

    #[tokio::test]
    async fn worker_completions_carry_epoch_and_offset() {
        let (factory, _log, _dims) = fake_factory(64);
        let offset = Arc::new(AtomicI8::new(1));
        let (dispatcher, mut done, task) = VideoDispatcher::spawn(factory, offset);

        dispatcher.reset(7).await.unwrap();
        dispatcher
            .submit(7, Bytes::from_static(&[0u8; 8]), Orientation::Deg90)
            .await
            .unwrap();

        let completion = done.recv().await.unwrap();
        assert_eq!(completion.epoch, 7);
        // Stream Deg90 plus one quarter turn of view offset.
        assert_eq!(completion.picture.orientation, Orientation::Deg180);

        drop(dispatcher);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn worker_skips_payloads_from_older_epochs() {
        let (factory, _log, _dims) = fake_factory(64);
        let (dispatcher, mut done, task) =
            VideoDispatcher::spawn(factory, Arc::new(AtomicI8::new(0)));

        dispatcher.reset(2).await.unwrap();
        // Late payload from episode 1: must never decode.
        dispatcher
            .submit(1, Bytes::from_static(&[0u8; 4]), Orientation::Deg0)
            .await
            .unwrap();
        dispatcher
            .submit(2, Bytes::from_static(&[0u8; 4]), Orientation::Deg0)
            .await
            .unwrap();

        let completion = done.recv().await.unwrap();
        assert_eq!(completion.epoch, 2);

        drop(dispatcher);
        task.await.unwrap().unwrap();
        assert!(done.recv().await.is_none(), "stale payload produced output");
    }

    #[tokio::test]
    async fn failed_decoder_creation_is_fatal() {
        let factory = Arc::new(FakeVideoFactory {
            unit: 8,
            dims: Arc::new(Mutex::new((2, 2))),
            log: Arc::new(Mutex::new(ConvertLog::default())),
            fail_init: true,
        });
        let (dispatcher, _done, task) =
            VideoDispatcher::spawn(factory, Arc::new(AtomicI8::new(0)));

        dispatcher
            .submit(0, Bytes::from_static(&[1, 2, 3]), Orientation::Deg0)
            .await
            .unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ScreenError::CodecInit(_)));
    }

    #[tokio::test]
    async fn decode_failure_counted_not_fatal() {
        let factory = Arc::new(StallingFactory {
            log: Arc::new(Mutex::new(ConvertLog::default())),
        });
        let (dispatcher, mut done, task) =
            VideoDispatcher::spawn(factory, Arc::new(AtomicI8::new(0)));

        dispatcher
            .submit(0, Bytes::from_static(&[0u8; 8]), Orientation::Deg0)
            .await
            .unwrap();

        // Give the worker a moment, then verify it is still alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.failures(), 1);
        assert!(!task.is_finished());

        drop(dispatcher);
        task.await.unwrap().unwrap();
        assert!(done.recv().await.is_none());
    }

    // ── Audio lane ───────────────────────────────────────────────

    struct WholeChunkAudioDecoder;

    impl AudioDecoder for WholeChunkAudioDecoder {
        fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawSamples>, CodecError> {
            Ok(DecodeStep {
                consumed: input.len(),
                output: Some(RawSamples {
                    rate: 44_100,
                    channels: 2,
                    data: input.to_vec(),
                }),
            })
        }
    }

    struct PassthroughResampler;

    impl AudioResampler for PassthroughResampler {
        fn resample(&mut self, samples: &RawSamples) -> Result<Vec<u8>, CodecError> {
            Ok(samples.data.clone())
        }
    }

    struct FakeAudioFactory;

    impl AudioCodecFactory for FakeAudioFactory {
        fn create_decoder(&self) -> Result<Box<dyn AudioDecoder>, CodecError> {
            Ok(Box::new(WholeChunkAudioDecoder))
        }
        fn create_resampler(&self) -> Result<Box<dyn AudioResampler>, CodecError> {
            Ok(Box::new(PassthroughResampler))
        }
    }

    #[tokio::test]
    async fn audio_payloads_land_in_queue() {
        let queue = Arc::new(AudioPlaybackQueue::new(1_000_000, 1));
        let (dispatcher, task) =
            AudioDispatcher::spawn(Arc::new(FakeAudioFactory), Arc::clone(&queue));

        dispatcher.reset(0).await.unwrap();
        dispatcher
            .submit(0, Bytes::from_static(&[9u8; 40]))
            .await
            .unwrap();

        drop(dispatcher);
        task.await.unwrap().unwrap();

        assert_eq!(queue.chunk_count(), 1);
        assert_eq!(queue.pull().unwrap().data, vec![9u8; 40]);
    }

    #[tokio::test]
    async fn audio_reset_clears_queue() {
        let queue = Arc::new(AudioPlaybackQueue::new(1_000_000, 1));
        let (dispatcher, task) =
            AudioDispatcher::spawn(Arc::new(FakeAudioFactory), Arc::clone(&queue));

        dispatcher.submit(0, Bytes::from_static(&[1u8; 10])).await.unwrap();
        dispatcher.reset(1).await.unwrap();

        drop(dispatcher);
        task.await.unwrap().unwrap();

        assert_eq!(queue.chunk_count(), 0, "old episode's audio survived reset");
        assert!(!queue.is_primed());
    }
}
