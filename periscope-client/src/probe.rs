//! Probe codec backend.
//!
//! Stands in for a real codec so the engine can run against a live
//! server without decoding anything. The video lane turns every
//! payload into a small synthetic picture, which keeps the whole
//! dispatch/present path moving; the audio lane passes payload bytes
//! straight through. The sinks log at `trace` level and discard, so
//! the probe reports stream health (fps, bandwidth, resyncs, stalls)
//! with no window and no sound device.

use std::io;

use tracing::{info, trace};

use periscope_core::error::CodecError;
use periscope_core::media::{
    AudioCodecFactory, AudioDecoder, AudioResampler, AudioSink, DecodedPicture, DecodeStep,
    PictureConverter, RawPicture, RawSamples, RenderSink, VideoCodecFactory, VideoDecoder,
};

/// Dimensions of the synthetic probe picture.
const PROBE_WIDTH: u32 = 16;
const PROBE_HEIGHT: u32 = 9;

// ── Video lane ───────────────────────────────────────────────────

/// Swallows each payload and emits one flat grey picture per call,
/// brightness stepping with every frame so successive pictures are
/// distinguishable downstream.
pub struct ProbeVideoDecoder {
    frames: u64,
}

impl VideoDecoder for ProbeVideoDecoder {
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawPicture>, CodecError> {
        self.frames += 1;
        let shade = (self.frames & 0xFF) as u8;
        Ok(DecodeStep {
            consumed: input.len(),
            output: Some(RawPicture {
                width: PROBE_WIDTH,
                height: PROBE_HEIGHT,
                planes: vec![vec![shade; (PROBE_WIDTH * PROBE_HEIGHT) as usize]],
                strides: vec![PROBE_WIDTH as usize],
            }),
        })
    }
}

/// Fills the RGB buffer with the picture's single shade.
pub struct ProbeConverter;

impl PictureConverter for ProbeConverter {
    fn convert(&mut self, picture: &RawPicture, dst: &mut [u8]) -> Result<(), CodecError> {
        let shade = picture
            .planes
            .first()
            .and_then(|plane| plane.first())
            .copied()
            .unwrap_or(0);
        dst.fill(shade);
        Ok(())
    }
}

pub struct ProbeVideoFactory;

impl VideoCodecFactory for ProbeVideoFactory {
    fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, CodecError> {
        Ok(Box::new(ProbeVideoDecoder { frames: 0 }))
    }

    fn create_converter(&self) -> Result<Box<dyn PictureConverter>, CodecError> {
        Ok(Box::new(ProbeConverter))
    }
}

// ── Audio lane ───────────────────────────────────────────────────

/// Passes payload bytes through as if they were already PCM.
pub struct ProbeAudioDecoder;

impl AudioDecoder for ProbeAudioDecoder {
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

pub struct ProbeResampler;

impl AudioResampler for ProbeResampler {
    fn resample(&mut self, samples: &RawSamples) -> Result<Vec<u8>, CodecError> {
        Ok(samples.data.clone())
    }
}

pub struct ProbeAudioFactory;

impl AudioCodecFactory for ProbeAudioFactory {
    fn create_decoder(&self) -> Result<Box<dyn AudioDecoder>, CodecError> {
        Ok(Box::new(ProbeAudioDecoder))
    }

    fn create_resampler(&self) -> Result<Box<dyn AudioResampler>, CodecError> {
        Ok(Box::new(ProbeResampler))
    }
}

// ── Sinks ────────────────────────────────────────────────────────

/// Render sink that logs instead of drawing.
#[derive(Default)]
pub struct TraceRenderSink {
    presented: u64,
}

impl RenderSink for TraceRenderSink {
    fn present(&mut self, picture: &DecodedPicture) {
        self.presented += 1;
        if self.presented == 1 {
            info!(
                width = picture.width,
                height = picture.height,
                "first picture presented"
            );
        }
        trace!(
            n = self.presented,
            width = picture.width,
            height = picture.height,
            degrees = picture.orientation.degrees(),
            "picture presented"
        );
    }
}

/// Audio sink that accepts everything and throws it away.
#[derive(Default)]
pub struct DiscardAudioSink {
    written: u64,
}

impl AudioSink for DiscardAudioSink {
    fn free_capacity(&self) -> usize {
        1 << 20
    }

    fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        self.written += pcm.len() as u64;
        trace!(bytes = pcm.len(), total = self.written, "audio discarded");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_lane_emits_a_picture_per_payload() {
        let mut decoder = ProbeVideoFactory.create_decoder().unwrap();
        let step = decoder.decode(&[0u8; 10]).unwrap();
        assert_eq!(step.consumed, 10);
        let picture = step.output.unwrap();
        assert_eq!((picture.width, picture.height), (PROBE_WIDTH, PROBE_HEIGHT));

        let mut converter = ProbeVideoFactory.create_converter().unwrap();
        let mut rgb = vec![0u8; converter.output_len(&picture)];
        converter.convert(&picture, &mut rgb).unwrap();
        assert!(rgb.iter().all(|&b| b == 1), "first frame has shade 1");
    }

    #[test]
    fn shade_steps_per_frame() {
        let mut decoder = ProbeVideoDecoder { frames: 0 };
        let first = decoder.decode(&[0u8; 4]).unwrap().output.unwrap();
        let second = decoder.decode(&[0u8; 4]).unwrap().output.unwrap();
        assert_ne!(first.planes[0][0], second.planes[0][0]);
    }

    #[test]
    fn audio_lane_passes_bytes_through() {
        let mut decoder = ProbeAudioFactory.create_decoder().unwrap();
        let step = decoder.decode(&[1, 2, 3, 4]).unwrap();
        assert_eq!(step.consumed, 4);
        let samples = step.output.unwrap();
        assert_eq!(samples.data, vec![1, 2, 3, 4]);

        let mut resampler = ProbeAudioFactory.create_resampler().unwrap();
        assert_eq!(resampler.resample(&samples).unwrap(), vec![1, 2, 3, 4]);
    }
}
