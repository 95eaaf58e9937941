//! WAV file audio source for offline decoding.

use crate::audio::frame::{AudioFormat, AudioFrame};
use crate::audio::source::{AudioSource, SourceEvent};
use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::EndpointConfig;
use crossbeam_channel::{Receiver, unbounded};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// How a decoded file is cut into frames and padded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDecodeOptions {
    /// Silence appended after the last sample so the endpoint rules can fire
    /// on the final utterance.
    pub tail_padding_secs: f32,
    /// Bytes of 16-bit PCM per emitted frame.
    pub read_chunk_bytes: usize,
}

impl Default for FileDecodeOptions {
    fn default() -> Self {
        Self {
            tail_padding_secs: defaults::TAIL_PADDING_SECS,
            read_chunk_bytes: defaults::READ_CHUNK_BYTES,
        }
    }
}

impl FileDecodeOptions {
    /// Reject a pad too short for any trailing-silence rule to fire.
    pub fn validate_against(&self, endpoint: &EndpointConfig) -> Result<()> {
        if self.read_chunk_bytes < 2 {
            return Err(VoxError::configuration(format!(
                "read_chunk_bytes must hold at least one sample, got {}",
                self.read_chunk_bytes
            )));
        }
        if !self.tail_padding_secs.is_finite() || self.tail_padding_secs < 0.0 {
            return Err(VoxError::configuration(format!(
                "tail_padding_secs must be a non-negative number, got {}",
                self.tail_padding_secs
            )));
        }
        if endpoint.enabled && self.tail_padding_secs <= endpoint.max_trailing_silence() {
            return Err(VoxError::configuration(format!(
                "tail_padding_secs ({}) must exceed the largest trailing-silence rule ({})",
                self.tail_padding_secs,
                endpoint.max_trailing_silence()
            )));
        }
        Ok(())
    }

    fn samples_per_frame(&self) -> usize {
        (self.read_chunk_bytes / 2).max(1)
    }
}

/// Audio source that reads a mono 16-bit PCM WAV file.
///
/// The container is validated when the source is opened, so a bad file
/// fails before the session sees a single frame.
pub struct FileDecodeSource {
    format: AudioFormat,
    samples: Vec<i16>,
    options: FileDecodeOptions,
    subscribed: bool,
}

impl FileDecodeSource {
    /// Open a WAV file that must be recorded at `sample_rate`.
    pub fn open(path: &Path, sample_rate: u32, options: FileDecodeOptions) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)), sample_rate, options)
    }

    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        sample_rate: u32,
        options: FileDecodeOptions,
    ) -> Result<Self> {
        let wav_reader = hound::WavReader::new(reader)
            .map_err(|e| VoxError::format(format!("Failed to parse WAV file: {}", e)))?;

        let spec = wav_reader.spec();
        validate_spec(&spec, sample_rate)?;

        let samples: Vec<i16> = wav_reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoxError::format(format!("Failed to read WAV samples: {}", e)))?;

        log::debug!(
            "Opened WAV: {} samples at {}Hz ({:.2}s)",
            samples.len(),
            spec.sample_rate,
            samples.len() as f32 / spec.sample_rate as f32
        );

        Ok(Self {
            format: AudioFormat::mono(spec.sample_rate),
            samples,
            options,
            subscribed: false,
        })
    }

    /// Create from stdin.
    pub fn from_stdin(sample_rate: u32, options: FileDecodeOptions) -> Result<Self> {
        use std::io::Cursor;

        // StdinLock is not Send, so buffer everything first
        let mut buffer = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buffer)?;
        Self::from_reader(Box::new(Cursor::new(buffer)), sample_rate, options)
    }

    /// Number of samples in the file, padding excluded.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn padding_samples(&self) -> usize {
        (self.options.tail_padding_secs * self.format.sample_rate as f32).round() as usize
    }
}

fn validate_spec(spec: &hound::WavSpec, sample_rate: u32) -> Result<()> {
    if spec.sample_format != hound::SampleFormat::Int {
        return Err(VoxError::format("Only support PCM format"));
    }
    if spec.channels != 1 {
        return Err(VoxError::format(format!(
            "Only support single channel. Given {}",
            spec.channels
        )));
    }
    if spec.bits_per_sample != 16 {
        return Err(VoxError::format(format!(
            "Only support 16-bit samples. Given {}",
            spec.bits_per_sample
        )));
    }
    if spec.sample_rate != sample_rate {
        return Err(VoxError::format(format!(
            "Expected sample rate {}. Given {}",
            sample_rate, spec.sample_rate
        )));
    }
    Ok(())
}

impl AudioSource for FileDecodeSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn subscribe(&mut self) -> Result<Receiver<SourceEvent>> {
        if self.subscribed {
            return Err(VoxError::Device {
                message: "file source already has a subscriber".to_string(),
            });
        }

        let (tx, rx) = unbounded();
        let per_frame = self.options.samples_per_frame();
        let mut sequence = 0u64;
        for chunk in self.samples.chunks(per_frame) {
            let _ = tx.send(SourceEvent::Frame(AudioFrame::from_i16(
                sequence,
                self.format,
                chunk.to_vec(),
            )));
            sequence += 1;
        }

        let mut remaining = self.padding_samples();
        while remaining > 0 {
            let n = remaining.min(per_frame);
            let _ = tx.send(SourceEvent::Frame(AudioFrame::from_i16(
                sequence,
                self.format,
                vec![0; n],
            )));
            sequence += 1;
            remaining -= n;
        }
        let _ = tx.send(SourceEvent::Finished);

        self.subscribed = true;
        Ok(rx)
    }

    fn unsubscribe(&mut self) -> Result<()> {
        self.subscribed = false;
        Ok(())
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "wav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn no_padding() -> FileDecodeOptions {
        FileDecodeOptions {
            tail_padding_secs: 0.0,
            ..FileDecodeOptions::default()
        }
    }

    fn open(data: Vec<u8>, options: FileDecodeOptions) -> Result<FileDecodeSource> {
        FileDecodeSource::from_reader(Box::new(Cursor::new(data)), 16000, options)
    }

    fn frames(rx: &Receiver<SourceEvent>) -> (Vec<AudioFrame>, bool) {
        let mut frames = Vec::new();
        let mut finished = false;
        for event in rx.try_iter() {
            match event {
                SourceEvent::Frame(f) => frames.push(f),
                SourceEvent::Finished => finished = true,
                SourceEvent::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }
        (frames, finished)
    }

    #[test]
    fn from_reader_16khz_mono_keeps_samples() {
        let input = vec![100i16, 200, 300, 400, 500];
        let source = open(make_wav_data(16000, 1, &input), no_padding()).unwrap();

        assert_eq!(source.samples, input);
        assert_eq!(source.format(), AudioFormat::mono(16000));
        assert!(source.is_finite());
    }

    #[test]
    fn subscribe_splits_into_read_chunks() {
        // 2048 samples per 4096-byte chunk
        let input = vec![1i16; 5000];
        let mut source = open(make_wav_data(16000, 1, &input), no_padding()).unwrap();
        let rx = source.subscribe().unwrap();
        let (frames, finished) = frames(&rx);

        let sizes: Vec<usize> = frames.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![2048, 2048, 904]);
        assert!(finished);
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn subscribe_appends_silence_pad() {
        let input = vec![1000i16; 100];
        let options = FileDecodeOptions {
            tail_padding_secs: 0.5,
            read_chunk_bytes: 4096,
        };
        let mut source = open(make_wav_data(16000, 1, &input), options).unwrap();
        let rx = source.subscribe().unwrap();
        let (frames, finished) = frames(&rx);

        let total: usize = frames.iter().map(|f| f.len()).sum();
        assert_eq!(total, 100 + 8000);
        assert!(finished);
        let last = frames.last().unwrap().to_normalized();
        assert!(last.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn rejects_mismatched_sample_rate() {
        let result = open(make_wav_data(8000, 1, &[0i16; 10]), no_padding());
        match result {
            Err(VoxError::Format { message }) => {
                assert_eq!(message, "Expected sample rate 16000. Given 8000");
            }
            _ => panic!("Expected Format error"),
        }
    }

    #[test]
    fn rejects_stereo() {
        let result = open(make_wav_data(16000, 2, &[0i16; 10]), no_padding());
        match result {
            Err(VoxError::Format { message }) => assert!(message.contains("single channel")),
            _ => panic!("Expected Format error"),
        }
    }

    #[test]
    fn rejects_float_samples() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        let result = open(cursor.into_inner(), no_padding());
        match result {
            Err(VoxError::Format { message }) => assert_eq!(message, "Only support PCM format"),
            _ => panic!("Expected Format error"),
        }
    }

    #[test]
    fn rejects_24_bit_samples() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        writer.write_sample(1000i32).unwrap();
        writer.finalize().unwrap();

        let result = open(cursor.into_inner(), no_padding());
        match result {
            Err(VoxError::Format { message }) => {
                assert_eq!(message, "Only support 16-bit samples. Given 24")
            }
            _ => panic!("Expected Format error"),
        }
    }

    #[test]
    fn invalid_wav_data_returns_format_error() {
        let result = open(vec![0u8, 1, 2, 3, 4, 5], no_padding());
        match result {
            Err(VoxError::Format { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            _ => panic!("Expected Format error"),
        }
    }

    #[test]
    fn test_malformed_wav_missing_riff_header() {
        let bad_data = b"XXXX\x00\x00\x00\x00WAVEfmt ";
        assert!(open(bad_data.to_vec(), no_padding()).is_err());
    }

    #[test]
    fn test_malformed_wav_all_zeros() {
        assert!(open(vec![0u8; 1000], no_padding()).is_err());
    }

    #[test]
    fn second_subscribe_requires_unsubscribe() {
        let mut source = open(make_wav_data(16000, 1, &[1i16; 10]), no_padding()).unwrap();
        let _rx = source.subscribe().unwrap();
        assert!(source.subscribe().is_err());
        source.unsubscribe().unwrap();
        source.unsubscribe().unwrap();
        assert!(source.subscribe().is_ok());
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let result = FileDecodeSource::open(
            Path::new("/nonexistent/voxdesk/test.wav"),
            16000,
            no_padding(),
        );
        assert!(matches!(result, Err(VoxError::Io(_))));
    }

    #[test]
    fn default_padding_exceeds_default_rules() {
        let options = FileDecodeOptions::default();
        assert!(options.validate_against(&EndpointConfig::default()).is_ok());
    }

    #[test]
    fn short_padding_is_rejected_when_endpointing() {
        let options = FileDecodeOptions {
            tail_padding_secs: 0.5,
            ..FileDecodeOptions::default()
        };
        let err = options
            .validate_against(&EndpointConfig::default())
            .unwrap_err();
        assert!(matches!(err, VoxError::Configuration { .. }));

        let disabled = EndpointConfig {
            enabled: false,
            ..EndpointConfig::default()
        };
        assert!(options.validate_against(&disabled).is_ok());
    }

    #[test]
    fn tiny_read_chunk_is_rejected() {
        let options = FileDecodeOptions {
            read_chunk_bytes: 1,
            ..FileDecodeOptions::default()
        };
        assert!(options.validate_against(&EndpointConfig::default()).is_err());
    }
}
