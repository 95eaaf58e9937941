use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use voxdesk::audio::{AudioFormat, ReplaySource};
use voxdesk::recognizer::{RecognizerConfig, TranscriberRecognizer};
use voxdesk::session::RecognitionSession;
use voxdesk::sink::CollectorSink;
use voxdesk::stt::MockTranscriber;
use voxdesk::Result;

const SAMPLE_RATE: u32 = 16000;
const FRAME_SAMPLES: usize = 2048;

/// Alternating one-second bursts of tone and silence.
fn speech_like_audio(seconds: usize) -> Vec<Vec<i16>> {
    let samples: Vec<i16> = (0..seconds * SAMPLE_RATE as usize)
        .map(|i| {
            if (i / SAMPLE_RATE as usize) % 2 == 0 {
                let t = i as f32 / SAMPLE_RATE as f32;
                ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16
            } else {
                0
            }
        })
        .collect();
    samples.chunks(FRAME_SAMPLES).map(<[i16]>::to_vec).collect()
}

fn run_session(frames: Vec<Vec<i16>>) -> usize {
    let factory = |config: &RecognizerConfig| -> Result<TranscriberRecognizer<MockTranscriber>> {
        Ok(TranscriberRecognizer::new(
            MockTranscriber::new("bench").with_response("benchmark"),
            config.clone(),
        ))
    };
    let sink = CollectorSink::new();
    let mut session =
        match RecognitionSession::new(RecognizerConfig::default(), factory, sink.clone()) {
            Ok(session) => session,
            Err(e) => panic!("session: {e}"),
        };
    let source = ReplaySource::from_i16_chunks(AudioFormat::mono(SAMPLE_RATE), frames);
    if let Err(e) = session.start(Box::new(source)) {
        panic!("start: {e}");
    }
    if let Err(e) = session.run() {
        panic!("run: {e}");
    }
    sink.finals().len()
}

fn bench_session_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_loop");
    for seconds in [4usize, 16, 64] {
        let frames = speech_like_audio(seconds);
        group.throughput(Throughput::Elements((seconds * SAMPLE_RATE as usize) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(seconds), &frames, |b, frames| {
            b.iter(|| black_box(run_session(frames.clone())));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_session_loop);
criterion_main!(benches);
