use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rawtracks_compositor::probe::parse;
use rawtracks_compositor::track::{detect_gaps, reconstruct_segments, TrackAnalyzer};

/// Probe dump of a 30 fps track with a one second hole every `hole_every` frames
fn probe_dump(frames: usize, hole_every: usize) -> String {
    let mut text = String::from(
        "[STREAM]\nindex=0\ncodec_type=video\nstart_time=0.000000\nr_frame_rate=30/1\n[/STREAM]\n",
    );
    let mut t = 0.0;
    for n in 0..frames {
        if n > 0 && n % hole_every == 0 {
            t += 1.0;
        }
        text.push_str(&format!(
            "[FRAME]\nmedia_type=video\npts_time={:.6}\nduration_time=0.033333\nwidth=1280\nheight=720\n[/FRAME]\n",
            t
        ));
        t += 1.0 / 30.0;
    }
    text
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for frames in [1_000, 30_000] {
        let dump = probe_dump(frames, 900);
        group.bench_with_input(BenchmarkId::from_parameter(frames), &dump, |b, dump| {
            b.iter(|| parse(black_box(dump)).unwrap())
        });
    }
    group.finish();
}

fn bench_gaps(c: &mut Criterion) {
    let output = parse(&probe_dump(108_000, 300)).unwrap();
    let samples = output.frame_samples().unwrap();

    c.bench_function("detect_gaps_1h", |b| {
        b.iter(|| detect_gaps(black_box(&samples), 0.5))
    });

    let analysis = TrackAnalyzer::default().analyze(&output).unwrap();
    c.bench_function("reconstruct_segments_1h", |b| {
        b.iter(|| reconstruct_segments(black_box(analysis.end_time), black_box(&analysis.gaps)))
    });
}

criterion_group!(benches, bench_parse, bench_gaps);
criterion_main!(benches);
