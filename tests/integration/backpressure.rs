use crate::*;

use sluice_core::Identity;
use sluice_pipeline::{EventKind, Pipeline};

const CHUNK: usize = 64 * 1024;

/// 10 MB through three stages into a sink that is far slower than the
/// source. The source may never run further ahead of the sink than the
/// stage buffers can hold.
#[tokio::test]
async fn slow_sink_bounds_buffered_chunks() {
    let total_chunks = 160u64;
    let (high, low) = (4usize, 1usize);
    let stages = 3usize;

    let produced = Arc::new(AtomicU64::new(0));
    let source = CountingSource::new(total_chunks, CHUNK, produced.clone());
    let sink = SlowSink::new(Duration::from_millis(2), produced.clone());
    let handles = sink.handles();

    let mut pipeline = Pipeline::builder()
        .stage(Identity)
        .stage(Identity)
        .stage(Identity)
        .watermarks(high, low)
        .build();
    let pauses = Arc::new(AtomicU64::new(0));
    {
        let pauses = pauses.clone();
        pipeline.events().subscribe(EventKind::Pause, move |_| {
            pauses.fetch_add(1, Ordering::SeqCst);
        });
    }

    let stats = pipeline.run(source, sink).await.unwrap();

    assert_eq!(stats.chunks_in, total_chunks);
    assert_eq!(stats.bytes_out, total_chunks * CHUNK as u64);
    assert_eq!(handles.written.load(Ordering::SeqCst), total_chunks);
    assert_eq!(handles.finished.load(Ordering::SeqCst), 1);

    let bound = (stages * (high + 1)) as u64;
    let ahead = handles.max_ahead.load(Ordering::SeqCst);
    assert!(ahead <= bound, "source ran {ahead} chunks ahead (bound {bound})");
    assert!(pauses.load(Ordering::SeqCst) > 0, "slow sink never caused a pause");
    assert_eq!(stats.pauses, pauses.load(Ordering::SeqCst));
    for peak in &stats.peak_buffered {
        assert!(*peak <= high + 1, "stage buffered {peak} chunks");
    }

    let expected = blake3::hash(&pattern(total_chunks as usize * CHUNK));
    assert_eq!(handles.hasher.lock().unwrap().finalize(), expected);
}

/// A pause must be followed by a resume once the sink catches up.
#[tokio::test]
async fn every_pause_is_resumed() {
    let produced = Arc::new(AtomicU64::new(0));
    let source = CountingSource::new(40, 1024, produced.clone());
    let sink = SlowSink::new(Duration::from_millis(1), produced);

    let mut pipeline = Pipeline::builder()
        .stage(Identity)
        .stage(Identity)
        .watermarks(2, 0)
        .build();
    let log = record_events(pipeline.events());

    pipeline.run(source, sink).await.unwrap();

    let log = log.lock().unwrap();
    for stage in 0..2 {
        let pauses = log
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Pause { stage: s } if *s == stage))
            .count();
        let resumes = log
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Resume { stage: s } if *s == stage))
            .count();
        assert!(
            resumes + 1 >= pauses && resumes <= pauses,
            "stage {stage}: {pauses} pauses, {resumes} resumes"
        );
    }
    assert!(log.iter().any(|e| matches!(e, PipelineEvent::Pause { .. })));
}
