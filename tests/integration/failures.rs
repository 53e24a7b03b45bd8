use crate::*;

use sluice_core::{FnTransform, Identity, Uppercase};
use sluice_pipeline::{MemorySink, MemorySource, Pipeline, StageState};

fn words(n: usize) -> MemorySource {
    MemorySource::new((0..n).map(|i| Chunk::from(format!("chunk-{i};").into_bytes())))
}

/// A stage that rejects its third chunk.
fn fails_on_third() -> FnTransform<impl FnMut(Chunk) -> Result<Option<Chunk>, PipelineError> + Send> {
    let mut seen = 0;
    FnTransform::new("picky", move |chunk: Chunk| {
        seen += 1;
        if seen == 3 {
            Err(PipelineError::transform("picky", "third chunk rejected"))
        } else {
            Ok(Some(chunk))
        }
    })
}

/// The middle stage of three fails: the error reaches the last stage,
/// nothing more flows into it, upstream is aborted and the sink is
/// closed exactly once without finishing.
#[tokio::test]
async fn middle_stage_failure_stops_everything() {
    let mut pipeline = Pipeline::builder()
        .stage(Uppercase::default())
        .stage(fails_on_third())
        .stage(Identity)
        .watermarks(8, 2)
        .build();
    let log = record_events(pipeline.events());
    let sink = MemorySink::new();

    let err = pipeline.run(words(20), sink.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::TransformFailure { ref stage, .. } if stage == "picky"));

    let first = pipeline.stage(0).unwrap();
    let failed = pipeline.stage(1).unwrap();
    let last = pipeline.stage(2).unwrap();
    assert!(matches!(first.error(), Some(PipelineError::Aborted)));
    assert!(matches!(failed.error(), Some(PipelineError::TransformFailure { .. })));
    assert!(matches!(last.error(), Some(PipelineError::TransformFailure { .. })));
    for stage in pipeline.stages() {
        assert_eq!(stage.state(), StageState::Closed);
        assert_eq!(stage.buffered(), 0);
    }
    assert!(last.accepted() <= 2, "last stage accepted {}", last.accepted());

    let state = sink.state();
    assert!(state.aborted);
    assert!(!state.finished);
    assert_eq!(state.closes, 1);
    assert!(state.writes <= 2);
    drop(state);

    let log = log.lock().unwrap();
    let errors: Vec<_> = log
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], PipelineEvent::Error { stage: Some(1), .. }));
    assert_eq!(
        log.iter().filter(|e| **e == PipelineEvent::SinkClosed).count(),
        1
    );
    assert!(!log.iter().any(|e| matches!(e, PipelineEvent::SinkFinished { .. })));
    assert_eq!(log.last(), Some(&PipelineEvent::SinkClosed));
}

/// After a failure the pipeline stays closed: a second run delivers
/// nothing.
#[tokio::test]
async fn failed_pipeline_cannot_be_reused() {
    let mut pipeline = Pipeline::builder().stage(fails_on_third()).build();
    pipeline.run(words(5), MemorySink::new()).await.unwrap_err();

    let sink = MemorySink::new();
    let err = pipeline.run(words(5), sink.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Closed { .. }));
    assert!(sink.contents().is_empty());
    assert_eq!(sink.state().closes, 1);
}

struct BrokenSource {
    reads: u32,
}

impl Source for BrokenSource {
    async fn read(&mut self) -> Result<Option<Chunk>, PipelineError> {
        self.reads += 1;
        if self.reads > 2 {
            return Err(PipelineError::io(
                "failed to read device",
                std::io::Error::other("device unplugged"),
            ));
        }
        Ok(Some("ok".into()))
    }
}

/// A source failure closes every stage with that error.
#[tokio::test]
async fn source_failure_closes_all_stages() {
    let mut pipeline = Pipeline::builder()
        .stage(Identity)
        .stage(Identity)
        .build();
    let log = record_events(pipeline.events());
    let sink = MemorySink::new();

    let err = pipeline
        .run(BrokenSource { reads: 0 }, sink.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(err.to_string().contains("device unplugged"));
    for stage in pipeline.stages() {
        assert!(matches!(stage.error(), Some(PipelineError::Io { .. })));
    }
    assert!(sink.state().aborted);
    assert!(log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, PipelineEvent::Error { stage: None, .. })));
}

struct RefusingSink {
    aborts: Arc<AtomicU64>,
}

impl Sink for RefusingSink {
    async fn write(&mut self, _chunk: Chunk) -> Result<(), PipelineError> {
        Err(PipelineError::io(
            "failed to write disk",
            std::io::Error::new(std::io::ErrorKind::WriteZero, "no space left"),
        ))
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn abort(&mut self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// A sink write failure aborts the sink once and fails the run.
#[tokio::test]
async fn sink_failure_aborts_sink_once() {
    let aborts = Arc::new(AtomicU64::new(0));
    let mut pipeline = Pipeline::builder().stage(Identity).build();

    let err = pipeline
        .run(words(10), RefusingSink { aborts: aborts.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
    assert!(matches!(
        pipeline.stage(0).unwrap().error(),
        Some(PipelineError::Io { .. })
    ));
}
