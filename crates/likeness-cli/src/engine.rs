use likeness_core::{compare_files, CompareError, FaceAnalyzer, MatchDecision, MatchOutcome, Threshold};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("comparison timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent to the engine thread.
enum EngineRequest {
    Compare {
        first: PathBuf,
        second: PathBuf,
        threshold: Threshold,
        started: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<MatchDecision, CompareError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Compare two image files. With a `timeout`, gives up waiting after that
    /// long; the engine drops the late reply.
    ///
    /// The clock starts when the engine picks the request up, so time spent
    /// queued behind an earlier comparison does not count against it.
    pub async fn compare(
        &self,
        first: PathBuf,
        second: PathBuf,
        threshold: Threshold,
        timeout: Option<Duration>,
    ) -> Result<MatchDecision, EngineError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare {
                first,
                second,
                threshold,
                started: started_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        started_rx.await.map_err(|_| EngineError::ChannelClosed)?;

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx)
                .await
                .map_err(|_| EngineError::Timeout(limit))?,
            None => reply_rx.await,
        };
        Ok(reply.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// [`compare`](Self::compare), with a missing face folded into the outcome.
    pub async fn compare_outcome(
        &self,
        first: PathBuf,
        second: PathBuf,
        threshold: Threshold,
        timeout: Option<Duration>,
    ) -> Result<MatchOutcome, EngineError> {
        match self.compare(first, second, threshold, timeout).await {
            Ok(decision) => Ok(decision.into()),
            Err(EngineError::Compare(e)) => Ok(MatchOutcome::from_comparison(Err(e))?),
            Err(e) => Err(e),
        }
    }
}

/// Run `analyzer` on a dedicated OS thread and return a handle to it.
///
/// The analyzer is loaded by the caller, so model failures surface before
/// any thread exists. Requests are served one at a time in arrival order.
pub fn spawn_engine<A>(mut analyzer: A) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("likeness-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Compare {
                        first,
                        second,
                        threshold,
                        started,
                        reply,
                    } => {
                        if reply.is_closed() || started.send(()).is_err() {
                            tracing::debug!(first = %first.display(), "caller gone; skipping comparison");
                            continue;
                        }
                        let result = compare_files(&mut analyzer, &first, &second, threshold);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use likeness_core::{
        AnalyzedFace, AnalyzerError, BoundingBox, DecodedImage, FaceDescriptor, MissingFace,
    };
    use std::path::Path;

    const SLOW: u8 = 255;

    /// Descriptor = [red / 100, 0, ...]; red 0 means no face. Images whose
    /// green channel is `SLOW` take `delay` per analysis.
    struct StubAnalyzer {
        delay: Duration,
    }

    impl FaceAnalyzer for StubAnalyzer {
        fn analyze(&mut self, image: &DecodedImage) -> Result<Option<AnalyzedFace>, AnalyzerError> {
            let pixel = image.rgb().get_pixel(0, 0);
            if pixel[1] == SLOW {
                std::thread::sleep(self.delay);
            }
            let red = pixel[0];
            if red == 0 {
                return Ok(None);
            }
            let mut values = vec![0.0f32; 128];
            values[0] = red as f32 / 100.0;
            Ok(Some(AnalyzedFace {
                face: BoundingBox {
                    x: 0.0, y: 0.0, width: 4.0, height: 4.0, confidence: 0.9, keypoints: None,
                },
                landmarks: None,
                descriptor: FaceDescriptor::new(values).unwrap(),
            }))
        }
    }

    fn write_png(dir: &Path, name: &str, red: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 4, Rgb([red, 0, 0])).save(&path).unwrap();
        path
    }

    fn write_slow_png(dir: &Path, name: &str, red: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 4, Rgb([red, SLOW, 0])).save(&path).unwrap();
        path
    }

    fn engine(delay_ms: u64) -> EngineHandle {
        spawn_engine(StubAnalyzer { delay: Duration::from_millis(delay_ms) }).unwrap()
    }

    #[tokio::test]
    async fn test_engine_compares_pair() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 40);

        let decision = engine(0)
            .compare(a, b, Threshold::default(), None)
            .await
            .unwrap();
        assert!((decision.distance - 0.3).abs() < 1e-5);
        assert!(decision.is_match);
    }

    #[tokio::test]
    async fn test_engine_serves_sequential_requests() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 90);
        let handle = engine(0);

        for _ in 0..3 {
            let decision = handle
                .compare(a.clone(), b.clone(), Threshold::default(), Some(Duration::from_secs(5)))
                .await
                .unwrap();
            assert!(!decision.is_match);
        }
    }

    #[tokio::test]
    async fn test_engine_no_face_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 0);
        let b = write_png(dir.path(), "b.png", 40);

        let outcome = engine(0)
            .compare_outcome(a, b, Threshold::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoFaceDetected { missing: MissingFace::First });
    }

    #[tokio::test]
    async fn test_engine_decode_error_stays_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);
        let b = dir.path().join("missing.png");

        let err = engine(0)
            .compare_outcome(a, b, Threshold::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Compare(CompareError::Decode { .. })), "{err:?}");
    }

    #[tokio::test]
    async fn test_engine_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_slow_png(dir.path(), "a.png", 10);
        let b = write_slow_png(dir.path(), "b.png", 40);

        let err = engine(500)
            .compare(a, b, Threshold::default(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_queued_request_not_charged_for_abandoned_one() {
        let dir = tempfile::tempdir().unwrap();
        let slow_a = write_slow_png(dir.path(), "slow_a.png", 10);
        let slow_b = write_slow_png(dir.path(), "slow_b.png", 40);
        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 40);
        let handle = engine(300);

        // The slow pair keeps the engine busy for ~600ms after its caller gives up.
        let err = handle
            .compare(slow_a, slow_b, Threshold::default(), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)), "{err:?}");

        let decision = handle
            .compare(a, b, Threshold::default(), Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!((decision.distance - 0.3).abs() < 1e-5);
    }
}
