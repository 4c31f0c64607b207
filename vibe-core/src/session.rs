use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use image::RgbImage;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{info, warn};

use crate::{persist_result, resolve_seed, EditError, EditResult, EditorLike, RawEditRequest};

/// Lifecycle phase of the session: idle, running one inference, or torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Ready = 0,
    Serving = 1,
    Terminated = 2,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Ready,
            1 => Phase::Serving,
            _ => Phase::Terminated,
        }
    }
}

/// Owns the loaded editing capability for the lifetime of the process.
///
/// Requests run one at a time: a single admission slot serializes inference
/// calls in FIFO order, since the capability (and the device under it) is not
/// assumed safe for concurrent invocation. Per-request failures are caught
/// here and turned into status text; the session keeps serving afterwards.
pub struct EditorSession {
    editor: Arc<dyn EditorLike>,
    output_dir: PathBuf,
    slot: Mutex<()>,
    phase: AtomicU8,
}

impl EditorSession {
    /// Creates the output directory idempotently; this is the one filesystem
    /// precondition established at startup rather than per request.
    pub fn new(editor: Arc<dyn EditorLike>, output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            editor,
            output_dir,
            slot: Mutex::new(()),
            phase: AtomicU8::new(Phase::Ready as u8),
        })
    }

    pub fn editor(&self) -> Arc<dyn EditorLike> {
        self.editor.clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Runs one edit request end to end: normalize, resolve the seed, invoke
    /// the capability once, persist the artifact. Always returns a result
    /// pair; failures land in the status text with no image.
    pub async fn process(&self, raw: RawEditRequest) -> EditResult {
        match self.try_process(raw).await {
            Ok((image, path)) => EditResult::success(image, &path),
            Err(error) => {
                warn!(%error, "request failed");
                EditResult::failure(&error)
            }
        }
    }

    async fn try_process(&self, raw: RawEditRequest) -> Result<(RgbImage, PathBuf), EditError> {
        let request = raw.normalize()?;
        let seed = resolve_seed(request.seed);

        // One inference at a time; the call itself may block for minutes, so
        // it runs on the blocking pool and monitoring stays live.
        let _slot = self.slot.lock().await;
        self.phase.store(Phase::Serving as u8, Ordering::SeqCst);
        let editor = self.editor.clone();
        let outcome = task::spawn_blocking(move || editor.edit(&request, seed)).await;
        self.phase.store(Phase::Ready as u8, Ordering::SeqCst);

        let edited = match outcome {
            Ok(Ok(image)) => image,
            Ok(Err(error)) => return Err(EditError::Generation(format!("{error:#}"))),
            Err(join_error) => return Err(EditError::Generation(join_error.to_string())),
        };

        let path = persist_result(&edited, seed, &self.output_dir)?;
        info!(path = %path.display(), seed, "saved result");
        Ok((edited, path))
    }

    /// Terminates the whole process immediately, abandoning any in-flight
    /// request. Accelerator memory is only reliably released by full process
    /// teardown, so there is no graceful unload path. Never returns.
    pub fn shutdown(&self) -> ! {
        self.phase.store(Phase::Terminated as u8, Ordering::SeqCst);
        info!("shutdown requested, terminating");
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use anyhow::anyhow;
    use base64::{prelude::BASE64_STANDARD, Engine};

    use super::*;
    use crate::EditRequest;

    /// Echoes the input image back and counts invocations; fails on demand
    /// when the instruction says so.
    struct StubEditor {
        calls: AtomicUsize,
    }

    impl StubEditor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EditorLike for StubEditor {
        fn edit(&self, request: &EditRequest, _seed: u32) -> anyhow::Result<RgbImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.instruction == "fail" {
                return Err(anyhow!("pipeline exploded"));
            }
            Ok(request.image.clone())
        }
    }

    fn png_base64(width: u32, height: u32) -> String {
        let image = RgbImage::from_pixel(width, height, image::Rgb([9, 9, 9]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        BASE64_STANDARD.encode(&bytes)
    }

    fn raw(instruction: &str, seed: i64) -> RawEditRequest {
        RawEditRequest {
            image: Some(png_base64(4, 4)),
            instruction: instruction.to_string(),
            steps: Some(2.0),
            guidance_scale: None,
            image_guidance_scale: None,
            seed: Some(seed),
        }
    }

    #[tokio::test]
    async fn missing_input_never_reaches_the_capability() {
        let editor = Arc::new(StubEditor::new());
        let dir = tempfile::tempdir().unwrap();
        let session = EditorSession::new(editor.clone(), dir.path()).unwrap();

        let result = session
            .process(RawEditRequest {
                image: None,
                instruction: "anything".to_string(),
                steps: None,
                guidance_scale: None,
                image_guidance_scale: None,
                seed: None,
            })
            .await;

        assert!(result.image.is_none());
        assert_eq!(result.status, "No image uploaded");
        assert_eq!(editor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn capability_failure_leaves_the_session_usable() {
        let editor = Arc::new(StubEditor::new());
        let dir = tempfile::tempdir().unwrap();
        let session = EditorSession::new(editor.clone(), dir.path()).unwrap();

        let failed = session.process(raw("fail", 1)).await;
        assert!(failed.image.is_none());
        assert!(failed.status.contains("pipeline exploded"));
        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let ok = session.process(raw("brighten", 2)).await;
        assert!(ok.image.is_some());
        assert!(ok.status.starts_with("Saved to: "));
        assert_eq!(editor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistence_failure_is_not_a_generation_failure() {
        let editor = Arc::new(StubEditor::new());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("outputs");
        let session = EditorSession::new(editor, &out).unwrap();
        fs::remove_dir_all(&out).unwrap();

        let result = session.process(raw("brighten", 3)).await;
        assert!(result.image.is_none());
        assert!(result.status.starts_with("Could not save result:"));
    }

    #[tokio::test]
    async fn phase_starts_ready_and_returns_to_ready() {
        let editor = Arc::new(StubEditor::new());
        let dir = tempfile::tempdir().unwrap();
        let session = EditorSession::new(editor, dir.path()).unwrap();

        assert_eq!(session.phase(), Phase::Ready);
        let _ = session.process(raw("brighten", 4)).await;
        assert_eq!(session.phase(), Phase::Ready);
    }
}
