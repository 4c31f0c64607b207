use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hf_hub::api::tokio::Api;
use tracing::info;

/// Checkpoint container formats the editing backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    Safetensors,
    Ckpt,
    Gguf,
}

impl CheckpointFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "safetensors" => Some(Self::Safetensors),
            "ckpt" => Some(Self::Ckpt),
            "gguf" => Some(Self::Gguf),
            _ => None,
        }
    }
}

/// Where the model checkpoint comes from: a preferred local file, with a
/// Hugging Face repo to fall back to when it is absent.
#[derive(Debug, Clone)]
pub struct CheckpointSource {
    pub local: PathBuf,
    pub fallback_repo: String,
    pub fallback_file: String,
}

impl CheckpointSource {
    /// Resolves to a concrete checkpoint file, downloading the fallback from
    /// the hub when the local file is missing. Failures here are fatal load
    /// errors; the caller exits before serving.
    pub async fn resolve(&self, api: &Api) -> Result<(PathBuf, CheckpointFormat)> {
        let path = match self.local_checkpoint() {
            Some(local) => {
                info!(path = %local.display(), "using local checkpoint");
                local.to_path_buf()
            }
            None => {
                info!(
                    repo = %self.fallback_repo,
                    file = %self.fallback_file,
                    "local checkpoint not found, fetching from the hub"
                );
                api.model(self.fallback_repo.clone())
                    .get(&self.fallback_file)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to fetch {} from {}",
                            self.fallback_file, self.fallback_repo
                        )
                    })?
            }
        };
        let format = CheckpointFormat::from_path(&path)
            .ok_or_else(|| anyhow!("unsupported checkpoint format: {}", path.display()))?;
        Ok((path, format))
    }

    fn local_checkpoint(&self) -> Option<&Path> {
        self.local.is_file().then_some(self.local.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("VIBE_Model.safetensors")),
            Some(CheckpointFormat::Safetensors)
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.CKPT")),
            Some(CheckpointFormat::Ckpt)
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("weights/q4.gguf")),
            Some(CheckpointFormat::Gguf)
        );
        assert_eq!(CheckpointFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(CheckpointFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn prefers_an_existing_local_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("VIBE_Model.safetensors");
        std::fs::write(&local, b"weights").unwrap();

        let source = CheckpointSource {
            local: local.clone(),
            fallback_repo: "iitolstykh/VIBE-Image-Edit".to_string(),
            fallback_file: "model.safetensors".to_string(),
        };
        assert_eq!(source.local_checkpoint(), Some(local.as_path()));
    }

    #[test]
    fn missing_local_checkpoint_defers_to_the_hub() {
        let source = CheckpointSource {
            local: PathBuf::from("/definitely/not/here.safetensors"),
            fallback_repo: "iitolstykh/VIBE-Image-Edit".to_string(),
            fallback_file: "model.safetensors".to_string(),
        };
        assert_eq!(source.local_checkpoint(), None);
    }
}
