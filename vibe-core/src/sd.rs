use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use hf_hub::api::tokio::Api;
use image::RgbImage;
use tracing::info;

use crate::{
    select_best_device, AcceleratorMemory, CheckpointSource, Device, DeviceMap, EditRequest,
    EditorLike, Loader,
};

/// Configuration for the external `sd` editing backend.
#[derive(Debug, Clone)]
pub struct SdCliConfig {
    pub binary: PathBuf,
    pub checkpoint: CheckpointSource,
}

/// Drives a stable-diffusion.cpp style `sd` binary as the editing capability.
///
/// The pipeline itself stays out of process: each request stages the input
/// image in a scratch directory, runs one `sd` invocation with the resolved
/// seed, and reads the edited image back. Backend failures surface as plain
/// errors and never tear down the session.
pub struct SdCliEditor {
    binary: PathBuf,
    checkpoint: PathBuf,
    device: Device,
}

impl SdCliEditor {
    fn command_args(
        &self,
        request: &EditRequest,
        seed: u32,
        input: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        [
            OsString::from("-M"),
            "img2img".into(),
            "-m".into(),
            self.checkpoint.clone().into(),
            "-i".into(),
            input.to_path_buf().into(),
            "-p".into(),
            request.instruction.clone().into(),
            "--steps".into(),
            request.steps.to_string().into(),
            "--cfg-scale".into(),
            request.guidance_scale.to_string().into(),
            "--img-cfg-scale".into(),
            request.image_guidance_scale.to_string().into(),
            "-s".into(),
            seed.to_string().into(),
            "-o".into(),
            output.to_path_buf().into(),
        ]
        .into()
    }
}

impl EditorLike for SdCliEditor {
    fn edit(&self, request: &EditRequest, seed: u32) -> Result<RgbImage> {
        info!(
            instruction = %request.instruction,
            seed,
            steps = request.steps,
            "generating"
        );
        let work = tempfile::tempdir().context("failed to create scratch directory")?;
        let input = work.path().join("input.png");
        let output = work.path().join("output.png");
        request
            .image
            .save(&input)
            .context("failed to stage input image")?;

        let run = Command::new(&self.binary)
            .args(self.command_args(request, seed, &input, &output))
            .output()
            .context("failed to launch the editing backend")?;
        if !run.status.success() {
            bail!(
                "editing backend exited with {}: {}",
                run.status,
                String::from_utf8_lossy(&run.stderr).trim()
            );
        }

        let edited = image::open(&output).context("editing backend produced no readable output")?;
        Ok(edited.to_rgb8())
    }

    fn accelerator_memory(&self) -> Option<AcceleratorMemory> {
        self.device.memory_usage()
    }
}

pub struct SdCliLoader;

impl Loader for SdCliLoader {
    type Editor = SdCliEditor;
    type Config = SdCliConfig;

    async fn load(config: SdCliConfig, api: Api, device_map: DeviceMap) -> Result<SdCliEditor> {
        let device = select_best_device(device_map);
        info!(?device, "device detected");

        probe_binary(&config.binary)?;
        let (checkpoint, format) = config.checkpoint.resolve(&api).await?;
        info!(path = %checkpoint.display(), ?format, "loading model");

        Ok(SdCliEditor {
            binary: config.binary,
            checkpoint,
            device,
        })
    }
}

fn probe_binary(binary: &Path) -> Result<()> {
    Command::new(binary)
        .arg("--help")
        .output()
        .map(|_| ())
        .with_context(|| format!("editing backend binary not runnable: {}", binary.display()))
}
