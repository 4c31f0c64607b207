use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use clap::Parser;
use hf_hub::api::tokio::Api;
use image::RgbImage;
use serde::Serialize;
use std::{io::Cursor, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vibe_core::{
    CheckpointSource, DeviceMap, EditResult, EditorSession, Loader, RawEditRequest,
    ResourceMonitor, ResourceSnapshot, SdCliConfig, SdCliLoader,
};

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Local instruction-driven image editing server")]
struct Args {
    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,

    /// Path to a local model checkpoint, preferred when it exists
    #[arg(long, default_value = "VIBE_Model.safetensors")]
    model: PathBuf,

    /// Hub repository the checkpoint is fetched from when the local file is absent
    #[arg(long, default_value = "iitolstykh/VIBE-Image-Edit")]
    model_repo: String,

    /// Checkpoint filename inside the hub repository
    #[arg(long, default_value = "model.safetensors")]
    model_file: String,

    /// External editing backend binary
    #[arg(long, default_value = "sd")]
    editor_bin: PathBuf,

    /// Directory edited images are saved into
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Host address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

/// Encodes an edited image as a base64 JPEG at the same quality the
/// persisted artifact uses.
fn image_to_base64_jpeg(img: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, 100);
    encoder.encode_image(img)?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

#[derive(Serialize)]
struct EditResponse {
    image: Option<String>,
    status: String,
}

#[derive(Serialize)]
struct ResourceResponse {
    #[serde(flatten)]
    snapshot: ResourceSnapshot,
    text: String,
}

// Application state containing the loaded session and the resource monitor.
struct AppState {
    session: Arc<EditorSession>,
    monitor: Arc<ResourceMonitor>,
}

async fn edit_image_handler(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawEditRequest>,
) -> Json<EditResponse> {
    let EditResult { image, status } = state.session.process(raw).await;
    // Per-request failures are part of the result contract, not HTTP errors:
    // the caller always gets 200 with the reason in `status`.
    let (image, status) = match image.map(|img| image_to_base64_jpeg(&img)) {
        Some(Ok(encoded)) => (Some(encoded), status),
        Some(Err(error)) => (None, format!("Could not encode result: {error:#}")),
        None => (None, status),
    };
    Json(EditResponse { image, status })
}

async fn resources_handler(State(state): State<Arc<AppState>>) -> Json<ResourceResponse> {
    let snapshot = state.monitor.sample();
    Json(ResourceResponse {
        text: snapshot.render(),
        snapshot,
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "phase": format!("{:?}", state.session.phase()),
    }))
}

/// Terminates the process immediately; the connection is simply dropped.
async fn shutdown_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.shutdown()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let device_map = if args.cpu {
        DeviceMap::ForceCpu
    } else {
        DeviceMap::default()
    };
    let config = SdCliConfig {
        binary: args.editor_bin,
        checkpoint: CheckpointSource {
            local: args.model,
            fallback_repo: args.model_repo,
            fallback_file: args.model_file,
        },
    };

    // A load failure is fatal: propagate and exit non-zero before serving.
    let editor = Arc::new(SdCliLoader::load(config, Api::new()?, device_map).await?);
    let session = Arc::new(EditorSession::new(editor.clone(), args.output_dir)?);
    let monitor = Arc::new(ResourceMonitor::new(editor));

    // 1 Hz resource tick, decoupled from request handling.
    let ticker = monitor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            debug!("{}", ticker.sample().render());
        }
    });

    // --- Build axum router with shared state ---
    let state = Arc::new(AppState { session, monitor });
    let app = Router::new()
        .route("/v1/images/edits", post(edit_image_handler))
        .route("/v1/resources", get(resources_handler))
        .route("/v1/health", get(health_handler))
        .route("/v1/shutdown", post(shutdown_handler))
        .with_state(state);

    // --- Start the server ---
    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address).await?;
    info!("started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
