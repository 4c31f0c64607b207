pub mod checkpoint;
pub mod device;
pub mod error;
pub mod loader;
pub mod monitor;
pub mod persist;
pub mod request;
mod sd;
pub mod session;

pub use checkpoint::*;
pub use device::*;
pub use error::EditError;
pub use loader::*;
pub use monitor::*;
pub use persist::*;
pub use request::*;
pub use sd::*;
pub use session::*;

use image::RgbImage;

/// The generative editing capability behind the service.
///
/// Implementations receive a fully normalized request plus the resolved seed
/// and produce the edited image, or fail with whatever the underlying
/// pipeline reported. The seed is threaded explicitly so that identical
/// (image, instruction, parameters, seed) tuples reproduce identical output.
pub trait EditorLike: Send + Sync {
    fn edit(&self, request: &EditRequest, seed: u32) -> anyhow::Result<RgbImage>;

    /// Best-effort accelerator memory usage, if the capability runs on one.
    fn accelerator_memory(&self) -> Option<AcceleratorMemory> {
        None
    }
}
