use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, EditorLike};

/// Builds a ready-to-serve editing capability at startup. Load failures are
/// fatal: the process exits before accepting any request.
pub trait Loader {
    type Editor: EditorLike;
    type Config;

    fn load(
        config: Self::Config,
        api: Api,
        device_map: DeviceMap,
    ) -> impl Future<Output = Result<Self::Editor>>
    where
        Self: Sized;
}
