use std::sync::{Arc, Mutex};

use serde::Serialize;
use sysinfo::{CpuExt, System, SystemExt};

use crate::EditorLike;

/// Used/total memory of the accelerator the capability runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AcceleratorMemory {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// One sampling tick worth of host and accelerator usage. Recomputed on
/// every call, never stored.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub accelerator: Option<AcceleratorMemory>,
}

/// Samples CPU, RAM, and accelerator memory on demand. Sampling is pure
/// observation and independent of request handling; the server polls it on a
/// fixed one-second tick.
pub struct ResourceMonitor {
    system: Mutex<System>,
    editor: Arc<dyn EditorLike>,
}

impl ResourceMonitor {
    pub fn new(editor: Arc<dyn EditorLike>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            editor,
        }
    }

    /// Never fails: host stats are best-effort and an accelerator query error
    /// only degrades that one field to `None`.
    pub fn sample(&self) -> ResourceSnapshot {
        let (cpu_percent, ram_percent) = {
            let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
            system.refresh_cpu();
            system.refresh_memory();
            let total = system.total_memory();
            let ram = if total == 0 {
                0.0
            } else {
                system.used_memory() as f32 / total as f32 * 100.0
            };
            (system.global_cpu_info().cpu_usage(), ram)
        };
        ResourceSnapshot {
            cpu_percent,
            ram_percent,
            accelerator: self.editor.accelerator_memory(),
        }
    }
}

impl ResourceSnapshot {
    /// One status line for the presentation layer.
    pub fn render(&self) -> String {
        let accelerator = match self.accelerator {
            Some(memory) => format!(
                "GPU: {} / {} MiB",
                memory.used_bytes / (1024 * 1024),
                memory.total_bytes / (1024 * 1024)
            ),
            None => "GPU: unavailable".to_string(),
        };
        format!(
            "CPU: {:.1}% | RAM: {:.1}% | {}",
            self.cpu_percent, self.ram_percent, accelerator
        )
    }
}
