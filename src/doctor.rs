use crate::config::Config;
use crate::engine::{process, DocDiag, Engine};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    pub name: String,
    pub vram_gib: f32,
    pub driver_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvReport {
    pub docling: DocDiag,
    pub gpus: Vec<GpuInfo>,
    pub resolved_device: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl EnvReport {
    pub fn build(cfg: &Config, docling: DocDiag, gpus: Vec<GpuInfo>) -> Self {
        let resolved_device = resolve_device(&cfg.docling.device, !gpus.is_empty());
        let mut hints = Vec::new();
        if gpus.is_empty() && resolved_device != "cuda" {
            hints.extend(
                [
                    "no NVIDIA GPU detected; conversion will run on CPU (slower, but functional)",
                    "check that the machine has an NVIDIA GPU",
                    "install the latest NVIDIA drivers",
                    "verify the driver and CUDA runtime with `nvidia-smi` and `nvcc --version`",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }
        Self {
            docling,
            gpus,
            resolved_device,
            hints,
        }
    }
}

/// `auto` picks cuda when a GPU is visible, else cpu; anything else is taken as-is.
pub fn resolve_device(configured: &str, has_gpu: bool) -> String {
    if configured.trim().is_empty() || configured.eq_ignore_ascii_case("auto") {
        if has_gpu { "cuda".into() } else { "cpu".into() }
    } else {
        configured.trim().to_ascii_lowercase()
    }
}

/// Parses `nvidia-smi --query-gpu=name,memory.total,driver_version --format=csv,noheader,nounits`.
pub fn parse_nvidia_smi(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            if cols.len() < 3 || cols[0].is_empty() {
                return None;
            }
            let mib: f32 = cols[1].parse().ok()?;
            Some(GpuInfo {
                name: cols[0].to_string(),
                vram_gib: mib / 1024.0,
                driver_version: cols[2].to_string(),
            })
        })
        .collect()
}

pub fn detect_gpus(cfg: &Config) -> Vec<GpuInfo> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.args([
        "--query-gpu=name,memory.total,driver_version",
        "--format=csv,noheader,nounits",
    ]);
    let timeout = Some(Duration::from_secs(cfg.docling.doctor_timeout_seconds.max(1)));
    match process::run(&mut cmd, timeout) {
        Ok(process::Finished::Exited(out)) if out.status.success() => {
            parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(_) => {
            debug!("nvidia-smi did not report any GPU");
            Vec::new()
        }
        Err(err) => {
            debug!("nvidia-smi unavailable: {err:#}");
            Vec::new()
        }
    }
}

/// Checks the converter install and accelerator. Fails when docling can't be run.
pub fn check_environment(cfg: &Config, engine: &dyn Engine) -> Result<EnvReport> {
    let diag = engine.doctor()?;
    if !diag.ok {
        bail!(
            "Docling is not installed or not runnable ({}): {}",
            diag.docling_exe,
            diag.error.as_deref().unwrap_or("unknown error")
        );
    }

    let report = EnvReport::build(cfg, diag, detect_gpus(cfg));
    info!(
        "docling version={}",
        report.docling.docling_version.as_deref().unwrap_or("unidentified")
    );
    for gpu in &report.gpus {
        info!("GPU: {} VRAM={:.1} GB driver={}", gpu.name, gpu.vram_gib, gpu.driver_version);
    }
    if report.gpus.is_empty() {
        warn!("GPU not detected, using {}", report.resolved_device);
    }
    info!("processing device={}", report.resolved_device);
    Ok(report)
}
