use super::process::{self, Finished};
use super::{types::*, Engine};
use crate::config::Config;
use crate::util::file_stem;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const STDERR_TAIL_LINES: usize = 20;

/// Drives the `docling` command-line converter, one child process per document.
pub struct DoclingCli {
    cfg: Config,
    exe: PathBuf,
}

impl DoclingCli {
    pub fn new(cfg: &Config) -> Self {
        Self {
            cfg: cfg.clone(),
            exe: resolve_docling_exe(&cfg.docling.exe),
        }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        for (k, v) in &self.cfg.docling.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn timeout(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    fn convert_args(&self, req: &ConvertIn, scratch: &Path) -> Vec<String> {
        let d = &self.cfg.docling;
        let mut args = vec![
            req.input.display().to_string(),
            "--to".to_string(),
            "md".to_string(),
            "--output".to_string(),
            scratch.display().to_string(),
            "--abort-on-error".to_string(),
        ];
        if !req.device.eq_ignore_ascii_case("auto") {
            args.push("--device".into());
            args.push(req.device.to_ascii_lowercase());
        }
        args.push(if d.do_ocr { "--ocr" } else { "--no-ocr" }.into());
        if !d.pdf_backend.is_empty() {
            args.push("--pdf-backend".into());
            args.push(d.pdf_backend.clone());
        }
        if d.num_threads > 0 {
            args.push("--num-threads".into());
            args.push(d.num_threads.to_string());
        }
        if d.document_timeout_seconds > 0 {
            args.push("--document-timeout".into());
            args.push(d.document_timeout_seconds.to_string());
        }
        args.extend(d.extra_args.iter().cloned());
        args
    }
}

fn resolve_docling_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("DOCLING_BIN") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        if let Some(p) = find_on_path("docling") {
            return p;
        }
        return PathBuf::from("docling");
    }
    expand_tilde(raw)
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Pulls the version number out of `docling --version` output.
pub fn parse_version(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Docling version:") {
            return Some(rest.trim().to_string());
        }
    }
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.to_string())
}

impl Engine for DoclingCli {
    fn doctor(&self) -> Result<DocDiag> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let exe = self.exe.display().to_string();

        let timeout = Self::timeout(self.cfg.docling.doctor_timeout_seconds);
        let finished = match process::run(&mut cmd, timeout) {
            Ok(f) => f,
            Err(err) => {
                return Ok(DocDiag {
                    docling_exe: exe,
                    docling_version: None,
                    ok: false,
                    error: Some(format!("{err:#}")),
                });
            }
        };

        Ok(match finished {
            Finished::Exited(out) if out.status.success() => DocDiag {
                docling_exe: exe,
                docling_version: parse_version(&String::from_utf8_lossy(&out.stdout)),
                ok: true,
                error: None,
            },
            Finished::Exited(out) => DocDiag {
                docling_exe: exe,
                docling_version: None,
                ok: false,
                error: Some(process::stderr_tail(&out.stderr, STDERR_TAIL_LINES)),
            },
            Finished::TimedOut { after, .. } => DocDiag {
                docling_exe: exe,
                docling_version: None,
                ok: false,
                error: Some(format!("docling --version timed out after {after:?}")),
            },
        })
    }

    fn convert(&self, req: &ConvertIn) -> std::result::Result<ConvertOut, ConvertError> {
        let started = Instant::now();
        let scratch = tempfile::Builder::new()
            .prefix("docling-batch-")
            .tempdir()
            .map_err(|e| ConvertError::Conversion(format!("creating scratch dir: {e}")))?;

        let mut cmd = self.command();
        cmd.args(self.convert_args(req, scratch.path()));

        let timeout = Self::timeout(self.cfg.docling.convert_timeout_seconds);
        let finished = process::run(&mut cmd, timeout)
            .map_err(|e| ConvertError::Conversion(format!("{e:#}")))?;

        let out = match finished {
            Finished::Exited(out) => out,
            Finished::TimedOut { after, stderr } => {
                let tail = process::stderr_tail(&stderr, STDERR_TAIL_LINES);
                return Err(ConvertError::Timeout(format!(
                    "docling exceeded timeout ({after:?}); stderr: {tail}"
                )));
            }
        };

        if !out.status.success() {
            let tail = process::stderr_tail(&out.stderr, STDERR_TAIL_LINES);
            return Err(ConvertError::Conversion(if tail.is_empty() {
                format!("docling exited with {}", out.status)
            } else {
                tail
            }));
        }

        if self.cfg.debug.keep_docling_stderr && !out.stderr.is_empty() {
            debug!(
                "docling stderr {}: {}",
                req.input.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        let md_path = scratch.path().join(format!("{}.md", file_stem(&req.input)));
        let markdown = read_markdown(&md_path).map_err(|e| ConvertError::Export(format!("{e:#}")))?;

        let mut warnings = Vec::new();
        if markdown.trim().is_empty() {
            warn!("docling produced empty markdown for {}", req.input.display());
            warnings.push("empty markdown".to_string());
        }

        Ok(ConvertOut {
            markdown,
            elapsed_ms: started.elapsed().as_millis() as u64,
            warnings,
        })
    }
}

fn read_markdown(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("docling produced no markdown at {}", path.display()))
}
