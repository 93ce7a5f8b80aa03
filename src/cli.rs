use crate::{
    chunk_plan::ChunkPlan,
    config::Config,
    doctor::{self, EnvReport},
    engine::{docling::DoclingCli, Engine},
    merge,
    pipeline::BatchPipeline,
    scan,
    split,
    util::ensure_dir,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "docling-batch")]
#[command(about = "Batch document-to-Markdown driver (Docling + large-PDF splitting + merge)")]
pub struct Args {
    /// Defaults to `run` with the configured folders.
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Path to config TOML. If omitted, uses ./docling-batch.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the docling install and the accelerator.
    Doctor {},
    /// List the files a run would pick up.
    Scan {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Show how a PDF would be split into chunks.
    Plan {
        #[arg(long)]
        input: PathBuf,
    },
    /// Convert every supported file, then merge the Markdown outputs.
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        no_merge: bool,
    },
    /// Merge the Markdown files already in the output folder.
    Merge {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match &args.cmd {
        Some(Command::Doctor {}) => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor_cmd(&cfg)
        }
        Some(Command::Scan { input }) => {
            let _guard = init_logging(&args, &cfg, None)?;
            scan_cmd(&cfg, &input_dir(&cfg, input.as_deref()))
        }
        Some(Command::Plan { input }) => {
            let _guard = init_logging(&args, &cfg, None)?;
            plan_cmd(&cfg, input)
        }
        Some(Command::Run {
            input,
            out_dir,
            no_merge,
        }) => {
            let input = input_dir(&cfg, input.as_deref());
            let out = output_dir(&cfg, out_dir.as_deref());
            run(&args, &cfg, &input, &out, !no_merge && cfg.output.merge_after_run)
        }
        Some(Command::Merge { out_dir }) => {
            let out = output_dir(&cfg, out_dir.as_deref());
            let log_path = resolve_log_path(&cfg, Some(&out));
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            merge_cmd(&cfg, &out)
        }
        None => {
            let input = input_dir(&cfg, None);
            let out = output_dir(&cfg, None);
            run(&args, &cfg, &input, &out, cfg.output.merge_after_run)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["docling-batch.toml", "docling-batch.example.toml"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn input_dir(cfg: &Config, user: Option<&Path>) -> PathBuf {
    user.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.input_dir))
}

fn output_dir(cfg: &Config, user: Option<&Path>) -> PathBuf {
    user.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.output_dir))
}

fn init_logging(
    args: &Args,
    cfg: &Config,
    file_path: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    let engine = DoclingCli::new(cfg);
    let diag = engine.doctor()?;
    let ok = diag.ok;
    let report = EnvReport::build(cfg, diag, doctor::detect_gpus(cfg));
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !ok {
        bail!("docling is not runnable: {}", engine.exe().display());
    }
    Ok(())
}

fn scan_cmd(cfg: &Config, input: &Path) -> Result<()> {
    let files = scan::scan_input_dir(cfg, input)?;
    let listing: Vec<_> = files
        .iter()
        .map(|f| {
            serde_json::json!({
                "path": f.path,
                "file_bytes": f.file_bytes,
                "split": scan::needs_split(cfg, f),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "files": listing,
        }))?
    );
    Ok(())
}

fn plan_cmd(cfg: &Config, input: &Path) -> Result<()> {
    let meta = std::fs::metadata(input).with_context(|| format!("stat {}", input.display()))?;
    let page_count = split::page_count(input)?;
    let file = scan::SourceFile {
        path: input.to_path_buf(),
        file_bytes: meta.len(),
    };
    let plan = if scan::needs_split(cfg, &file) {
        ChunkPlan::from_page_count(cfg.chunking.pages_per_chunk, page_count)
    } else {
        ChunkPlan::single(page_count)
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "file_bytes": file.file_bytes,
            "split": plan.chunks.len() > 1,
            "plan": plan,
        }))?
    );
    Ok(())
}

fn merge_cmd(cfg: &Config, out: &Path) -> Result<()> {
    if !out.is_dir() {
        bail!("output folder not found: {}", out.display());
    }
    if let Some(path) = merge::merge_markdown_files(cfg, out)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn run(args: &Args, cfg: &Config, input: &Path, out: &Path, merge_after: bool) -> Result<()> {
    if !input.is_dir() {
        bail!("input folder does not exist: {}", input.display());
    }
    ensure_dir(out)?;

    let log_path = resolve_log_path(cfg, Some(out));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("input folder: {}", input.display());
    info!("output folder: {}", out.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).context("serializing effective config")?;
        let path = out.join("effective-config.toml");
        std::fs::write(&path, raw)
            .with_context(|| format!("writing effective config: {}", path.display()))?;
    }

    let engine = DoclingCli::new(cfg);
    let env = doctor::check_environment(cfg, &engine)?;
    for hint in &env.hints {
        info!("{hint}");
    }

    let cancel = install_interrupt_handler()?;
    let pipeline = BatchPipeline::new(cfg, engine, &env.resolved_device)?.with_cancel(cancel);
    let report = pipeline.run(input, out)?;
    if report.interrupted {
        warn!("run stopped early; keeping the outputs written so far");
    } else {
        info!("processing completed");
    }

    let merged = if merge_after {
        merge::merge_markdown_files(cfg, out)?
    } else {
        None
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "total": report.total,
            "successes": report.successes,
            "failures": report.failures,
            "success_rate": format!("{:.1}", report.success_rate()),
            "interrupted": report.interrupted,
            "merged": merged,
        }))?
    );

    Ok(())
}

/// First Ctrl-C asks the pipeline to stop after the current document; a second one exits.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("interrupt received; stopping after the current document");
    })
    .context("installing Ctrl-C handler")?;
    Ok(flag)
}

fn resolve_log_path(cfg: &Config, out_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    let dir = out_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.output_dir));
    Some(dir.join("logs").join("docling-batch.log"))
}
