use crate::{
    chunk_plan::ChunkPlan,
    classify::{ClassifiedError, Classifier, FailureKind},
    config::Config,
    engine::{ConvertIn, Engine},
    report::{write_error_log, BatchReport},
    scan::{self, SourceFile},
    split,
    util::{ensure_dir, file_name, file_stem, now_local, truncate_chars},
};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LABEL_CHARS: usize = 30;

pub struct BatchPipeline<E: Engine> {
    cfg: Config,
    engine: E,
    classifier: Classifier,
    device: String,
    cancel: Arc<AtomicBool>,
}

impl<E: Engine> BatchPipeline<E> {
    pub fn new(cfg: &Config, engine: E, device: &str) -> Result<Self> {
        Ok(Self {
            cfg: cfg.clone(),
            engine,
            classifier: Classifier::new(cfg)?,
            device: device.to_string(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares a stop flag with the caller; once it is set, no further
    /// document or chunk is started and `run` returns what was done so far.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Converts every supported file in `input_dir` into Markdown under `output_dir`.
    /// Per-document failures are recorded in the report; only setup and
    /// error-log I/O failures are returned as errors.
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport> {
        let files = scan::scan_input_dir(&self.cfg, input_dir)?;
        if files.is_empty() {
            warn!("no compatible files found in {}", input_dir.display());
            return Ok(BatchReport::new(0));
        }

        ensure_dir(output_dir)?;
        let work_dir = PathBuf::from(&self.cfg.paths.work_dir);

        info!("found {} files to process", files.len());
        info!("processing device={}", self.device);
        info!("output dir={}", output_dir.display());

        let mut report = BatchReport::new(files.len());
        let bar = self.progress_bar(files.len() as u64);

        for file in &files {
            if self.cancelled() {
                break;
            }
            let name = file_name(&file.path);
            bar.set_message(format!("preparing {}", truncate_chars(&name, LABEL_CHARS)));

            if scan::needs_split(&self.cfg, file) {
                bar.suspend(|| info!("large document detected: {name}"));
                self.process_split(file, output_dir, &work_dir, &mut report, &bar);
            } else {
                match self.convert_one(&file.path, output_dir) {
                    Ok(md) => {
                        report.record_success(file_name(&md));
                        bar.set_message(format!("done {}", truncate_chars(&name, LABEL_CHARS)));
                    }
                    Err(err) => {
                        bar.set_message(format!("error {}", truncate_chars(&name, LABEL_CHARS)));
                        self.record_failure(&mut report, &bar, &name, err);
                    }
                }
                bar.inc(1);
            }
        }
        bar.finish_and_clear();
        if self.cancelled() {
            report.interrupted = true;
            warn!("processing interrupted by user");
        }

        for line in report.summary_lines() {
            info!("{line}");
        }

        if !report.errors.is_empty() {
            let log_path = output_dir.join(&self.cfg.output.error_log_filename);
            write_error_log(&log_path, &report, now_local())?;
            info!("error log saved at {}", log_path.display());
        }

        if self.cfg.output.write_report_json {
            let path = output_dir.join(&self.cfg.output.report_filename);
            let json = serde_json::json!({
                "finished": crate::util::now_rfc3339(),
                "input_dir": input_dir,
                "output_dir": output_dir,
                "device": self.device,
                "success_rate": report.success_rate(),
                "report": &report,
            });
            std::fs::write(&path, serde_json::to_string_pretty(&json)?)
                .with_context(|| format!("writing report: {}", path.display()))?;
        }

        Ok(report)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.cfg.progress.enabled {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.green/238}] {percent:>3}% {pos}/{len} \
             [{elapsed_precise}<{eta_precise}] {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn process_split(
        &self,
        file: &SourceFile,
        output_dir: &Path,
        work_dir: &Path,
        report: &mut BatchReport,
        bar: &ProgressBar,
    ) {
        let name = file_name(&file.path);
        let chunks = match self.prepare_chunks(file, work_dir) {
            Ok(chunks) => chunks,
            Err(err) => {
                let classified = self.classifier.split_failure(&err);
                self.record_failure(report, bar, &name, classified);
                bar.inc(1);
                return;
            }
        };

        let input = match chunks {
            PreparedChunks::Whole => {
                debug!("{name} fits in a single chunk; converting whole file");
                match self.convert_one(&file.path, output_dir) {
                    Ok(md) => report.record_success(file_name(&md)),
                    Err(err) => self.record_failure(report, bar, &name, err),
                }
                bar.inc(1);
                return;
            }
            PreparedChunks::Split(paths) => paths,
        };

        // One bar position per chunk instead of one per file.
        bar.inc_length(input.len().saturating_sub(1) as u64);

        for chunk in input {
            if self.cancelled() {
                self.discard_chunk(&chunk.path);
                continue;
            }
            let chunk_name = file_name(&chunk.path);
            bar.set_message(format!("converting {}", truncate_chars(&chunk_name, LABEL_CHARS)));
            info!(
                "chunk {} pages {}-{} input={}",
                chunk.chunk_index,
                chunk.start_page,
                chunk.end_page,
                chunk.path.display()
            );

            match self.convert_one(&chunk.path, output_dir) {
                Ok(md) => report.record_success(file_name(&md)),
                Err(err) => self.record_failure(report, bar, &chunk_name, err),
            }

            self.discard_chunk(&chunk.path);
            bar.inc(1);
        }
    }

    fn discard_chunk(&self, path: &Path) {
        if self.cfg.chunking.keep_chunk_pdfs {
            return;
        }
        if let Err(err) = std::fs::remove_file(path) {
            warn!("could not delete chunk {}: {err}", path.display());
        }
    }

    fn prepare_chunks(&self, file: &SourceFile, work_dir: &Path) -> Result<PreparedChunks> {
        let doc = split::load_pdf(&file.path)?;
        let page_count = split::page_count_of(&doc);
        let plan = ChunkPlan::from_page_count(self.cfg.chunking.pages_per_chunk, page_count);
        debug!(?plan, "chunk plan");
        if plan.is_empty() {
            bail!("PDF has zero pages: {}", file.path.display());
        }
        if plan.chunks.len() == 1 {
            return Ok(PreparedChunks::Whole);
        }
        ensure_dir(work_dir)?;
        let chunks = split::split_document(&doc, &file_stem(&file.path), work_dir, &plan)
            .with_context(|| format!("splitting {}", file.path.display()))?;
        Ok(PreparedChunks::Split(chunks))
    }

    /// Runs the engine on `input` and writes `<stem>.md` into `output_dir`.
    fn convert_one(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<PathBuf, ClassifiedError> {
        info!("converting {}", file_name(input));
        let req = ConvertIn {
            input: input.to_path_buf(),
            device: self.device.clone(),
        };

        let out = self
            .engine
            .convert(&req)
            .map_err(|e| self.classifier.classify_convert(&e))?;
        for w in &out.warnings {
            warn!("{}: {w}", file_name(input));
        }

        let md_path = output_dir.join(format!("{}.md", file_stem(input)));
        std::fs::write(&md_path, &out.markdown).map_err(|e| ClassifiedError {
            kind: FailureKind::Export,
            message: format!("writing {}: {e}", md_path.display()),
        })?;
        info!("markdown saved: {} ({} ms)", file_name(&md_path), out.elapsed_ms);
        Ok(md_path)
    }

    fn record_failure(
        &self,
        report: &mut BatchReport,
        bar: &ProgressBar,
        name: &str,
        err: ClassifiedError,
    ) {
        bar.suspend(|| error!("{name} - {}", err.message));
        report.record_failure(name, err.kind, err.message);
    }
}

enum PreparedChunks {
    Whole,
    Split(Vec<split::SplitChunk>),
}
