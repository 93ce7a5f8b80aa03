use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub chunking: Chunking,
    #[serde(default)]
    pub docling: Docling,
    #[serde(default)]
    pub classify: Classify,
    #[serde(default)]
    pub merge: Merge,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub input_dir: String,
    pub output_dir: String,
    /// Where chunk PDFs of oversized documents are written before conversion.
    pub work_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            input_dir: "input".into(),
            output_dir: "output".into(),
            work_dir: ".docling-batch-work".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scan {
    /// Lower-case extensions without the leading dot.
    pub extensions: Vec<String>,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            extensions: ["pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "html", "md", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Chunking {
    pub enabled: bool,
    /// PDFs strictly larger than this are split before conversion.
    pub split_threshold_bytes: u64,
    pub pages_per_chunk: u32,
    pub keep_chunk_pdfs: bool,
}
impl Default for Chunking {
    fn default() -> Self {
        Self {
            enabled: true,
            split_threshold_bytes: 50 * 1024 * 1024,
            pages_per_chunk: 10,
            keep_chunk_pdfs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Docling {
    /// Path to the docling CLI, or "auto" to use $DOCLING_BIN and then PATH.
    pub exe: String,
    /// auto / cpu / cuda / mps
    pub device: String,
    pub do_ocr: bool,
    pub pdf_backend: String,
    pub num_threads: u32,
    pub document_timeout_seconds: u64,
    pub convert_timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
impl Default for Docling {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("TOKENIZERS_PARALLELISM".to_string(), "false".to_string());
        Self {
            exe: "auto".into(),
            device: "auto".into(),
            do_ocr: true,
            pdf_backend: "".into(),
            num_threads: 0,
            document_timeout_seconds: 0,
            convert_timeout_seconds: 1800,
            doctor_timeout_seconds: 60,
            extra_args: Vec::new(),
            env,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Classify {
    pub rules: Vec<ClassifyRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRule {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Merge {
    pub normalize_newlines: bool,
    pub normalize_unicode: bool,
    pub trim_trailing_whitespace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub merge_after_run: bool,
    pub merged_filename: String,
    pub error_log_filename: String,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            merge_after_run: true,
            merged_filename: "documento_final.md".into(),
            error_log_filename: "conversion_errors.log".into(),
            write_report_json: false,
            report_filename: "conversion_report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub enabled: bool,
}
impl Default for Progress {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_docling_stderr: bool,
    pub dump_effective_config: bool,
}
