use crate::config::Config;
use crate::engine::ConvertError;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const PIPELINE_OPTIONS_BACKEND: &str = "'PdfPipelineOptions' object has no attribute 'backend'";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    ApiCompatibility,
    Gpu,
    Memory,
    Timeout,
    Export,
    Split,
    Custom(String),
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Buckets raw failure messages into coarse categories by substring match.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<(Regex, String)>,
}

impl Classifier {
    pub fn new(cfg: &Config) -> Result<Self> {
        let rules = cfg
            .classify
            .rules
            .iter()
            .map(|r| {
                Regex::new(&r.pattern)
                    .map(|re| (re, r.label.clone()))
                    .with_context(|| format!("invalid classify rule pattern: {}", r.pattern))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn classify(&self, message: &str) -> ClassifiedError {
        if message.contains(PIPELINE_OPTIONS_BACKEND) {
            return ClassifiedError {
                kind: FailureKind::ApiCompatibility,
                message: "API compatibility error - Docling may be outdated".to_string(),
            };
        }
        if message.contains("CUDA") {
            return ClassifiedError {
                kind: FailureKind::Gpu,
                message: format!("GPU-related error: {message}"),
            };
        }
        if message.to_lowercase().contains("memory") {
            return ClassifiedError {
                kind: FailureKind::Memory,
                message: format!("Memory error: {message}"),
            };
        }
        for (re, label) in &self.rules {
            if re.is_match(message) {
                return ClassifiedError {
                    kind: FailureKind::Custom(label.clone()),
                    message: format!("{label}: {message}"),
                };
            }
        }
        ClassifiedError {
            kind: FailureKind::Other,
            message: message.to_string(),
        }
    }

    pub fn classify_convert(&self, err: &ConvertError) -> ClassifiedError {
        match err {
            ConvertError::Conversion(msg) => self.classify(msg),
            ConvertError::Timeout(msg) => ClassifiedError {
                kind: FailureKind::Timeout,
                message: format!("Timeout: {msg}"),
            },
            // Export failures are recorded as-is.
            ConvertError::Export(msg) => ClassifiedError {
                kind: FailureKind::Export,
                message: msg.clone(),
            },
        }
    }

    pub fn split_failure(&self, err: &anyhow::Error) -> ClassifiedError {
        ClassifiedError {
            kind: FailureKind::Split,
            message: format!("Error splitting/processing: {err:#}"),
        }
    }
}
