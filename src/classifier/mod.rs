pub mod offline;
pub mod prompt;
pub mod remote;

use crate::papersort::config::LlmConfig;
use crate::papersort::retry::RetryPolicy;
use anyhow::Result;
use std::path::Path;
use thiserror::Error;

pub use offline::OfflineClassifier;
pub use remote::RemoteClassifier;

/// Structured fields extracted from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAnalysis {
    pub title: String,
    pub suggested_path: String,
    /// 0..=10
    pub confidence: u8,
    pub year: Option<i32>,
    pub date: Option<String>,
    pub entity: Option<String>,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier returned http status {status}")]
    Http { status: u16 },
    #[error("classifier transport failed: {0}")]
    Transport(String),
    #[error("classifier response unusable: {0}")]
    Parse(String),
    #[error("document is {size_mb:.1}MB, over the {limit_mb}MB limit")]
    TooLarge { size_mb: f64, limit_mb: u64 },
    #[error("missing credentials: set {0}")]
    MissingCredentials(String),
}

impl ClassifierError {
    /// Rate limits, server errors and connection problems are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

/// Inputs for a single document analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub pdf_path: &'a Path,
    pub layout_text: &'a str,
    /// Where the document was previously filed, if anywhere.
    pub hint: &'a str,
    pub inbox_path: &'a str,
}

/// Document classifier. Implementations never propagate failures: an
/// unusable analysis is `None` and an unanswerable match is "no match".
pub trait Classifier {
    fn name(&self) -> &str;

    fn analyze_document(
        &self,
        request: &AnalysisRequest<'_>,
        path_is_valid: &dyn Fn(&str) -> bool,
    ) -> Option<DocumentAnalysis>;

    fn compare_names(&self, a: &str, b: &str) -> bool;

    fn find_duplicate_pair(&self, names: &[String]) -> Option<(String, String)>;

    fn find_matching_folder(&self, new_name: &str, existing: &[String]) -> Option<String>;
}

pub fn create_classifier(cfg: &LlmConfig, retry: RetryPolicy) -> Result<Box<dyn Classifier>> {
    if cfg.provider == "offline" {
        return Ok(Box::new(OfflineClassifier));
    }
    Ok(Box::new(RemoteClassifier::from_config(cfg, retry)?))
}
