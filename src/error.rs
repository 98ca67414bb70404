use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaperSortError {
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("classification failed: {0}")]
    ClassificationFailure(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("merge of '{source_folder}' into '{dest_folder}' aborted after {moved} move(s): {reason}")]
    MergeAborted {
        source_folder: String,
        dest_folder: String,
        moved: usize,
        reason: String,
    },
}

/// Stage of the per-file pipeline that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingStage {
    Download,
    Hash,
    Classify,
    Cache,
    Resolve,
    IngressLog,
    Repair,
}

impl FilingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Hash => "hash",
            Self::Classify => "classify",
            Self::Cache => "cache",
            Self::Resolve => "resolve",
            Self::IngressLog => "ingress-log",
            Self::Repair => "repair",
        }
    }
}
