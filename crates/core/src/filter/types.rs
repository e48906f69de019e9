//! Types for file filtering.

use serde::Serialize;
use thiserror::Error;

/// Errors building a filter from policy.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid {list} pattern '{pattern}': {reason}")]
    InvalidPattern {
        list: &'static str,
        pattern: String,
        reason: String,
    },
}

/// Why a file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    FolderExcluded { pattern: String },
    FileNameExcluded { pattern: String },
    ExtensionNotAllowed { extension: String },
    ProbeFailed { detail: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::FolderExcluded { pattern } => {
                write!(f, "folder matches exclusion '{}'", pattern)
            }
            RejectReason::FileNameExcluded { pattern } => {
                write!(f, "file name matches exclusion '{}'", pattern)
            }
            RejectReason::ExtensionNotAllowed { extension } => {
                if extension.is_empty() {
                    write!(f, "file has no extension")
                } else {
                    write!(f, "extension '{}' not allowed", extension)
                }
            }
            RejectReason::ProbeFailed { detail } => write!(f, "media probe failed: {}", detail),
        }
    }
}

/// Verdict for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl FileVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FileVerdict::Accepted)
    }
}

/// Verdict for one evaluated file of a torrent.
#[derive(Debug, Clone, Serialize)]
pub struct FileDecision {
    /// Client-side file index.
    pub index: usize,
    pub name: String,
    pub verdict: FileVerdict,
}

/// Result of filtering one torrent's wanted files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterReport {
    pub files: Vec<FileDecision>,
}

impl FilterReport {
    /// At least one evaluated file was accepted.
    pub fn any_accepted(&self) -> bool {
        self.files.iter().any(|f| f.verdict.is_accepted())
    }

    pub fn any_rejected(&self) -> bool {
        self.files.iter().any(|f| !f.verdict.is_accepted())
    }

    /// Files were evaluated and none survived.
    pub fn all_rejected(&self) -> bool {
        !self.files.is_empty() && !self.any_accepted()
    }

    pub fn rejected_indices(&self) -> Vec<usize> {
        self.files
            .iter()
            .filter(|f| !f.verdict.is_accepted())
            .map(|f| f.index)
            .collect()
    }

    /// Relative paths of the rejected files.
    pub fn rejected_names(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.verdict.is_accepted())
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn accepted(&self) -> impl Iterator<Item = &FileDecision> {
        self.files.iter().filter(|f| f.verdict.is_accepted())
    }

    /// First rejection, for log messages.
    pub fn first_rejection(&self) -> Option<(&str, &RejectReason)> {
        self.files.iter().find_map(|f| match &f.verdict {
            FileVerdict::Rejected(reason) => Some((f.name.as_str(), reason)),
            FileVerdict::Accepted => None,
        })
    }

    /// Reject a previously accepted file.
    pub fn reject(&mut self, index: usize, reason: RejectReason) {
        if let Some(file) = self.files.iter_mut().find(|f| f.index == index) {
            file.verdict = FileVerdict::Rejected(reason);
        }
    }
}

/// Outcome of probing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Invalid(String),
    /// No probe ran (disabled, helper missing, file not on disk).
    Skipped,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Valid => "valid",
            ProbeOutcome::Invalid(_) => "invalid",
            ProbeOutcome::Skipped => "skipped",
        }
    }
}
