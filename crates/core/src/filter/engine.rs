//! Regex-based file filtering.

use regex_lite::{Regex, RegexBuilder};

use super::{FileDecision, FileVerdict, FilterError, FilterReport, RejectReason};
use crate::config::TorrentPolicy;
use crate::torrent_client::TorrentFile;

/// Compiled pattern with its source text (reported on match).
#[derive(Debug)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn compile(
        list: &'static str,
        source: &str,
        expression: &str,
        case_sensitive: bool,
    ) -> Result<Self, FilterError> {
        let regex = RegexBuilder::new(expression)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FilterError::InvalidPattern {
                list,
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }
}

/// Evaluates torrent files against an instance's exclusion and allow rules.
#[derive(Debug)]
pub struct FilterEngine {
    folder_patterns: Vec<Pattern>,
    file_name_patterns: Vec<Pattern>,
    extension_patterns: Vec<Pattern>,
}

impl FilterEngine {
    /// Compile the policy's patterns. Any invalid pattern fails the build.
    pub fn new(policy: &TorrentPolicy) -> Result<Self, FilterError> {
        let case_sensitive = policy.case_sensitive_matches;

        let folder_patterns = policy
            .folder_exclusion_regex
            .iter()
            .map(|p| Pattern::compile("folder_exclusion_regex", p, p, case_sensitive))
            .collect::<Result<Vec<_>, _>>()?;

        let file_name_patterns = policy
            .file_name_exclusion_regex
            .iter()
            .map(|p| Pattern::compile("file_name_exclusion_regex", p, p, case_sensitive))
            .collect::<Result<Vec<_>, _>>()?;

        let extension_patterns = policy
            .file_extension_allowlist
            .iter()
            .map(|entry| {
                // Entries starting with a backslash are regular expressions.
                let body = if entry.starts_with('\\') {
                    entry.clone()
                } else {
                    regex_lite::escape(entry)
                };
                Pattern::compile(
                    "file_extension_allowlist",
                    entry,
                    &format!("^(?:{})$", body),
                    case_sensitive,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            folder_patterns,
            file_name_patterns,
            extension_patterns,
        })
    }

    /// Evaluate every wanted file (priority > 0).
    pub fn evaluate(&self, files: &[TorrentFile]) -> FilterReport {
        FilterReport {
            files: files
                .iter()
                .filter(|f| f.is_wanted())
                .map(|f| FileDecision {
                    index: f.index,
                    name: f.name.clone(),
                    verdict: self.evaluate_path(&f.name),
                })
                .collect(),
        }
    }

    /// Verdict for a single relative path.
    pub fn evaluate_path(&self, path: &str) -> FileVerdict {
        let components: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .collect();
        let Some((base_name, folders)) = components.split_last() else {
            return FileVerdict::Rejected(RejectReason::ExtensionNotAllowed {
                extension: String::new(),
            });
        };

        for folder in folders {
            if let Some(p) = self.folder_patterns.iter().find(|p| p.regex.is_match(folder)) {
                return FileVerdict::Rejected(RejectReason::FolderExcluded {
                    pattern: p.source.clone(),
                });
            }
        }

        if let Some(p) = self
            .file_name_patterns
            .iter()
            .find(|p| p.regex.is_match(base_name))
        {
            return FileVerdict::Rejected(RejectReason::FileNameExcluded {
                pattern: p.source.clone(),
            });
        }

        if !self.extension_patterns.is_empty() {
            let extension = extension_of(base_name);
            if !self
                .extension_patterns
                .iter()
                .any(|p| p.regex.is_match(extension))
            {
                return FileVerdict::Rejected(RejectReason::ExtensionNotAllowed {
                    extension: extension.to_string(),
                });
            }
        }

        FileVerdict::Accepted
    }
}

/// Extension including the dot, or "" when there is none.
fn extension_of(base_name: &str) -> &str {
    match base_name.rfind('.') {
        Some(idx) if idx > 0 => &base_name[idx..],
        _ => "",
    }
}
