use std::collections::BTreeSet;

use crate::error::AnalyzerError;
use crate::model::{AnalyzerDescriptor, EvidenceRef, OperatingSystem};

/// Outcome of a successful applicability check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applicability {
    /// Capabilities shared between analyzer and evidence.
    pub matched: BTreeSet<String>,
}

impl Applicability {
    /// Sorted, comma-joined matched tags, stable for the same input sets.
    pub fn filter(&self) -> String {
        self.matched
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Capabilities ∩ (evidence tags ∪ {os}).
///
/// The operating system acts as an implicit evidence tag.
pub fn matching_tags(
    capabilities: &BTreeSet<String>,
    evidence_tags: &BTreeSet<String>,
    os: Option<OperatingSystem>,
) -> BTreeSet<String> {
    let os_tag = os.map(|os| os.as_str());
    capabilities
        .iter()
        .filter(|cap| evidence_tags.contains(*cap) || os_tag == Some(cap.as_str()))
        .cloned()
        .collect()
}

/// Decide whether `descriptor` may run against `evidence`.
///
/// Fails with [`AnalyzerError::Precondition`] when host context is required but
/// missing, or when no capability is shared with the evidence.
pub fn applies(
    descriptor: &AnalyzerDescriptor,
    evidence: &EvidenceRef,
) -> Result<Applicability, AnalyzerError> {
    if descriptor.requires_host {
        let hostname = evidence.hostname.as_deref().map(str::trim).unwrap_or_default();
        if hostname.is_empty() {
            return Err(AnalyzerError::Precondition(
                "collection hostname is empty".into(),
            ));
        }
        if evidence.tags.is_empty() {
            return Err(AnalyzerError::Precondition("collection tags are empty".into()));
        }
    }

    let matched = matching_tags(&descriptor.tags, &evidence.tags, evidence.opsystem);
    if matched.is_empty() {
        return Err(AnalyzerError::Precondition(format!(
            "{} shares no capability with collection tags [{}]",
            descriptor.name,
            evidence.tags.iter().cloned().collect::<Vec<_>>().join(",")
        )));
    }

    Ok(Applicability { matched })
}
