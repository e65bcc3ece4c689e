use std::fmt::{Display, Formatter};

use crate::mutant::MutantRecord;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A reportable vulnerability. Findings are created once and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Ids of the responses that justify the finding.
    pub evidence_response_ids: Vec<u64>,
    pub plugin_name: String,
    pub mutant: MutantRecord,
}

impl Finding {
    /// The resource the finding is about: the mutant's URL without query string.
    pub fn url(&self) -> &str {
        &self.mutant.url
    }

    pub fn token_name(&self) -> &str {
        &self.mutant.token_name
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} (responses {:?})",
            self.severity, self.title, self.description, self.evidence_response_ids
        )
    }
}
