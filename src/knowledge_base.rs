//! The knowledge base collects the findings of all audit plugins during a scan.

use std::sync::{Mutex, PoisonError};

use crate::finding::Finding;

/// Storage for findings, shared by all audit plugins. Findings are grouped in
/// categories, usually one per plugin.
pub trait KnowledgeBase: Send + Sync {
    /// Records `finding` under `category`, unless a finding for the same URL and token
    /// is already recorded there. Returns whether it was recorded.
    fn append_if_absent(&self, category: &str, finding: Finding) -> bool;

    /// All recorded findings with their categories, in recording order.
    fn all_findings(&self) -> Vec<(String, Finding)>;

    fn findings(&self, category: &str) -> Vec<Finding> {
        self.all_findings()
            .into_iter()
            .filter(|(found_in, _)| found_in == category)
            .map(|(_, finding)| finding)
            .collect()
    }

    /// Whether any plugin already reported the token `token_name` of `url`.
    fn covers(&self, url: &str, token_name: &str) -> bool {
        self.all_findings()
            .iter()
            .any(|(_, finding)| finding.url() == url && finding.token_name() == token_name)
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    findings: Mutex<Vec<(String, Finding)>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn append_if_absent(&self, category: &str, finding: Finding) -> bool {
        let mut findings = self.findings.lock().unwrap_or_else(PoisonError::into_inner);
        let present = findings.iter().any(|(found_in, known)| {
            found_in == category
                && known.url() == finding.url()
                && known.token_name() == finding.token_name()
        });
        if present {
            return false;
        }
        log::info!("Found {} at {}", finding.title, finding.mutant.found_at);
        findings.push((category.to_owned(), finding));
        true
    }

    fn all_findings(&self) -> Vec<(String, Finding)> {
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
