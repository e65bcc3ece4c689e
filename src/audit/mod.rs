//! Audit plugins probe the tokens of a baseline request and record what they find in
//! the knowledge base.

use crate::{
    dispatcher::ProbeDispatcher, input::FuzzableRequest, knowledge_base::KnowledgeBase,
    transport::Response,
};

pub mod generic;
pub mod phishing_vector;

pub use generic::UnhandledErrorAudit;
pub use phishing_vector::PhishingVectorAudit;

pub trait AuditPlugin: Send + Sync {
    /// Name of the plugin, used as the plugin name of its findings.
    fn name(&self) -> &'static str;

    /// Audits one baseline request. `original` is the response to the unmodified request.
    ///
    /// Failing probes are not errors; an `Err` means the scan can not continue.
    fn audit(
        &self,
        request: &FuzzableRequest,
        original: &Response,
        dispatcher: &ProbeDispatcher,
        kb: &dyn KnowledgeBase,
    ) -> anyhow::Result<()>;

    /// Called once after the last request was audited.
    fn end(&self, _kb: &dyn KnowledgeBase) -> anyhow::Result<()> {
        Ok(())
    }
}

/// All audit plugins, in the order they run on each request.
pub fn all_plugins(base_diff_ratio: f64, dedup_memory_limit: usize) -> Vec<Box<dyn AuditPlugin>> {
    vec![
        Box::new(PhishingVectorAudit::new()),
        Box::new(UnhandledErrorAudit::new(base_diff_ratio, dedup_memory_limit)),
    ]
}
