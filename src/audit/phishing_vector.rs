//! Finds phishing vectors: parameters whose value ends up as the source of a frame,
//! so that a link can make the site display a page of the attacker's choosing.
//!
//! Several URL schemes are sent since a filter may block `http://` but forget
//! `ftp://`, and the odd casing slips past case-sensitive filters. A frame whose
//! `src` starts with any of the test URLs counts.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    audit::AuditPlugin,
    dispatcher::ProbeDispatcher,
    finding::{Finding, Severity},
    input::FuzzableRequest,
    knowledge_base::KnowledgeBase,
    mutant::{Mutant, create_mutants},
    transport::Response,
};

pub const PLUGIN_NAME: &str = "phishing_vector";
pub const CATEGORY: &str = "phishing_vector";
pub const TITLE: &str = "Phishing vector";

pub const TEST_URLS: [&str; 4] = [
    "hTtp://w3af.org/",
    "htTps://w3af.org/",
    "fTp://w3af.org/",
    "//w3af.org",
];

static FRAME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<i?frame\b[^>]*>").expect("frame tag regex is valid"));

static SRC_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("src attribute regex is valid")
});

/// The `src` attributes of all `<iframe>` and `<frame>` tags in `html`.
pub fn frame_sources(html: &str) -> impl Iterator<Item = &str> {
    FRAME_TAG.find_iter(html).filter_map(|tag| {
        SRC_ATTRIBUTE.captures(tag.as_str()).and_then(|captures| {
            captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|value| value.as_str())
        })
    })
}

#[derive(Default)]
pub struct PhishingVectorAudit;

impl PhishingVectorAudit {
    pub fn new() -> Self {
        Self
    }

    fn analyze(&self, mutant: &Mutant, response: &Response, kb: &dyn KnowledgeBase) {
        if !response.is_text_or_html() {
            return;
        }
        let url = mutant.url().as_str();
        let token_name = mutant.token_name();
        let already_found = kb
            .findings(CATEGORY)
            .iter()
            .any(|finding| finding.url() == url && finding.token_name() == token_name);
        if already_found {
            return;
        }
        let text = response.text();
        let Some(source) = frame_sources(&text)
            .find(|src| TEST_URLS.iter().any(|test_url| src.starts_with(test_url)))
        else {
            return;
        };
        log::debug!("Frame source {source:?} is controlled by {token_name}");
        let finding = Finding {
            title: TITLE.to_owned(),
            description: format!("A phishing vector was found at: {}", mutant.found_at()),
            severity: Severity::Low,
            evidence_response_ids: vec![response.id()],
            plugin_name: PLUGIN_NAME.to_owned(),
            mutant: mutant.to_record(),
        };
        kb.append_if_absent(CATEGORY, finding);
    }
}

impl AuditPlugin for PhishingVectorAudit {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn audit(
        &self,
        request: &FuzzableRequest,
        _original: &Response,
        dispatcher: &ProbeDispatcher,
        kb: &dyn KnowledgeBase,
    ) -> anyhow::Result<()> {
        let mutants = create_mutants(request, &TEST_URLS);
        dispatcher.send_mutants_in_parallel(&mutants, |mutant, outcome| {
            if let Ok(response) = outcome {
                self.analyze(mutant, &response, kb);
            }
        });
        Ok(())
    }
}
