//! Finds unhandled errors without a database of error messages.
//!
//! For every token, three kinds of probes are compared against the baseline response:
//! a *limit* (a random value of the same shape as the original, which most likely does
//! not exist), and a set of *error* values meant to break naive string handling. An
//! error response that looks like neither the baseline nor the limit is suspicious. To
//! rule out a limit that was itself an anomaly, a second limit must look like the first
//! before the token is remembered as a potential finding.
//!
//! Potential findings only become findings in [`AuditPlugin::end`], and only for
//! tokens no other plugin already reported.

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::{
    audit::AuditPlugin,
    container::Token,
    dedup::{DedupKey, DedupStore},
    dispatcher::ProbeDispatcher,
    finding::{Finding, Severity},
    input::{FuzzableRequest, TokenLocation},
    knowledge_base::KnowledgeBase,
    mutant::{Mutant, MutantRecord},
    similarity::relative_distance,
    transport::Response,
};

pub const PLUGIN_NAME: &str = "generic";
pub const CATEGORY: &str = "generic";
pub const TITLE: &str = "Unhandled error in web application";

/// Values that tend to make input handling fail.
pub const ERROR_STRINGS: [&str; 2] = ["d'kc\"z'gj'\"**5*(((;-*`)", ""];

const LIMIT_LENGTH: usize = 8;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PotentialFinding {
    mutant: MutantRecord,
    /// Ids of the baseline, limit and error responses.
    evidence: Vec<u64>,
}

pub struct UnhandledErrorAudit {
    base_diff_ratio: f64,
    potential: DedupStore<PotentialFinding>,
}

/// The similarity below which an error response counts as different. It grows as the
/// baseline and limit responses drift apart, so volatile pages need a bigger difference.
pub fn acceptance_ratio(base_diff_ratio: f64, original_to_limit: f64) -> f64 {
    base_diff_ratio + (1.0 - original_to_limit)
}

/// Whether the error response is unlike both the baseline and the limit response.
pub fn looks_anomalous(original_to_error: f64, limit_to_error: f64, ratio: f64) -> bool {
    original_to_error < ratio && limit_to_error < ratio
}

/// A random value that most likely does not exist: digits for numeric originals,
/// alphanumerics otherwise.
pub fn limit_value(original: &str) -> String {
    let mut rng = rand::rng();
    if !original.is_empty() && original.bytes().all(|b| b.is_ascii_digit()) {
        (0..LIMIT_LENGTH)
            .map(|_| char::from(rng.random_range(b'0'..=b'9')))
            .collect()
    } else {
        (0..LIMIT_LENGTH)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }
}

impl UnhandledErrorAudit {
    pub fn new(base_diff_ratio: f64, dedup_memory_limit: usize) -> Self {
        Self {
            base_diff_ratio,
            potential: DedupStore::new(PLUGIN_NAME, dedup_memory_limit),
        }
    }

    /// Probes one token. Returns the confirmed potential finding, if any. A failing
    /// probe ends the analysis of the token without a result.
    fn analyze_token(
        &self,
        request: &FuzzableRequest,
        original: &Response,
        dispatcher: &ProbeDispatcher,
        location: TokenLocation,
        token: &Token<'_>,
    ) -> Option<(Mutant, PotentialFinding)> {
        let limit_mutant = Mutant::from_token(
            request,
            location,
            token,
            &limit_value(token.original_value()),
        );
        let limit = dispatcher.send_mutant(&limit_mutant).ok()?;

        let original_body = original.text();
        let limit_body = limit.text();
        let ratio = acceptance_ratio(
            self.base_diff_ratio,
            relative_distance(&original_body, &limit_body),
        );

        for error_string in ERROR_STRINGS {
            let error_mutant = limit_mutant.with_value(error_string);
            let error = dispatcher.send_mutant(&error_mutant).ok()?;
            let error_body = error.text();

            let original_to_error = relative_distance(&original_body, &error_body);
            let limit_to_error = relative_distance(&limit_body, &error_body);
            if !looks_anomalous(original_to_error, limit_to_error, ratio) {
                continue;
            }
            log::debug!(
                "Possible unhandled error at {} (similarity {original_to_error:.2} and {limit_to_error:.2}, ratio {ratio:.2})",
                error_mutant.found_at()
            );

            let limit2 = dispatcher
                .send_mutant(&error_mutant.with_value(&limit_value(token.original_value())))
                .ok()?;
            let limits_agree =
                relative_distance(&limit2.text(), &limit_body) > 1.0 - self.base_diff_ratio;
            if !limits_agree {
                log::debug!(
                    "Second limit probe for {} differs from the first, discarding",
                    error_mutant.token_name()
                );
                continue;
            }
            let potential = PotentialFinding {
                mutant: error_mutant.to_record(),
                evidence: vec![original.id(), limit.id(), error.id()],
            };
            return Some((error_mutant, potential));
        }
        None
    }
}

impl AuditPlugin for UnhandledErrorAudit {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn audit(
        &self,
        request: &FuzzableRequest,
        original: &Response,
        dispatcher: &ProbeDispatcher,
        _kb: &dyn KnowledgeBase,
    ) -> anyhow::Result<()> {
        for (location, token) in request.tokens() {
            let key = DedupKey::new(request.url().as_str(), token.name());
            if self.potential.contains(&key)? {
                log::debug!(
                    "Skipping {} of {}, already found an unhandled error there",
                    key.token_name,
                    key.url
                );
                continue;
            }
            if let Some((mutant, potential)) =
                self.analyze_token(request, original, dispatcher, location, &token)
            {
                if self.potential.add(key, potential)? {
                    log::debug!("Recorded potential unhandled error at {}", mutant.found_at());
                }
            }
        }
        Ok(())
    }

    fn end(&self, kb: &dyn KnowledgeBase) -> anyhow::Result<()> {
        let mut confirmed = vec![];
        self.potential.try_for_each(|key, potential| {
            if kb.covers(&key.url, &key.token_name) {
                log::debug!(
                    "Not reporting {} of {}, another finding covers it",
                    key.token_name,
                    key.url
                );
            } else {
                confirmed.push(potential);
            }
            Ok(())
        })?;

        for PotentialFinding { mutant, evidence } in confirmed {
            let finding = Finding {
                title: TITLE.to_owned(),
                description: format!(
                    "An unhandled error, which could potentially translate to a vulnerability, was found at: {}",
                    mutant.found_at
                ),
                severity: Severity::Low,
                evidence_response_ids: evidence,
                plugin_name: PLUGIN_NAME.to_owned(),
                mutant,
            };
            kb.append_if_absent(CATEGORY, finding);
        }
        self.potential.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::{
        ERROR_STRINGS, UnhandledErrorAudit, acceptance_ratio, limit_value, looks_anomalous,
    };
    use crate::{
        audit::AuditPlugin,
        dispatcher::ProbeDispatcher,
        finding::Severity,
        input::FuzzableRequest,
        knowledge_base::{InMemoryKnowledgeBase, KnowledgeBase},
        test_helpers::{ScriptedTransport, html_response, query_value, sample_finding},
    };

    const FATAL: &str = "Fatal error: unexpected token in /app.php on line 42";

    fn is_limit(value: &str) -> bool {
        value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
    }

    fn dispatcher(transport: &Arc<ScriptedTransport>) -> ProbeDispatcher {
        ProbeDispatcher::new(transport.clone(), NonZeroUsize::new(2).unwrap(), None).unwrap()
    }

    fn request() -> FuzzableRequest {
        FuzzableRequest::try_from(("GET", "http://shop.example/item.php?b=1")).unwrap()
    }

    #[test]
    fn test_identical_responses_are_not_flagged() {
        let transport = Arc::new(ScriptedTransport::new(|_| Some("ok".to_owned())));
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();

        audit
            .audit(&request(), &html_response(1, "ok"), &dispatcher(&transport), &kb)
            .unwrap();

        // One limit and one probe per error string, no confirmation
        assert_eq!(transport.dispatch_count(), 1 + ERROR_STRINGS.len());
        audit.end(&kb).unwrap();
        assert!(kb.all_findings().is_empty());
    }

    #[test]
    fn test_error_page_becomes_finding() {
        let transport = Arc::new(ScriptedTransport::by_query_value("b", |value| {
            Some(if is_limit(value) { "Welcome" } else { FATAL }.to_owned())
        }));
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();

        audit
            .audit(
                &request(),
                &html_response(100, "Welcome"),
                &dispatcher(&transport),
                &kb,
            )
            .unwrap();
        // limit, first error string, confirming limit
        assert_eq!(transport.dispatch_count(), 3);
        assert!(kb.all_findings().is_empty(), "nothing is reported before end");

        audit.end(&kb).unwrap();
        let findings = kb.findings("generic");
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.title, "Unhandled error in web application");
        assert_eq!(finding.severity, Severity::Low);
        assert_eq!(finding.plugin_name, "generic");
        assert_eq!(finding.url(), "http://shop.example/item.php");
        assert_eq!(finding.token_name(), "b");
        assert_eq!(finding.evidence_response_ids[0], 100);
        assert_eq!(finding.evidence_response_ids.len(), 3);
        assert!(finding.description.starts_with(
            "An unhandled error, which could potentially translate to a vulnerability, was found at: GET http://shop.example/item.php?b="
        ));
    }

    #[test]
    fn test_unstable_limit_is_not_confirmed() {
        let limits = Arc::new(AtomicUsize::new(0));
        let counter = limits.clone();
        let transport = Arc::new(ScriptedTransport::by_query_value("b", move |value| {
            let body = if !is_limit(value) {
                FATAL.to_owned()
            } else if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                "Welcome".to_owned()
            } else {
                "Session expired, please log in again".to_owned()
            };
            Some(body)
        }));
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();

        audit
            .audit(
                &request(),
                &html_response(1, "Welcome"),
                &dispatcher(&transport),
                &kb,
            )
            .unwrap();
        audit.end(&kb).unwrap();
        assert!(kb.all_findings().is_empty());
        // Both error strings were flagged and both confirmations failed
        assert_eq!(limits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_second_request_for_same_token_is_skipped() {
        let transport = Arc::new(ScriptedTransport::by_query_value("b", |value| {
            Some(if is_limit(value) { "Welcome" } else { FATAL }.to_owned())
        }));
        let dispatcher = dispatcher(&transport);
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();
        let original = html_response(1, "Welcome");

        audit.audit(&request(), &original, &dispatcher, &kb).unwrap();
        let after_first = transport.dispatch_count();

        let same_token =
            FuzzableRequest::try_from(("GET", "http://shop.example/item.php?b=7")).unwrap();
        audit.audit(&same_token, &original, &dispatcher, &kb).unwrap();
        assert_eq!(transport.dispatch_count(), after_first);

        audit.end(&kb).unwrap();
        assert_eq!(kb.all_findings().len(), 1);
    }

    #[test]
    fn test_dispatch_failure_only_abandons_that_token() {
        // Mutating `a` breaks the connection; `b` behaves like the error page case
        let transport = Arc::new(ScriptedTransport::new(|request| {
            if query_value(request, "a").as_deref() != Some("1") {
                return None;
            }
            let b = query_value(request, "b").unwrap_or_default();
            Some(if b == "1" || is_limit(&b) { "Welcome" } else { FATAL }.to_owned())
        }));
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();
        let request = FuzzableRequest::try_from(("GET", "http://shop.example/?a=1&b=1")).unwrap();

        audit
            .audit(
                &request,
                &html_response(1, "Welcome"),
                &dispatcher(&transport),
                &kb,
            )
            .unwrap();
        audit.end(&kb).unwrap();

        let findings = kb.all_findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].1.token_name(), "b");
    }

    #[test]
    fn test_end_skips_tokens_reported_elsewhere() {
        let transport = Arc::new(ScriptedTransport::by_query_value("b", |value| {
            Some(if is_limit(value) { "Welcome" } else { FATAL }.to_owned())
        }));
        let audit = UnhandledErrorAudit::new(0.3, 16);
        let kb = InMemoryKnowledgeBase::new();
        kb.append_if_absent("sqli", sample_finding("http://shop.example/item.php", "b"));

        audit
            .audit(
                &request(),
                &html_response(1, "Welcome"),
                &dispatcher(&transport),
                &kb,
            )
            .unwrap();
        audit.end(&kb).unwrap();

        assert!(kb.findings("generic").is_empty());
        assert_eq!(kb.all_findings().len(), 1);
    }

    #[test]
    fn test_volatile_baseline_widens_ratio() {
        let ratio = acceptance_ratio(0.3, 0.6);
        assert!((ratio - 0.7).abs() < 1e-9);
        assert!(looks_anomalous(0.65, 0.65, ratio));
        // The same error response on a stable page is not different enough
        assert!(!looks_anomalous(0.65, 0.65, acceptance_ratio(0.3, 1.0)));
    }

    #[test]
    fn test_ratio_grows_as_limit_drifts() {
        let ratios: Vec<f64> = [1.0, 0.8, 0.5, 0.2, 0.0]
            .into_iter()
            .map(|original_to_limit| acceptance_ratio(0.3, original_to_limit))
            .collect();
        assert!(ratios.windows(2).all(|pair| pair[0] < pair[1]));
        assert!((ratios[4] - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_limit_value_shape() {
        for original in ["1", "0042", "123456789"] {
            let value = limit_value(original);
            assert_eq!(value.len(), 8);
            assert!(value.bytes().all(|b| b.is_ascii_digit()), "{value}");
        }
        for original in ["abc", "", "12a", "-1", "１２"] {
            let value = limit_value(original);
            assert_eq!(value.len(), 8);
            assert!(value.bytes().all(|b| b.is_ascii_alphanumeric()), "{value}");
        }
    }
}
