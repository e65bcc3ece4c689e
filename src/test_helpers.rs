//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use reqwest::StatusCode;

use crate::{
    finding::{Finding, Severity},
    input::FuzzableRequest,
    mutant::create_mutants,
    transport::{DispatchError, Response, Transport},
};

type Responder = dyn Fn(&FuzzableRequest) -> Option<String> + Send + Sync;

/// A transport that answers every request with the body its responder computes, as
/// `text/html`. A responder returning `None` makes the dispatch fail with a
/// connection error.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    dispatched: AtomicUsize,
    next_id: AtomicU64,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&FuzzableRequest) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            dispatched: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Answers based on the value of the query parameter `name` only.
    pub fn by_query_value<F>(name: &'static str, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(move |request| {
            let value = query_value(request, name).unwrap_or_default();
            responder(&value)
        })
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// A response as the transport would produce it, without dispatching anything.
    pub fn response(&self, body: &str) -> Response {
        html_response(self.next_id.fetch_add(1, Ordering::SeqCst), body)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &FuzzableRequest) -> Result<Response, DispatchError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        match (self.responder)(request) {
            Some(body) => Ok(self.response(&body)),
            None => Err(DispatchError::Connection("scripted failure".to_owned())),
        }
    }
}

pub fn html_response(id: u64, body: &str) -> Response {
    Response::new(
        id,
        StatusCode::OK,
        vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
        body.as_bytes().to_vec(),
    )
}

pub fn query_value(request: &FuzzableRequest, name: &str) -> Option<String> {
    request
        .url_with_query()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// A finding about query parameter `token` of `url`.
pub fn sample_finding(url: &str, token: &str) -> Finding {
    let base = FuzzableRequest::try_from(("GET", format!("{url}?{token}=1").as_str()))
        .expect("sample URL");
    let mutant = create_mutants(&base, &["x"])
        .pop()
        .expect("sample request has a token");
    Finding {
        title: "Sample".to_owned(),
        description: format!("Sample finding at {}", mutant.found_at()),
        severity: Severity::Low,
        evidence_response_ids: vec![1],
        plugin_name: "sample".to_owned(),
        mutant: mutant.to_record(),
    }
}
