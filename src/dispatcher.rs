//! Sends baselines and mutants through the [`Transport`], recording every exchange in the
//! trace database when reporting is enabled.
//!
//! Two invocation patterns exist. [`ProbeDispatcher::send_mutant`] runs on the calling
//! thread, for probe sequences where each step depends on the previous one.
//! [`ProbeDispatcher::send_mutants_in_parallel`] fans independent mutants out over a
//! bounded worker pool.

use std::{num::NonZeroUsize, sync::Arc};

use anyhow::Context;
use rayon::prelude::*;

use crate::{
    input::FuzzableRequest,
    mutant::Mutant,
    reporting::{Reporting, sqlite::MySqLite},
    transport::{DispatchError, Response, Transport},
};

pub struct ProbeDispatcher {
    transport: Arc<dyn Transport>,
    pool: rayon::ThreadPool,
    reporter: Option<MySqLite>,
}

impl ProbeDispatcher {
    /// Creates a dispatcher whose fan-out never has more than `concurrency` probes in flight.
    pub fn new(
        transport: Arc<dyn Transport>,
        concurrency: NonZeroUsize,
        reporter: Option<MySqLite>,
    ) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.get())
            .thread_name(|index| format!("probe-{index}"))
            .build()
            .context("Could not start the probe worker pool")?;
        Ok(Self {
            transport,
            pool,
            reporter,
        })
    }

    pub fn reporter(&self) -> Option<&MySqLite> {
        self.reporter.as_ref()
    }

    /// Sends an unmodified request, such as a baseline.
    pub fn send_request(&self, request: &FuzzableRequest) -> Result<Response, DispatchError> {
        self.dispatch(request, None)
    }

    pub fn send_mutant(&self, mutant: &Mutant) -> Result<Response, DispatchError> {
        self.dispatch(mutant.request(), Some(mutant))
    }

    /// Sends all mutants concurrently. Each outcome is handed to `analyze` together
    /// with the mutant it belongs to, in no particular order. A failed probe only
    /// affects its own outcome.
    pub fn send_mutants_in_parallel<F>(&self, mutants: &[Mutant], analyze: F)
    where
        F: Fn(&Mutant, Result<Response, DispatchError>) + Send + Sync,
    {
        self.pool.install(|| {
            mutants
                .par_iter()
                .enumerate()
                .map(|(index, mutant)| (index, self.send_mutant(mutant)))
                .for_each(|(index, outcome)| analyze(&mutants[index], outcome))
        });
    }

    fn dispatch(
        &self,
        request: &FuzzableRequest,
        mutant: Option<&Mutant>,
    ) -> Result<Response, DispatchError> {
        let request_id = self.reporter.report_request(request, mutant);
        match self.transport.send(request) {
            Ok(response) => {
                self.reporter.report_response(&response, request_id);
                Ok(response)
            }
            Err(err) => {
                log::debug!("Probe {request} failed: {err}");
                self.reporter
                    .report_response_error(&err.to_string(), request_id);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        num::NonZeroUsize,
        sync::{Arc, Mutex},
    };

    use super::ProbeDispatcher;
    use crate::{
        input::FuzzableRequest, mutant::create_mutants, test_helpers::ScriptedTransport,
        transport::DispatchError,
    };

    fn dispatcher(transport: Arc<ScriptedTransport>) -> ProbeDispatcher {
        ProbeDispatcher::new(transport, NonZeroUsize::new(4).unwrap(), None).unwrap()
    }

    #[test]
    fn test_fan_out_matches_responses_to_mutants() {
        let transport = Arc::new(ScriptedTransport::new(|request| {
            Some(format!("echo {}", request.url_with_query().query().unwrap_or("")))
        }));
        let base = FuzzableRequest::try_from(("GET", "http://a/?x=1&y=2")).unwrap();
        let mutants = create_mutants(&base, &["p", "q", "r"]);

        let seen = Mutex::new(Vec::new());
        dispatcher(transport.clone()).send_mutants_in_parallel(&mutants, |mutant, outcome| {
            let body = outcome.unwrap().text().into_owned();
            let expected = format!("echo {}", mutant.request().url_with_query().query().unwrap());
            assert_eq!(body, expected);
            seen.lock().unwrap().push(mutant.clone());
        });

        assert_eq!(transport.dispatch_count(), 6);
        assert_eq!(seen.into_inner().unwrap().len(), 6);
    }

    #[test]
    fn test_failure_stays_with_its_mutant() {
        let transport = Arc::new(ScriptedTransport::new(|request| {
            let query = request.url_with_query().query().unwrap_or("").to_owned();
            (!query.contains("bad")).then(|| "fine".to_owned())
        }));
        let base = FuzzableRequest::try_from(("GET", "http://a/?x=1")).unwrap();
        let mutants = create_mutants(&base, &["good", "bad", "also-good"]);

        let failed = Mutex::new(HashSet::new());
        dispatcher(transport).send_mutants_in_parallel(&mutants, |mutant, outcome| {
            if let Err(err) = outcome {
                assert!(matches!(err, DispatchError::Connection(_)));
                failed.lock().unwrap().insert(mutant.value().to_owned());
            }
        });
        assert_eq!(failed.into_inner().unwrap(), HashSet::from(["bad".to_owned()]));
    }

    #[test]
    fn test_sequential_sends_in_order() {
        let transport = Arc::new(ScriptedTransport::new(|_| Some("ok".to_owned())));
        let dispatcher = dispatcher(transport);
        let base = FuzzableRequest::try_from(("GET", "http://a/?x=1")).unwrap();
        let first = dispatcher.send_request(&base).unwrap();
        let second = dispatcher
            .send_mutant(&create_mutants(&base, &["2"])[0])
            .unwrap();
        assert!(second.id() > first.id());
    }
}
