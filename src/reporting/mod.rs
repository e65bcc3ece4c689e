use crate::{finding::Finding, input::FuzzableRequest, mutant::Mutant, transport::Response};

pub mod sqlite;

// The reporting trait allows reporting requests, responses and findings for later analysis.
// The type `T` is the type used by the underlying data store to refer to records,
// so that information can be added to a record made earlier.
//
// Reporting never fails the scan: implementations log their own errors.
pub trait Reporting<T> {
    /// Report a request about to be sent, with the mutant it was derived from if any
    fn report_request(&self, request: &FuzzableRequest, mutant: Option<&Mutant>) -> T;

    /// Report a valid response link to the corresponding request
    fn report_response(&self, response: &Response, request_id: T);

    /// Report a response error linked to the corresponding request
    fn report_response_error(&self, error: &str, request_id: T);

    /// Report a finding recorded in the knowledge base
    fn report_finding(&self, category: &str, finding: &Finding);
}

impl<R, T> Reporting<T> for Option<R>
where
    R: Reporting<T>,
    T: Default,
{
    fn report_request(&self, request: &FuzzableRequest, mutant: Option<&Mutant>) -> T {
        match self.as_ref() {
            Some(reporter) => reporter.report_request(request, mutant),
            _ => Default::default(),
        }
    }

    fn report_response(&self, response: &Response, request_id: T) {
        if let Some(reporter) = self.as_ref() {
            reporter.report_response(response, request_id)
        }
    }

    fn report_response_error(&self, error: &str, request_id: T) {
        if let Some(reporter) = self.as_ref() {
            reporter.report_response_error(error, request_id)
        }
    }

    fn report_finding(&self, category: &str, finding: &Finding) {
        if let Some(reporter) = self.as_ref() {
            reporter.report_finding(category, finding)
        }
    }
}
