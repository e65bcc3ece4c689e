//! Request-mutation audit engine. Baseline requests are taken apart into tokens, every
//! token is probed with mutated values, and responses that betray unhandled errors or
//! reflected frame sources are recorded as findings.

pub mod audit;
pub mod configuration;
pub mod container;
pub mod curl_request;
pub mod dedup;
pub mod dispatcher;
pub mod finding;
pub mod header;
pub mod input;
pub mod knowledge_base;
pub mod mutant;
pub mod reporting;
pub mod scan;
pub mod similarity;
pub mod token_path;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

use configuration::Configuration;

/// Initialises the logger with the configured level. Calling it more than once is
/// harmless.
pub fn setup_logging(config: &Configuration) {
    if let Err(err) = env_logger::Builder::new()
        .filter_level(config.log_level)
        .format_timestamp_millis()
        .try_init()
    {
        log::debug!("Logger was already initialised: {err}");
    }
}
