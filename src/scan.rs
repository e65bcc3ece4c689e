use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::json;

use crate::{
    audit::{AuditPlugin, all_plugins},
    configuration::{Configuration, OutputFormat},
    dispatcher::ProbeDispatcher,
    finding::Finding,
    header::get_default_headers,
    input::{FuzzableRequest, load_requests},
    knowledge_base::{InMemoryKnowledgeBase, KnowledgeBase},
    reporting::{Reporting, sqlite::get_reporter},
    transport::ReqwestTransport,
};

/// Main scan function.
///
/// Loads the baseline requests, audits each of them with every plugin and prints the
/// findings.
pub fn scan() -> Result<()> {
    let config = &Configuration::get().map_err(anyhow::Error::msg)?;
    crate::setup_logging(config);

    let mut requests = load_requests(&config.requests)?;
    if let Some(target) = &config.target {
        requests.iter_mut().for_each(|request| request.rebase(target));
    }
    info!("Loaded {} baseline request(s)", requests.len());

    let client = build_http_client(config)?;
    let dispatcher = ProbeDispatcher::new(
        Arc::new(ReqwestTransport::new(client)),
        config.concurrency,
        get_reporter(config)?,
    )?;
    let plugins = all_plugins(config.base_diff_ratio, config.dedup_memory_limit);
    let kb = InMemoryKnowledgeBase::new();

    let progress = progress_bar(requests.len());
    run_plugins(&requests, &dispatcher, &plugins, &kb, &progress)?;
    progress.finish_and_clear();

    let findings = kb.all_findings();
    if let Some(reporter) = dispatcher.reporter() {
        for (category, finding) in &findings {
            reporter.report_finding(category, finding);
        }
    }
    println!("{}", render_findings(&findings, config.output_format));
    Ok(())
}

/// Builds the HTTP client probes are sent with.
pub fn build_http_client(config: &Configuration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout))
        .default_headers(get_default_headers(config.header.as_deref())?)
        .build()
        .context("Could not build the HTTP client")
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
    {
        Ok(style) => progress.set_style(style.progress_chars("##-")),
        Err(err) => warn!("Could not style the progress bar: {err}"),
    }
    progress
}

/// Sends every baseline once and hands it to every plugin, then finalizes the plugins.
/// Baselines that can not be sent are skipped.
pub fn run_plugins(
    requests: &[FuzzableRequest],
    dispatcher: &ProbeDispatcher,
    plugins: &[Box<dyn AuditPlugin>],
    kb: &dyn KnowledgeBase,
    progress: &ProgressBar,
) -> Result<()> {
    for request in requests {
        progress.set_message(request.to_string());
        match dispatcher.send_request(request) {
            Ok(original) => {
                for plugin in plugins {
                    plugin
                        .audit(request, &original, dispatcher, kb)
                        .with_context(|| format!("Plugin {} failed on {request}", plugin.name()))?;
                }
            }
            Err(err) => warn!("Skipping {request}, the baseline request failed: {err}"),
        }
        progress.inc(1);
    }
    for plugin in plugins {
        plugin
            .end(kb)
            .with_context(|| format!("Plugin {} failed to finish", plugin.name()))?;
    }
    Ok(())
}

pub fn render_findings(findings: &[(String, Finding)], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "findings": findings
                .iter()
                .map(|(category, finding)| json!({"category": category, "finding": finding}))
                .collect::<Vec<_>>(),
        })
        .to_string(),
        OutputFormat::HumanReadable => {
            if findings.is_empty() {
                "No findings".to_owned()
            } else {
                findings
                    .iter()
                    .map(|(category, finding)| format!("[{category}] {finding}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}
