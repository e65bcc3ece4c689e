use std::{
    fs::create_dir_all,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use chrono::SecondsFormat;
use log::info;
use rusqlite::{Connection, named_params};

use crate::{
    configuration::Configuration,
    curl_request::CurlRequest,
    finding::Finding,
    input::FuzzableRequest,
    mutant::Mutant,
    reporting::Reporting,
    transport::Response,
};

/// Instantiates a MySqLite reporter if desired by the configuration
pub fn get_reporter(config: &Configuration) -> Result<Option<MySqLite>, anyhow::Error> {
    if !config.report {
        return Ok(None);
    }
    create_dir_all("reports/trace")?;
    Ok(Some(MySqLite::new(Path::new("reports/trace/report.db"))?))
}

fn now() -> String {
    chrono::offset::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trace database of a scan. Probes are sent from several threads, so the connection
/// sits behind a mutex.
pub struct MySqLite {
    conn: Mutex<Connection>,
    run_id: i64,
}

impl MySqLite {
    pub fn new(path: &Path) -> anyhow::Result<MySqLite> {
        let conn = Connection::open(path)
            .with_context(|| format!("Can not create database file {path:?} for reporting"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY NOT NULL,
                `timestamp` DATETIME NOT NULL
            )",
            [],
        )
        .context("Could not create `runs` table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY NOT NULL,
                `timestamp` DATETIME NOT NULL,
                `type` varchar(10) NOT NULL,
                `url` varchar(65535) NOT NULL,
                `token` varchar(255),
                `value` blob(65535),
                `body` blob(65535),
                `data` blob(65535),
                `runid` INTEGER NOT NULL,
                CONSTRAINT run_FK FOREIGN KEY (runid) REFERENCES runs(id)
            )",
            [],
        )
        .context("Could not create `requests` table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS responses (
                id INTEGER PRIMARY KEY NOT NULL,
                `timestamp` DATETIME NOT NULL,
                responseid INT NULL,
                status INT NULL,
                error varchar(255) NULL,
                data blob(65535),
                reqid int NOT NULL,
                CONSTRAINT responses_FK FOREIGN KEY (reqid) REFERENCES requests(id)
            )",
            [],
        )
        .context("Create responses table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS findings (
                id INTEGER PRIMARY KEY NOT NULL,
                `timestamp` DATETIME NOT NULL,
                `category` varchar(255) NOT NULL,
                `title` varchar(255) NOT NULL,
                `severity` varchar(10) NOT NULL,
                `description` varchar(65535) NOT NULL,
                `url` varchar(65535) NOT NULL,
                `token` varchar(255) NOT NULL,
                `evidence` varchar(255) NOT NULL,
                `plugin` varchar(255) NOT NULL,
                `runid` INTEGER NOT NULL,
                CONSTRAINT run_FK FOREIGN KEY (runid) REFERENCES runs(id)
            )",
            [],
        )
        .context("Could not create `findings` table")?;

        info!("Created tables for the reporting");

        let run_id = conn
            .prepare("INSERT INTO runs (timestamp) VALUES(?)")
            .and_then(|mut stmt| stmt.insert([now()]))
            .context("Could not create new run")?;
        Ok(MySqLite {
            conn: Mutex::new(conn),
            run_id,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reporting<i64> for MySqLite {
    fn report_request(&self, request: &FuzzableRequest, mutant: Option<&Mutant>) -> i64 {
        let body = request.body().to_bytes();
        let url = request.url_with_query().to_string();
        let params = named_params! {
            ":timestamp": now(),
            ":type": request.method().as_str(),
            ":url": url,
            ":token": mutant.map(Mutant::token_name),
            ":value": mutant.map(Mutant::value),
            ":body": (!body.is_empty()).then_some(body.as_slice()),
            ":data": CurlRequest(request).to_string(),
            ":runid": self.run_id,
        };
        self.conn()
            .prepare("INSERT INTO requests (timestamp, type, url, token, value, body, data, runid) VALUES(:timestamp, :type, :url, :token, :value, :body, :data, :runid)")
            .and_then(|mut stmt| stmt.insert(params))
            .unwrap_or_else(|err| {
                log::error!("Could not insert request into database: {err}");
                0
            })
    }

    fn report_response(&self, response: &Response, request_id: i64) {
        let result = self
            .conn()
            .prepare("INSERT INTO responses (timestamp, responseid, status, reqid, data) VALUES(?,?,?,?,?)")
            .and_then(|mut stmt| {
                stmt.insert((
                    now(),
                    response.id() as i64,
                    response.status().as_u16(),
                    request_id,
                    response.text().as_ref(),
                ))
            });
        if let Err(err) = result {
            log::error!("Could not insert response into database: {err}");
        }
    }

    fn report_response_error(&self, error: &str, request_id: i64) {
        let result = self
            .conn()
            .prepare("INSERT INTO responses (timestamp, error, reqid) VALUES(?,?,?)")
            .and_then(|mut stmt| stmt.insert((now(), error, request_id)));
        if let Err(err) = result {
            log::error!("Could not insert response error into database: {err}");
        }
    }

    fn report_finding(&self, category: &str, finding: &Finding) {
        let evidence = finding
            .evidence_response_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let params = named_params! {
            ":timestamp": now(),
            ":category": category,
            ":title": finding.title,
            ":severity": finding.severity.to_string(),
            ":description": finding.description,
            ":url": finding.url(),
            ":token": finding.token_name(),
            ":evidence": evidence,
            ":plugin": finding.plugin_name,
            ":runid": self.run_id,
        };
        let result = self
            .conn()
            .prepare("INSERT INTO findings (timestamp, category, title, severity, description, url, token, evidence, plugin, runid) VALUES(:timestamp, :category, :title, :severity, :description, :url, :token, :evidence, :plugin, :runid)")
            .and_then(|mut stmt| stmt.insert(params));
        if let Err(err) = result {
            log::error!("Could not insert finding into database: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::MySqLite;
    use crate::{
        input::FuzzableRequest, mutant::create_mutants, reporting::Reporting,
        test_helpers::sample_finding, transport::Response,
    };

    fn count(reporter: &MySqLite, table: &str) -> i64 {
        reporter
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_records_requests_responses_and_findings() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = MySqLite::new(&dir.path().join("report.db")).unwrap();

        let base = FuzzableRequest::try_from(("GET", "http://a/?q=1")).unwrap();
        let mutant = &create_mutants(&base, &["x"])[0];
        let request_id = reporter.report_request(mutant.request(), Some(mutant));
        assert!(request_id > 0);
        reporter.report_response(
            &Response::new(7, StatusCode::OK, vec![], b"hello".to_vec()),
            request_id,
        );
        let other_id = reporter.report_request(&base, None);
        reporter.report_response_error("connection failed", other_id);
        reporter.report_finding("generic", &sample_finding("http://a/", "q"));

        assert_eq!(count(&reporter, "runs"), 1);
        assert_eq!(count(&reporter, "requests"), 2);
        assert_eq!(count(&reporter, "responses"), 2);
        assert_eq!(count(&reporter, "findings"), 1);

        let token: String = reporter
            .conn()
            .query_row("SELECT token FROM requests WHERE id = ?", [request_id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(token, "q");
    }

    #[test]
    fn test_disabled_reporter_is_a_no_op() {
        let reporter: Option<MySqLite> = None;
        let base = FuzzableRequest::try_from(("GET", "http://a/")).unwrap();
        assert_eq!(reporter.report_request(&base, None), 0);
    }
}
