use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::AppError;
use crate::jobs::{Action, JobFailure};
use crate::nimbusec::{ApiError, Domain, NimbusecApi, ScanResult};
use crate::pool::{Job, Pool};

/// `--domain` value selecting every infected domain.
pub const ALL_DOMAINS: &str = "ALL";

/// Collector-owned CSV output: `name,lastDate,resource,threatname,reason`.
pub struct ResultsSink {
    writer: csv::Writer<Box<dyn Write + Send>>,
    /// Domains whose results were handled, written or failed.
    pub domains: usize,
    pub rows: usize,
    pub failures: Vec<JobFailure>,
    fail_fast: bool,
    abort: Arc<AtomicBool>,
}

impl ResultsSink {
    pub fn new(out: Box<dyn Write + Send>, fail_fast: bool) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            domains: 0,
            rows: 0,
            failures: Vec::new(),
            fail_fast,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reports every failed domain; errors if there was any.
    pub fn conclude(&self) -> Result<(), AppError> {
        if self.failures.is_empty() {
            return Ok(());
        }
        for failure in &self.failures {
            tracing::error!(%failure, "operation failed");
        }
        Err(AppError::BatchFailed {
            failed: self.failures.len(),
            total: self.domains,
        })
    }

    fn fail(&mut self, domain: &str, error: String) {
        tracing::warn!(domain, %error, "could not report results");
        self.failures.push(JobFailure {
            action: Action::FetchResults,
            domain: domain.to_string(),
            error,
        });
        if self.fail_fast {
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    fn write(&mut self, domain: &str, results: &[ScanResult]) -> Result<(), csv::Error> {
        for result in results {
            let last_date = result.last_date.to_string();
            self.writer.write_record([
                domain,
                last_date.as_str(),
                result.resource.as_str(),
                result.threat_name.as_str(),
                result.reason.as_str(),
            ])?;
            self.rows += 1;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Fetches the scan results of one domain.
pub struct ResultsJob<A> {
    api: Arc<A>,
    domain: Domain,
    filter: String,
    outcome: Option<Result<Vec<ScanResult>, ApiError>>,
}

impl<A: NimbusecApi> ResultsJob<A> {
    pub fn new(api: Arc<A>, domain: Domain, filter: String) -> Self {
        Self {
            api,
            domain,
            filter,
            outcome: None,
        }
    }
}

impl<A: NimbusecApi> Job for ResultsJob<A> {
    type Report = ResultsSink;

    async fn work(&mut self) {
        let result = match self.domain.id {
            Some(id) => self.api.find_results(id, &self.filter).await,
            None => Err(ApiError::NotFound(self.domain.name.clone())),
        };
        self.outcome = Some(result);
    }

    fn save(self, sink: &mut ResultsSink) {
        sink.domains += 1;
        match self.outcome {
            Some(Ok(results)) => {
                if let Err(e) = sink.write(&self.domain.name, &results) {
                    sink.fail(&self.domain.name, e.to_string());
                }
            }
            Some(Err(e)) => sink.fail(&self.domain.name, e.to_string()),
            None => sink.fail(&self.domain.name, "work did not run".to_string()),
        }
    }
}

/// Lists results for one named domain, or for every domain matching `filter`
/// when `domain` is [`ALL_DOMAINS`]. The filter also narrows the results.
pub async fn run<A: NimbusecApi>(
    api: Arc<A>,
    domain: &str,
    filter: &str,
    workers: usize,
    sink: ResultsSink,
) -> Result<ResultsSink, AppError> {
    let domains = if domain == ALL_DOMAINS {
        api.find_infected(filter).await?
    } else {
        vec![api.get_domain_by_name(domain).await?]
    };
    tracing::info!(domains = domains.len(), "fetching results");

    let abort = Arc::clone(&sink.abort);
    let mut pool = Pool::<ResultsJob<A>>::with_report(workers, sink)?;
    pool.start()?;
    for domain in domains {
        if abort.load(Ordering::SeqCst) {
            tracing::warn!("aborting after failure, remaining domains skipped");
            break;
        }
        pool.add(ResultsJob::new(Arc::clone(&api), domain, filter.to_string()))
            .await?;
    }
    pool.wait().await?;
    Ok(pool.stop().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nimbusec::fake::{Call, FakeApi};
    use crate::ui::CapturedOutput;

    fn sorted_lines(out: &CapturedOutput) -> Vec<String> {
        let mut lines: Vec<String> = out.text().lines().map(str::to_string).collect();
        lines.sort();
        lines
    }

    fn infected(id: i64, name: &str) -> Domain {
        Domain {
            id: Some(id),
            name: name.into(),
            ..Domain::default()
        }
    }

    fn finding(last_date: i64, resource: &str, threat: &str) -> ScanResult {
        ScanResult {
            last_date,
            resource: resource.into(),
            threat_name: threat.into(),
            ..ScanResult::default()
        }
    }

    fn api() -> FakeApi {
        FakeApi::new()
            .with_infected(vec![infected(1, "a.com"), infected(2, "b.com")])
            .with_results(1, vec![finding(100, "/x.php", "Webshell")])
            .with_results(
                2,
                vec![
                    finding(200, "/y.js", "Malware"),
                    ScanResult {
                        reason: "blacklisted".into(),
                        ..finding(300, "http://b.com", "")
                    },
                ],
            )
    }

    #[tokio::test]
    async fn all_writes_results_of_every_infected_domain() {
        let api = Arc::new(api());
        let out = CapturedOutput::default();
        let sink = ResultsSink::new(Box::new(out.clone()), false);

        let sink = run(Arc::clone(&api), ALL_DOMAINS, "severity ge 3", 2, sink)
            .await
            .unwrap();

        assert_eq!(sink.rows, 3);
        assert!(sink.failures.is_empty());
        assert_eq!(
            sorted_lines(&out),
            vec![
                "a.com,100,/x.php,Webshell,",
                "b.com,200,/y.js,Malware,",
                "b.com,300,http://b.com,,blacklisted",
            ]
        );
        assert!(api.calls().contains(&Call::FindInfected("severity ge 3".into())));
        assert!(api.calls().contains(&Call::FindResults {
            domain: 2,
            filter: "severity ge 3".into()
        }));
    }

    #[tokio::test]
    async fn single_domain_is_resolved_by_name() {
        let api = Arc::new(api());
        let out = CapturedOutput::default();
        let sink = ResultsSink::new(Box::new(out.clone()), false);

        let sink = run(Arc::clone(&api), "a.com", "", 1, sink).await.unwrap();

        assert_eq!(sink.rows, 1);
        assert_eq!(api.calls()[0], Call::GetByName("a.com".into()));
        assert_eq!(sorted_lines(&out), vec!["a.com,100,/x.php,Webshell,"]);
    }

    #[tokio::test]
    async fn unknown_domain_fails_before_pool() {
        let api = Arc::new(api());
        let sink = ResultsSink::new(Box::new(CapturedOutput::default()), false);
        let result = run(api, "nope.com", "", 1, sink).await;
        assert!(matches!(result, Err(AppError::Api(ApiError::NotFound(_)))));
    }

    #[tokio::test]
    async fn failing_domain_is_recorded() {
        let api = Arc::new(api().failing_on("b.com"));
        let out = CapturedOutput::default();
        let sink = ResultsSink::new(Box::new(out.clone()), false);

        let sink = run(api, ALL_DOMAINS, "", 2, sink).await.unwrap();

        assert_eq!(sink.rows, 1);
        assert_eq!(sink.domains, 2);
        assert_eq!(sink.failures.len(), 1);
        assert_eq!(sink.failures[0].domain, "b.com");
        assert!(matches!(
            sink.conclude(),
            Err(AppError::BatchFailed {
                failed: 1,
                total: 2
            })
        ));
    }

    #[tokio::test]
    async fn failures_are_counted_per_domain_not_per_row() {
        // a.com fails, b.com writes two rows.
        let api = Arc::new(api().failing_on("a.com"));
        let sink = ResultsSink::new(Box::new(CapturedOutput::default()), false);

        let sink = run(api, ALL_DOMAINS, "", 1, sink).await.unwrap();

        assert_eq!(sink.rows, 2);
        assert_eq!(sink.domains, 2);
        match sink.conclude() {
            Err(AppError::BatchFailed { failed, total }) => {
                assert_eq!((failed, total), (1, 2));
            }
            other => panic!("expected BatchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conclude_is_ok_without_failures() {
        let api = Arc::new(api());
        let sink = ResultsSink::new(Box::new(CapturedOutput::default()), false);
        let sink = run(api, ALL_DOMAINS, "", 2, sink).await.unwrap();
        assert_eq!(sink.domains, 2);
        assert!(sink.conclude().is_ok());
    }
}
