//! Crawl execution as a bounded polling state machine.
//!
//! ```text
//! INITIAL ──(RUNNING)──> WAIT_FOR_IDLE ──(READY)──> STARTING ──> POLLING
//!    │                        │                                    │
//!    └──────(otherwise)───────┼──────────────> STARTING            ├─> SUCCEEDED
//!                             └─(idle deadline)─> TIMEOUT          ├─> FAILED
//!                                                                  ├─> CANCELLED
//!                                                                  └─> TIMEOUT
//! ```
//!
//! The crawl service never calls back, so every transition is driven by a
//! fresh status fetch. Waiting for a busy crawler re-checks at once and
//! then once per interval; polling a started crawl sleeps first. Both
//! waiting phases are bounded.

use std::sync::Arc;
use std::time::Duration;

use analitica_config::CrawlTiming;
use analitica_core::{
    CatalogError, CatalogService, CrawlOutcome, CrawlerState, CrawlerStatus,
};
use common::{Deadline, PollPolicy, sleep_cancellable};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};

pub struct CrawlerRunner {
    catalog: Arc<dyn CatalogService>,
    timing: CrawlTiming,
    cancel: CancellationToken,
}

impl CrawlerRunner {
    pub fn new(catalog: Arc<dyn CatalogService>, timing: CrawlTiming) -> Self {
        Self {
            catalog,
            timing,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start a crawl of `crawler` and wait for its terminal classification.
    ///
    /// A TIMEOUT is an outcome, not an error. Errors are reserved for
    /// service failures and cancellation.
    pub async fn run(&self, crawler: &str) -> PipelineResult<CrawlOutcome> {
        let started = Instant::now();

        let initial = self.fetch(crawler).await?;
        info!(crawler, state = %initial.state, "crawler state before start");

        if initial.state == CrawlerState::Running {
            if let Some(outcome) = self.wait_for_idle(crawler).await? {
                return Ok(self.finish(outcome, started));
            }
        }

        self.start(crawler).await?;
        let outcome = self.poll_until_done(crawler).await?;
        Ok(self.finish(outcome, started))
    }

    /// Wait for a crawl we did not start. `Some` carries the TIMEOUT
    /// outcome when the idle deadline passes first.
    async fn wait_for_idle(
        &self,
        crawler: &str,
    ) -> PipelineResult<Option<CrawlOutcome>> {
        info!(crawler, "crawler busy, waiting for previous run");
        let deadline = Deadline::start(self.timing.idle_timeout);
        let mut policy = PollPolicy::fixed(self.timing.poll_interval);

        loop {
            let status = self.fetch(crawler).await?;
            if status.state == CrawlerState::Ready {
                info!(
                    crawler,
                    waited_secs = deadline.elapsed().as_secs(),
                    "previous run finished"
                );
                return Ok(None);
            }

            debug!(crawler, state = %status.state, "still busy");
            if deadline.expired() {
                let error = format!(
                    "previous crawl did not finish within {}s",
                    deadline.limit().as_secs()
                );
                warn!(crawler, %error, "giving up on busy crawler");
                return Ok(Some(CrawlOutcome::timeout(crawler, error)));
            }

            self.sleep(policy.next_delay()).await?;
        }
    }

    async fn start(&self, crawler: &str) -> PipelineResult<()> {
        match self.catalog.start_crawler(crawler).await {
            Ok(()) => {
                info!(crawler, "crawl started");
                Ok(())
            }
            Err(e) if e.is_already_running() => {
                warn!(crawler, "crawl already running, following it instead");
                Ok(())
            }
            Err(e) => Err(PipelineError::crawler(crawler, e)),
        }
    }

    async fn poll_until_done(
        &self,
        crawler: &str,
    ) -> PipelineResult<CrawlOutcome> {
        let deadline = Deadline::start(self.timing.crawl_timeout);
        let mut policy = PollPolicy::fixed(self.timing.poll_interval);

        loop {
            self.sleep(policy.next_delay()).await?;

            let status = self.fetch(crawler).await?;
            let elapsed = deadline.elapsed().as_secs();
            info!(
                crawler,
                elapsed_secs = elapsed,
                state = %status.state,
                "crawler poll"
            );

            if status.state == CrawlerState::Ready {
                return Ok(CrawlOutcome::from_last_crawl(
                    crawler,
                    status.last_crawl.as_ref(),
                ));
            }

            if deadline.expired() {
                return Ok(CrawlOutcome::timeout(
                    crawler,
                    format!(
                        "did not complete within {}s",
                        deadline.limit().as_secs()
                    ),
                ));
            }
        }
    }

    async fn fetch(&self, crawler: &str) -> PipelineResult<CrawlerStatus> {
        counter!("analitica_crawler_polls_total").increment(1);
        self.catalog
            .get_crawler(crawler)
            .await
            .map_err(|e| PipelineError::crawler(crawler, e))?
            .ok_or_else(|| {
                PipelineError::crawler(
                    crawler,
                    CatalogError::NotFound {
                        entity: "crawler",
                        name: crawler.to_owned(),
                    },
                )
            })
    }

    async fn sleep(&self, delay: Duration) -> PipelineResult<()> {
        if sleep_cancellable(&self.cancel, delay).await.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn finish(&self, outcome: CrawlOutcome, started: Instant) -> CrawlOutcome {
        counter!(
            "analitica_crawl_outcomes_total",
            "status" => outcome.status.as_str()
        )
        .increment(1);
        histogram!("analitica_stage_latency_seconds", "stage" => "crawl")
            .record(started.elapsed().as_secs_f64());

        match &outcome.error {
            None => info!(
                crawler = %outcome.crawler,
                status = %outcome.status,
                tables_created = outcome.tables_created,
                tables_updated = outcome.tables_updated,
                tables_deleted = outcome.tables_deleted,
                "crawl finished"
            ),
            Some(error) => warn!(
                crawler = %outcome.crawler,
                status = %outcome.status,
                reported = outcome.reported_status.as_deref().unwrap_or("-"),
                %error,
                "crawl did not succeed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analitica_core::{CrawlStatus, CrawlerDefinition, NO_ERROR_MESSAGE};
    use catalog::{CatalogOp, CrawlStep, MemCatalog};
    use pretty_assertions::assert_eq;

    const NAME: &str = "analitica_crawler";

    fn catalog() -> Arc<MemCatalog> {
        Arc::new(MemCatalog::new().with_crawler(CrawlerDefinition {
            name: NAME.into(),
            role: "arn:aws:iam::1:role/LabRole".into(),
            database: "db".into(),
            s3_targets: vec!["s3://bucket/analitica/ingesta".into()],
            description: "test".into(),
        }))
    }

    fn runner(cat: &Arc<MemCatalog>) -> CrawlerRunner {
        CrawlerRunner::new(cat.clone(), CrawlTiming::default())
    }

    #[tokio::test(start_paused = true)]
    async fn succeeded_crawl_reports_counts() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::ready(None),
                CrawlStep::running(),
                CrawlStep::running(),
                CrawlStep::succeeded(2, 1, 0),
            ],
        );

        let started = Instant::now();
        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Succeeded);
        assert_eq!(outcome.tables_created, 2);
        assert_eq!(outcome.tables_updated, 1);
        assert_eq!(outcome.error, None);
        assert_eq!(cat.starts(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_crawl_keeps_reported_message() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::ready(None),
                CrawlStep::running(),
                CrawlStep::failed(Some("Lake Formation permission denied")),
            ],
        );

        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Failed);
        assert_eq!(outcome.reported_status.as_deref(), Some("FAILED"));
        assert_eq!(
            outcome.error.as_deref(),
            Some("Lake Formation permission denied")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_message_gets_default() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [CrawlStep::ready(None), CrawlStep::failed(None)],
        );

        let outcome = runner(&cat).run(NAME).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some(NO_ERROR_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_crawl_is_its_own_outcome() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::ready(None),
                CrawlStep::stopping(),
                CrawlStep::cancelled(),
            ],
        );

        let outcome = runner(&cat).run(NAME).await.unwrap();
        assert_eq!(outcome.status, CrawlStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn crawl_still_running_at_deadline_times_out() {
        let cat = catalog();
        cat.script_crawl(NAME, [CrawlStep::ready(None), CrawlStep::running()]);

        let started = Instant::now();
        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Timeout);
        assert_eq!(
            outcome.error.as_deref(),
            Some("did not complete within 600s")
        );
        assert_eq!(started.elapsed(), Duration::from_secs(600));
        // initial fetch + 40 polls at 15s
        assert_eq!(cat.count(CatalogOp::GetCrawler), 41);
    }

    #[tokio::test(start_paused = true)]
    async fn start_collision_follows_existing_run() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::ready(None),
                CrawlStep::running(),
                CrawlStep::succeeded(0, 3, 0),
            ],
        );
        cat.fail_next(
            CatalogOp::StartCrawler,
            CatalogError::AlreadyRunning { name: NAME.into() },
        );

        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Succeeded);
        assert_eq!(outcome.tables_updated, 3);
        assert_eq!(cat.starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_crawler_is_awaited_before_start() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::running(),
                CrawlStep::running(),
                CrawlStep::failed(Some("previous run")),
                CrawlStep::running(),
                CrawlStep::succeeded(1, 0, 0),
            ],
        );

        let started = Instant::now();
        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Succeeded);
        assert_eq!(outcome.tables_created, 1);
        assert_eq!(cat.starts(), 1);
        // one idle re-check interval, then two crawl polls
        assert_eq!(started.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn crawler_idle_on_recheck_is_started_without_sleeping() {
        let cat = catalog();
        cat.script_crawl(
            NAME,
            [
                CrawlStep::running(),
                CrawlStep::ready(None),
                CrawlStep::running(),
                CrawlStep::succeeded(0, 0, 0),
            ],
        );

        let started = Instant::now();
        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Succeeded);
        assert_eq!(
            cat.calls()[..3].to_vec(),
            vec![
                CatalogOp::GetCrawler,
                CatalogOp::GetCrawler,
                CatalogOp::StartCrawler
            ]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_crawler_past_idle_deadline_times_out_without_start() {
        let cat = catalog();
        cat.script_crawl(NAME, [CrawlStep::running()]);

        let outcome = runner(&cat).run(NAME).await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Timeout);
        assert_eq!(
            outcome.error.as_deref(),
            Some("previous crawl did not finish within 600s")
        );
        assert_eq!(cat.count(CatalogOp::StartCrawler), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_crawler_is_a_state_error() {
        let cat = Arc::new(MemCatalog::new());
        let err = runner(&cat).run(NAME).await.unwrap_err();
        assert!(matches!(err, PipelineError::CrawlerState { .. }), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_a_state_error() {
        let cat = catalog();
        cat.fail_next(
            CatalogOp::StartCrawler,
            CatalogError::Permission {
                details: "glue:StartCrawler denied".into(),
            },
        );

        let err = runner(&cat).run(NAME).await.unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::CrawlerState {
                    source: CatalogError::Permission { .. },
                    ..
                }
            ),
            "{err}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_polling() {
        let cat = catalog();
        cat.script_crawl(NAME, [CrawlStep::ready(None), CrawlStep::running()]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let err = runner(&cat)
            .with_cancel(cancel)
            .run(NAME)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timing_is_honoured() {
        let cat = catalog();
        cat.script_crawl(NAME, [CrawlStep::ready(None), CrawlStep::running()]);
        let timing = CrawlTiming {
            poll_interval: Duration::from_secs(10),
            crawl_timeout: Duration::from_secs(35),
            idle_timeout: Duration::from_secs(60),
        };

        let started = Instant::now();
        let outcome = CrawlerRunner::new(cat.clone(), timing)
            .run(NAME)
            .await
            .unwrap();

        assert_eq!(
            outcome.error.as_deref(),
            Some("did not complete within 35s")
        );
        // terminates within deadline + one interval
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }
}
