use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AppError;
use crate::services::failure_cache::FailureCache;
use crate::services::quote_refresh_service::QuoteRefresher;

/// Every hour, on the hour.
const FAILURE_CACHE_CLEANUP_CRON: &str = "0 0 * * * *";

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub refresher: QuoteRefresher,
    pub failure_cache: FailureCache,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: usize,
    pub items_failed: usize,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Register the jobs and start ticking.
    pub async fn start(&mut self, quote_refresh_cron: &str) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        self.schedule_job(quote_refresh_cron, "refresh_quotes", refresh_quotes)
            .await?;

        self.schedule_job(
            FAILURE_CACHE_CLEANUP_CRON,
            "cleanup_failure_cache",
            cleanup_failure_cache,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started successfully with 2 jobs");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} [cron: {}]", job_name, schedule);
        Ok(())
    }
}

async fn execute_job<F, Fut>(job_name: &str, context: JobContext, job_fn: Arc<F>) -> Option<JobResult>
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
            Some(job_result)
        }
        Err(e) => {
            error!("❌ Job failed: {} - {} (duration: {}ms)", job_name, e, duration_ms);
            None
        }
    }
}

pub async fn refresh_quotes(ctx: JobContext) -> Result<JobResult, AppError> {
    let updated = ctx.refresher.refresh_once().await?;
    Ok(JobResult { items_processed: updated, items_failed: 0 })
}

pub async fn cleanup_failure_cache(ctx: JobContext) -> Result<JobResult, AppError> {
    let removed = ctx.failure_cache.cleanup_expired();
    info!("🧹 Removed {} expired failure-cache entries", removed);
    Ok(JobResult { items_processed: removed, items_failed: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_job_reports_failure_as_none() {
        let failing = Arc::new(|_ctx: JobContext| async { Err::<JobResult, _>(AppError::External("boom".into())) });
        let ctx = test_context();
        assert!(execute_job("failing", ctx, failing).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_job_counts_nothing_on_empty_cache() {
        let result = cleanup_failure_cache(test_context()).await.unwrap();
        assert_eq!(result, JobResult::default());
    }

    fn test_context() -> JobContext {
        use crate::external::market_gateway::Unconfigured;
        use crate::services::ledger_service::LedgerStore;
        use crate::services::market_service::{MarketGateways, MarketService};
        use crate::services::session_service::SessionGate;
        use crate::services::sync_service::SyncOutbox;
        use crate::services::watchlist_service::WatchlistStore;
        use parking_lot::Mutex;

        let session = SessionGate::new();
        let none = Arc::new(Unconfigured("test"));
        let failure_cache = FailureCache::new();
        let market = MarketService::new(
            MarketGateways {
                quotes: none.clone(),
                history: none.clone(),
                profiles: none.clone(),
                news: none.clone(),
                search: none,
            },
            failure_cache.clone(),
        );
        let refresher = QuoteRefresher::new(
            Arc::new(Mutex::new(LedgerStore::new(session.clone(), SyncOutbox::disabled()))),
            Arc::new(Mutex::new(WatchlistStore::new(session.clone(), SyncOutbox::disabled()))),
            market,
            session,
        );
        JobContext { refresher, failure_cache }
    }
}
