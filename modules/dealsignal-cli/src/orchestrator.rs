use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use dealsignal_collect::{enabled_collectors, CollectContext, CollectRunSummary, CollectorRunner};
use dealsignal_common::config::RateLimitSetting;
use dealsignal_common::{CancelFlag, Config};
use dealsignal_gate::GateConfig;
use dealsignal_http::{RateLimitedClient, RateLimiter};
use dealsignal_push::{NotionPusher, SuppressionSync};
use dealsignal_store::SignalStore;
use notion_client::NotionClient;

use crate::exit::ExitCode;
use crate::health;

/// How many collectors run at once. Each is still throttled by its own
/// rate-limit bucket.
const COLLECTOR_CONCURRENCY: usize = 4;

/// Binds store, HTTP, CRM, gate, and collectors into the five jobs the
/// CLI exposes. Phases are independent; only store-level failures are
/// fatal to an enclosing phase.
pub struct Orchestrator {
    config: Config,
    store: SignalStore,
    http: RateLimitedClient,
    cancel: CancelFlag,
}

impl Orchestrator {
    pub async fn initialize(config: Config) -> Result<Self, ExitCode> {
        let store = match SignalStore::open(&config.db_path).await {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open signal store: {e}");
                return Err(ExitCode::StoreError);
            }
        };

        let mut rate_limits = config.rate_limits.clone();
        rate_limits
            .entry(notion_client::SOURCE.to_string())
            .or_insert(RateLimitSetting {
                requests_per_second: notion_client::DEFAULT_NOTION_RPS,
                burst: 3,
            });
        let limiter = RateLimiter::new(
            rate_limits,
            RateLimitSetting {
                requests_per_second: 1.0,
                burst: 2,
            },
        );
        let http = match RateLimitedClient::new(&config.http, limiter) {
            Ok(http) => http,
            Err(e) => {
                error!("Failed to build HTTP client: {e}");
                return Err(ExitCode::ConfigError);
            }
        };

        let orchestrator = Self {
            config,
            store,
            http,
            cancel: CancelFlag::new(),
        };

        // A fresh suppression cache before anything collects or pushes.
        if orchestrator.config.warmup_sync && orchestrator.config.notion.is_some() {
            info!("Warmup suppression sync");
            if let ExitCode::StoreError = orchestrator.sync(None, false).await {
                return Err(ExitCode::StoreError);
            }
        }

        Ok(orchestrator)
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn notion(&self) -> Result<NotionClient, ExitCode> {
        match self.config.notion() {
            Ok(notion_config) => Ok(NotionClient::new(notion_config.clone(), self.http.clone())),
            Err(e) => {
                error!("{e:#}");
                Err(ExitCode::ConfigError)
            }
        }
    }

    fn gate_config(&self) -> GateConfig {
        let (auto_push, needs_review) = match &self.config.notion {
            Some(n) => (n.status_auto_push.clone(), n.status_needs_review.clone()),
            None => ("Source".to_string(), "Review".to_string()),
        };
        GateConfig::from_settings(&self.config.gate, auto_push, needs_review)
    }

    // --- Jobs ---

    pub async fn collect(
        &self,
        requested: Option<&[String]>,
        dry_run: bool,
        lookback_days: Option<i64>,
    ) -> ExitCode {
        let enabled = requested
            .map(<[String]>::to_vec)
            .or_else(|| self.config.collectors_enabled.clone());
        let collectors = enabled_collectors(enabled.as_deref());
        if collectors.is_empty() {
            warn!("No collectors selected");
            return ExitCode::Success;
        }

        let lookback = lookback_days.unwrap_or(self.config.lookback_days);
        let timeout = std::time::Duration::from_secs(self.config.collector_timeout_secs.max(1));
        let ctx = CollectContext::new(self.http.clone(), lookback, dry_run)
            .with_cancel(self.cancel.clone());
        let runner = CollectorRunner::new(self.store.clone());

        let mut summary = CollectRunSummary::default();
        let runner = &runner;
        let ctx = &ctx;
        let mut results = stream::iter(collectors.iter())
            .map(|collector| async move {
                match tokio::time::timeout(timeout, runner.run(collector.as_ref(), ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let mut result =
                            dealsignal_collect::CollectorResult::new(collector.name(), dry_run);
                        result.status = dealsignal_collect::CollectorStatus::Error;
                        result
                            .errors
                            .push(format!("run exceeded {}s timeout", timeout.as_secs()));
                        result
                    }
                }
            })
            .buffer_unordered(COLLECTOR_CONCURRENCY);
        while let Some(result) = results.next().await {
            summary.push(result);
        }

        println!("{summary}");
        if summary.had_failures() {
            ExitCode::PartialFailure
        } else {
            ExitCode::Success
        }
    }

    pub async fn process(&self, limit: Option<i64>, dry_run: bool) -> ExitCode {
        let crm = match self.notion() {
            Ok(crm) => crm,
            Err(code) => return code,
        };
        let pusher = NotionPusher::new(self.store.clone(), crm, self.gate_config());

        match pusher.process_pending(limit, dry_run, &self.cancel).await {
            Ok(result) => {
                println!("{result}");
                if result.had_failures() {
                    ExitCode::PartialFailure
                } else {
                    ExitCode::Success
                }
            }
            Err(e) => {
                error!("Process phase failed: {e}");
                ExitCode::from_error(&e)
            }
        }
    }

    pub async fn sync(&self, ttl_days: Option<i64>, dry_run: bool) -> ExitCode {
        let crm = match self.notion() {
            Ok(crm) => crm,
            Err(code) => return code,
        };
        let ttl = ttl_days.unwrap_or(self.config.suppression_ttl_days);
        let sync = SuppressionSync::new(self.store.clone(), crm, ttl);

        match sync.run(dry_run, &self.cancel).await {
            Ok(stats) => {
                println!("{stats}");
                ExitCode::Success
            }
            Err(e) => {
                error!("Sync phase failed: {e}");
                ExitCode::from_error(&e)
            }
        }
    }

    pub async fn full(
        &self,
        collectors: Option<&[String]>,
        dry_run: bool,
        lookback_days: Option<i64>,
        limit: Option<i64>,
        ttl_days: Option<i64>,
    ) -> ExitCode {
        let mut worst = self.sync(ttl_days, dry_run).await;
        if worst == ExitCode::StoreError {
            return worst;
        }

        worst = worst.worst(self.collect(collectors, dry_run, lookback_days).await);
        if worst == ExitCode::StoreError {
            return worst;
        }

        worst.worst(self.process(limit, dry_run).await)
    }

    pub async fn stats(&self) -> ExitCode {
        match self.store.get_stats().await {
            Ok(stats) => {
                println!("{stats}");
                ExitCode::Success
            }
            Err(e) => {
                error!("Failed to read stats: {e}");
                ExitCode::StoreError
            }
        }
    }

    pub async fn health(&self, json: bool) -> ExitCode {
        let notion = self.config.notion.is_some().then(|| self.notion()).transpose();
        let notion = match notion {
            Ok(client) => client,
            Err(code) => return code,
        };

        let report = health::run_checks(
            &self.store,
            &self.http,
            notion.as_ref(),
            &self.cancel,
        )
        .await;

        if json {
            match serde_json::to_string_pretty(&report) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => {
                    error!("Failed to render health report: {e}");
                    return ExitCode::PartialFailure;
                }
            }
        } else {
            println!("{report}");
        }

        report.exit_code()
    }
}
