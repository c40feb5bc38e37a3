use tracing::{info, warn};

use dealsignal_common::error::PipelineError;
use dealsignal_store::SignalStore;

use crate::context::CollectContext;
use crate::result::{CollectorResult, CollectorStatus};
use crate::traits::Collector;

/// Wraps a concrete collector with everything source-independent:
/// suppression checks, duplicate skips, transactional saves, per-signal
/// error isolation, and the accounting counters.
pub struct CollectorRunner {
    store: SignalStore,
}

impl CollectorRunner {
    pub fn new(store: SignalStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, collector: &dyn Collector, ctx: &CollectContext) -> CollectorResult {
        let mut result = CollectorResult::new(collector.name(), ctx.dry_run);

        if let Err(e) = collector.open().await {
            result.status = CollectorStatus::Error;
            result.errors.push(format!("open failed: {e}"));
            return result;
        }

        let outcome = self.run_inner(collector, ctx, &mut result).await;

        if let Err(e) = collector.close().await {
            warn!(collector = collector.name(), error = %e, "Collector close failed");
        }

        if let Err(e) = outcome {
            result.status = match e {
                PipelineError::NotFound(_) => CollectorStatus::NotFound,
                PipelineError::Cancelled => {
                    result.cancelled = true;
                    CollectorStatus::PartialSuccess
                }
                other => {
                    result.errors.push(other.to_string());
                    CollectorStatus::Error
                }
            };
            return result;
        }

        result.status = if result.cancelled || !result.errors.is_empty() {
            CollectorStatus::PartialSuccess
        } else if ctx.dry_run {
            CollectorStatus::DryRun
        } else {
            CollectorStatus::Success
        };

        info!(
            collector = collector.name(),
            status = %result.status,
            found = result.signals_found,
            new = result.signals_new,
            suppressed = result.signals_suppressed,
            duplicate = result.signals_duplicate,
            "Collector run complete"
        );
        result
    }

    async fn run_inner(
        &self,
        collector: &dyn Collector,
        ctx: &CollectContext,
        result: &mut CollectorResult,
    ) -> dealsignal_common::error::Result<()> {
        let output = collector.fetch(ctx).await?;

        // Records the source yielded but the collector could not turn
        // into keyed signals. They count as found and as errors.
        for error in output.errors {
            result.signals_found += 1;
            result.errors.push(error);
        }

        for signal in output.signals {
            if ctx.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            // (a) Already in the CRM? Skip and count.
            match self.store.check_suppression(&signal.canonical_key).await {
                Ok(Some(_)) => {
                    result.signals_found += 1;
                    result.signals_suppressed += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => return Err(e), // store failure is fatal to the run
            }

            // (b) Already observed? Collector policy decides.
            if collector.skip_duplicates() {
                match self.store.is_duplicate(&signal.canonical_key).await {
                    Ok(true) => {
                        result.signals_duplicate += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => return Err(e),
                }
            }

            result.signals_found += 1;

            if ctx.dry_run {
                result.signals_new += 1;
                continue;
            }

            // (c) Persist. One bad record must not sink the batch.
            match self.store.save_signal(&signal).await {
                Ok((_, true)) => result.signals_new += 1,
                Ok((_, false)) => {
                    // Lost the race to an identical tuple; count as duplicate.
                    result.signals_found -= 1;
                    result.signals_duplicate += 1;
                }
                Err(e @ PipelineError::Database(_)) => return Err(e),
                Err(e) => {
                    result
                        .errors
                        .push(format!("{}: {e}", signal.canonical_key));
                }
            }
        }

        Ok(())
    }
}
