use async_trait::async_trait;

use dealsignal_common::error::Result;
use dealsignal_common::NewSignal;

use crate::context::CollectContext;

/// What one fetch pass produced: parseable candidates plus the records
/// that could not become signals (unparseable, no derivable key). The
/// framework counts the latter without aborting the batch.
#[derive(Debug, Default)]
pub struct FetchOutput {
    pub signals: Vec<NewSignal>,
    pub errors: Vec<String>,
}

impl FetchOutput {
    pub fn push_signal(&mut self, signal: NewSignal) {
        self.signals.push(signal);
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// Contract every source collector implements. The framework drives the
/// lifecycle: `open` once, `fetch` per run, `close` once.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable source name; becomes `source_api` on every emitted signal
    /// and keys the source's rate-limit bucket.
    fn name(&self) -> &'static str;

    /// Endpoint for the orchestrator's health probe, if the source has one.
    fn ping_url(&self) -> Option<&'static str> {
        None
    }

    /// Skip candidates whose canonical key already has stored signals.
    /// Event-stream sources keep this on; state-snapshot sources that can
    /// legitimately re-observe a company turn it off and rely on the
    /// store's tuple-level idempotence instead.
    fn skip_duplicates(&self) -> bool {
        true
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Pull the source and map its records into candidate signals.
    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
