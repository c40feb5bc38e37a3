//! Deterministic test doubles for the framework: no network, no real
//! sources, `cargo test` in seconds.

use std::sync::Mutex;

use async_trait::async_trait;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::NewSignal;

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

/// A collector scripted with fixed output per fetch call. Calls past the
/// end of the script replay the last batch (rerun scenarios).
pub struct MockCollector {
    name: &'static str,
    batches: Mutex<Vec<ScriptedBatch>>,
    skip_duplicates: bool,
    fail_open: bool,
}

pub struct ScriptedBatch {
    pub signals: Vec<NewSignal>,
    pub errors: Vec<String>,
}

impl MockCollector {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            batches: Mutex::new(Vec::new()),
            skip_duplicates: true,
            fail_open: false,
        }
    }

    pub fn with_batch(self, signals: Vec<NewSignal>) -> Self {
        self.with_batch_and_errors(signals, Vec::new())
    }

    pub fn with_batch_and_errors(self, signals: Vec<NewSignal>, errors: Vec<String>) -> Self {
        self.batches
            .lock()
            .unwrap()
            .push(ScriptedBatch { signals, errors });
        self
    }

    pub fn with_skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[async_trait]
impl Collector for MockCollector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn skip_duplicates(&self) -> bool {
        self.skip_duplicates
    }

    async fn open(&self) -> Result<()> {
        if self.fail_open {
            return Err(PipelineError::Config("mock open failure".into()));
        }
        Ok(())
    }

    async fn fetch(&self, _ctx: &CollectContext) -> Result<FetchOutput> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            return Ok(FetchOutput::default());
        }
        let batch = if batches.len() > 1 {
            batches.remove(0)
        } else {
            let last = &batches[0];
            ScriptedBatch {
                signals: last.signals.clone(),
                errors: last.errors.clone(),
            }
        };
        Ok(FetchOutput {
            signals: batch.signals,
            errors: batch.errors,
        })
    }
}
