use futures::stream::{self, StreamExt};
use serde::Serialize;

use dealsignal_collect::registry;
use dealsignal_common::CancelFlag;
use dealsignal_http::RateLimitedClient;
use dealsignal_store::SignalStore;
use notion_client::NotionClient;

use crate::exit::ExitCode;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub store_ok: bool,
    pub sources: Vec<SourceHealth>,
    /// None when the deployment has no CRM configured.
    pub schema: Option<SchemaHealth>,
}

#[derive(Debug, Serialize)]
pub struct SourceHealth {
    pub name: String,
    pub reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct SchemaHealth {
    pub valid: bool,
    pub report: String,
}

impl HealthReport {
    pub fn exit_code(&self) -> ExitCode {
        if !self.store_ok {
            return ExitCode::StoreError;
        }
        if let Some(schema) = &self.schema {
            if !schema.valid {
                return ExitCode::SchemaInvalid;
            }
        }
        if self.sources.iter().any(|s| !s.reachable) {
            return ExitCode::PartialFailure;
        }
        ExitCode::Success
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Health ===")?;
        writeln!(f, "Store:  {}", if self.store_ok { "ok" } else { "FAILED" })?;
        for source in &self.sources {
            writeln!(
                f,
                "Source: {:<18} {}",
                source.name,
                if source.reachable { "ok" } else { "unreachable" }
            )?;
        }
        match &self.schema {
            Some(schema) if schema.valid => writeln!(f, "Schema: ok")?,
            Some(schema) => {
                writeln!(f, "Schema: INVALID")?;
                writeln!(f, "{}", schema.report)?;
            }
            None => writeln!(f, "Schema: (no CRM configured)")?,
        }
        Ok(())
    }
}

/// Probe store connectivity, every source's ping endpoint, and the CRM
/// schema. Probes run concurrently; none of them mutates anything.
pub async fn run_checks(
    store: &SignalStore,
    http: &RateLimitedClient,
    notion: Option<&NotionClient>,
    cancel: &CancelFlag,
) -> HealthReport {
    let store_ok = store.ping().await.is_ok();

    let collectors = registry();
    let sources: Vec<SourceHealth> = stream::iter(collectors.iter())
        .map(|collector| async move {
            let reachable = match collector.ping_url() {
                Some(url) => http
                    .head_ok(collector.name(), cancel, url)
                    .await
                    .unwrap_or(false),
                None => true,
            };
            SourceHealth {
                name: collector.name().to_string(),
                reachable,
            }
        })
        .buffer_unordered(8)
        .collect()
        .await;

    let schema = match notion {
        Some(client) => match client.validate_schema(true, cancel).await {
            Ok(report) => Some(SchemaHealth {
                valid: report.is_valid(),
                report: report.to_string(),
            }),
            Err(e) => Some(SchemaHealth {
                valid: false,
                report: format!("schema check failed: {e}"),
            }),
        },
        None => None,
    };

    HealthReport {
        store_ok,
        sources,
        schema,
    }
}
