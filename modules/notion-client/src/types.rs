//! Wire types for the Notion API surface we use: database retrieval
//! (schema preflight), database query (suppression list, upsert lookup),
//! and page create/update.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// --- Requests ---

/// One prospect's write to the pipeline database. Field names here are
/// ours; property names on the wire come from the schema contract.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectPayload {
    pub discovery_id: String,
    pub canonical_key: String,
    pub company_name: String,
    /// Routing status. Must be one of the CRM's literal Status options.
    pub status: String,
    pub confidence: f64,
    pub signal_types: Vec<String>,
    pub why_now: String,
    pub stage_estimate: String,
    pub website: Option<String>,
}

impl ProspectPayload {
    /// Render as Notion page properties.
    pub fn to_properties(&self) -> Value {
        let mut properties = json!({
            "Company Name": {
                "title": [{"text": {"content": self.company_name}}]
            },
            "Status": {
                "select": {"name": self.status}
            },
            "Investment Stage": {
                "select": {"name": self.stage_estimate}
            },
            "Discovery ID": {
                "rich_text": [{"text": {"content": self.discovery_id}}]
            },
            "Canonical Key": {
                "rich_text": [{"text": {"content": self.canonical_key}}]
            },
            "Confidence Score": {
                "number": self.confidence
            },
            "Signal Types": {
                "multi_select": self.signal_types.iter()
                    .map(|t| json!({"name": t}))
                    .collect::<Vec<_>>()
            },
            "Why Now": {
                "rich_text": [{"text": {"content": self.why_now}}]
            }
        });
        if let Some(website) = &self.website {
            properties["Website"] = json!({"url": website});
        }
        properties
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
    /// The record's current CRM status is terminal; nothing was written.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub crm_page_id: String,
    pub action: UpsertAction,
}

// --- Responses ---

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Page>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub properties: Value,
}

impl Page {
    /// Plain text of a title property.
    pub fn title(&self, name: &str) -> Option<String> {
        let parts = self.properties.get(name)?.get("title")?.as_array()?;
        collect_plain_text(parts)
    }

    /// Plain text of a rich_text property.
    pub fn rich_text(&self, name: &str) -> Option<String> {
        let parts = self.properties.get(name)?.get("rich_text")?.as_array()?;
        collect_plain_text(parts)
    }

    /// Name of a select property's current option.
    pub fn select(&self, name: &str) -> Option<String> {
        self.properties
            .get(name)?
            .get("select")?
            .get("name")?
            .as_str()
            .map(String::from)
    }

    pub fn url(&self, name: &str) -> Option<String> {
        self.properties
            .get(name)?
            .get("url")?
            .as_str()
            .map(String::from)
    }
}

fn collect_plain_text(parts: &[Value]) -> Option<String> {
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("plain_text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// One active CRM record as seen by the suppression sync. The canonical
/// key is taken verbatim when the CRM exposes it; otherwise the sync
/// derives one from website/name/region.
#[derive(Debug, Clone)]
pub struct CrmRecord {
    pub crm_page_id: String,
    pub status: String,
    pub company_name: Option<String>,
    pub canonical_key: Option<String>,
    pub website: Option<String>,
    pub region: Option<String>,
}

impl CrmRecord {
    pub fn from_page(page: &Page) -> Self {
        Self {
            crm_page_id: page.id.clone(),
            status: page.select("Status").unwrap_or_default(),
            company_name: page.title("Company Name"),
            canonical_key: page.rich_text("Canonical Key").filter(|k| !k.is_empty()),
            website: page.url("Website"),
            region: page.select("Region").or_else(|| page.rich_text("Region")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        serde_json::from_value(json!({
            "id": "page-123",
            "properties": {
                "Company Name": {"title": [{"plain_text": "Acme "}, {"plain_text": "Robotics"}]},
                "Status": {"select": {"name": "Dilligence"}},
                "Canonical Key": {"rich_text": [{"plain_text": "domain:acme.ai"}]},
                "Website": {"url": "https://acme.ai"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn page_accessors_read_notion_shapes() {
        let page = sample_page();
        assert_eq!(page.title("Company Name").as_deref(), Some("Acme Robotics"));
        assert_eq!(page.select("Status").as_deref(), Some("Dilligence"));
        assert_eq!(page.rich_text("Canonical Key").as_deref(), Some("domain:acme.ai"));
        assert_eq!(page.url("Website").as_deref(), Some("https://acme.ai"));
        assert!(page.select("Investment Stage").is_none());
    }

    #[test]
    fn crm_record_prefers_explicit_canonical_key() {
        let record = CrmRecord::from_page(&sample_page());
        assert_eq!(record.canonical_key.as_deref(), Some("domain:acme.ai"));
        assert_eq!(record.status, "Dilligence");
        assert_eq!(record.website.as_deref(), Some("https://acme.ai"));
    }

    #[test]
    fn payload_renders_all_required_properties() {
        let payload = ProspectPayload {
            discovery_id: "ds-domain-acme.ai".into(),
            canonical_key: "domain:acme.ai".into(),
            company_name: "Acme Robotics".into(),
            status: "Source".into(),
            confidence: 0.82,
            signal_types: vec!["incorporation".into(), "github_spike".into()],
            why_now: "2 sources".into(),
            stage_estimate: "Pre-Seed".into(),
            website: Some("https://acme.ai".into()),
        };
        let properties = payload.to_properties();
        assert_eq!(
            properties["Company Name"]["title"][0]["text"]["content"],
            "Acme Robotics"
        );
        assert_eq!(properties["Status"]["select"]["name"], "Source");
        assert_eq!(properties["Confidence Score"]["number"], 0.82);
        assert_eq!(
            properties["Signal Types"]["multi_select"][1]["name"],
            "github_spike"
        );
        assert_eq!(properties["Website"]["url"], "https://acme.ai");
    }

    #[test]
    fn payload_without_website_omits_the_property() {
        let payload = ProspectPayload {
            discovery_id: "ds-1".into(),
            canonical_key: "name_loc:acme|london".into(),
            company_name: "Acme".into(),
            status: "Review".into(),
            confidence: 0.5,
            signal_types: vec![],
            why_now: String::new(),
            stage_estimate: "Seed".into(),
            website: None,
        };
        assert!(payload.to_properties().get("Website").is_none());
    }
}
