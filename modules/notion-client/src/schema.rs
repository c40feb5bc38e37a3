//! Schema preflight: compare the live pipeline database against the
//! property contract before any write is allowed.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use dealsignal_common::config::NotionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Title,
    Select,
    MultiSelect,
    RichText,
    Number,
    Url,
}

impl PropertyKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            PropertyKind::Title => "title",
            PropertyKind::Select => "select",
            PropertyKind::MultiSelect => "multi_select",
            PropertyKind::RichText => "rich_text",
            PropertyKind::Number => "number",
            PropertyKind::Url => "url",
        }
    }
}

/// What the pipeline database must look like. Routing status options come
/// from configuration so operator-specific enum spellings are honored.
#[derive(Debug, Clone)]
pub struct SchemaContract {
    pub required: Vec<(&'static str, PropertyKind)>,
    pub optional: Vec<(&'static str, PropertyKind)>,
    /// Options the Status select must carry.
    pub required_status_options: Vec<String>,
    /// Options the Investment Stage select must carry.
    pub required_stage_options: Vec<String>,
}

impl SchemaContract {
    pub fn for_config(config: &NotionConfig) -> Self {
        let mut status_options = vec![
            config.status_auto_push.clone(),
            config.status_needs_review.clone(),
        ];
        for terminal in &config.terminal_statuses {
            if !status_options.contains(terminal) {
                status_options.push(terminal.clone());
            }
        }

        Self {
            required: vec![
                ("Company Name", PropertyKind::Title),
                ("Status", PropertyKind::Select),
                ("Investment Stage", PropertyKind::Select),
                ("Discovery ID", PropertyKind::RichText),
                ("Canonical Key", PropertyKind::RichText),
                ("Confidence Score", PropertyKind::Number),
                ("Signal Types", PropertyKind::MultiSelect),
                ("Why Now", PropertyKind::RichText),
            ],
            optional: vec![("Website", PropertyKind::Url)],
            required_status_options: status_options,
            required_stage_options: vec![
                "Pre-Seed".to_string(),
                "Seed".to_string(),
                "Series A".to_string(),
            ],
        }
    }
}

/// The live database schema, as parsed from `GET /v1/databases/{id}`.
#[derive(Debug, Deserialize)]
pub struct DatabaseMeta {
    pub properties: HashMap<String, Value>,
}

impl DatabaseMeta {
    fn kind_of(&self, name: &str) -> Option<&str> {
        self.properties.get(name)?.get("type")?.as_str()
    }

    fn select_options(&self, name: &str) -> Vec<String> {
        let Some(prop) = self.properties.get(name) else {
            return Vec::new();
        };
        let Some(kind) = prop.get("type").and_then(|t| t.as_str()) else {
            return Vec::new();
        };
        prop.get(kind)
            .and_then(|v| v.get("options"))
            .and_then(|o| o.as_array())
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| o.get("name").and_then(|n| n.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Outcome of a preflight. Stringifies to a report an operator can read.
#[derive(Debug, Clone, Default)]
pub struct SchemaReport {
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
    /// (property, expected, actual)
    pub wrong_type: Vec<(String, String, String)>,
    /// (property, missing option)
    pub missing_options: Vec<(String, String)>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.missing_required.is_empty()
            && self.wrong_type.is_empty()
            && self.missing_options.is_empty()
    }
}

impl std::fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() && self.missing_optional.is_empty() {
            return write!(f, "schema OK");
        }
        if !self.missing_required.is_empty() {
            writeln!(f, "Missing required properties:")?;
            for name in &self.missing_required {
                writeln!(f, "  - {name}")?;
            }
        }
        if !self.wrong_type.is_empty() {
            writeln!(f, "Wrong property types:")?;
            for (name, expected, actual) in &self.wrong_type {
                writeln!(f, "  - {name}: expected {expected}, found {actual}")?;
            }
        }
        if !self.missing_options.is_empty() {
            writeln!(f, "Missing select options:")?;
            for (property, option) in &self.missing_options {
                writeln!(f, "  - {property}: \"{option}\"")?;
            }
        }
        if !self.missing_optional.is_empty() {
            writeln!(f, "Missing optional properties:")?;
            for name in &self.missing_optional {
                writeln!(f, "  - {name}")?;
            }
        }
        Ok(())
    }
}

/// Compare the live schema to the contract.
pub fn validate(meta: &DatabaseMeta, contract: &SchemaContract) -> SchemaReport {
    let mut report = SchemaReport::default();

    for (name, kind) in &contract.required {
        match meta.kind_of(name) {
            None => report.missing_required.push(name.to_string()),
            Some(actual) if actual != kind.wire_name() => report.wrong_type.push((
                name.to_string(),
                kind.wire_name().to_string(),
                actual.to_string(),
            )),
            Some(_) => {}
        }
    }

    for (name, kind) in &contract.optional {
        match meta.kind_of(name) {
            None => report.missing_optional.push(name.to_string()),
            Some(actual) if actual != kind.wire_name() => report.wrong_type.push((
                name.to_string(),
                kind.wire_name().to_string(),
                actual.to_string(),
            )),
            Some(_) => {}
        }
    }

    // Enum options only matter when the property exists with the right type.
    if meta.kind_of("Status") == Some("select") {
        let live = meta.select_options("Status");
        for option in &contract.required_status_options {
            if !live.contains(option) {
                report
                    .missing_options
                    .push(("Status".to_string(), option.clone()));
            }
        }
    }
    if meta.kind_of("Investment Stage") == Some("select") {
        let live = meta.select_options("Investment Stage");
        for option in &contract.required_stage_options {
            if !live.contains(option) {
                report
                    .missing_options
                    .push(("Investment Stage".to_string(), option.clone()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> SchemaContract {
        SchemaContract::for_config(&NotionConfig {
            api_key: "secret".into(),
            database_id: "db".into(),
            status_auto_push: "Source".into(),
            status_needs_review: "Review".into(),
            terminal_statuses: vec!["Passed".into(), "Lost".into()],
            schema_cache_ttl_hours: 6,
        })
    }

    fn full_schema() -> DatabaseMeta {
        serde_json::from_value(json!({
            "properties": {
                "Company Name": {"type": "title", "title": {}},
                "Status": {"type": "select", "select": {"options": [
                    {"name": "Source"}, {"name": "Review"}, {"name": "Dilligence"},
                    {"name": "Passed"}, {"name": "Lost"}
                ]}},
                "Investment Stage": {"type": "select", "select": {"options": [
                    {"name": "Pre-Seed"}, {"name": "Seed"}, {"name": "Series A"}
                ]}},
                "Discovery ID": {"type": "rich_text", "rich_text": {}},
                "Canonical Key": {"type": "rich_text", "rich_text": {}},
                "Confidence Score": {"type": "number", "number": {}},
                "Signal Types": {"type": "multi_select", "multi_select": {"options": []}},
                "Why Now": {"type": "rich_text", "rich_text": {}},
                "Website": {"type": "url", "url": {}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn complete_schema_is_valid() {
        let report = validate(&full_schema(), &contract());
        assert!(report.is_valid(), "unexpected report: {report}");
        assert_eq!(report.to_string(), "schema OK");
    }

    #[test]
    fn missing_required_property_fails() {
        let mut meta = full_schema();
        meta.properties.remove("Canonical Key");
        let report = validate(&meta, &contract());
        assert!(!report.is_valid());
        assert_eq!(report.missing_required, vec!["Canonical Key"]);
        assert!(report.to_string().contains("Canonical Key"));
    }

    #[test]
    fn wrong_type_fails() {
        let mut meta = full_schema();
        meta.properties.insert(
            "Confidence Score".to_string(),
            json!({"type": "rich_text", "rich_text": {}}),
        );
        let report = validate(&meta, &contract());
        assert!(!report.is_valid());
        assert_eq!(
            report.wrong_type,
            vec![("Confidence Score".to_string(), "number".to_string(), "rich_text".to_string())]
        );
    }

    #[test]
    fn missing_status_option_fails() {
        let mut meta = full_schema();
        meta.properties.insert(
            "Status".to_string(),
            json!({"type": "select", "select": {"options": [{"name": "Source"}]}}),
        );
        let report = validate(&meta, &contract());
        assert!(!report.is_valid());
        assert!(report
            .missing_options
            .contains(&("Status".to_string(), "Review".to_string())));
        assert!(report
            .missing_options
            .contains(&("Status".to_string(), "Passed".to_string())));
    }

    #[test]
    fn missing_optional_website_is_still_valid() {
        let mut meta = full_schema();
        meta.properties.remove("Website");
        let report = validate(&meta, &contract());
        assert!(report.is_valid());
        assert_eq!(report.missing_optional, vec!["Website"]);
    }

    #[test]
    fn operator_status_spellings_come_from_config() {
        // A CRM whose review status is historically misspelled validates
        // only when the configuration carries the same spelling.
        let misspelled = SchemaContract::for_config(&NotionConfig {
            api_key: "secret".into(),
            database_id: "db".into(),
            status_auto_push: "Source".into(),
            status_needs_review: "Dilligence".into(),
            terminal_statuses: vec!["Passed".into()],
            schema_cache_ttl_hours: 6,
        });
        let report = validate(&full_schema(), &misspelled);
        assert!(report.is_valid());
    }
}
