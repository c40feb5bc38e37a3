use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Signal taxonomy ---

/// Kind of event a collector observed. One signal row per observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Incorporation,
    FundingEvent,
    GithubSpike,
    DomainRegistration,
    PatentFiling,
    TrademarkFiling,
    ProductLaunch,
    HnMention,
    ResearchPaper,
    JobPosting,
    NewsMention,
    CompanyDissolved,
}

impl SignalType {
    pub const ALL: [SignalType; 12] = [
        SignalType::Incorporation,
        SignalType::FundingEvent,
        SignalType::GithubSpike,
        SignalType::DomainRegistration,
        SignalType::PatentFiling,
        SignalType::TrademarkFiling,
        SignalType::ProductLaunch,
        SignalType::HnMention,
        SignalType::ResearchPaper,
        SignalType::JobPosting,
        SignalType::NewsMention,
        SignalType::CompanyDissolved,
    ];

    /// Hard-kill types route the whole prospect to Reject no matter what
    /// other evidence exists.
    pub fn is_hard_kill(&self) -> bool {
        matches!(self, SignalType::CompanyDissolved)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Incorporation => write!(f, "incorporation"),
            SignalType::FundingEvent => write!(f, "funding_event"),
            SignalType::GithubSpike => write!(f, "github_spike"),
            SignalType::DomainRegistration => write!(f, "domain_registration"),
            SignalType::PatentFiling => write!(f, "patent_filing"),
            SignalType::TrademarkFiling => write!(f, "trademark_filing"),
            SignalType::ProductLaunch => write!(f, "product_launch"),
            SignalType::HnMention => write!(f, "hn_mention"),
            SignalType::ResearchPaper => write!(f, "research_paper"),
            SignalType::JobPosting => write!(f, "job_posting"),
            SignalType::NewsMention => write!(f, "news_mention"),
            SignalType::CompanyDissolved => write!(f, "company_dissolved"),
        }
    }
}

impl std::str::FromStr for SignalType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "incorporation" => Ok(Self::Incorporation),
            "funding_event" => Ok(Self::FundingEvent),
            "github_spike" => Ok(Self::GithubSpike),
            "domain_registration" => Ok(Self::DomainRegistration),
            "patent_filing" => Ok(Self::PatentFiling),
            "trademark_filing" => Ok(Self::TrademarkFiling),
            "product_launch" => Ok(Self::ProductLaunch),
            "hn_mention" => Ok(Self::HnMention),
            "research_paper" => Ok(Self::ResearchPaper),
            "job_posting" => Ok(Self::JobPosting),
            "news_mention" => Ok(Self::NewsMention),
            "company_dissolved" => Ok(Self::CompanyDissolved),
            other => Err(format!("unknown SignalType: {other}")),
        }
    }
}

// --- Signals ---

/// A signal as stored. Returned by all store read methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub signal_type: SignalType,
    pub source_api: String,
    pub canonical_key: String,
    pub company_name: Option<String>,
    /// The collector's own belief that this observation is about a real,
    /// investable company. 0.0–1.0.
    pub confidence: f64,
    /// Source-specific payload. Consumers must not assume fields beyond
    /// what the producing collector documents.
    pub raw_data: serde_json::Value,
    /// When the source says the event happened.
    pub detected_at: DateTime<Utc>,
    /// When we ingested it.
    pub created_at: DateTime<Utc>,
    pub source_url: Option<String>,
    pub source_response_hash: Option<String>,
}

/// A signal to be saved. The caller builds this; the store assigns id and
/// created_at.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub signal_type: SignalType,
    pub source_api: String,
    pub canonical_key: String,
    pub company_name: Option<String>,
    pub confidence: f64,
    pub raw_data: serde_json::Value,
    pub detected_at: DateTime<Utc>,
    pub source_url: Option<String>,
    pub source_response_hash: Option<String>,
    /// Collector-provided caution markers (e.g. "name_only_match").
    /// Each flag costs the prospect confidence at gate time.
    pub warning_flags: Vec<String>,
}

impl NewSignal {
    pub fn new(
        signal_type: SignalType,
        source_api: impl Into<String>,
        canonical_key: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signal_type,
            source_api: source_api.into(),
            canonical_key: canonical_key.into(),
            company_name: None,
            confidence: 0.5,
            raw_data: serde_json::Value::Null,
            detected_at,
            source_url: None,
            source_response_hash: None,
            warning_flags: Vec::new(),
        }
    }

    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_raw_data(mut self, raw_data: serde_json::Value) -> Self {
        self.raw_data = raw_data;
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_response_hash(mut self, hash: impl Into<String>) -> Self {
        self.source_response_hash = Some(hash.into());
        self
    }

    pub fn with_warning_flag(mut self, flag: impl Into<String>) -> Self {
        self.warning_flags.push(flag.into());
        self
    }
}

// --- Processing records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Pushed,
    Rejected,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Pushed => write!(f, "pushed"),
            ProcessingStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pushed" => Ok(Self::Pushed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown ProcessingStatus: {other}")),
        }
    }
}

/// One per signal, created atomically with it. Mutated exactly once, on
/// the push/reject decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub signal_id: i64,
    pub status: ProcessingStatus,
    pub crm_page_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Decision audit: confidence at decision time, decision kind, etc.
    pub metadata: serde_json::Value,
}

// --- Suppression cache ---

/// Local mirror of one CRM record, keyed by canonical key. Collectors and
/// the pusher consult this instead of the CRM on every signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub canonical_key: String,
    pub crm_page_id: String,
    pub status: String,
    pub company_name: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl SuppressionEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// --- Prospects ---

/// Aggregation of all signals sharing one canonical key. Ephemeral:
/// built by the pusher per batch, never stored.
#[derive(Debug, Clone)]
pub struct Prospect {
    pub canonical_key: String,
    pub signals: Vec<Signal>,
    pub signal_types: BTreeSet<SignalType>,
    pub source_apis: BTreeSet<String>,
    /// Shallow merge of every signal's raw_data; on key conflict the
    /// signal with the latest detected_at wins.
    pub merged_raw_data: serde_json::Value,
    pub earliest_detected_at: DateTime<Utc>,
    pub latest_detected_at: DateTime<Utc>,
    pub is_multi_source: bool,
}

impl Prospect {
    /// Build a prospect from a non-empty signal list sharing one key.
    /// Returns None on an empty list.
    pub fn from_signals(canonical_key: String, mut signals: Vec<Signal>) -> Option<Self> {
        if signals.is_empty() {
            return None;
        }
        signals.sort_by_key(|s| s.detected_at);

        let signal_types: BTreeSet<SignalType> = signals.iter().map(|s| s.signal_type).collect();
        let source_apis: BTreeSet<String> =
            signals.iter().map(|s| s.source_api.clone()).collect();

        let mut merged = serde_json::Map::new();
        for signal in &signals {
            if let serde_json::Value::Object(map) = &signal.raw_data {
                for (k, v) in map {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }

        let earliest = signals.first().map(|s| s.detected_at)?;
        let latest = signals.last().map(|s| s.detected_at)?;
        let is_multi_source = source_apis.len() >= 2;

        Some(Self {
            canonical_key,
            signals,
            signal_types,
            source_apis,
            merged_raw_data: serde_json::Value::Object(merged),
            earliest_detected_at: earliest,
            latest_detected_at: latest,
            is_multi_source,
        })
    }

    /// Company name from the most recent signal that has one.
    pub fn company_name(&self) -> Option<&str> {
        self.signals
            .iter()
            .rev()
            .find_map(|s| s.company_name.as_deref())
    }
}
