use std::collections::HashMap;
use std::str::FromStr;

use dealsignal_common::config::GateSettings;
use dealsignal_common::SignalType;

/// Source reliability tiers. Authoritative registries count in full;
/// unverified chatter at half weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    /// Government / statutory registries.
    Authoritative,
    /// Reliable third-party data.
    Reliable,
    /// Informational feeds.
    Informational,
    /// Unverified or unknown sources.
    Unverified,
}

impl SourceTier {
    fn index(&self) -> usize {
        match self {
            SourceTier::Authoritative => 0,
            SourceTier::Reliable => 1,
            SourceTier::Informational => 2,
            SourceTier::Unverified => 3,
        }
    }
}

/// Everything the gate needs to score and route one prospect.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub high_threshold: f64,
    pub medium_threshold: f64,
    /// Require multi-source corroboration for AutoPush.
    pub strict_mode: bool,
    pub auto_push_status: String,
    pub needs_review_status: String,
    pub(crate) weights: HashMap<SignalType, f64>,
    pub(crate) half_life_days: HashMap<SignalType, f64>,
    pub(crate) tier_multipliers: [f64; 4],
    pub(crate) source_tiers: HashMap<String, SourceTier>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.70,
            medium_threshold: 0.40,
            strict_mode: false,
            auto_push_status: "Source".to_string(),
            needs_review_status: "Review".to_string(),
            weights: default_weights(),
            half_life_days: default_half_lives(),
            tier_multipliers: [1.00, 0.85, 0.70, 0.50],
            source_tiers: default_source_tiers(),
        }
    }
}

impl GateConfig {
    /// Build from loaded settings, applying any per-type overrides.
    pub fn from_settings(
        settings: &GateSettings,
        auto_push_status: impl Into<String>,
        needs_review_status: impl Into<String>,
    ) -> Self {
        let mut config = Self {
            high_threshold: settings.high_threshold,
            medium_threshold: settings.medium_threshold,
            strict_mode: settings.strict_mode,
            auto_push_status: auto_push_status.into(),
            needs_review_status: needs_review_status.into(),
            ..Self::default()
        };
        for (name, weight) in &settings.weight_overrides {
            if let Ok(signal_type) = SignalType::from_str(name) {
                config.weights.insert(signal_type, *weight);
            }
        }
        for (name, days) in &settings.half_life_overrides {
            if let Ok(signal_type) = SignalType::from_str(name) {
                config.half_life_days.insert(signal_type, *days);
            }
        }
        for (tier, multiplier) in &settings.tier_overrides {
            if let Ok(index) = tier.parse::<usize>() {
                if (1..=4).contains(&index) {
                    config.tier_multipliers[index - 1] = *multiplier;
                }
            }
        }
        config
    }

    pub fn weight(&self, signal_type: SignalType) -> f64 {
        self.weights.get(&signal_type).copied().unwrap_or(0.10)
    }

    pub fn half_life_days(&self, signal_type: SignalType) -> f64 {
        self.half_life_days
            .get(&signal_type)
            .copied()
            .unwrap_or(90.0)
    }

    pub fn tier(&self, source_api: &str) -> SourceTier {
        self.source_tiers
            .get(source_api)
            .copied()
            .unwrap_or(SourceTier::Unverified)
    }

    pub fn tier_multiplier(&self, tier: SourceTier) -> f64 {
        self.tier_multipliers[tier.index()]
    }
}

fn default_weights() -> HashMap<SignalType, f64> {
    HashMap::from([
        (SignalType::Incorporation, 0.25),
        (SignalType::FundingEvent, 0.20),
        (SignalType::GithubSpike, 0.20),
        (SignalType::DomainRegistration, 0.15),
        (SignalType::PatentFiling, 0.15),
        (SignalType::TrademarkFiling, 0.15),
        (SignalType::ProductLaunch, 0.15),
        (SignalType::HnMention, 0.10),
        (SignalType::ResearchPaper, 0.10),
        (SignalType::JobPosting, 0.10),
        (SignalType::NewsMention, 0.08),
        // Hard-kill: never scores, only vetoes.
        (SignalType::CompanyDissolved, 0.0),
    ])
}

fn default_half_lives() -> HashMap<SignalType, f64> {
    HashMap::from([
        (SignalType::Incorporation, 365.0),
        (SignalType::FundingEvent, 180.0),
        (SignalType::GithubSpike, 14.0),
        (SignalType::DomainRegistration, 90.0),
        (SignalType::PatentFiling, 365.0),
        (SignalType::TrademarkFiling, 365.0),
        (SignalType::ProductLaunch, 30.0),
        (SignalType::HnMention, 14.0),
        (SignalType::ResearchPaper, 180.0),
        (SignalType::JobPosting, 60.0),
        (SignalType::NewsMention, 30.0),
        (SignalType::CompanyDissolved, 3650.0),
    ])
}

fn default_source_tiers() -> HashMap<String, SourceTier> {
    HashMap::from([
        ("companies_house".to_string(), SourceTier::Authoritative),
        ("sec_edgar".to_string(), SourceTier::Authoritative),
        ("uspto_trademarks".to_string(), SourceTier::Authoritative),
        ("uspto_patents".to_string(), SourceTier::Authoritative),
        ("github_trending".to_string(), SourceTier::Reliable),
        ("domain_registry".to_string(), SourceTier::Reliable),
        ("arxiv_research".to_string(), SourceTier::Reliable),
        ("product_hunt".to_string(), SourceTier::Informational),
        ("job_boards".to_string(), SourceTier::Informational),
        ("news_feed".to_string(), SourceTier::Informational),
        ("hn_launches".to_string(), SourceTier::Unverified),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_defaults() {
        let settings = GateSettings {
            weight_overrides: HashMap::from([("incorporation".to_string(), 0.5)]),
            half_life_overrides: HashMap::from([("github_spike".to_string(), 7.0)]),
            tier_overrides: HashMap::from([("4".to_string(), 0.25)]),
            ..GateSettings::default()
        };
        let config = GateConfig::from_settings(&settings, "Source", "Review");
        assert_eq!(config.weight(SignalType::Incorporation), 0.5);
        assert_eq!(config.half_life_days(SignalType::GithubSpike), 7.0);
        assert_eq!(config.tier_multiplier(SourceTier::Unverified), 0.25);
        // Untouched defaults survive.
        assert_eq!(config.weight(SignalType::FundingEvent), 0.20);
    }

    #[test]
    fn unknown_sources_are_unverified() {
        let config = GateConfig::default();
        assert_eq!(config.tier("mystery_api"), SourceTier::Unverified);
        assert_eq!(config.tier("companies_house"), SourceTier::Authoritative);
    }
}
