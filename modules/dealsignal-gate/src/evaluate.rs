use chrono::{DateTime, Utc};

use dealsignal_common::{Signal, SignalType};

use crate::config::GateConfig;

/// Routing outcome for one prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Push to the CRM with the auto-push status.
    AutoPush,
    /// Push with the needs-review status.
    NeedsReview,
    /// Not enough evidence yet; signals stay Pending.
    Hold,
    /// Hard-kill evidence present; reject every signal.
    Reject,
}

/// One signal type's share of the score: the strongest post-decay signal
/// of that type, reliability-adjusted.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub signal_type: SignalType,
    pub weight: f64,
    pub strength: f64,
    pub source_api: String,
}

#[derive(Debug, Clone)]
pub struct GateVerdict {
    pub confidence: f64,
    pub decision: GateDecision,
    pub suggested_status: Option<String>,
    pub contributions: Vec<Contribution>,
    pub warning_flags: Vec<String>,
    pub multi_source: bool,
}

/// Score a company's signal list and decide its routing.
///
/// The confidence model, in order:
/// 1. per-signal strength = collector confidence x age decay x source tier;
/// 2. decay is `0.5^(age_days / half_life)` with per-type half-lives;
/// 3. at most one contribution per signal type (the strongest), so a
///    chatty collector cannot inflate the score by volume;
/// 4. contributions combine as a type-weighted mean;
/// 5. multi-source boost: x1.15 for two distinct APIs, x1.30 for three+;
/// 6. each collector warning flag subtracts 0.15;
/// 7. clamp to [0.0, 0.95]; never certain.
pub fn evaluate(
    canonical_key: &str,
    signals: &[Signal],
    now: DateTime<Utc>,
    config: &GateConfig,
) -> GateVerdict {
    if signals.is_empty() {
        return GateVerdict {
            confidence: 0.0,
            decision: GateDecision::Hold,
            suggested_status: None,
            contributions: Vec::new(),
            warning_flags: Vec::new(),
            multi_source: false,
        };
    }

    let hard_kill = signals.iter().any(|s| s.signal_type.is_hard_kill());

    // Strongest contribution per type.
    let mut contributions: Vec<Contribution> = Vec::new();
    for signal in signals {
        let weight = config.weight(signal.signal_type);
        if weight <= 0.0 {
            continue;
        }
        let age_days = (now - signal.detected_at).num_seconds().max(0) as f64 / 86_400.0;
        let decay = 0.5_f64.powf(age_days / config.half_life_days(signal.signal_type));
        let tier = config.tier_multiplier(config.tier(&signal.source_api));
        let strength = signal.confidence.clamp(0.0, 1.0) * decay * tier;

        match contributions
            .iter_mut()
            .find(|c| c.signal_type == signal.signal_type)
        {
            Some(existing) if existing.strength >= strength => {}
            Some(existing) => {
                existing.strength = strength;
                existing.source_api = signal.source_api.clone();
            }
            None => contributions.push(Contribution {
                signal_type: signal.signal_type,
                weight,
                strength,
                source_api: signal.source_api.clone(),
            }),
        }
    }

    let distinct_sources: std::collections::BTreeSet<&str> =
        signals.iter().map(|s| s.source_api.as_str()).collect();
    let multi_source = distinct_sources.len() >= 2;

    let warning_flags = collect_warning_flags(signals);

    let weight_total: f64 = contributions.iter().map(|c| c.weight).sum();
    let mut confidence = if weight_total > 0.0 {
        contributions
            .iter()
            .map(|c| c.weight * c.strength)
            .sum::<f64>()
            / weight_total
    } else {
        0.0
    };

    confidence *= match distinct_sources.len() {
        0 | 1 => 1.0,
        2 => 1.15,
        _ => 1.30,
    };
    confidence -= 0.15 * warning_flags.len() as f64;
    confidence = confidence.clamp(0.0, 0.95);

    let decision = if hard_kill {
        GateDecision::Reject
    } else if confidence >= config.high_threshold && (multi_source || !config.strict_mode) {
        // Weak identities (github slugs, name+region) need corroboration
        // before we are willing to auto-push on them.
        if !is_strong_key(canonical_key) && distinct_sources.len() < 2 {
            GateDecision::NeedsReview
        } else {
            GateDecision::AutoPush
        }
    } else if confidence >= config.medium_threshold {
        GateDecision::NeedsReview
    } else {
        GateDecision::Hold
    };

    let suggested_status = match decision {
        GateDecision::AutoPush => Some(config.auto_push_status.clone()),
        GateDecision::NeedsReview => Some(config.needs_review_status.clone()),
        GateDecision::Hold | GateDecision::Reject => None,
    };

    GateVerdict {
        confidence,
        decision,
        suggested_status,
        contributions,
        warning_flags,
        multi_source,
    }
}

fn is_strong_key(canonical_key: &str) -> bool {
    matches!(
        canonical_key.split(':').next().unwrap_or(""),
        "domain" | "companies_house" | "crunchbase" | "pitchbook"
    )
}

fn collect_warning_flags(signals: &[Signal]) -> Vec<String> {
    let mut flags: Vec<String> = Vec::new();
    for signal in signals {
        if let Some(arr) = signal
            .raw_data
            .get("warning_flags")
            .and_then(|v| v.as_array())
        {
            for flag in arr {
                if let Some(s) = flag.as_str() {
                    if !flags.iter().any(|f| f == s) {
                        flags.push(s.to_string());
                    }
                }
            }
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn signal(
        signal_type: SignalType,
        source: &str,
        confidence: f64,
        age_days: i64,
    ) -> Signal {
        Signal {
            id: 0,
            signal_type,
            source_api: source.to_string(),
            canonical_key: "domain:foo.io".to_string(),
            company_name: Some("Foo".to_string()),
            confidence,
            raw_data: json!({}),
            detected_at: Utc::now() - Duration::days(age_days),
            created_at: Utc::now(),
            source_url: None,
            source_response_hash: None,
        }
    }

    fn run(key: &str, signals: &[Signal]) -> GateVerdict {
        evaluate(key, signals, Utc::now(), &GateConfig::default())
    }

    #[test]
    fn empty_input_holds_at_zero() {
        let verdict = run("domain:foo.io", &[]);
        assert_eq!(verdict.decision, GateDecision::Hold);
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.suggested_status.is_none());
    }

    #[test]
    fn confidence_never_reaches_one() {
        // Pile on the strongest possible evidence from many sources.
        let signals: Vec<Signal> = [
            (SignalType::Incorporation, "companies_house"),
            (SignalType::FundingEvent, "sec_edgar"),
            (SignalType::PatentFiling, "uspto_patents"),
            (SignalType::TrademarkFiling, "uspto_trademarks"),
            (SignalType::GithubSpike, "github_trending"),
        ]
        .into_iter()
        .map(|(t, s)| signal(t, s, 1.0, 0))
        .collect();

        let verdict = run("domain:foo.io", &signals);
        assert!(verdict.confidence <= 0.95);
        assert!(verdict.confidence >= 0.90);
        assert_eq!(verdict.decision, GateDecision::AutoPush);
    }

    #[test]
    fn confidence_stays_in_bounds_across_a_grid() {
        for confidence in [0.0, 0.3, 0.7, 1.0] {
            for age in [0i64, 14, 180, 2000] {
                for flags in 0..4usize {
                    let mut s = signal(SignalType::HnMention, "hn_launches", confidence, age);
                    let flag_list: Vec<String> =
                        (0..flags).map(|i| format!("flag{i}")).collect();
                    s.raw_data = json!({ "warning_flags": flag_list });
                    let verdict = run("domain:foo.io", &[s]);
                    assert!(verdict.confidence >= 0.0);
                    assert!(verdict.confidence <= 0.95);
                }
            }
        }
    }

    #[test]
    fn hard_kill_dominates_any_evidence() {
        let signals = vec![
            signal(SignalType::Incorporation, "sec_edgar", 0.9, 1),
            signal(SignalType::CompanyDissolved, "companies_house", 1.0, 1),
        ];
        let verdict = run("domain:foo.io", &signals);
        assert_eq!(verdict.decision, GateDecision::Reject);
        assert!(verdict.suggested_status.is_none());
    }

    #[test]
    fn one_contribution_per_type_strongest_wins() {
        let signals = vec![
            signal(SignalType::GithubSpike, "github_trending", 0.3, 20),
            signal(SignalType::GithubSpike, "github_trending", 0.9, 1),
            signal(SignalType::GithubSpike, "github_trending", 0.5, 5),
        ];
        let verdict = run("domain:foo.io", &signals);
        assert_eq!(verdict.contributions.len(), 1);

        // The score equals what the single strongest signal alone yields.
        let solo = run(
            "domain:foo.io",
            &[signal(SignalType::GithubSpike, "github_trending", 0.9, 1)],
        );
        assert!((verdict.confidence - solo.confidence).abs() < 1e-9);
    }

    #[test]
    fn distinct_types_each_contribute_once() {
        let signals = vec![
            signal(SignalType::Incorporation, "companies_house", 0.8, 2),
            signal(SignalType::Incorporation, "companies_house", 0.6, 9),
            signal(SignalType::FundingEvent, "sec_edgar", 0.7, 3),
            signal(SignalType::HnMention, "hn_launches", 0.5, 1),
        ];
        let verdict = run("domain:foo.io", &signals);
        assert_eq!(verdict.contributions.len(), 3);
    }

    #[test]
    fn decay_is_exactly_half_at_one_half_life() {
        // github_spike half-life is 14 days; tier 2 source multiplies 0.85.
        let verdict = run(
            "domain:foo.io",
            &[signal(SignalType::GithubSpike, "github_trending", 1.0, 14)],
        );
        let strength = verdict.contributions[0].strength;
        assert!((strength - 1.0 * 0.5 * 0.85).abs() < 1e-6);
    }

    #[test]
    fn multi_source_auto_push_scenario() {
        // Two pending signals for one key: a fresh github spike and a
        // recent incorporation. Two distinct APIs corroborate.
        let signals = vec![
            signal(SignalType::GithubSpike, "github_trending", 0.7, 2),
            signal(SignalType::Incorporation, "companies_house", 0.9, 10),
        ];
        let verdict = run("domain:foo.io", &signals);
        assert!(verdict.multi_source);
        assert!(verdict.confidence >= 0.70, "got {}", verdict.confidence);
        assert_eq!(verdict.decision, GateDecision::AutoPush);
        assert_eq!(verdict.suggested_status.as_deref(), Some("Source"));
    }

    #[test]
    fn multi_source_boost_is_exactly_fifteen_then_thirty_percent() {
        // Same contributions, only the number of distinct APIs varies.
        // All three sources are tier 1, so strengths are identical.
        let one_source = run(
            "domain:foo.io",
            &[
                signal(SignalType::Incorporation, "companies_house", 0.5, 5),
                signal(SignalType::FundingEvent, "companies_house", 0.5, 5),
                signal(SignalType::PatentFiling, "companies_house", 0.5, 5),
            ],
        );
        let two_sources = run(
            "domain:foo.io",
            &[
                signal(SignalType::Incorporation, "companies_house", 0.5, 5),
                signal(SignalType::FundingEvent, "sec_edgar", 0.5, 5),
                signal(SignalType::PatentFiling, "companies_house", 0.5, 5),
            ],
        );
        let three_sources = run(
            "domain:foo.io",
            &[
                signal(SignalType::Incorporation, "companies_house", 0.5, 5),
                signal(SignalType::FundingEvent, "sec_edgar", 0.5, 5),
                signal(SignalType::PatentFiling, "uspto_patents", 0.5, 5),
            ],
        );
        assert!(!one_source.multi_source);
        assert!(two_sources.multi_source);
        assert!(
            (two_sources.confidence / one_source.confidence - 1.15).abs() < 1e-9
        );
        assert!(
            (three_sources.confidence / one_source.confidence - 1.30).abs() < 1e-9
        );
    }

    #[test]
    fn strict_mode_requires_corroboration_for_auto_push() {
        let signals = vec![signal(SignalType::Incorporation, "companies_house", 1.0, 0)];

        let relaxed = evaluate(
            "domain:foo.io",
            &signals,
            Utc::now(),
            &GateConfig::default(),
        );
        assert_eq!(relaxed.decision, GateDecision::AutoPush);

        let strict = evaluate(
            "domain:foo.io",
            &signals,
            Utc::now(),
            &GateConfig {
                strict_mode: true,
                ..GateConfig::default()
            },
        );
        assert_eq!(strict.decision, GateDecision::NeedsReview);
    }

    #[test]
    fn weak_key_without_corroboration_never_auto_pushes() {
        let signals = vec![signal(SignalType::Incorporation, "companies_house", 1.0, 0)];
        let verdict = run("github_org:foo-io", &signals);
        assert_eq!(verdict.decision, GateDecision::NeedsReview);

        // A second source unlocks auto-push for the same weak key.
        let corroborated = vec![
            signal(SignalType::Incorporation, "companies_house", 1.0, 0),
            signal(SignalType::GithubSpike, "github_trending", 0.9, 1),
        ];
        let verdict = run("github_org:foo-io", &corroborated);
        assert_eq!(verdict.decision, GateDecision::AutoPush);
    }

    #[test]
    fn warning_flags_cost_fifteen_points_each() {
        let clean = run(
            "domain:foo.io",
            &[signal(SignalType::Incorporation, "companies_house", 0.8, 1)],
        );
        let mut flagged_signal = signal(SignalType::Incorporation, "companies_house", 0.8, 1);
        flagged_signal.raw_data = json!({"warning_flags": ["name_only_match"]});
        let flagged = run("domain:foo.io", &[flagged_signal]);
        assert!((clean.confidence - flagged.confidence - 0.15).abs() < 1e-9);
        assert_eq!(flagged.warning_flags, vec!["name_only_match"]);
    }

    #[test]
    fn medium_confidence_needs_review_low_holds() {
        // A lone informational mention: medium band.
        let medium = run(
            "domain:foo.io",
            &[signal(SignalType::ProductLaunch, "product_hunt", 0.9, 1)],
        );
        assert_eq!(medium.decision, GateDecision::NeedsReview);
        assert_eq!(medium.suggested_status.as_deref(), Some("Review"));

        let low = run(
            "domain:foo.io",
            &[signal(SignalType::HnMention, "hn_launches", 0.4, 30)],
        );
        assert_eq!(low.decision, GateDecision::Hold);
        assert!(low.suggested_status.is_none());
    }
}
