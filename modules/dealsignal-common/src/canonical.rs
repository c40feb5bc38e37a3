//! Canonical key derivation. Pure, deterministic, no I/O.
//!
//! A company seen through a trademark filing, a GitHub org and a Form D
//! must collapse to one identity even when no website is known. Each
//! collector hands over whatever partial evidence it extracted; this module
//! turns that into an ordered candidate list, strongest identifier first.

use url::Url;

use crate::error::PipelineError;
use crate::slugify;

/// Tagged kind of a canonical key, ranked. Lower rank = stronger identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyKind {
    Domain,
    CompaniesHouse,
    Crunchbase,
    Pitchbook,
    GithubOrg,
    GithubRepo,
    NameLoc,
}

impl KeyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            KeyKind::Domain => "domain",
            KeyKind::CompaniesHouse => "companies_house",
            KeyKind::Crunchbase => "crunchbase",
            KeyKind::Pitchbook => "pitchbook",
            KeyKind::GithubOrg => "github_org",
            KeyKind::GithubRepo => "github_repo",
            KeyKind::NameLoc => "name_loc",
        }
    }

    /// Strong keys may be merged across signals automatically. Weak keys
    /// need corroboration first (enforced by the gate, not here).
    pub fn is_strong(&self) -> bool {
        matches!(
            self,
            KeyKind::Domain | KeyKind::CompaniesHouse | KeyKind::Crunchbase | KeyKind::Pitchbook
        )
    }
}

/// A derived canonical key: `"<kind>:<normalized-value>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    pub kind: KeyKind,
    pub value: String,
}

impl CanonicalKey {
    pub fn is_strong(&self) -> bool {
        self.kind.is_strong()
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.tag(), self.value)
    }
}

/// Whatever identifiers a collector managed to extract for one company.
#[derive(Debug, Clone, Default)]
pub struct IdentityEvidence {
    pub website: Option<String>,
    pub github_org: Option<String>,
    pub github_repo: Option<String>,
    pub companies_house_number: Option<String>,
    pub crunchbase_id: Option<String>,
    pub pitchbook_id: Option<String>,
    pub company_name: Option<String>,
    pub region: Option<String>,
}

impl IdentityEvidence {
    pub fn from_website(website: impl Into<String>) -> Self {
        Self {
            website: Some(website.into()),
            ..Default::default()
        }
    }

    pub fn from_name_and_region(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            company_name: Some(name.into()),
            region: Some(region.into()),
            ..Default::default()
        }
    }
}

/// Derive the ordered, deduplicated candidate key list for one company,
/// strongest first. Fails only when the evidence bag yields nothing.
pub fn candidate_keys(evidence: &IdentityEvidence) -> Result<Vec<CanonicalKey>, PipelineError> {
    let mut keys: Vec<CanonicalKey> = Vec::new();

    let mut push = |kind: KeyKind, value: Option<String>| {
        if let Some(v) = value {
            let key = CanonicalKey { kind, value: v };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    };

    push(
        KeyKind::Domain,
        evidence.website.as_deref().and_then(registrable_domain),
    );
    push(
        KeyKind::CompaniesHouse,
        evidence
            .companies_house_number
            .as_deref()
            .and_then(normalize_opaque_id),
    );
    push(
        KeyKind::Crunchbase,
        evidence.crunchbase_id.as_deref().and_then(normalize_opaque_id),
    );
    push(
        KeyKind::Pitchbook,
        evidence.pitchbook_id.as_deref().and_then(normalize_opaque_id),
    );
    push(
        KeyKind::GithubOrg,
        evidence.github_org.as_deref().and_then(normalize_slug),
    );
    push(
        KeyKind::GithubRepo,
        evidence.github_repo.as_deref().and_then(normalize_repo),
    );
    push(KeyKind::NameLoc, name_loc_key(evidence));

    if keys.is_empty() {
        return Err(PipelineError::InsufficientEvidence);
    }
    Ok(keys)
}

/// The primary key is simply the strongest candidate.
pub fn primary_key(evidence: &IdentityEvidence) -> Result<CanonicalKey, PipelineError> {
    candidate_keys(evidence).map(|mut keys| keys.remove(0))
}

// --- Normalization helpers ---

/// Multi-part public suffixes we see in practice. Anything else is treated
/// as a single-label TLD when reducing to the registrable domain.
const MULTI_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "ltd.uk", "plc.uk",
    "com.au", "net.au", "org.au", "co.nz", "org.nz", "co.jp", "or.jp",
    "co.in", "com.br", "com.cn", "com.sg", "com.hk", "co.kr", "co.za",
];

/// Reduce a website to its registrable domain (eTLD+1), lowercase, with
/// scheme, `www.`, path, trailing dots and slashes stripped.
///
/// Returns None for values that can't identify anything (empty, single
/// character, bare TLDs, IPs are kept as-is minus normalization).
pub fn registrable_domain(website: &str) -> Option<String> {
    let trimmed = website.trim().trim_end_matches(['/', '.']);
    if trimmed.len() < 2 {
        return None;
    }

    // url::Url needs a scheme; add one for bare hosts.
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let host = Url::parse(&with_scheme).ok()?.host_str()?.to_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }

    // Registrable domain: one label in front of the public suffix.
    let take = if labels.len() >= 3 {
        let last_two = labels[labels.len() - 2..].join(".");
        if MULTI_PART_SUFFIXES.contains(&last_two.as_str()) {
            3
        } else {
            2
        }
    } else {
        2
    };

    let domain = labels[labels.len() - take..].join(".");
    if domain.len() < 2 {
        return None;
    }
    Some(domain)
}

fn normalize_opaque_id(id: &str) -> Option<String> {
    let normalized = id.trim().to_lowercase();
    if normalized.len() < 2 {
        return None;
    }
    Some(normalized)
}

fn normalize_slug(value: &str) -> Option<String> {
    let slug = slugify(value);
    if slug.len() < 2 {
        return None;
    }
    Some(slug)
}

/// `owner/repo`, both halves slugged.
fn normalize_repo(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('/');
    let (owner, repo) = trimmed.split_once('/')?;
    let owner = slugify(owner);
    let repo = slugify(repo);
    if owner.len() < 2 || repo.is_empty() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

fn name_loc_key(evidence: &IdentityEvidence) -> Option<String> {
    let name = slugify(evidence.company_name.as_deref()?);
    let region = slugify(evidence.region.as_deref()?);
    if name.len() < 2 || region.is_empty() {
        return None;
    }
    Some(format!("{name}|{region}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_normalization_strips_scheme_www_and_path() {
        assert_eq!(
            registrable_domain("https://www.acme.ai/about/"),
            Some("acme.ai".to_string())
        );
        assert_eq!(registrable_domain("ACME.AI."), Some("acme.ai".to_string()));
        assert_eq!(registrable_domain("http://acme.ai"), Some("acme.ai".to_string()));
    }

    #[test]
    fn domain_reduces_to_registrable() {
        assert_eq!(
            registrable_domain("https://app.acme.ai"),
            Some("acme.ai".to_string())
        );
        assert_eq!(
            registrable_domain("https://deep.app.acme.co.uk"),
            Some("acme.co.uk".to_string())
        );
    }

    #[test]
    fn domain_rejects_junk() {
        assert_eq!(registrable_domain(""), None);
        assert_eq!(registrable_domain("x"), None);
        assert_eq!(registrable_domain("localhost"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = registrable_domain("https://www.Acme.AI/").unwrap();
        let twice = registrable_domain(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn candidates_come_out_strongest_first() {
        let evidence = IdentityEvidence {
            website: Some("https://acme.ai".into()),
            github_org: Some("acme-ai".into()),
            companies_house_number: Some("12345678".into()),
            company_name: Some("Acme AI".into()),
            region: Some("London".into()),
            ..Default::default()
        };

        let keys = candidate_keys(&evidence).unwrap();
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "domain:acme.ai",
                "companies_house:12345678",
                "github_org:acme-ai",
                "name_loc:acme-ai|london",
            ]
        );
        assert!(keys[0].is_strong());
        assert!(!keys[2].is_strong());
    }

    #[test]
    fn github_repo_key_keeps_owner_and_repo() {
        let evidence = IdentityEvidence {
            github_repo: Some("Acme-AI/inference-engine".into()),
            ..Default::default()
        };
        let keys = candidate_keys(&evidence).unwrap();
        assert_eq!(keys[0].to_string(), "github_repo:acme-ai/inference-engine");
    }

    #[test]
    fn empty_bag_is_insufficient_evidence() {
        let err = candidate_keys(&IdentityEvidence::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientEvidence));
    }

    #[test]
    fn single_char_values_are_rejected() {
        let evidence = IdentityEvidence {
            website: Some("a".into()),
            crunchbase_id: Some("x".into()),
            ..Default::default()
        };
        assert!(candidate_keys(&evidence).is_err());
    }
}
