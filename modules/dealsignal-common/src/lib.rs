pub mod cancel;
pub mod canonical;
pub mod config;
pub mod error;
pub mod types;

pub use cancel::CancelFlag;
pub use canonical::{candidate_keys, primary_key, CanonicalKey, IdentityEvidence, KeyKind};
pub use config::Config;
pub use error::PipelineError;
pub use types::*;

/// Normalize a name into a slug: lowercase, strip non-alphanumeric
/// (keeping spaces), collapse whitespace, replace spaces with hyphens.
///
/// ```
/// assert_eq!(dealsignal_common::slugify("Acme Robotics Ltd."), "acme-robotics-ltd");
/// assert_eq!(dealsignal_common::slugify("  Acme   Robotics  "), "acme-robotics");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}

/// FNV-1a hash of a source response body, hex-encoded. Stored with each
/// signal for provenance so a re-fetch can be compared without keeping
/// the full body.
pub fn response_hash(content: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325; // FNV offset basis
    for byte in content.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3); // FNV prime
    }
    format!("{hash:016x}")
}
