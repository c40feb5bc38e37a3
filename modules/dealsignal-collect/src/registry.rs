use std::env;

use tracing::warn;

use crate::collectors::{
    ArxivResearchCollector, CompaniesHouseCollector, DomainRegistryCollector,
    GithubTrendingCollector, HnLaunchesCollector, JobBoardsCollector, NewsFeedCollector,
    SecEdgarCollector, UsptoPatentsCollector, UsptoTrademarksCollector,
};
use crate::traits::Collector;

/// Every collector this build knows about. Source credentials come from
/// the environment; collectors that need one and don't have it fail at
/// `open()` with a configuration error rather than here.
pub fn registry() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(CompaniesHouseCollector::new(
            env::var("COMPANIES_HOUSE_API_KEY").ok(),
        )),
        Box::new(SecEdgarCollector::new()),
        Box::new(GithubTrendingCollector::new(env::var("GITHUB_TOKEN").ok())),
        Box::new(UsptoTrademarksCollector::new()),
        Box::new(UsptoPatentsCollector::new()),
        Box::new(DomainRegistryCollector::new()),
        Box::new(HnLaunchesCollector::new()),
        Box::new(ArxivResearchCollector::new()),
        Box::new(JobBoardsCollector::new()),
        Box::new(NewsFeedCollector::new()),
    ]
}

/// The registry filtered to the configured/requested names. Unknown names
/// are warned about and dropped, not fatal.
pub fn enabled_collectors(enabled: Option<&[String]>) -> Vec<Box<dyn Collector>> {
    let all = registry();
    let Some(enabled) = enabled else {
        return all;
    };

    for name in enabled {
        if !all.iter().any(|c| c.name() == name) {
            warn!(collector = %name, "Unknown collector name, skipping");
        }
    }
    all.into_iter()
        .filter(|c| enabled.iter().any(|name| name == c.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_ten_uniquely_named_collectors() {
        let all = registry();
        assert_eq!(all.len(), 10);
        let mut names: Vec<&str> = all.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn enabled_filter_keeps_only_requested() {
        let enabled = vec!["sec_edgar".to_string(), "nonexistent".to_string()];
        let filtered = enabled_collectors(Some(&enabled));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "sec_edgar");
    }
}
