pub mod arxiv_research;
pub mod companies_house;
pub mod domain_registry;
pub mod github_trending;
pub mod hn_launches;
pub mod job_boards;
pub mod news_feed;
pub mod sec_edgar;
pub mod uspto_patents;
pub mod uspto_trademarks;

pub use arxiv_research::ArxivResearchCollector;
pub use companies_house::CompaniesHouseCollector;
pub use domain_registry::DomainRegistryCollector;
pub use github_trending::GithubTrendingCollector;
pub use hn_launches::HnLaunchesCollector;
pub use job_boards::JobBoardsCollector;
pub use news_feed::NewsFeedCollector;
pub use sec_edgar::SecEdgarCollector;
pub use uspto_patents::UsptoPatentsCollector;
pub use uspto_trademarks::UsptoTrademarksCollector;
