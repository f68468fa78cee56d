pub mod batch_writer;
pub mod csv_import;
pub mod fetcher;
pub mod ingestor;
pub mod nba_stats;
pub mod payload;
pub mod rate_limiter;
pub mod resolver;
pub mod schedule;
pub mod source;

#[cfg(test)]
pub mod test_support;

pub use csv_import::{import_csv, CsvKind};
pub use fetcher::ResilientFetcher;
pub use ingestor::{IngestReport, Ingestor};
pub use nba_stats::NbaStatsClient;
pub use rate_limiter::RateLimiter;
