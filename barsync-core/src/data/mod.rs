//! Bar data: providers, CSV bar files, merging and on-disk storage

pub mod bar_file;
pub mod merge;
pub mod provider;
pub mod store;
pub mod tradingview;
pub mod yahoo;

pub use bar_file::{format_timestamp, parse_timestamp, read_bars, write_bars};
pub use merge::{group_by_month, merge_bars};
pub use provider::{
    DataError, DataProvider, DataSource, FetchProgress, FetchResult, TracingProgress,
    MAX_BARS_PER_REQUEST,
};
pub use store::{MergeReport, PartitionFailure, PartitionMode, PartitionUpdate, SeriesStore};
pub use tradingview::{Credentials, TradingViewOptions, TradingViewProvider};
pub use yahoo::YahooProvider;
