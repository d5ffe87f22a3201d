pub mod chunked_fetcher;
pub mod scheduler;
pub mod state_manager;

pub use chunked_fetcher::{ChunkedFetcher, FetchOptions, FetchReport, RetryPolicy};
pub use scheduler::{RefreshAcceptance, RefreshScheduler};
pub use state_manager::{RefreshState, RefreshStateManager, StateStore};
