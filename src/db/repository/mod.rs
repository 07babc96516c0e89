pub mod feed_cache;
pub mod read_state;

pub use feed_cache::FeedCacheRepository;
pub use read_state::ReadStateRepository;
