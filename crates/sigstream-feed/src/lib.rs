//! Price streaming for sigstream.
//!
//! Consumes `price`/`ticker` and `kline` messages from the shared
//! connection, keeps the latest value per symbol in a `PriceBook`, and
//! hands consumers throttled snapshots through `PriceWatch`.

pub mod error;
pub mod parser;
pub mod price_book;
pub mod stream;

pub use error::{FeedError, FeedResult};
pub use parser::{parse_feed_message, FeedEvent};
pub use price_book::{PriceBook, PriceSnapshot};
pub use stream::{PriceStream, PriceStreamConfig, PriceWatch, StreamStats};
