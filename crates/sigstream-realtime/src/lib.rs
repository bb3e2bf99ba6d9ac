//! Realtime alerts for sigstream.
//!
//! Follows a Postgres change feed (Supabase Realtime) for the signal alerts
//! table:
//! - One filtered subscription per identity (`user_id=eq.<id>` or
//!   system-wide `user_id=is.null`)
//! - Row normalization into `RealtimeAlert`
//! - Bounded most-recent-first alert list, updates replaced in place
//! - New alerts republished on the in-process `AlertBus`

pub mod buffer;
pub mod bus;
pub mod change_feed;
pub mod config;
pub mod error;
pub mod normalize;
pub mod phoenix;
pub mod subscriber;
pub mod supabase;

pub use buffer::{AlertBuffer, DEFAULT_CAPACITY};
pub use bus::{AlertBus, AlertEvent, REALTIME_ALERT_EVENT};
pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeRequest, ChangeSender, ChangeSubscription,
    RowFilter,
};
pub use config::AlertConfig;
pub use error::{RealtimeError, RealtimeResult};
pub use normalize::normalize_row;
pub use subscriber::{AlertSubscriber, FeedHealth, SubscriberStats};
pub use supabase::{realtime_url, SupabaseChangeFeed, HEARTBEAT_INTERVAL};
