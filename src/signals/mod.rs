pub mod model;

pub use model::{
    FeedItem, FeedKind, FeedPage, FeedQuery, Signal, SignalDraft, SignalStatus, SignalUpdate,
};
