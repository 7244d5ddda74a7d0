pub mod guard;
pub mod model;
pub mod poller;
pub mod projection;
pub mod reconcile;
pub mod scheduler;
pub mod watch;

pub use poller::PollerHandle;
pub use watch::spawn_watcher;
