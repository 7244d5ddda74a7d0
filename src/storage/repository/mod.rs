pub mod session_repo;

pub use session_repo::{SessionRepository, SessionUser, StoredSession};
