mod store;

pub use store::{Session, SessionStore, StoredMessage, DEFAULT_SESSION_NAME};
