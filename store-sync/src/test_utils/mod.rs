//! Scripted transport and ping directory for tests.

mod directory;
mod transport;

pub use directory::MockDirectory;
pub use transport::{content_topic_for, MockFailure, MockResource, MockTransport};
