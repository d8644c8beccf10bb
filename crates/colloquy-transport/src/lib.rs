//! Request/response boundary to the conversation service.
//!
//! Defines the `ConversationTransport` async trait the controllers depend on,
//! an HTTP implementation speaking the service's REST API, and an in-memory
//! fake for tests and offline use.

pub mod error;
pub mod http;
pub mod mock;
pub mod transport;
pub mod wire;

pub use error::TransportError;
pub use http::HttpTransport;
pub use mock::{Endpoint, Gate, MockTransport, RecordedCall};
pub use transport::ConversationTransport;
