//! Conversation session and intelligence query controllers.
//!
//! The [`SessionController`] owns the client's view of conversations and
//! applies optimistic message updates that are reconciled against the
//! service. The [`QueryController`] runs questions about past conversations
//! and suppresses responses that arrive for superseded queries.

pub mod error;
pub mod notifier;
pub mod query;
pub mod session;
pub mod store;

pub use error::ChatError;
pub use notifier::{Notifier, RecordingNotifier, TracingNotifier};
pub use query::{parse_date_bound, QueryController, QueryState};
pub use session::SessionController;
pub use store::{MessageEntry, ProvisionalMessage, SessionStore};
