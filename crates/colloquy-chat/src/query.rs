//! Intelligence query controller.
//!
//! Every issued query gets a sequence number. A response is applied only if
//! its number is still the latest when it arrives; anything older is logged
//! and dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::debug;

use colloquy_core::events::{ClientEvent, ClientOperation};
use colloquy_core::types::{
    QueryRequest, QueryResult, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, MIN_QUERY_LIMIT,
};
use colloquy_transport::ConversationTransport;

use crate::error::ChatError;
use crate::notifier::Notifier;

/// What the query surface currently shows.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryState {
    /// Nothing asked yet, or cleared.
    Idle,
    /// The latest query is in flight. Any earlier result is no longer shown.
    Pending { sequence: u64 },
    Ready { sequence: u64, result: QueryResult },
    Failed { sequence: u64, message: String },
}

impl QueryState {
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Ready { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

struct Tracker {
    latest: u64,
    state: QueryState,
}

/// Runs natural-language questions about past conversations.
pub struct QueryController {
    transport: Arc<dyn ConversationTransport>,
    notifier: Arc<dyn Notifier>,
    default_limit: u32,
    tracker: Mutex<Tracker>,
}

impl QueryController {
    pub fn new(transport: Arc<dyn ConversationTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport,
            notifier,
            default_limit: DEFAULT_QUERY_LIMIT,
            tracker: Mutex::new(Tracker {
                latest: 0,
                state: QueryState::Idle,
            }),
        }
    }

    /// Limit applied to requests that do not set one.
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> QueryState {
        self.tracker().state.clone()
    }

    /// Sequence number of the most recently issued query.
    pub fn latest_sequence(&self) -> u64 {
        self.tracker().latest
    }

    /// Reset to idle. A query still in flight will be discarded on arrival.
    pub fn clear(&self) {
        let mut tracker = self.tracker();
        tracker.latest += 1;
        tracker.state = QueryState::Idle;
    }

    /// Ask a question about past conversations.
    ///
    /// Blank text or an out-of-range limit fails with
    /// [`ChatError::InvalidQuery`] before anything is sent. An empty result
    /// is a success. If another query is issued (or the surface cleared)
    /// before this one resolves, its response is discarded and
    /// [`ChatError::Superseded`] returned.
    pub async fn query(&self, mut request: QueryRequest) -> Result<QueryResult, ChatError> {
        if request.query.trim().is_empty() {
            return Err(ChatError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }
        let limit = request.limit.unwrap_or(self.default_limit);
        if !(MIN_QUERY_LIMIT..=MAX_QUERY_LIMIT).contains(&limit) {
            return Err(ChatError::InvalidQuery(format!(
                "limit must be between {} and {}, got {}",
                MIN_QUERY_LIMIT, MAX_QUERY_LIMIT, limit
            )));
        }
        request.limit = Some(limit);

        if let (Some(from), Some(to)) = (request.date_from, request.date_to) {
            if from > to {
                debug!(%from, %to, "Date range is inverted, submitting as given");
            }
        }

        let sequence = {
            let mut tracker = self.tracker();
            let sequence = tracker.latest + 1;
            tracker.latest = sequence;
            tracker.state = QueryState::Pending { sequence };
            sequence
        };
        debug!(sequence, query = %request.query, "Query issued");

        let outcome = self.transport.query_conversations(&request).await;

        let applied = {
            let mut tracker = self.tracker();
            if tracker.latest != sequence {
                false
            } else {
                tracker.state = match &outcome {
                    Ok(result) => QueryState::Ready {
                        sequence,
                        result: result.clone(),
                    },
                    Err(e) => QueryState::Failed {
                        sequence,
                        message: e.to_string(),
                    },
                };
                true
            }
        };

        if !applied {
            debug!(sequence, "Discarding stale query response");
            self.notifier
                .notify(&ClientEvent::QueryDiscarded { sequence });
            return Err(ChatError::Superseded);
        }

        match outcome {
            Ok(result) => {
                debug!(sequence, count = result.count(), "Query answered");
                self.notifier.notify(&ClientEvent::QueryAnswered {
                    sequence,
                    count: result.count(),
                });
                Ok(result)
            }
            Err(e) => {
                self.notifier.notify(&ClientEvent::OperationFailed {
                    operation: ClientOperation::Query,
                    message: e.to_string(),
                });
                Err(ChatError::Query(e))
            }
        }
    }
}

/// Parse a date bound typed by the user.
///
/// Accepts a calendar date (`2025-01-31`, taken as midnight UTC) or an
/// RFC 3339 timestamp with any offset, converted to UTC.
pub fn parse_date_bound(input: &str) -> Result<DateTime<Utc>, ChatError> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ChatError::InvalidQuery(format!(
                "unrecognized date '{}', expected YYYY-MM-DD or RFC 3339",
                input
            ))
        })
}
