//! HTTP implementation of [`ConversationTransport`] over the service's REST API.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use colloquy_core::config::TransportConfig;
use colloquy_core::types::{
    Conversation, ConversationId, Exchange, ListFilter, QueryRequest, QueryResult,
};

use crate::error::TransportError;
use crate::transport::ConversationTransport;
use crate::wire::{
    ConversationBody, ConversationListBody, CreateConversationRequest, EndConversationRequest,
    Envelope, QueryBody, QueryConversationsRequest, SendMessageBody, SendMessageRequest,
};

/// Talks JSON to the conversation service under a base URL such as
/// `http://localhost:8000/api`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport with reqwest's default client settings.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a transport with the timeouts from configuration.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, TransportError> {
        // A trailing slash makes `Url::join` append instead of replacing the
        // last path segment.
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }

    /// Decode an enveloped response, mapping HTTP failures to transport errors.
    async fn read<T: DeserializeOwned>(
        response: Response,
        subject: &str,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(subject.to_string()));
        }

        if !status.is_success() {
            let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&bytes)
                .map(|envelope| envelope.failure_message())
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        envelope.into_body()
    }
}

#[async_trait]
impl ConversationTransport for HttpTransport {
    async fn list_conversations(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<Conversation>, TransportError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = filter.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(ref search) = filter.search {
            params.push(("search", search.clone()));
        }

        debug!(?filter, "Listing conversations");
        let response = self
            .client
            .get(self.endpoint("conversations/")?)
            .query(&params)
            .send()
            .await?;
        let body: ConversationListBody = Self::read(response, "conversations").await?;
        Ok(body.into_conversations())
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, TransportError> {
        debug!(conversation_id = %id, "Fetching conversation");
        let response = self
            .client
            .get(self.endpoint(&format!("conversations/{}/", id))?)
            .send()
            .await?;
        let body: ConversationBody =
            Self::read(response, &format!("conversation {}", id)).await?;
        body.into_conversation()
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, TransportError> {
        let request = CreateConversationRequest {
            title: title.unwrap_or(""),
        };
        let response = self
            .client
            .post(self.endpoint("conversations/")?)
            .json(&request)
            .send()
            .await?;
        let body: ConversationBody = Self::read(response, "conversations").await?;
        body.into_conversation()
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Exchange, TransportError> {
        let request = SendMessageRequest {
            conversation_id: conversation_id.0,
            message: text,
        };
        let response = self
            .client
            .post(self.endpoint("conversations/send_message/")?)
            .json(&request)
            .send()
            .await?;
        let body: SendMessageBody =
            Self::read(response, &format!("conversation {}", conversation_id)).await?;
        body.into_exchange()
    }

    async fn end_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, TransportError> {
        let request = EndConversationRequest {
            conversation_id: conversation_id.0,
        };
        let response = self
            .client
            .post(self.endpoint("conversations/end_conversation/")?)
            .json(&request)
            .send()
            .await?;
        let body: ConversationBody =
            Self::read(response, &format!("conversation {}", conversation_id)).await?;
        body.into_conversation()
    }

    async fn query_conversations(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult, TransportError> {
        let body = QueryConversationsRequest::from(request);
        let response = self
            .client
            .post(self.endpoint("conversations/query_conversations/")?)
            .json(&body)
            .send()
            .await?;
        let body: QueryBody = Self::read(response, "query").await?;
        Ok(body.into_result())
    }
}
