//! Request/response boundary: chat collection, history pages and chat
//! mutations.

use std::{future::Future, time::Duration};

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header::RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use sync_core::{
    Chat, ChatCollection, ChatToggle, ChatUpdate, HistoryPage, HistoryRequest, NewChat, SyncError,
    SyncErrorCategory, classify_http_status,
};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Server calls that await one round trip. Every mutating call returns the
/// authoritative entity.
pub trait ChatApi: Send + Sync + 'static {
    fn fetch_chats(&self) -> impl Future<Output = Result<ChatCollection, SyncError>> + Send;

    /// One page of history, newest-first.
    fn fetch_history(
        &self,
        request: HistoryRequest,
    ) -> impl Future<Output = Result<HistoryPage, SyncError>> + Send;

    fn create_chat(&self, chat: NewChat) -> impl Future<Output = Result<Chat, SyncError>> + Send;

    fn update_chat(
        &self,
        chat_id: String,
        update: ChatUpdate,
    ) -> impl Future<Output = Result<Chat, SyncError>> + Send;

    fn set_chat_flag(
        &self,
        chat_id: String,
        toggle: ChatToggle,
        value: bool,
    ) -> impl Future<Output = Result<Chat, SyncError>> + Send;
}

#[derive(Debug, Serialize)]
struct FlagBody {
    value: bool,
}

/// JSON-over-HTTP implementation authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Config,
                "invalid_base_url",
                format!("{base_url}: {err}"),
            )
        })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                SyncError::new(
                    SyncErrorCategory::Config,
                    "http_client_build_error",
                    err.to_string(),
                )
            })?;
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Resolve path segments under the base URL. Each segment is
    /// percent-encoded on its own, so ids cannot add path levels or a query.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                SyncError::new(
                    SyncErrorCategory::Config,
                    "invalid_base_url",
                    format!("{} cannot carry a path", self.base_url),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, SyncError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(operation, response).await?;
        response.json::<T>().await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Serialization,
                "response_decode_error",
                format!("{operation}: {err}"),
            )
        })
    }
}

impl ChatApi for HttpChatApi {
    async fn fetch_chats(&self) -> Result<ChatCollection, SyncError> {
        let url = self.endpoint(&["chats"])?;
        self.execute("fetch_chats", self.client.get(url)).await
    }

    async fn fetch_history(&self, request: HistoryRequest) -> Result<HistoryPage, SyncError> {
        debug!(
            chat_id = %request.chat_id,
            limit = request.limit,
            before = ?request.before_message_id,
            "fetching history page"
        );
        let url = self.endpoint(&["chats", request.chat_id.as_str(), "messages"])?;
        let builder = self.client.get(url).query(&history_query(&request));
        self.execute("fetch_history", builder).await
    }

    async fn create_chat(&self, chat: NewChat) -> Result<Chat, SyncError> {
        let url = self.endpoint(&["chats"])?;
        let builder = self.client.post(url).json(&chat);
        self.execute("create_chat", builder).await
    }

    async fn update_chat(&self, chat_id: String, update: ChatUpdate) -> Result<Chat, SyncError> {
        let url = self.endpoint(&["chats", chat_id.as_str()])?;
        let builder = self.client.patch(url).json(&update);
        self.execute("update_chat", builder).await
    }

    async fn set_chat_flag(
        &self,
        chat_id: String,
        toggle: ChatToggle,
        value: bool,
    ) -> Result<Chat, SyncError> {
        let url = self.endpoint(&["chats", chat_id.as_str(), flag_segment(toggle)])?;
        let builder = self.client.post(url).json(&FlagBody { value });
        self.execute("set_chat_flag", builder).await
    }
}

fn history_query(request: &HistoryRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", request.limit.to_string())];
    if let Some(before) = &request.before_message_id {
        query.push(("before", before.clone()));
    }
    query
}

fn flag_segment(toggle: ChatToggle) -> &'static str {
    match toggle {
        ChatToggle::Pin => "pin",
        ChatToggle::Archive => "archive",
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(operation, status, retry_after_secs, &body))
}

fn status_error(
    operation: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> SyncError {
    let mut mapped = SyncError::new(
        classify_http_status(status.as_u16()),
        "http_status_error",
        format!("{operation} failed with {status}: {}", body.trim()),
    );
    if let Some(secs) = retry_after_secs {
        mapped = mapped.with_retry_after(Duration::from_secs(secs));
    }
    mapped
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        return SyncError::new(
            SyncErrorCategory::Config,
            "http_request_invalid",
            err.to_string(),
        );
    }
    let code = if err.is_timeout() {
        "http_timeout"
    } else {
        "http_request_failed"
    };
    SyncError::new(SyncErrorCategory::Network, code, err.to_string())
}
