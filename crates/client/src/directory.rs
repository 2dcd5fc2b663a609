//! Session resolution against the auth and chat REST services.
//!
//! The resolver turns a locally known username into a `SessionIdentity`
//! (numeric user id plus a conversation to continue) and optionally loads
//! the conversation's prior history. Any lookup failure collapses to `None`:
//! the caller aborts the connect attempt and waits for the next trigger.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use talentdesk_protocol::{ChatMessage, CreatedConversation, SessionIdentity, UserRecord};

use crate::ChatError;

/// Lookups the session resolver depends on
#[async_trait]
pub trait SessionDirectory: Send + Sync + 'static {
    async fn user_id(&self, username: &str) -> Result<i64, ChatError>;

    /// Conversation ids owned by the user, oldest first
    async fn conversation_ids(&self, user_id: i64) -> Result<Vec<String>, ChatError>;

    async fn create_conversation(&self, user_id: i64) -> Result<String, ChatError>;

    async fn history(
        &self,
        user_id: i64,
        conversation_id: &str,
    ) -> Result<Vec<ChatMessage>, ChatError>;
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub identity: SessionIdentity,
    /// Present only when history was requested
    pub history: Option<Vec<ChatMessage>>,
}

/// Resolve identity and conversation, loading history when asked.
///
/// History failures are not fatal: the session still connects with an
/// empty history.
pub async fn resolve_session(
    directory: &dyn SessionDirectory,
    username: &str,
    load_history: bool,
) -> Option<ResolvedSession> {
    let identity = match resolve_identity(directory, username).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(
                component = "directory",
                event = "directory.resolve.failed",
                username = %username,
                error = %e,
                "Could not resolve chat session identity"
            );
            return None;
        }
    };

    let history = if load_history {
        match directory
            .history(identity.user_id, &identity.conversation_id)
            .await
        {
            Ok(history) => Some(history),
            Err(e) => {
                warn!(
                    component = "directory",
                    event = "directory.history.failed",
                    user_id = identity.user_id,
                    conversation_id = %identity.conversation_id,
                    error = %e,
                    "Could not load conversation history"
                );
                Some(Vec::new())
            }
        }
    } else {
        None
    };

    Some(ResolvedSession { identity, history })
}

async fn resolve_identity(
    directory: &dyn SessionDirectory,
    username: &str,
) -> Result<SessionIdentity, ChatError> {
    let user_id = directory.user_id(username).await?;

    let existing = directory.conversation_ids(user_id).await?;
    let conversation_id = match existing.into_iter().last() {
        Some(id) => id,
        None => {
            let id = directory.create_conversation(user_id).await?;
            debug!(
                component = "directory",
                event = "directory.conversation.created",
                user_id,
                conversation_id = %id,
                "Created conversation"
            );
            id
        }
    };

    Ok(SessionIdentity {
        user_id,
        conversation_id,
    })
}

// ---------------------------------------------------------------------------
// HttpDirectory (reqwest)
// ---------------------------------------------------------------------------

/// REST implementation of [`SessionDirectory`]
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    http: Client,
    auth_url: String,
    chat_url: String,
    token: Option<String>,
}

impl HttpDirectory {
    pub fn new(auth_url: impl Into<String>, chat_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth_url: trim_base(auth_url.into()),
            chat_url: trim_base(chat_url.into()),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn conversations_url(&self, user_id: i64) -> String {
        format!("{}/users/{}/conversations", self.chat_url, user_id)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn ensure_success(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ChatError::Directory(format!(
            "{} returned {}",
            response.url().path(),
            status
        )))
    }
}

#[async_trait]
impl SessionDirectory for HttpDirectory {
    async fn user_id(&self, username: &str) -> Result<i64, ChatError> {
        let url = format!(
            "{}/users/username/{}",
            self.auth_url,
            urlencoding::encode(username)
        );
        let response = self.authorize(self.http.get(url)).send().await?;
        let record: UserRecord = ensure_success(response)?.json().await?;
        Ok(record.id)
    }

    async fn conversation_ids(&self, user_id: i64) -> Result<Vec<String>, ChatError> {
        let response = self
            .authorize(self.http.get(self.conversations_url(user_id)))
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }

    async fn create_conversation(&self, user_id: i64) -> Result<String, ChatError> {
        let response = self
            .authorize(self.http.post(self.conversations_url(user_id)))
            .send()
            .await?;
        let created: CreatedConversation = ensure_success(response)?.json().await?;
        Ok(created.conversation_id)
    }

    async fn history(
        &self,
        user_id: i64,
        conversation_id: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let url = format!(
            "{}/{}/messages",
            self.conversations_url(user_id),
            urlencoding::encode(conversation_id)
        );
        let response = self.authorize(self.http.get(url)).send().await?;
        Ok(ensure_success(response)?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDirectory;

    #[tokio::test]
    async fn reuses_most_recent_conversation() {
        let directory = FakeDirectory::new(7)
            .with_conversations(&["conv-old", "conv-new"])
            .with_history(vec![ChatMessage::user("earlier")]);

        let resolved = resolve_session(&directory, "alice", true)
            .await
            .expect("resolved");

        assert_eq!(resolved.identity.user_id, 7);
        assert_eq!(resolved.identity.conversation_id, "conv-new");
        assert_eq!(resolved.history, Some(vec![ChatMessage::user("earlier")]));
        assert_eq!(directory.created_count(), 0);
    }

    #[tokio::test]
    async fn creates_conversation_when_none_exist() {
        let directory = FakeDirectory::new(3);

        let resolved = resolve_session(&directory, "bob", false)
            .await
            .expect("resolved");

        assert_eq!(resolved.identity.conversation_id, "created-1");
        assert_eq!(resolved.history, None);
        assert_eq!(directory.created_count(), 1);
    }

    #[tokio::test]
    async fn unknown_user_yields_none() {
        let directory = FakeDirectory::failing();
        assert!(resolve_session(&directory, "ghost", true).await.is_none());
    }

    #[tokio::test]
    async fn history_failure_is_not_fatal() {
        let directory = FakeDirectory::new(5)
            .with_conversations(&["conv-1"])
            .with_failing_history();

        let resolved = resolve_session(&directory, "carol", true)
            .await
            .expect("resolved");

        assert_eq!(resolved.history, Some(Vec::new()));
    }

    #[test]
    fn http_directory_trims_trailing_slashes() {
        let directory = HttpDirectory::new("http://auth/", "http://chat//").with_token("");
        assert_eq!(directory.conversations_url(9), "http://chat/users/9/conversations");
        assert!(directory.token.is_none());
    }
}
