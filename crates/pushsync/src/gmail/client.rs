//! Gmail API HTTP client
//!
//! Implements [`MailboxApi`] over the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;
use urlencoding::encode;

use super::api::{AttachmentBody, GmailMessage, HistoryResponse};
use super::{MailboxApi, UserCredentials};
use crate::error::{HistoryExpiredError, NotFoundError};
use crate::models::MessageId;

/// Gmail API client
///
/// Holds only the HTTP agent; each request is authorized with the
/// credentials passed to it, so one client serves any number of users.
pub struct GmailClient {
    agent: ureq::Agent,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Default per-request timeout
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new Gmail client
    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// URL of a resource under `users/{mailbox}`
    fn user_url(mailbox_id: &str, path: &str) -> String {
        format!("{}/users/{}/{}", Self::BASE_URL, encode(mailbox_id), path)
    }

    fn get(
        &self,
        credentials: &UserCredentials,
        url: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        self.agent
            .get(url)
            .header("Authorization", &credentials.authorization_header())
            .call()
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxApi for GmailClient {
    /// List history since a given historyId
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the history ID is too old (404 from Gmail)
    fn list_history(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        start_history_id: u64,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let mut url = Self::user_url(
            mailbox_id,
            &format!("history?startHistoryId={}", start_history_id),
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", encode(token)));
        }

        match self.get(credentials, &url) {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .context("Failed to parse history response"),
            Err(ureq::Error::StatusCode(404)) => Err(HistoryExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }

    fn get_message(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        id: &MessageId,
    ) -> Result<GmailMessage> {
        let url = Self::user_url(
            mailbox_id,
            &format!("messages/{}?format=full", encode(id.as_str())),
        );

        match self.get(credentials, &url) {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .with_context(|| format!("Failed to parse message {}", id.as_str())),
            Err(ureq::Error::StatusCode(404)) => {
                debug!("Message {} not found on server", id.as_str());
                Err(NotFoundError(id.as_str().to_string()).into())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to fetch message {}: {}",
                id.as_str(),
                e
            )),
        }
    }

    fn get_attachment(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<AttachmentBody> {
        let url = Self::user_url(
            mailbox_id,
            &format!(
                "messages/{}/attachments/{}",
                encode(message_id.as_str()),
                encode(attachment_id)
            ),
        );

        let mut response = self.get(credentials, &url).with_context(|| {
            format!(
                "Failed to fetch attachment {} of message {}",
                attachment_id,
                message_id.as_str()
            )
        })?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse attachment response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url_encodes_mailbox() {
        assert_eq!(
            GmailClient::user_url("user+tag@gmail.com", "history?startHistoryId=1"),
            "https://gmail.googleapis.com/gmail/v1/users/user%2Btag%40gmail.com/history?startHistoryId=1"
        );
    }
}
