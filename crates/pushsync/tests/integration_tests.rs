//! Integration tests for the pushsync crate
//!
//! These tests drive the whole push pipeline against a scripted in-process
//! mailbox: decode, cursor decision, pagination, classification, resolution,
//! MIME parsing, label filtering and attachment fetching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use base64::prelude::*;
use pushsync::gmail::api::{AttachmentBody, GmailMessage, HistoryRecord, HistoryResponse};
use pushsync::{
    ChangeKind, CursorCommit, CursorStore, InMemoryCursorStore, JsonFileCursorStore, MailboxApi, MessageId,
    MessageQuery, NotFoundError, PubSubMessage, PushPayload, PushSync, SqliteCursorStore, SyncOptions,
    UserCredentials,
};
use serde_json::json;
use tempfile::TempDir;

const MAILBOX: &str = "user@gmail.com";

/// Mailbox whose history is scripted per start cursor
///
/// `history[start]` is the list of pages returned for that start; pages
/// link to each other with tokens `"{start}-{n}"`. Only `MAILBOX` is served
/// unless more mailboxes are granted, and a granted mailbox answers its own
/// access token only.
#[derive(Default)]
struct ScriptedMailbox {
    history: HashMap<u64, Vec<Vec<HistoryRecord>>>,
    grants: HashMap<String, String>,
    messages: HashMap<String, GmailMessage>,
    attachments: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedMailbox {
    fn history(mut self, start: u64, pages: Vec<serde_json::Value>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| serde_json::from_value(page).unwrap())
            .collect();
        self.history.insert(start, pages);
        self
    }

    fn message(mut self, message: serde_json::Value) -> Self {
        let message: GmailMessage = serde_json::from_value(message).unwrap();
        self.messages.insert(message.id.clone(), message);
        self
    }

    fn attachment(mut self, attachment_id: &str, content: &[u8]) -> Self {
        self.attachments
            .insert(attachment_id.to_string(), BASE64_URL_SAFE_NO_PAD.encode(content));
        self
    }

    fn grant(mut self, mailbox_id: &str, access_token: &str) -> Self {
        self.grants
            .insert(mailbox_id.to_string(), access_token.to_string());
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn authorize(&self, credentials: &UserCredentials, mailbox_id: &str) -> Result<()> {
        match self.grants.get(mailbox_id) {
            Some(token) if *token == credentials.access_token => Ok(()),
            Some(_) => Err(anyhow!("403 Forbidden for {}", mailbox_id)),
            None => {
                assert_eq!(mailbox_id, MAILBOX);
                Ok(())
            }
        }
    }
}

impl MailboxApi for ScriptedMailbox {
    fn list_history(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        start: u64,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        self.authorize(credentials, mailbox_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(format!("history {} {}", start, page_token.unwrap_or("-")));

        let Some(pages) = self.history.get(&start) else {
            return Ok(HistoryResponse::default());
        };

        let index = match page_token {
            None => 0,
            Some(token) => token
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| anyhow!("bad token {}", token))?,
        };

        Ok(HistoryResponse {
            history: Some(pages[index].clone()),
            next_page_token: (index + 1 < pages.len()).then(|| format!("{}-{}", start, index + 1)),
            history_id: None,
        })
    }

    fn get_message(&self, credentials: &UserCredentials, mailbox_id: &str, id: &MessageId) -> Result<GmailMessage> {
        self.authorize(credentials, mailbox_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(format!("message {}", id.as_str()));
        self.messages
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| NotFoundError(id.as_str().to_string()).into())
    }

    fn get_attachment(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<AttachmentBody> {
        self.authorize(credentials, mailbox_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(format!("attachment {} {}", message_id.as_str(), attachment_id));
        let data = self
            .attachments
            .get(attachment_id)
            .ok_or_else(|| anyhow!("no attachment {}", attachment_id))?;
        Ok(serde_json::from_value(json!({"size": 3, "data": data}))?)
    }
}

fn b64(s: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(s)
}

fn credentials() -> UserCredentials {
    UserCredentials::bearer("ya29.test-token")
}

/// Push body as Pub/Sub delivers it
fn push(history_id: u64) -> PushPayload {
    push_for(MAILBOX, history_id)
}

fn push_for(mailbox_id: &str, history_id: u64) -> PushPayload {
    let data = BASE64_STANDARD.encode(json!({"emailAddress": mailbox_id, "historyId": history_id}).to_string());
    PushPayload::from_json(
        &json!({
            "message": {
                "data": data,
                "messageId": "2070443601311540",
                "message_id": "2070443601311540",
                "publishTime": "2021-02-26T19:13:55.749Z",
                "publish_time": "2021-02-26T19:13:55.749Z"
            },
            "subscription": "projects/demo/subscriptions/gmail-push"
        })
        .to_string(),
    )
    .unwrap()
}

fn added(id: &str, message_id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "messages": [{"id": message_id, "threadId": message_id}],
        "messagesAdded": [{"message": {"id": message_id, "threadId": message_id, "labelIds": ["INBOX"]}}]
    })
}

fn label_added(id: &str, message_id: &str, label: &str) -> serde_json::Value {
    json!({
        "id": id,
        "messages": [{"id": message_id, "threadId": message_id}],
        "labelsAdded": [{"message": {"id": message_id, "threadId": message_id}, "labelIds": [label]}]
    })
}

fn simple_message(id: &str, labels: &[&str], subject: &str) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": id,
        "labelIds": labels,
        "snippet": subject,
        "historyId": "1510000",
        "internalDate": "1692516045566",
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "From", "value": "Alice <alice@example.com>"},
                {"name": "To", "value": "user@gmail.com"},
                {"name": "Subject", "value": subject}
            ],
            "body": {"size": subject.len(), "data": b64(subject)}
        }
    })
}

fn mixed_message(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": id,
        "labelIds": ["INBOX", "UNREAD"],
        "payload": {
            "mimeType": "multipart/mixed",
            "headers": [
                {"name": "From", "value": "\"Billing\" <billing@example.com>"},
                {"name": "To", "value": "user@gmail.com, Other <other@example.com>"},
                {"name": "Cc", "value": "cc@example.com"},
                {"name": "Subject", "value": "Invoice"},
                {"name": "Date", "value": "Sun, 20 Aug 2023 07:20:45 +0000"}
            ],
            "parts": [
                {
                    "partId": "0",
                    "mimeType": "multipart/alternative",
                    "parts": [
                        {"partId": "0.0", "mimeType": "text/plain", "body": {"size": 5, "data": b64("hello")}},
                        {"partId": "0.1", "mimeType": "text/html", "body": {"size": 12, "data": b64("<p>hello</p>")}}
                    ]
                },
                {
                    "partId": "1",
                    "mimeType": "application/pdf",
                    "filename": "x.pdf",
                    "body": {"attachmentId": "att-pdf", "size": 100}
                }
            ]
        }
    })
}

fn pipeline(api: ScriptedMailbox, store: Arc<dyn CursorStore>, commit: CursorCommit) -> (PushSync, Arc<ScriptedMailbox>) {
    let api = Arc::new(api);
    let options = SyncOptions {
        commit,
        max_parallel_fetches: Some(4),
    };
    let sync = PushSync::new(api.clone(), store, options).unwrap();
    (sync, api)
}

#[test]
fn test_full_push_flow() {
    let api = ScriptedMailbox::default()
        .history(
            1000,
            vec![
                json!([added("1001", "m1"), label_added("1002", "m9", "STARRED")]),
                json!([added("1003", "m2")]),
            ],
        )
        .message(mixed_message("m1"))
        .message(simple_message("m2", &["INBOX"], "second"))
        .attachment("att-pdf", b"%PDF-1.4");
    let store = Arc::new(InMemoryCursorStore::new());
    let (sync, api) = pipeline(api, store.clone(), CursorCommit::BeforeFetch);

    // First push only establishes the baseline
    let baseline = sync.sync_push(&push(1000), &credentials(), &MessageQuery::default(), false).unwrap();
    assert!(!baseline.stats.skipped);

    let report = sync.sync_push(&push(1005), &credentials(), &MessageQuery::default(), true).unwrap();
    assert_eq!(report.stats.entries_fetched, 3);
    assert_eq!(report.stats.entries_kept, 2);
    assert_eq!(report.stats.messages_matched, 2);
    assert_eq!(report.stats.attachments_fetched, 1);
    assert_eq!(store.get(MAILBOX).unwrap().unwrap().history_id, 1005);

    let messages = report.messages;
    assert_eq!(messages[0].id.as_str(), "m1");
    assert_eq!(messages[1].id.as_str(), "m2");

    let invoice = &messages[0];
    assert_eq!(invoice.change_kind, Some(ChangeKind::MessageAdded));
    assert_eq!(invoice.headers.from.as_ref().unwrap().address, "billing@example.com");
    assert_eq!(invoice.headers.to.len(), 2);
    assert_eq!(invoice.headers.cc.len(), 1);
    assert_eq!(invoice.headers.subject.as_deref(), Some("Invoice"));
    assert_eq!(invoice.body_text.as_deref(), Some("hello"));
    assert_eq!(invoice.body_html.as_deref(), Some("<p>hello</p>"));
    assert_eq!(invoice.attachments.len(), 1);
    assert_eq!(invoice.attachments[0].filename, "x.pdf");
    assert_eq!(invoice.attachments[0].size_bytes, 100);
    assert_eq!(invoice.attachments[0].data.as_deref(), Some(&b"%PDF-1.4"[..]));

    // m9 was only labelled, so it is never fetched
    assert!(!api.requests().contains(&"message m9".to_string()));
}

#[test]
fn test_without_attachments_leaves_bytes_unfetched() {
    let api = ScriptedMailbox::default()
        .history(10, vec![json!([added("11", "m1")])])
        .message(mixed_message("m1"))
        .attachment("att-pdf", b"%PDF");
    let (sync, api) = pipeline(api, Arc::new(InMemoryCursorStore::new()), CursorCommit::BeforeFetch);

    sync.sync_push(&push(10), &credentials(), &MessageQuery::default(), false).unwrap();
    let messages = sync
        .get_messages_without_attachments(&push(12), &credentials(), &MessageQuery::default())
        .unwrap();

    assert_eq!(messages.len(), 1);
    assert!(messages[0].attachments[0].data.is_none());
    assert!(api.requests().iter().all(|r| !r.starts_with("attachment")));

    let bytes = sync
        .get_attachment(&credentials(), MAILBOX, &MessageId::new("m1"), "att-pdf")
        .unwrap();
    assert_eq!(bytes, b"%PDF");
}

#[test]
fn test_not_found_message_does_not_stop_the_push() {
    let api = ScriptedMailbox::default()
        .history(10, vec![json!([added("11", "gone"), added("12", "m2")])])
        .message(simple_message("m2", &["INBOX"], "still here"));
    let (sync, _) = pipeline(api, Arc::new(InMemoryCursorStore::new()), CursorCommit::BeforeFetch);

    sync.sync_push(&push(10), &credentials(), &MessageQuery::default(), false).unwrap();
    let report = sync.sync_push(&push(13), &credentials(), &MessageQuery::default(), false).unwrap();

    assert_eq!(report.stats.messages_resolved, 2);
    assert_eq!(report.stats.messages_not_found, 1);
    // The stub has no labels, so the label filter drops it
    let ids: Vec<_> = report.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m2"]);
}

#[test]
fn test_stale_push_is_a_no_op() {
    let api = ScriptedMailbox::default().history(50, vec![json!([added("51", "m1")])]);
    let store = Arc::new(InMemoryCursorStore::new());
    let (sync, api) = pipeline(api, store.clone(), CursorCommit::BeforeFetch);

    sync.sync_push(&push(50), &credentials(), &MessageQuery::default(), false).unwrap();
    let requests_before = api.requests().len();

    let report = sync.sync_push(&push(40), &credentials(), &MessageQuery::default(), false).unwrap();
    assert!(report.stats.skipped);
    assert!(report.messages.is_empty());
    assert_eq!(api.requests().len(), requests_before);
    assert_eq!(store.get(MAILBOX).unwrap().unwrap().history_id, 50);
}

#[test]
fn test_label_kinds_and_exclusions() {
    let api = ScriptedMailbox::default()
        .history(
            10,
            vec![json!([
                added("11", "m1"),
                label_added("12", "m2", "IMPORTANT"),
                added("13", "m3")
            ])],
        )
        .message(simple_message("m1", &["INBOX"], "one"))
        .message(simple_message("m2", &["INBOX", "IMPORTANT"], "two"))
        .message(simple_message("m3", &["INBOX", "SPAM"], "three"));
    let (sync, _) = pipeline(api, Arc::new(InMemoryCursorStore::new()), CursorCommit::AfterFetch);

    let query = MessageQuery::new()
        .without_labels(["SPAM"])
        .history_kinds([ChangeKind::MessageAdded, ChangeKind::LabelAdded]);

    sync.sync_push(&push(10), &credentials(), &query, false).unwrap();
    let messages = sync.get_messages_without_attachments(&push(14), &credentials(), &query).unwrap();

    let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(messages[1].change_kind, Some(ChangeKind::LabelAdded));
}

#[test]
fn test_pagination_across_pages() {
    let api = ScriptedMailbox::default().history(
        100,
        vec![
            json!([added("101", "m1"), added("102", "m2")]),
            json!([added("103", "m3"), added("104", "m4")]),
            json!([added("105", "m5")]),
        ],
    );
    let (sync, api) = pipeline(api, Arc::new(InMemoryCursorStore::new()), CursorCommit::BeforeFetch);

    let entries = sync.engine().fetch_delta_log(&credentials(), MAILBOX, 100).unwrap();
    let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "103", "104", "105"]);
    assert_eq!(
        api.requests(),
        vec!["history 100 -", "history 100 100-1", "history 100 100-2"]
    );
}

#[test]
fn test_two_mailboxes_with_their_own_credentials() {
    let alice = "alice@gmail.com";
    let bob = "bob@gmail.com";
    let api = ScriptedMailbox::default()
        .grant(alice, "token-alice")
        .grant(bob, "token-bob")
        .history(100, vec![json!([added("101", "a1")])])
        .history(500, vec![json!([added("501", "b1")])])
        .message(simple_message("a1", &["INBOX"], "for alice"))
        .message(simple_message("b1", &["INBOX"], "for bob"));
    let store = Arc::new(InMemoryCursorStore::new());
    let (sync, _) = pipeline(api, store.clone(), CursorCommit::AfterFetch);
    let alice_token = UserCredentials::bearer("token-alice");
    let bob_token = UserCredentials::bearer("token-bob");
    let query = MessageQuery::default();

    sync.sync_push(&push_for(alice, 100), &alice_token, &query, false).unwrap();
    sync.sync_push(&push_for(bob, 500), &bob_token, &query, false).unwrap();

    let for_alice = sync.get_messages_without_attachments(&push_for(alice, 110), &alice_token, &query).unwrap();
    let for_bob = sync.get_messages_without_attachments(&push_for(bob, 520), &bob_token, &query).unwrap();
    assert_eq!(for_alice[0].id.as_str(), "a1");
    assert_eq!(for_bob[0].id.as_str(), "b1");

    // The wrong mailbox's token is refused and the cursor stays put
    let err = sync
        .sync_push(&push_for(bob, 530), &alice_token, &query, false)
        .unwrap_err();
    assert!(err.to_string().contains("403"));
    assert_eq!(store.get(alice).unwrap().unwrap().history_id, 110);
    assert_eq!(store.get(bob).unwrap().unwrap().history_id, 520);
}

#[test]
fn test_cursor_survives_restart_with_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gmailpush_history.json");

    {
        let api = ScriptedMailbox::default();
        let store = Arc::new(JsonFileCursorStore::new(&path));
        let (sync, _) = pipeline(api, store, CursorCommit::BeforeFetch);
        sync.sync_push(&push(700), &credentials(), &MessageQuery::default(), false).unwrap();
    }

    let api = ScriptedMailbox::default()
        .history(700, vec![json!([added("701", "m1")])])
        .message(simple_message("m1", &["INBOX"], "after restart"));
    let store = Arc::new(JsonFileCursorStore::new(&path));
    let (sync, api) = pipeline(api, store, CursorCommit::BeforeFetch);

    let messages = sync.get_messages(&push(705), &credentials(), &MessageQuery::default()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(api.requests()[0], "history 700 -");

    let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!([{"emailAddress": MAILBOX, "prevHistoryId": 705}]));
}

#[test]
fn test_cursor_survives_restart_with_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cursors.test.sqlite");

    {
        let store = Arc::new(SqliteCursorStore::new(&path).unwrap());
        let (sync, _) = pipeline(ScriptedMailbox::default(), store, CursorCommit::AfterFetch);
        sync.sync_push(&push(300), &credentials(), &MessageQuery::default(), false).unwrap();
    }

    let store = Arc::new(SqliteCursorStore::new(&path).unwrap());
    let (sync, api) = pipeline(ScriptedMailbox::default(), store.clone(), CursorCommit::AfterFetch);
    sync.sync_push(&push(310), &credentials(), &MessageQuery::default(), false).unwrap();

    assert_eq!(api.requests(), vec!["history 300 -"]);
    assert_eq!(store.get(MAILBOX).unwrap().unwrap().history_id, 310);
}

#[test]
fn test_overlapping_labels_rejected_up_front() {
    let (sync, api) = pipeline(
        ScriptedMailbox::default(),
        Arc::new(InMemoryCursorStore::new()),
        CursorCommit::BeforeFetch,
    );
    let query = MessageQuery::new().with_labels(["INBOX"]).without_labels(["INBOX"]);

    let err = sync.get_messages(&push(1), &credentials(), &query).unwrap_err();
    assert!(err.downcast_ref::<pushsync::ConfigError>().is_some());
    assert!(api.requests().is_empty());
}

#[test]
fn test_push_without_wire_metadata() {
    let api = ScriptedMailbox::default();
    let (sync, _) = pipeline(api, Arc::new(InMemoryCursorStore::new()), CursorCommit::BeforeFetch);

    let data = BASE64_STANDARD.encode(format!(r#"{{"emailAddress":"{}","historyId":"42"}}"#, MAILBOX));
    let payload = PushPayload::new(PubSubMessage::new(data));
    let report = sync.sync_push(&payload, &credentials(), &MessageQuery::default(), false).unwrap();
    assert!(report.messages.is_empty());
    assert_eq!(sync.engine().commit(), CursorCommit::BeforeFetch);
}
