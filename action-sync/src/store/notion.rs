//! Typed Notion REST client backing [`ActionStore`].
//!
//! Property names come from [`PropertyNames`]; page JSON is decoded into the
//! shared record types here so nothing past this module sees Notion shapes.

use super::{ActionStore, StoreError};
use crate::config::{Config, PropertyNames};
use crate::markers::{self, ACTION_KEYWORD};
use action_sync_types::{Card, NewTrackingEntry, TrackingEntry};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;

/// Notion rejects rich text fragments longer than this
pub const MAX_TEXT_FRAGMENT_CHARS: usize = 2000;

/// Largest page the query endpoint returns
const QUERY_PAGE_SIZE: u32 = 100;

pub struct NotionStore {
    base_url: String,
    token: String,
    notion_version: String,
    kanban_db_id: String,
    action_items_db_id: String,
    props: PropertyNames,
    client: Client,
}

// ── Transport ───────────────────────────────────────

impl NotionStore {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.notion_token.clone(),
            notion_version: config.notion_version.clone(),
            kanban_db_id: config.kanban_db_id.clone(),
            action_items_db_id: config.action_items_db_id.clone(),
            props: config.properties.clone(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.notion_version)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, StoreError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // Notion error bodies look like {"object":"error","code":..,"message":..}
            let parsed: Option<Value> = serde_json::from_str(&body).ok();
            let field = |name: &str| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get(name))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            };
            return Err(StoreError::Api {
                status: status.as_u16(),
                code: field("code").unwrap_or_else(|| "unknown".to_string()),
                message: field("message").unwrap_or(body),
            });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("Invalid JSON: {}", e)))
    }

    /// Run a filtered database query, following pagination to the end
    pub async fn query_database(
        &self,
        database_id: &str,
        filter: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": filter,
                "page_size": QUERY_PAGE_SIZE,
            });
            if let Some(ref c) = cursor {
                body["start_cursor"] = json!(c);
            }

            let page = self
                .send(
                    self.request(Method::POST, &format!("databases/{}/query", database_id))
                        .json(&body),
                )
                .await?;

            match page.get("results").and_then(|r| r.as_array()) {
                Some(items) => results.extend(items.iter().cloned()),
                None => return Err(StoreError::Decode("query response has no results".to_string())),
            }

            let has_more = page.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false);
            cursor = page
                .get("next_cursor")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            if !has_more || cursor.is_none() {
                break;
            }
        }

        log::debug!("[NOTION] Query on {} returned {} pages", database_id, results.len());
        Ok(results)
    }

    pub async fn retrieve_page(&self, page_id: &str) -> Result<Value, StoreError> {
        self.send(self.request(Method::GET, &format!("pages/{}", page_id)))
            .await
    }

    pub async fn create_page(&self, database_id: &str, properties: Value) -> Result<Value, StoreError> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        self.send(self.request(Method::POST, "pages").json(&body))
            .await
    }

    pub async fn update_page(&self, page_id: &str, properties: Value) -> Result<Value, StoreError> {
        let body = json!({ "properties": properties });
        self.send(self.request(Method::PATCH, &format!("pages/{}", page_id)).json(&body))
            .await
    }
}

// ── ActionStore impl ────────────────────────────────

#[async_trait]
impl ActionStore for NotionStore {
    async fn list_candidate_cards(&self) -> Result<Vec<Card>, StoreError> {
        let filter = json!({
            "property": self.props.notes,
            "rich_text": { "contains": ACTION_KEYWORD },
        });
        let pages = self.query_database(&self.kanban_db_id, filter).await?;

        Ok(pages
            .iter()
            .filter_map(|page| {
                let card = decode_card(page, &self.props);
                if card.is_none() {
                    log::warn!("[NOTION] Skipping kanban page without an id");
                }
                card
            })
            .collect())
    }

    async fn read_notes(&self, card_id: &str) -> Result<String, StoreError> {
        let page = self.retrieve_page(card_id).await?;
        Ok(page_property(&page, &self.props.notes)
            .map(rich_text_content)
            .unwrap_or_default())
    }

    async fn list_action_titles(&self, card_id: &str) -> Result<Vec<String>, StoreError> {
        let filter = json!({
            "property": self.props.source_card,
            "relation": { "contains": card_id },
        });
        let pages = self.query_database(&self.action_items_db_id, filter).await?;

        Ok(pages
            .iter()
            .filter_map(|page| decode_tracking_entry(page, &self.props))
            .map(|entry| entry.title)
            .filter(|title| !title.is_empty())
            .collect())
    }

    async fn create_action_item(&self, entry: &NewTrackingEntry) -> Result<String, StoreError> {
        let properties = tracking_entry_properties(entry, &self.props);
        let page = self.create_page(&self.action_items_db_id, properties).await?;

        page.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Decode("created page has no id".to_string()))
    }

    async fn mark_processed(&self, card_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut properties = serde_json::Map::new();
        properties.insert(self.props.last_processed.clone(), date_property(at));
        self.update_page(card_id, Value::Object(properties)).await?;
        Ok(())
    }

    async fn list_completed_items(&self) -> Result<Vec<TrackingEntry>, StoreError> {
        let filter = json!({
            "property": self.props.status,
            "checkbox": { "equals": true },
        });
        let pages = self.query_database(&self.action_items_db_id, filter).await?;

        Ok(pages
            .iter()
            .filter_map(|page| decode_tracking_entry(page, &self.props))
            .collect())
    }

    /// Replaces the whole notes property with plain text fragments. Mentions,
    /// equations, links and inline formatting do not survive the write.
    async fn write_notes(&self, card_id: &str, notes: &str) -> Result<(), StoreError> {
        let mut properties = serde_json::Map::new();
        properties.insert(
            self.props.notes.clone(),
            json!({ "rich_text": text_fragments(notes) }),
        );
        self.update_page(card_id, Value::Object(properties)).await?;
        Ok(())
    }
}

// ── Decoding ────────────────────────────────────────

fn page_property<'a>(page: &'a Value, name: &str) -> Option<&'a Value> {
    page.get("properties").and_then(|p| p.get(name))
}

/// Concatenate the `text` fragments of a rich text or title property
pub fn rich_text_content(property: &Value) -> String {
    let fragments = property
        .get("rich_text")
        .or_else(|| property.get("title"))
        .and_then(|v| v.as_array());

    let Some(fragments) = fragments else {
        return String::new();
    };

    fragments
        .iter()
        .filter(|f| f.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|f| f.pointer("/text/content").and_then(|c| c.as_str()))
        .collect()
}

/// Read an instant from a date, last_edited_time or created_time property
fn property_instant(property: &Value) -> Option<DateTime<Utc>> {
    let raw = property
        .pointer("/date/start")
        .or_else(|| property.get("last_edited_time"))
        .or_else(|| property.get("created_time"))
        .and_then(|v| v.as_str())?;
    markers::parse_instant(raw)
}

pub fn decode_card(page: &Value, props: &PropertyNames) -> Option<Card> {
    let id = page.get("id").and_then(|v| v.as_str())?.to_string();

    let title = page_property(page, &props.card_title)
        .map(rich_text_content)
        .unwrap_or_default();

    // Fall back to the page's own edit time when the column is absent
    let last_edited = page_property(page, &props.last_edited)
        .and_then(property_instant)
        .or_else(|| {
            page.get("last_edited_time")
                .and_then(|v| v.as_str())
                .and_then(markers::parse_instant)
        });

    let last_processed = page_property(page, &props.last_processed).and_then(property_instant);

    Some(Card {
        id,
        title,
        last_edited,
        last_processed,
    })
}

pub fn decode_tracking_entry(page: &Value, props: &PropertyNames) -> Option<TrackingEntry> {
    let id = page.get("id").and_then(|v| v.as_str())?.to_string();

    let title = page_property(page, &props.action_item)
        .map(rich_text_content)
        .unwrap_or_default();

    let completed = page_property(page, &props.status)
        .and_then(|p| p.get("checkbox"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let source_card = page_property(page, &props.source_card)
        .and_then(|p| p.pointer("/relation/0/id"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let date_added = page_property(page, &props.date_added).and_then(property_instant);

    Some(TrackingEntry {
        id,
        title,
        completed,
        source_card,
        date_added,
    })
}

// ── Encoding ────────────────────────────────────────

/// Split text into rich text fragments no longer than the API allows
pub fn text_fragments(text: &str) -> Vec<Value> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == MAX_TEXT_FRAGMENT_CHARS {
            fragments.push(text_fragment(&current));
            current.clear();
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        fragments.push(text_fragment(&current));
    }

    fragments
}

fn text_fragment(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}

fn date_property(at: DateTime<Utc>) -> Value {
    json!({ "date": { "start": at.to_rfc3339_opts(SecondsFormat::Millis, true) } })
}

pub fn tracking_entry_properties(entry: &NewTrackingEntry, props: &PropertyNames) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        props.action_item.clone(),
        json!({ "title": text_fragments(&entry.title) }),
    );
    properties.insert(props.status.clone(), json!({ "checkbox": false }));
    properties.insert(
        props.source_card.clone(),
        json!({ "relation": [{ "id": entry.source_card }] }),
    );
    properties.insert(props.date_added.clone(), date_property(entry.date_added));
    Value::Object(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KANBAN: &str = "0123456789abcdef0123456789abcdef";
    const ACTIONS: &str = "fedcba9876543210fedcba9876543210";

    fn store_for(server: &MockServer) -> NotionStore {
        let mut config = Config::new("secret_token", KANBAN, ACTIONS).unwrap();
        config.api_url = server.uri();
        NotionStore::new(&config).unwrap()
    }

    fn card_page() -> Value {
        json!({
            "object": "page",
            "id": "card-1",
            "last_edited_time": "2024-03-01T09:00:00.000Z",
            "properties": {
                "Task Name": {
                    "type": "title",
                    "title": [{ "type": "text", "text": { "content": "Budget review" }, "plain_text": "Budget review" }]
                },
                "Notes": {
                    "type": "rich_text",
                    "rich_text": [
                        { "type": "text", "text": { "content": "Discuss budget. " } },
                        { "type": "mention", "mention": { "type": "user" }, "plain_text": "@Sam" },
                        { "type": "text", "text": { "content": "ACTION: Send report" } }
                    ]
                },
                "Last Edited Time": {
                    "type": "last_edited_time",
                    "last_edited_time": "2024-03-01T10:00:00.000Z"
                },
                "Last Processed": {
                    "type": "date",
                    "date": { "start": "2024-03-01T09:30:00.125Z", "end": null }
                }
            }
        })
    }

    #[test]
    fn test_rich_text_content_joins_text_fragments() {
        let page = card_page();
        let notes = page_property(&page, "Notes").map(rich_text_content).unwrap();
        assert_eq!(notes, "Discuss budget. ACTION: Send report");
    }

    #[test]
    fn test_decode_card() {
        let card = decode_card(&card_page(), &PropertyNames::default()).unwrap();
        assert_eq!(card.id, "card-1");
        assert_eq!(card.title, "Budget review");
        assert_eq!(
            card.last_edited,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        let processed = card.last_processed.unwrap();
        assert_eq!(processed.timestamp_subsec_millis(), 125);
    }

    #[test]
    fn test_decode_card_missing_properties() {
        let page = json!({
            "id": "card-2",
            "last_edited_time": "2024-03-01T09:00:00.000Z",
            "properties": {
                "Last Processed": { "type": "date", "date": null }
            }
        });
        let card = decode_card(&page, &PropertyNames::default()).unwrap();
        assert_eq!(card.title, "");
        assert_eq!(
            card.last_edited,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(card.last_processed, None);

        assert!(decode_card(&json!({ "properties": {} }), &PropertyNames::default()).is_none());
    }

    #[test]
    fn test_decode_tracking_entry() {
        let page = json!({
            "id": "item-1",
            "properties": {
                "Action Item": { "type": "title", "title": [{ "type": "text", "text": { "content": "Send report" } }] },
                "Status": { "type": "checkbox", "checkbox": true },
                "Source Card": { "type": "relation", "relation": [{ "id": "card-1" }] },
                "Date Added": { "type": "date", "date": { "start": "2024-03-01T10:05:00.000Z" } }
            }
        });
        let entry = decode_tracking_entry(&page, &PropertyNames::default()).unwrap();
        assert_eq!(entry.title, "Send report");
        assert!(entry.completed);
        assert_eq!(entry.source_card.as_deref(), Some("card-1"));
        assert!(entry.date_added.is_some());
    }

    #[test]
    fn test_decode_tracking_entry_without_relation() {
        let page = json!({
            "id": "item-2",
            "properties": {
                "Action Item": { "type": "title", "title": [] },
                "Source Card": { "type": "relation", "relation": [] }
            }
        });
        let entry = decode_tracking_entry(&page, &PropertyNames::default()).unwrap();
        assert_eq!(entry.title, "");
        assert!(!entry.completed);
        assert_eq!(entry.source_card, None);
    }

    #[test]
    fn test_decode_uses_custom_property_names() {
        let props = PropertyNames {
            action_item: "Task".to_string(),
            ..PropertyNames::default()
        };
        let page = json!({
            "id": "item-3",
            "properties": {
                "Task": { "type": "title", "title": [{ "type": "text", "text": { "content": "Call vendor" } }] }
            }
        });
        assert_eq!(decode_tracking_entry(&page, &props).unwrap().title, "Call vendor");
    }

    #[test]
    fn test_text_fragments_split_on_chars() {
        assert!(text_fragments("").is_empty());

        let long = "✅".repeat(MAX_TEXT_FRAGMENT_CHARS + 5);
        let fragments = text_fragments(&long);
        assert_eq!(fragments.len(), 2);
        let first = fragments[0].pointer("/text/content").and_then(|v| v.as_str()).unwrap();
        let second = fragments[1].pointer("/text/content").and_then(|v| v.as_str()).unwrap();
        assert_eq!(first.chars().count(), MAX_TEXT_FRAGMENT_CHARS);
        assert_eq!(second.chars().count(), 5);
    }

    #[test]
    fn test_tracking_entry_properties() {
        let entry = NewTrackingEntry {
            title: "Send report".to_string(),
            source_card: "card-1".to_string(),
            date_added: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        };
        let props = tracking_entry_properties(&entry, &PropertyNames::default());
        assert_eq!(props["Status"]["checkbox"], json!(false));
        assert_eq!(props["Source Card"]["relation"][0]["id"], json!("card-1"));
        assert_eq!(props["Action Item"]["title"][0]["text"]["content"], json!("Send report"));
        assert_eq!(props["Date Added"]["date"]["start"], json!("2024-03-01T10:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_query_follows_next_cursor() {
        let server = MockServer::start().await;
        let query_path = format!("/databases/{}/query", KANBAN);

        Mock::given(method("POST"))
            .and(path(query_path.as_str()))
            .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [{ "id": "card-2", "properties": {} }],
                "has_more": false,
                "next_cursor": null
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(query_path.as_str()))
            .and(bearer_token("secret_token"))
            .and(header("Notion-Version", crate::config::defaults::NOTION_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [card_page()],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cards = store_for(&server).list_candidate_cards().await.unwrap();
        let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["card-1", "card-2"]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let first: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert!(first.get("start_cursor").is_none());
        assert_eq!(second["start_cursor"], json!("cursor-2"));
        assert_eq!(second["filter"]["property"], json!("Notes"));
    }

    #[tokio::test]
    async fn test_api_error_body_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/card-9"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "object": "error",
                "status": 400,
                "code": "validation_error",
                "message": "body failed validation"
            })))
            .mount(&server)
            .await;

        let err = store_for(&server).read_notes("card-9").await.unwrap_err();
        match err {
            StoreError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "validation_error");
                assert_eq!(message, "body failed validation");
            }
            other => panic!("expected an API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_without_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/card-9"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = store_for(&server).read_notes("card-9").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Api { status: 502, ref code, ref message }
                if code == "unknown" && message == "Bad Gateway"
        ));
    }

    #[tokio::test]
    async fn test_write_notes_replaces_property_with_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/pages/card-1"))
            .and(body_partial_json(json!({
                "properties": {
                    "Notes": {
                        "rich_text": [
                            { "type": "text", "text": { "content": "✅ ACTION: Send report" } }
                        ]
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "card-1" })))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server)
            .write_notes("card-1", "✅ ACTION: Send report")
            .await
            .unwrap();
    }
}
