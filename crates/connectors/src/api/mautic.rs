use super::{PageFetcher, PagedExtractor, since_timestamp};
use crate::http::{HttpRequest, HttpTransport, client::ApiClient};
use async_trait::async_trait;
use chrono::Duration;
use engine_config::settings::{MauticSettings, require};
use engine_core::{
    error::{ConfigError, ExtractError},
    source::{ExtractRequest, Extractor, Source},
};
use model::{
    core::{data_type::DataType, value::Value},
    cursor::marker::Marker,
    records::record::Record,
    source::descriptor::{
        CursorStrategy, ExtractionKind, ResourceDescriptor, SourceDescriptor, WriteDisposition,
    },
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const SOURCE_NAME: &str = "mautic";
const PAGE_SIZE: u64 = 100;
const CONTACT_LOOKBACK_DAYS: i64 = 30;

pub struct MauticSource {
    descriptor: SourceDescriptor,
    settings: MauticSettings,
    transport: Arc<dyn HttpTransport>,
}

impl MauticSource {
    pub fn new(settings: MauticSettings, transport: Arc<dyn HttpTransport>) -> Self {
        let contacts = ResourceDescriptor::new("contacts", ExtractionKind::ApiPaginated)
            .table("mautic_contacts")
            .primary_key(&["id"])
            .disposition(WriteDisposition::Merge)
            .cursor(CursorStrategy::row("dateModified", Value::Null))
            .column("id", DataType::BigInt)
            .column("dateModified", DataType::Timestamp)
            .column("fields", DataType::Json);

        let entity = |name: &str| {
            ResourceDescriptor::new(name, ExtractionKind::ApiPaginated)
                .table(&format!("mautic_{name}"))
                .primary_key(&["id"])
                .disposition(WriteDisposition::Merge)
                .column("id", DataType::BigInt)
        };

        MauticSource {
            descriptor: SourceDescriptor::new(
                SOURCE_NAME,
                vec![contacts, entity("emails"), entity("campaigns")],
            ),
            settings,
            transport,
        }
    }
}

impl Source for MauticSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let base_url = require(&self.settings.base_url, SOURCE_NAME, "MAUTIC_BASE_URL")?;
        let client_id = require(&self.settings.client_id, SOURCE_NAME, "MAUTIC_CLIENT_ID")?;
        let client_secret = require(&self.settings.client_secret, SOURCE_NAME, "MAUTIC_CLIENT_SECRET")?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut params = Vec::new();
        if resource.name == "contacts" {
            let since = since_timestamp(&marker, &request.window, Duration::days(CONTACT_LOOKBACK_DAYS));
            params.push(("search".to_string(), format!("dateModified:>={since}")));
            params.push(("orderBy".to_string(), "dateModified".to_string()));
            params.push(("orderByDir".to_string(), "asc".to_string()));
        }

        let fetcher = OffsetPages {
            client: ApiClient::new(SOURCE_NAME, self.transport.clone()),
            token_url: format!("{base_url}/oauth/v2/token"),
            url: format!("{base_url}/api/{}", resource.name),
            entity: resource.name.clone(),
            credentials: (client_id, client_secret),
            token: None,
            params,
            start: 0,
            done: false,
        };
        Ok(Box::new(PagedExtractor::new(resource, &marker, fetcher)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: Option<u64>,
}

/// `start`/`limit` pagination over an entity list, authenticated with a
/// client-credentials token fetched on the first page.
struct OffsetPages {
    client: ApiClient,
    token_url: String,
    url: String,
    entity: String,
    credentials: (String, String),
    token: Option<String>,
    params: Vec<(String, String)>,
    start: u64,
    done: bool,
}

impl OffsetPages {
    async fn token(&mut self) -> Result<String, ExtractError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.credentials.0.clone()),
            ("client_secret".to_string(), self.credentials.1.clone()),
        ];
        let payload = self
            .client
            .send_json(HttpRequest::post_form(&self.token_url, form))
            .await?;
        let grant: TokenGrant = serde_json::from_value(payload).map_err(|e| ExtractError::Auth {
            source_name: SOURCE_NAME.to_string(),
            message: format!("unexpected token response: {e}"),
        })?;
        debug!(expires_in = ?grant.expires_in, "Obtained Mautic access token");
        self.token = Some(grant.access_token.clone());
        Ok(grant.access_token)
    }
}

#[async_trait]
impl PageFetcher for OffsetPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ExtractError> {
        if self.done {
            return Ok(None);
        }
        let token = self.token().await?;

        let mut request = HttpRequest::get(&self.url)
            .bearer(&token)
            .query("limit", PAGE_SIZE)
            .query("start", self.start);
        for (name, value) in &self.params {
            request = request.query(name, value);
        }
        let payload = self.client.send_json(request).await?;

        // Entities come keyed by id in an object, or as a plain list.
        let items: Vec<serde_json::Value> = match payload.get(&self.entity) {
            Some(serde_json::Value::Object(map)) => map.values().cloned().collect(),
            Some(serde_json::Value::Array(list)) => list.clone(),
            _ => Vec::new(),
        };
        if items.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let total = payload
            .get("total")
            .map(Value::from_json)
            .and_then(|t| t.as_i64())
            .unwrap_or(0)
            .max(0) as u64;
        self.start += PAGE_SIZE;
        self.done = self.start >= total;
        debug!(entity = %self.entity, items = items.len(), total, "Mautic page");

        Ok(Some(items.iter().map(Record::from_json).collect()))
    }

    fn origin(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Body, HttpResponse, Method, client::tests::ScriptedTransport};
    use serde_json::json;

    fn settings() -> MauticSettings {
        MauticSettings {
            base_url: Some("https://m.test/".to_string()),
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn authenticates_then_pages_by_offset() {
        let page = |ids: std::ops::Range<i64>| {
            let contacts: serde_json::Map<String, serde_json::Value> = ids
                .map(|id| {
                    (
                        id.to_string(),
                        json!({"id": id, "dateModified": format!("2025-06-01T00:00:{:02}+00:00", id % 60)}),
                    )
                })
                .collect();
            json!({"total": "150", "contacts": contacts}).to_string()
        };
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::ok(json!({"access_token": "tok"}).to_string())),
            Ok(HttpResponse::ok(page(0..100))),
            Ok(HttpResponse::ok(page(100..150))),
        ]);
        let source = MauticSource::new(settings(), transport.clone());
        let resource = source.descriptor().resource("contacts").unwrap().clone();

        let mut extractor = source
            .extractor(&resource, Marker::Initial, &ExtractRequest::default())
            .unwrap();
        let batch = extractor.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 150);
        assert!(batch.marker.is_some());

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://m.test/oauth/v2/token");
        assert!(matches!(&requests[0].body, Some(Body::Form(form)) if form.contains(&("grant_type".to_string(), "client_credentials".to_string()))));
        assert!(requests[2].query.contains(&("start".to_string(), "100".to_string())));
        assert!(requests[1].query.iter().any(|(k, v)| k == "search" && v.starts_with("dateModified:>=")));
    }

    #[tokio::test]
    async fn list_payloads_and_empty_pages() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::ok(json!({"access_token": "tok"}).to_string())),
            Ok(HttpResponse::ok(json!({"total": 1, "emails": [{"id": 9, "name": "Welcome"}]}).to_string())),
        ]);
        let source = MauticSource::new(settings(), transport.clone());
        let resource = source.descriptor().resource("emails").unwrap().clone();

        let mut extractor = source
            .extractor(&resource, Marker::Initial, &ExtractRequest::default())
            .unwrap();
        let batch = extractor.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.records[0].get_value("name"), Value::from("Welcome"));
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(resource.table, "mautic_emails");
    }
}
