use super::{PageFetcher, PagedExtractor, since_timestamp};
use crate::http::{HttpRequest, HttpTransport, client::ApiClient};
use async_trait::async_trait;
use chrono::Duration;
use engine_config::settings::{PosthogSettings, require};
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
use std::sync::Arc;
use tracing::debug;

pub const SOURCE_NAME: &str = "posthog";
const EVENT_PAGE_SIZE: usize = 100;
const EVENT_LOOKBACK_DAYS: i64 = 7;

pub struct PosthogSource {
    descriptor: SourceDescriptor,
    settings: PosthogSettings,
    transport: Arc<dyn HttpTransport>,
}

impl PosthogSource {
    pub fn new(settings: PosthogSettings, transport: Arc<dyn HttpTransport>) -> Self {
        let events = ResourceDescriptor::new("events", ExtractionKind::ApiPaginated)
            .table("posthog_events")
            .primary_key(&["uuid"])
            .disposition(WriteDisposition::Append)
            .cursor(CursorStrategy::row("timestamp", Value::Null))
            .column("uuid", DataType::Text)
            .column("event", DataType::Text)
            .column("distinct_id", DataType::Text)
            .column("timestamp", DataType::Timestamp)
            .column("properties", DataType::Json);

        let feature_flags = ResourceDescriptor::new("feature_flags", ExtractionKind::ApiPaginated)
            .table("posthog_feature_flags")
            .disposition(WriteDisposition::Replace)
            .column("id", DataType::BigInt)
            .column("key", DataType::Text)
            .column("filters", DataType::Json);

        let experiments = ResourceDescriptor::new("experiments", ExtractionKind::ApiPaginated)
            .table("posthog_experiments")
            .primary_key(&["id"])
            .disposition(WriteDisposition::Merge)
            .column("id", DataType::BigInt)
            .column("name", DataType::Text)
            .column("feature_flag_key", DataType::Text)
            .column("start_date", DataType::Timestamp)
            .column("end_date", DataType::Timestamp)
            .column("parameters", DataType::Json);

        PosthogSource {
            descriptor: SourceDescriptor::new(SOURCE_NAME, vec![events, feature_flags, experiments]),
            settings,
            transport,
        }
    }
}

impl Source for PosthogSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let api_key = require(&self.settings.api_key, SOURCE_NAME, "POSTHOG_API_KEY")?;
        let project_id = require(&self.settings.project_id, SOURCE_NAME, "POSTHOG_PROJECT_ID")?;
        let base = format!("{}/api/projects/{project_id}", self.settings.host);

        let first = match resource.name.as_str() {
            "events" => {
                let after = since_timestamp(&marker, &request.window, Duration::days(EVENT_LOOKBACK_DAYS));
                let mut first = HttpRequest::get(format!("{base}/events"))
                    .query("after", after)
                    .query("limit", EVENT_PAGE_SIZE);
                if let Some(end) = request.window.end {
                    first = first.query("before", format!("{}T00:00:00", end.succ_opt().unwrap_or(end)));
                }
                first
            }
            "feature_flags" => HttpRequest::get(format!("{base}/feature_flags")),
            "experiments" => HttpRequest::get(format!("{base}/experiments")),
            other => {
                return Err(ConfigError::UnknownResource {
                    source_name: SOURCE_NAME.to_string(),
                    resource: other.to_string(),
                });
            }
        };

        let fetcher = LinkedPages {
            client: ApiClient::new(SOURCE_NAME, self.transport.clone()),
            api_key,
            next: Some(first.clone()),
            first,
        };
        Ok(Box::new(PagedExtractor::new(resource, &marker, fetcher)))
    }
}

/// Follows the `next` link of list responses until it is absent.
struct LinkedPages {
    client: ApiClient,
    api_key: String,
    first: HttpRequest,
    next: Option<HttpRequest>,
}

#[async_trait]
impl PageFetcher for LinkedPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ExtractError> {
        let Some(request) = self.next.take() else {
            return Ok(None);
        };
        let payload = self.client.send_json(request.bearer(&self.api_key)).await?;

        let results = payload
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        if results.is_empty() {
            return Ok(None);
        }

        // The link already carries every query parameter.
        self.next = payload
            .get("next")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(HttpRequest::get);
        debug!(url = %self.first.url, results = results.len(), more = self.next.is_some(), "PostHog page");

        Ok(Some(results.iter().map(Record::from_json).collect()))
    }

    fn origin(&self) -> String {
        self.first.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, client::tests::ScriptedTransport};
    use model::cursor::marker::RowMarker;
    use serde_json::json;

    fn settings() -> PosthogSettings {
        PosthogSettings {
            api_key: Some("phx".to_string()),
            project_id: Some("12".to_string()),
            host: "https://ph.test".to_string(),
        }
    }

    fn event(uuid: &str, ts: &str) -> serde_json::Value {
        json!({"uuid": uuid, "event": "$pageview", "distinct_id": "d", "timestamp": ts, "properties": {"path": "/"}})
    }

    #[tokio::test]
    async fn follows_next_links_and_skips_loaded_ties() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::ok(
                json!({
                    "results": [event("e2", "2025-05-01T10:00:00Z"), event("e1", "2025-05-01T09:00:00Z")],
                    "next": "https://ph.test/api/projects/12/events?cursor=abc"
                })
                .to_string(),
            )),
            Ok(HttpResponse::ok(
                json!({"results": [event("e0", "2025-05-01T09:00:00Z")], "next": null}).to_string(),
            )),
        ]);
        let source = PosthogSource::new(settings(), transport.clone());
        let resource = source.descriptor().resource("events").unwrap().clone();

        let mut stored = RowMarker::new(Value::from("2025-05-01T09:00:00Z"));
        stored.boundary_keys.insert("e1".to_string());
        let mut extractor = source
            .extractor(&resource, Marker::Row(stored), &ExtractRequest::default())
            .unwrap();

        let batch = extractor.next_batch().await.unwrap().unwrap();
        let uuids: Vec<Value> = batch.records.iter().map(|r| r.get_value("uuid")).collect();
        assert_eq!(uuids, vec![Value::from("e2"), Value::from("e0")]);
        assert_eq!(
            batch.marker.unwrap().as_row().unwrap().value,
            Value::from("2025-05-01T10:00:00Z")
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].query.contains(&("after".to_string(), "2025-05-01T09:00:00Z".to_string())));
        assert!(requests[1].query.is_empty());
        assert!(requests[1].headers.contains(&("Authorization".to_string(), "Bearer phx".to_string())));
    }

    #[tokio::test]
    async fn feature_flags_have_no_marker() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(
            json!({"results": [{"id": 1, "key": "beta", "filters": {}}]}).to_string(),
        ))]);
        let source = PosthogSource::new(settings(), transport);
        let resource = source.descriptor().resource("feature_flags").unwrap().clone();

        let mut extractor = source
            .extractor(&resource, Marker::Initial, &ExtractRequest::default())
            .unwrap();
        let batch = extractor.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.marker.is_none());
    }

    #[test]
    fn missing_project_is_config_error() {
        let mut settings = settings();
        settings.project_id = None;
        let source = PosthogSource::new(settings, ScriptedTransport::new(vec![]));
        let resource = source.descriptor().resource("events").unwrap().clone();
        let err = source
            .extractor(&resource, Marker::Initial, &ExtractRequest::default())
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::MissingCredential {
                source_name: "posthog".to_string(),
                field: "POSTHOG_PROJECT_ID".to_string()
            }
        );
    }
}
