use super::{PageFetcher, PagedExtractor, day_range};
use crate::http::{HttpRequest, HttpTransport, client::ApiClient};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use engine_config::settings::{EverflowSettings, require};
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
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub const SOURCE_NAME: &str = "everflow";
const REPORT_PATH: &str = "/v1/networks/reporting/entity/table";
const TIMEZONE_ID: i64 = 80;
const PAGE_LIMIT: i64 = 10_000;

/// Daily affiliate x advertiser performance from the network reporting API.
pub struct EverflowSource {
    descriptor: SourceDescriptor,
    settings: EverflowSettings,
    transport: Arc<dyn HttpTransport>,
}

impl EverflowSource {
    pub fn new(settings: EverflowSettings, transport: Arc<dyn HttpTransport>) -> Self {
        let daily_stats = ResourceDescriptor::new("daily_stats", ExtractionKind::ApiPaginated)
            .table("everflow_daily_stats")
            .primary_key(&["date", "affiliate_id", "advertiser_id"])
            .disposition(WriteDisposition::Merge)
            .cursor(CursorStrategy::row("date", "2025-12-20"))
            .column("date", DataType::Date)
            .column("affiliate_id", DataType::BigInt)
            .column("affiliate_label", DataType::Text)
            .column("advertiser_id", DataType::BigInt)
            .column("advertiser_label", DataType::Text)
            .column("clicks", DataType::BigInt)
            .column("conversions", DataType::BigInt)
            .column("revenue", DataType::Double)
            .column("payout", DataType::Double)
            .column("profit", DataType::Double);

        EverflowSource {
            descriptor: SourceDescriptor::new(SOURCE_NAME, vec![daily_stats]),
            settings,
            transport,
        }
    }
}

impl Source for EverflowSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let api_key = require(&self.settings.api_key, SOURCE_NAME, "EVERFLOW_API_KEY")?;
        let fallback = match &resource.cursor {
            CursorStrategy::Row { initial, .. } => initial
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
            _ => None,
        }
        .unwrap_or_else(super::yesterday);
        let (start, end) = day_range(&marker, &request.window, fallback).map_err(|e| match e {
            ExtractError::Config(config) => config,
            other => ConfigError::InvalidOptions(other.to_string()),
        })?;

        let fetcher = ReportFetcher {
            client: ApiClient::new(SOURCE_NAME, self.transport.clone()),
            url: format!("{}{REPORT_PATH}", self.settings.base_url),
            api_key,
            advertiser_id: self.settings.advertiser_id,
            start,
            end,
            done: false,
        };
        Ok(Box::new(PagedExtractor::new(resource, &marker, fetcher)))
    }
}

struct ReportFetcher {
    client: ApiClient,
    url: String,
    api_key: String,
    advertiser_id: Option<i64>,
    start: NaiveDate,
    end: NaiveDate,
    done: bool,
}

impl ReportFetcher {
    fn payload(&self) -> serde_json::Value {
        let filters = match self.advertiser_id {
            Some(id) => json!([{"resource_type": "advertiser", "filter_id_value": id.to_string()}]),
            None => json!([]),
        };
        json!({
            "from": self.start.to_string(),
            "to": self.end.to_string(),
            "timezone_id": TIMEZONE_ID,
            "currency_id": "USD",
            "columns": [
                {"column": "affiliate"},
                {"column": "advertiser"},
                {"column": "date"},
            ],
            "query": {
                "filters": filters,
                "page": 1,
                "limit": PAGE_LIMIT,
            },
        })
    }
}

#[async_trait]
impl PageFetcher for ReportFetcher {
    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ExtractError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        if self.start > self.end {
            info!(start = %self.start, end = %self.end, "Everflow window is empty, nothing to fetch");
            return Ok(None);
        }

        let request = HttpRequest::post_json(&self.url, self.payload())
            .header("X-Eflow-API-Key", &self.api_key)
            .header("Content-Type", "application/json");
        let payload = self.client.send_json(request).await?;

        let rows = payload
            .get("table")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();
        debug!(rows = rows.len(), "Everflow report rows received");

        let records = rows
            .iter()
            .map(parse_row)
            .filter(|r| match self.advertiser_id {
                // The reporting endpoint ignores the filter for some accounts.
                Some(id) => r.get_value("advertiser_id").as_i64() == Some(id),
                None => true,
            })
            .collect();
        Ok(Some(records))
    }

    fn origin(&self) -> String {
        format!("everflow {}..{}", self.start, self.end)
    }
}

/// Flattens one report row. Dimensions arrive as a `columns` array keyed by
/// `column_type`; the date dimension id is a unix timestamp.
fn parse_row(row: &serde_json::Value) -> Record {
    let mut record = Record::new();
    let dimensions = row
        .get("columns")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    for dimension in &dimensions {
        let id = dimension.get("id").map(Value::from_json).unwrap_or_default();
        let label = dimension.get("label").map(Value::from_json).unwrap_or_default();
        match dimension.get("column_type").and_then(|t| t.as_str()) {
            Some("date") => {
                let day = id
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|dt| Value::from(dt.date_naive().to_string()))
                    .unwrap_or_default();
                record.set("date", day);
            }
            Some("affiliate") => {
                record.set("affiliate_id", id);
                record.set("affiliate_label", label);
            }
            Some("advertiser") => {
                record.set("advertiser_id", id);
                record.set("advertiser_label", label);
            }
            _ => {}
        }
    }

    let reporting = row.get("reporting").cloned().unwrap_or_default();
    let metric = |name: &str| reporting.get(name).map(Value::from_json).unwrap_or_default();
    record.set("clicks", metric("total_click"));
    record.set("conversions", metric("cv"));
    record.set("revenue", metric("revenue"));
    record.set("payout", metric("payout"));
    record.set("profit", metric("profit"));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, client::tests::ScriptedTransport};
    use engine_core::source::DateWindow;

    fn settings(advertiser_id: Option<i64>) -> EverflowSettings {
        EverflowSettings {
            api_key: Some("key".to_string()),
            base_url: "https://eflow.test".to_string(),
            advertiser_id,
        }
    }

    fn report() -> String {
        json!({
            "table": [
                {
                    "columns": [
                        {"column_type": "affiliate", "id": 11, "label": "Aff"},
                        {"column_type": "advertiser", "id": 7, "label": "Adv"},
                        {"column_type": "date", "id": 1735776000, "label": ""}
                    ],
                    "reporting": {"total_click": 120, "cv": 4, "revenue": 40.5, "payout": 20.0, "profit": 20.5}
                },
                {
                    "columns": [
                        {"column_type": "affiliate", "id": 12, "label": "Other"},
                        {"column_type": "advertiser", "id": 8, "label": "Other adv"},
                        {"column_type": "date", "id": 1735776000, "label": ""}
                    ],
                    "reporting": {"total_click": 3}
                }
            ]
        })
        .to_string()
    }

    fn window() -> ExtractRequest {
        ExtractRequest {
            window: DateWindow {
                start: NaiveDate::from_ymd_opt(2025, 1, 2),
                end: NaiveDate::from_ymd_opt(2025, 1, 2),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn parses_report_and_filters_advertiser() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(report()))]);
        let source = EverflowSource::new(settings(Some(7)), transport.clone());
        let resource = source.descriptor().resources[0].clone();

        let mut extractor = source.extractor(&resource, Marker::Initial, &window()).unwrap();
        let batch = extractor.next_batch().await.unwrap().unwrap();

        assert_eq!(batch.len(), 1);
        let row = &batch.records[0];
        assert_eq!(row.get_value("date"), Value::from("2025-01-02"));
        assert_eq!(row.get_value("affiliate_id"), Value::Int(11));
        assert_eq!(row.get_value("clicks"), Value::Int(120));
        assert_eq!(row.get_value("profit"), Value::Float(20.5));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with(REPORT_PATH));
        assert!(requests[0].headers.contains(&("X-Eflow-API-Key".to_string(), "key".to_string())));
    }

    #[tokio::test]
    async fn missing_key_is_config_error() {
        let transport = ScriptedTransport::new(vec![]);
        let mut settings = settings(None);
        settings.api_key = None;
        let source = EverflowSource::new(settings, transport);
        let resource = source.descriptor().resources[0].clone();

        let err = source
            .extractor(&resource, Marker::Initial, &ExtractRequest::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn empty_window_makes_no_request() {
        let transport = ScriptedTransport::new(vec![]);
        let source = EverflowSource::new(settings(None), transport.clone());
        let resource = source.descriptor().resources[0].clone();
        let request = ExtractRequest {
            window: DateWindow {
                start: NaiveDate::from_ymd_opt(2025, 1, 5),
                end: NaiveDate::from_ymd_opt(2025, 1, 4),
            },
            ..Default::default()
        };

        let mut extractor = source.extractor(&resource, Marker::Initial, &request).unwrap();
        assert!(extractor.next_batch().await.unwrap().is_none());
        assert!(transport.requests().is_empty());
    }
}
