use super::{PageFetcher, PagedExtractor, day_range, rows_from_payload, yesterday};
use crate::http::{HttpRequest, HttpTransport, client::ApiClient};
use async_trait::async_trait;
use chrono::{Duration as Days, NaiveDate};
use engine_config::settings::{RedtrackSettings, require};
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
use std::{sync::Arc, time::Duration};
use tracing::info;

pub const SOURCE_NAME: &str = "redtrack";
const TIMEZONE: &str = "America/New_York";
const ROW_KEYS: [&str; 4] = ["rows", "items", "data", "results"];

/// Daily spend by traffic source.
pub struct RedtrackSource {
    descriptor: SourceDescriptor,
    settings: RedtrackSettings,
    transport: Arc<dyn HttpTransport>,
}

impl RedtrackSource {
    pub fn new(settings: RedtrackSettings, transport: Arc<dyn HttpTransport>) -> Self {
        let daily_spend = ResourceDescriptor::new("daily_spend", ExtractionKind::ApiPaginated)
            .table("redtrack_daily_spend")
            .primary_key(&["date", "source_id"])
            .disposition(WriteDisposition::Merge)
            .cursor(CursorStrategy::row("date", Value::Null))
            .column("date", DataType::Date)
            .column("source_id", DataType::Text)
            .column("source_name", DataType::Text)
            .column("source_alias", DataType::Text)
            .column("clicks", DataType::BigInt)
            .column("conversions", DataType::BigInt)
            .column("cost", DataType::Double);

        RedtrackSource {
            descriptor: SourceDescriptor::new(SOURCE_NAME, vec![daily_spend]),
            settings,
            transport,
        }
    }
}

impl Source for RedtrackSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let api_key = require(&self.settings.api_key, SOURCE_NAME, "REDTRACK_API_KEY")?;
        let (start, end) = day_range(&marker, &request.window, yesterday()).map_err(|e| match e {
            ExtractError::Config(config) => config,
            other => ConfigError::InvalidOptions(other.to_string()),
        })?;

        let fetcher = DailyFetcher {
            client: ApiClient::new(SOURCE_NAME, self.transport.clone()),
            url: format!("{}/report", self.settings.base_url),
            api_key,
            spacing: self.settings.request_spacing,
            next: start,
            start,
            end,
        };
        Ok(Box::new(PagedExtractor::new(resource, &marker, fetcher)))
    }
}

/// One report request per day, spaced out to stay under the rate limit.
struct DailyFetcher {
    client: ApiClient,
    url: String,
    api_key: String,
    spacing: Duration,
    next: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
}

#[async_trait]
impl PageFetcher for DailyFetcher {
    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ExtractError> {
        if self.next > self.end {
            return Ok(None);
        }
        let day = self.next;
        if day > self.start && !self.spacing.is_zero() {
            tokio::time::sleep(self.spacing).await;
        }
        self.next = day + Days::days(1);

        let date = day.to_string();
        let request = HttpRequest::get(&self.url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .query("api_key", &self.api_key)
            .query("date_from", &date)
            .query("date_to", &date)
            .query("timezone", TIMEZONE)
            .query("group", "source")
            .query("sortby", "clicks")
            .query("direction", "desc");
        let payload = self.client.send_json(request).await?;

        let records: Vec<Record> = rows_from_payload(&payload, &ROW_KEYS)
            .iter()
            .filter_map(|row| normalize_row(row, &date))
            .collect();
        info!(date = %date, rows = records.len(), "Fetched Redtrack daily spend");
        Ok(Some(records))
    }

    fn origin(&self) -> String {
        format!("redtrack {}..{}", self.start, self.end)
    }
}

/// Maps the varying field names of report rows onto the table columns.
/// Rows without a traffic source id are dropped.
fn normalize_row(row: &serde_json::Value, report_date: &str) -> Option<Record> {
    let truthy = |keys: &[&str]| -> Option<serde_json::Value> {
        keys.iter()
            .filter_map(|k| row.get(*k))
            .find(|v| !v.is_null() && v.as_str() != Some("") && v.as_i64() != Some(0))
            .cloned()
    };
    let present = |keys: &[&str]| -> Value {
        keys.iter()
            .filter_map(|k| row.get(*k))
            .find(|v| !v.is_null())
            .map(Value::from_json)
            .unwrap_or_default()
    };
    let text = |value: Option<serde_json::Value>| match value {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let source_id = text(truthy(&["source_id", "sourceId", "traffic_source_id", "trafficSourceId"]))
        .trim()
        .to_string();
    if source_id.is_empty() {
        return None;
    }

    let date = match truthy(&["date", "Date", "day"]) {
        Some(serde_json::Value::String(s)) => s,
        _ => report_date.to_string(),
    };
    let clicks = present(&["clicks", "total_clicks"]).as_f64().unwrap_or(0.0) as i64;
    let conversions = present(&["conversions"]).as_f64().unwrap_or(0.0) as i64;
    let cost = present(&["cost", "spend", "total_cost"]).as_f64().unwrap_or(0.0);

    Some(
        Record::new()
            .with("date", date)
            .with("source_id", source_id)
            .with(
                "source_name",
                text(truthy(&["source", "traffic_source", "trafficSource", "source_name", "sourceName"])),
            )
            .with(
                "source_alias",
                text(truthy(&["source_alias", "sourceAlias", "traffic_source_alias"])),
            )
            .with("clicks", clicks)
            .with("conversions", conversions)
            .with("cost", cost),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, client::tests::ScriptedTransport};
    use engine_core::source::DateWindow;
    use serde_json::json;

    fn settings() -> RedtrackSettings {
        RedtrackSettings {
            api_key: Some("rt-key".to_string()),
            base_url: "https://rt.test".to_string(),
            request_spacing: Duration::ZERO,
        }
    }

    #[test]
    fn normalizes_alternate_field_names() {
        let row = json!({"sourceId": 42, "trafficSource": "Meta", "spend": "12.5", "total_clicks": 7});
        let record = normalize_row(&row, "2025-03-01").unwrap();
        assert_eq!(record.get_value("source_id"), Value::from("42"));
        assert_eq!(record.get_value("source_name"), Value::from("Meta"));
        assert_eq!(record.get_value("date"), Value::from("2025-03-01"));
        assert_eq!(record.get_value("cost"), Value::Float(12.5));
        assert_eq!(record.get_value("clicks"), Value::Int(7));
        assert_eq!(record.get_value("conversions"), Value::Int(0));
    }

    #[test]
    fn rows_without_source_are_dropped() {
        assert!(normalize_row(&json!({"source_id": "  ", "clicks": 3}), "2025-03-01").is_none());
        assert!(normalize_row(&json!({"clicks": 3}), "2025-03-01").is_none());
    }

    #[tokio::test]
    async fn one_request_per_day() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::ok(json!({"rows": [{"source_id": "a", "clicks": 1}]}).to_string())),
            Ok(HttpResponse::ok(json!([{"source_id": "a", "clicks": 2}]).to_string())),
            Ok(HttpResponse::ok(json!({"items": []}).to_string())),
        ]);
        let source = RedtrackSource::new(settings(), transport.clone());
        let resource = source.descriptor().resources[0].clone();
        let request = ExtractRequest {
            window: DateWindow {
                start: NaiveDate::from_ymd_opt(2025, 3, 1),
                end: NaiveDate::from_ymd_opt(2025, 3, 3),
            },
            ..Default::default()
        };

        let mut extractor = source.extractor(&resource, Marker::Initial, &request).unwrap();
        let batch = extractor.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.marker.unwrap().as_row().unwrap().value,
            Value::from("2025-03-02")
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].query.contains(&("date_from".to_string(), "2025-03-03".to_string())));
        assert!(requests[0].query.contains(&("group".to_string(), "source".to_string())));
    }
}
