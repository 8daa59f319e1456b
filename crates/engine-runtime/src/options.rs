use chrono::NaiveDate;
use engine_core::{
    error::ConfigError,
    source::{DateWindow, ExtractRequest},
};

/// What one pipeline run should do.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Resources to run; empty means all of them.
    pub resources: Vec<String>,
    /// Cursor partition, normally the client the data is loaded for.
    pub partition: String,
    /// Value written into the client tag column.
    pub client_id: String,
    pub window: DateWindow,
    /// Extract and normalize, but neither write nor advance cursors.
    pub dry_run: bool,
    pub max_batches: Option<usize>,
}

impl RunOptions {
    pub fn new(client_id: &str) -> Self {
        RunOptions {
            resources: Vec::new(),
            partition: client_id.to_string(),
            client_id: client_id.to_string(),
            window: DateWindow::default(),
            dry_run: false,
            max_batches: None,
        }
    }

    pub fn resources<S: AsRef<str>>(mut self, resources: &[S]) -> Self {
        self.resources = resources.iter().map(|r| r.as_ref().to_string()).collect();
        self
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = partition.to_string();
        self
    }

    pub fn window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.window = DateWindow { start, end };
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_batches(mut self, max_batches: Option<usize>) -> Self {
        self.max_batches = max_batches;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition.trim().is_empty() {
            return Err(ConfigError::InvalidOptions("partition must not be empty".into()));
        }
        if let (Some(start), Some(end)) = (self.window.start, self.window.end)
            && start > end
        {
            return Err(ConfigError::InvalidOptions(format!(
                "window start {start} is after its end {end}"
            )));
        }
        if self.max_batches == Some(0) {
            return Err(ConfigError::InvalidOptions("max_batches must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn extract_request(&self) -> ExtractRequest {
        ExtractRequest {
            partition: self.partition.clone(),
            window: self.window,
            max_batches: self.max_batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn partition_defaults_to_client() {
        let options = RunOptions::new("713");
        assert_eq!(options.partition, "713");
        assert!(options.resources.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_window() {
        let options = RunOptions::new("713").window(Some(day("2025-02-01")), Some(day("2025-01-01")));
        assert!(matches!(options.validate(), Err(ConfigError::InvalidOptions(_))));
    }

    #[test]
    fn rejects_zero_batches() {
        let options = RunOptions::new("713").max_batches(Some(0));
        assert!(options.validate().is_err());
    }
}
