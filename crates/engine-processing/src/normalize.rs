//! Tagging and type coercion applied to every extracted record.

use crate::error::SchemaViolation;
use chrono::{DateTime, SecondsFormat, Utc};
use model::{
    core::value::Value,
    records::record::Record,
    source::descriptor::{CoercionPolicy, ResourceDescriptor},
};

pub const CLIENT_ID_COLUMN: &str = "_client_id";
pub const LOADED_AT_COLUMN: &str = "_loaded_at";

/// Pure transformation from raw to loadable records.
///
/// Declared columns are coerced to their declared type; values that do not
/// fit become NULL unless the column is part of the primary key, in which
/// case the record is a schema violation. Undeclared columns pass through.
#[derive(Debug, Clone)]
pub struct Normalizer {
    client_id: String,
    loaded_at: String,
}

/// Outcome of normalizing one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub records: Vec<Record>,
    /// Non-key cells that could not be coerced and were set to NULL.
    pub nulled: usize,
}

impl Normalizer {
    pub fn new(client_id: &str, now: DateTime<Utc>) -> Self {
        Normalizer {
            client_id: client_id.to_string(),
            loaded_at: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn normalize(
        &self,
        resource: &ResourceDescriptor,
        index: usize,
        mut record: Record,
    ) -> Result<(Record, usize), SchemaViolation> {
        let mut nulled = 0;

        if resource.coercion == CoercionPolicy::Coerce {
            for column in &resource.columns {
                let Some(raw) = record.get(&column.name).cloned() else {
                    continue;
                };
                match column.data_type.coerce(raw.clone()) {
                    Some(value) => record.set(&column.name, value),
                    None if resource.is_key_column(&column.name) => {
                        return Err(SchemaViolation::InvalidKey {
                            resource: resource.name.clone(),
                            column: column.name.clone(),
                            value: raw.to_string(),
                            data_type: column.data_type.to_string(),
                            index,
                        });
                    }
                    None => {
                        record.set(&column.name, Value::Null);
                        nulled += 1;
                    }
                }
            }
        }

        if let Err(missing) = record.key(&resource.primary_key) {
            return Err(SchemaViolation::MissingKey {
                resource: resource.name.clone(),
                column: missing.column,
                index,
            });
        }

        record.set(CLIENT_ID_COLUMN, Value::from(self.client_id.as_str()));
        record.set(LOADED_AT_COLUMN, Value::from(self.loaded_at.as_str()));
        Ok((record, nulled))
    }

    /// Normalizes a batch; the first violation rejects the whole batch.
    pub fn normalize_batch(
        &self,
        resource: &ResourceDescriptor,
        records: Vec<Record>,
    ) -> Result<Normalized, SchemaViolation> {
        let mut out = Vec::with_capacity(records.len());
        let mut nulled = 0;
        for (index, record) in records.into_iter().enumerate() {
            let (record, count) = self.normalize(resource, index, record)?;
            nulled += count;
            out.push(record);
        }
        Ok(Normalized { records: out, nulled })
    }
}
