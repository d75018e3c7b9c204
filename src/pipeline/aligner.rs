//! Time-series alignment across feeds sampled at different cadences
//!
//! The governing stream (smallest cadence, first listed on ties) defines a
//! minute grid from its first to its last timestamp. Every stream is joined
//! onto that grid by exact minute, then each column is forward-filled from
//! its most recent prior observation. Forward-fill is the staleness model for
//! slowly varying indices; nothing is interpolated.

use super::parser::{FeedSchema, Row};
use super::types::{Column, Record, Value};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Parsed rows of one feed together with the schema that produced them.
#[derive(Debug, Clone)]
pub struct FeedStream {
    pub schema: &'static FeedSchema,
    pub rows: Vec<Row>,
}

impl FeedStream {
    pub fn new(schema: &'static FeedSchema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Index rows by minute; the first row for a minute wins.
    fn index(&self) -> HashMap<DateTime<Utc>, Vec<(Column, Value)>> {
        let mut by_minute = HashMap::with_capacity(self.rows.len());
        let mut unparseable = 0usize;

        for row in &self.rows {
            let Some(ts) = row.timestamp(&self.schema.time_key) else {
                unparseable += 1;
                continue;
            };

            by_minute.entry(ts).or_insert_with(|| {
                self.schema
                    .bindings
                    .iter()
                    .filter_map(|(name, column)| {
                        let token = row.get(name)?;
                        column
                            .interpret(token, self.schema.fill_cutoff)
                            .map(|v| (*column, v))
                    })
                    .collect::<Vec<_>>()
            });
        }

        if unparseable > 0 {
            log::debug!(
                "{}: {} rows skipped (unparseable timestamp)",
                self.schema.name,
                unparseable
            );
        }
        by_minute
    }
}

/// Merge feed streams into one record per minute.
///
/// Total over the governing range: every minute from the governing stream's
/// first to last timestamp gets a `Record`, possibly with null fields. A
/// column stays null until its first observation inside the range.
pub fn merge(streams: &[FeedStream]) -> Vec<Record> {
    let Some(governing_idx) = streams
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.schema.cadence)
        .map(|(idx, _)| idx)
    else {
        return Vec::new();
    };

    let indexes: Vec<_> = streams.iter().map(FeedStream::index).collect();

    let governing = &indexes[governing_idx];
    let (Some(start), Some(end)) = (
        governing.keys().min().copied(),
        governing.keys().max().copied(),
    ) else {
        return Vec::new();
    };

    let minutes = (end - start).num_minutes() as usize + 1;
    let mut records = Vec::with_capacity(minutes);
    let mut last_seen: HashMap<Column, Value> = HashMap::new();

    let mut minute = start;
    while minute <= end {
        for index in &indexes {
            if let Some(values) = index.get(&minute) {
                for (column, value) in values {
                    last_seen.insert(*column, value.clone());
                }
            }
        }

        let mut record = Record::empty(minute);
        for (column, value) in &last_seen {
            record.set(*column, value);
        }
        records.push(record);

        minute += Duration::minutes(1);
    }

    log::debug!(
        "🔗 Aligned {} streams into {} minutes ({} → {})",
        streams.len(),
        records.len(),
        start,
        end
    );
    records
}
