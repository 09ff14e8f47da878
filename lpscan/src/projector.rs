//! Projection of requested tag/field columns into positional rows.
use crate::{
    error::{LpscanError, Result},
    filter::TagFilter,
    source::{for_each_field, RecordContext, RecordSource},
};
use std::collections::HashMap;
use tracing::trace;

/// One output row, positionally aligned with the [`ColumnRequest`]. Values are the raw
/// bytes of the record.
pub type Row = Vec<Vec<u8>>;

/// The ordered, duplicate-free list of columns to output.
///
/// Tag and field names share one namespace: a column is filled by whichever the record has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRequest {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnRequest {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                return Err(LpscanError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { names, positions })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// Fills a fixed-size row buffer from a record's tags and fields.
///
/// The buffer is allocated once per run and reset for every record.
#[derive(Debug)]
pub struct ColumnProjector {
    columns: ColumnRequest,
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
}

impl ColumnProjector {
    pub fn new(columns: ColumnRequest) -> Self {
        let slots = vec![None; columns.len()];
        Self {
            columns,
            slots,
            filled: 0,
        }
    }

    pub fn columns(&self) -> &ColumnRequest {
        &self.columns
    }

    /// Runs the tag filter and the column fill over the current record.
    ///
    /// Returns `None` when the filter rejects the record or any requested column is missing.
    /// Fields are read after tags, so a field value replaces a tag value of the same name.
    pub fn project<S>(
        &mut self,
        source: &mut S,
        filter: &TagFilter,
        ctx: &mut RecordContext,
    ) -> Option<Row>
    where
        S: RecordSource + ?Sized,
    {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.filled = 0;

        let Self {
            columns,
            slots,
            filled,
        } = self;

        let matched = filter.matches(source, ctx, |key, value| {
            fill(columns, slots, filled, key, value)
        });
        if !matched {
            return None;
        }
        for_each_field(source, ctx, |key, value| {
            fill(columns, slots, filled, key, value)
        });

        if *filled != columns.len() {
            trace!(
                record = ctx.number,
                filled = *filled,
                requested = columns.len(),
                "record lacks requested columns"
            );
            return None;
        }
        Some(slots.iter_mut().map(|s| s.take().unwrap_or_default()).collect())
    }
}

fn fill(
    columns: &ColumnRequest,
    slots: &mut [Option<Vec<u8>>],
    filled: &mut usize,
    key: &str,
    value: &[u8],
) {
    if let Some(i) = columns.position(key) {
        let slot = &mut slots[i];
        match slot {
            Some(buf) => {
                buf.clear();
                buf.extend_from_slice(value);
            }
            None => {
                *filled += 1;
                *slot = Some(value.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterTerm;
    use crate::source::LineProtocolDecoder;

    fn projector(columns: &[&str]) -> ColumnProjector {
        ColumnProjector::new(
            ColumnRequest::new(columns.iter().map(|c| c.to_string()).collect()).unwrap(),
        )
    }

    fn row_of(values: &[&str]) -> Row {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    fn project(p: &mut ColumnProjector, filter: &TagFilter, line: &str) -> Option<Row> {
        let mut dec = LineProtocolDecoder::new(line.as_bytes());
        assert!(dec.advance());
        dec.measurement().unwrap();
        p.project(&mut dec, filter, &mut RecordContext::new(1))
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = ColumnRequest::new(vec!["a".into(), "b".into(), "a".into()]).unwrap_err();
        assert!(matches!(err, LpscanError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_projects_tags_and_fields_in_request_order() {
        let mut p = projector(&["value", "host"]);
        let row = project(&mut p, &TagFilter::default(), "cpu,host=a,region=us value=1");
        assert_eq!(row, Some(row_of(&["1", "a"])));
    }

    #[test]
    fn test_incomplete_record_is_dropped() {
        let mut p = projector(&["host", "missing"]);
        assert_eq!(
            project(&mut p, &TagFilter::default(), "cpu,host=a value=1"),
            None
        );
        // The buffer is reset between records.
        let mut p = projector(&["host", "value"]);
        assert!(project(&mut p, &TagFilter::default(), "cpu,host=a value=1").is_some());
        assert_eq!(project(&mut p, &TagFilter::default(), "cpu,host=b other=2"), None);
    }

    #[test]
    fn test_field_wins_over_tag_with_same_name() {
        let mut p = projector(&["k"]);
        let row = project(&mut p, &TagFilter::default(), "m,k=a k=\"b\"");
        assert_eq!(row, Some(row_of(&["b"])));
    }

    #[test]
    fn test_collision_does_not_mask_missing_column() {
        let mut p = projector(&["k", "other"]);
        assert_eq!(project(&mut p, &TagFilter::default(), "m,k=a k=1"), None);
    }

    #[test]
    fn test_filter_and_completeness_are_independent() {
        let filter = TagFilter::from_terms([FilterTerm::exact("region", "us")]).unwrap();
        let mut p = projector(&["host", "value"]);
        assert_eq!(
            project(&mut p, &filter, "cpu,host=a,region=us value=1"),
            Some(row_of(&["a", "1"]))
        );
        assert_eq!(project(&mut p, &filter, "cpu,host=b,region=eu value=2"), None);
        assert_eq!(project(&mut p, &filter, "mem,host=a value=9"), None);
    }

    #[test]
    fn test_values_are_kept_as_raw_bytes() {
        let mut p = projector(&["host", "note"]);
        let mut dec = LineProtocolDecoder::new(&b"cpu,host=caf\xe9 note=\"na\xefve\"\n"[..]);
        assert!(dec.advance());
        let row = p.project(&mut dec, &TagFilter::default(), &mut RecordContext::new(1));
        assert_eq!(row, Some(vec![b"caf\xe9".to_vec(), b"na\xefve".to_vec()]));
    }

    #[test]
    fn test_broken_pair_only_loses_that_column() {
        let mut p = projector(&["host", "value"]);
        let mut dec = LineProtocolDecoder::new(&b"cpu,host=a,bad value=7,x=\n"[..]);
        assert!(dec.advance());
        let mut ctx = RecordContext::new(4);
        let row = p.project(&mut dec, &TagFilter::default(), &mut ctx);
        assert_eq!(row, Some(row_of(&["a", "7"])));
        assert_eq!(ctx.decode_errors, 2);
    }
}
