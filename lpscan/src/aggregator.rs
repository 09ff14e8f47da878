//! Cardinality-capped summary of the values seen per tag, measurement and record shape.
use crate::{
    filter::TagFilter,
    source::{for_each_field, RecordContext, RecordSource},
};
use std::{
    collections::BTreeMap,
    io::{self, Write},
};
use tracing::trace;

/// Maximum number of distinct values tracked per facet.
pub const FACET_VALUE_CAP: usize = 20;

/// What a summarized value describes.
///
/// The derived ordering puts the measurement facet first and the field set facet last,
/// which is the order of the report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facet {
    /// The measurement name of a record.
    Measurement,
    /// The value of one tag key.
    Tag(String),
    /// The sorted, comma-joined field names of a record, i.e. its shape.
    FieldSet,
}

impl Facet {
    /// Section title used in the report.
    pub fn title(&self) -> &str {
        match self {
            Facet::Measurement => "MEASUREMENTS",
            Facet::Tag(key) => key.as_str(),
            Facet::FieldSet => "RECORD TYPES",
        }
    }
}

/// Facet values of a single record, as raw bytes.
pub type FacetMap = BTreeMap<Facet, Vec<u8>>;

/// Builds per-record facet maps from a record source.
#[derive(Debug, Default)]
pub struct SummaryAggregator {
    field_names: Vec<String>,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the tag filter over the current record and, when it matches, collects the
    /// measurement, every tag and the record's field set.
    pub fn summarize<S>(
        &mut self,
        measurement: &[u8],
        source: &mut S,
        filter: &TagFilter,
        ctx: &mut RecordContext,
    ) -> Option<FacetMap>
    where
        S: RecordSource + ?Sized,
    {
        let mut facets = FacetMap::new();
        facets.insert(Facet::Measurement, measurement.to_vec());

        let matched = filter.matches(source, ctx, |key, value| {
            facets.insert(Facet::Tag(key.to_string()), value.to_vec());
        });
        if !matched {
            return None;
        }

        let names = &mut self.field_names;
        names.clear();
        for_each_field(source, ctx, |key, _| names.push(key.to_string()));
        names.sort();
        facets.insert(Facet::FieldSet, names.join(",").into_bytes());

        trace!(record = ctx.number, ?facets, "summarized record");
        Some(facets)
    }
}

/// Occurrence counts for the values of one facet, capped at [`FACET_VALUE_CAP`] distinct
/// values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetValues {
    counts: BTreeMap<Vec<u8>, u64>,
    overflowed: bool,
}

impl FacetValues {
    /// Counts one occurrence. A value not yet tracked is dropped once the cap is reached;
    /// tracked values keep counting.
    pub fn observe(&mut self, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if let Some(count) = self.counts.get_mut(&value) {
            *count += 1;
        } else if self.counts.len() < FACET_VALUE_CAP {
            self.counts.insert(value, 1);
        } else {
            self.overflowed = true;
        }
    }

    pub fn count(&self, value: impl AsRef<[u8]>) -> Option<u64> {
        self.counts.get(value.as_ref()).copied()
    }

    /// Number of distinct values tracked.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Whether some value was dropped because of the cap.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Tracked values and counts in bytewise lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.counts.iter().map(|(v, c)| (v.as_slice(), *c))
    }
}

/// The running aggregation table of a summary run.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    facets: BTreeMap<Facet, FacetValues>,
    records: u64,
}

impl SummaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, record: FacetMap) {
        self.records += 1;
        for (facet, value) in record {
            self.facets.entry(facet).or_default().observe(value);
        }
    }

    /// Number of records folded in.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn facet(&self, facet: &Facet) -> Option<&FacetValues> {
        self.facets.get(facet)
    }

    /// Facets in report order.
    pub fn facets(&self) -> impl Iterator<Item = (&Facet, &FacetValues)> {
        self.facets.iter()
    }

    /// Writes the human readable report: one section per facet, values sorted, and a `...`
    /// line for facets that hit the cap. Values are written as they were read.
    pub fn write_report<W: Write>(&self, mut out: W) -> io::Result<()> {
        for (facet, values) in &self.facets {
            writeln!(out, "{}:", facet.title())?;
            for (value, count) in values.iter() {
                write!(out, "\t{count:7} ")?;
                out.write_all(value)?;
                out.write_all(b"\n")?;
            }
            if values.overflowed() {
                writeln!(out, "\t...")?;
            }
        }
        out.flush()
    }
}
