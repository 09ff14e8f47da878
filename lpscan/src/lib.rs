//! Exploratory scanning of line protocol dumps.
//!
//! Records are pulled one at a time from a [`RecordSource`], pre-filtered by measurement and
//! by a [`TagFilter`], and then either projected into delimited rows of the requested columns
//! or folded into a [`SummaryTable`] of the distinct values seen per tag, measurement and
//! field set. A [`Pipeline`] ties the stages together for one immutable [`RunConfig`].
pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod projector;
pub mod source;

pub use aggregator::{
    Facet, FacetMap, FacetValues, SummaryAggregator, SummaryTable, FACET_VALUE_CAP,
};
pub use config::{Mode, OutputFormat, RunConfig};
pub use error::{LpscanError, Result};
pub use filter::{parse_arguments, FilterTerm, TagFilter};
pub use pipeline::{Pipeline, RunStats};
pub use projector::{ColumnProjector, ColumnRequest, Row};
pub use source::{
    for_each_field, for_each_tag, DecodeError, DecodeErrorKind, LineProtocolDecoder, Pair,
    PairKind, RecordContext, RecordSource,
};
