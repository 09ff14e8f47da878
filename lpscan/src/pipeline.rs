//! The per-run driver: decode, pre-filter by measurement, then project or summarize.
//!
//! A run is split into a producer half (decode, filter, project/summarize) and a consumer
//! half (skip/limit and writing, or folding into the summary table). [`Pipeline::run`] drives
//! both in one loop. [`Pipeline::run_staged`] runs the producer on its own thread and hands
//! items over a channel of capacity one, so decoding of the next record overlaps with
//! writing of the current one.
use crate::{
    aggregator::{FacetMap, SummaryAggregator, SummaryTable},
    config::{Mode, RunConfig},
    error::{LpscanError, Result},
    filter::TagFilter,
    projector::{ColumnProjector, ColumnRequest, Row},
    source::{RecordContext, RecordSource},
};
use crossbeam::channel;
use std::{io::Write, thread};
use tracing::{debug, error, info, info_span, trace, warn};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Start,
    Streaming,
    Done,
}

/// Counters reported at the end of a run.
///
/// A run that stops at its limit reports the counts as of the last accepted row, so the
/// staged and the synchronous driver agree even though the decode stage may have read ahead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Records produced by the source, including those that failed to decode.
    pub records_seen: u64,
    /// Records that passed the measurement restriction, the tag filter and, in projection
    /// mode, had every requested column.
    pub records_matched: u64,
    /// Rows written (projection) or records folded into the table (summary).
    pub emitted: u64,
    /// Measurements and pairs skipped because they failed to decode.
    pub decode_errors: u64,
    /// The terminal error of the source, if the stream ended on one.
    pub source_error: Option<String>,
}

/// Producer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    seen: u64,
    decode_errors: u64,
}

/// What the producer hands to the consumer for one matching record.
#[derive(Debug)]
enum Item {
    Row(Row),
    Facets(FacetMap),
}

/// An item plus the producer counters at the time it was produced.
#[derive(Debug)]
struct Produced {
    progress: Progress,
    item: Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Default)]
struct ProducerReport {
    progress: Progress,
    source_error: Option<String>,
}

/// A validated, immutable run.
#[derive(Debug)]
pub struct Pipeline {
    config: RunConfig,
    filter: TagFilter,
    columns: ColumnRequest,
}

impl Pipeline {
    /// Validates the configuration. Duplicate filter keys and duplicate columns are rejected
    /// here, before any record is read.
    pub fn new(config: RunConfig) -> Result<Self> {
        let filter = TagFilter::from_terms(config.filters.iter().cloned())?;
        let columns = ColumnRequest::new(config.columns.clone())?;
        Ok(Self {
            config,
            filter,
            columns,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode()
    }

    /// Runs the whole pipeline in the calling thread, writing rows or the summary report to
    /// `out`.
    pub fn run<S, W>(&self, source: &mut S, out: W) -> Result<RunStats>
    where
        S: RecordSource + ?Sized,
        W: Write,
    {
        let _span = info_span!("run", mode = ?self.mode(), staged = false).entered();
        let mut state = RunState::Start;
        let mut consumer = Consumer::new(self, out)?;
        let mut producer = Producer::new(self);

        if consumer.is_satisfied() {
            debug!("Limit is zero, not reading input");
        } else {
            state = transition(state, RunState::Streaming);
            while let Some(produced) = producer.next_item(source) {
                if consumer.accept(produced)? == Flow::Stop {
                    debug!("Limit reached, not reading further records");
                    break;
                }
            }
        }
        let report = producer.finish(source);
        transition(state, RunState::Done);
        self.complete(report, consumer)
    }

    /// Like [`Pipeline::run`], with decoding on a separate thread.
    pub fn run_staged<S, W>(&self, source: &mut S, out: W) -> Result<RunStats>
    where
        S: RecordSource + Send + ?Sized,
        W: Write,
    {
        let _span = info_span!("run", mode = ?self.mode(), staged = true).entered();
        let mut state = RunState::Start;
        let mut consumer = Consumer::new(self, out)?;
        if consumer.is_satisfied() {
            debug!("Limit is zero, not reading input");
            transition(state, RunState::Done);
            return self.complete(ProducerReport::default(), consumer);
        }

        state = transition(state, RunState::Streaming);
        let (tx, rx) = channel::bounded::<Produced>(1);
        let (consumed, report) = thread::scope(|scope| {
            let producer = scope.spawn(move || {
                let mut producer = Producer::new(self);
                while let Some(produced) = producer.next_item(source) {
                    if tx.send(produced).is_err() {
                        trace!("Consumer hung up, stopping decode stage");
                        break;
                    }
                }
                // Dropping `tx` here lets the consumer see the end of the stream.
                producer.finish(source)
            });

            let mut consumed = Ok(());
            for produced in rx.iter() {
                match consumer.accept(produced) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => {
                        debug!("Limit reached, not reading further records");
                        break;
                    }
                    Err(e) => {
                        consumed = Err(e);
                        break;
                    }
                }
            }
            // Unblocks a producer waiting on a full channel.
            drop(rx);
            (consumed, producer.join())
        });
        consumed?;
        let report = report.map_err(|_| LpscanError::Staged)?;
        transition(state, RunState::Done);
        self.complete(report, consumer)
    }

    fn complete<W: Write>(
        &self,
        report: ProducerReport,
        consumer: Consumer<'_, W>,
    ) -> Result<RunStats> {
        let progress = consumer.stopped_at.unwrap_or(report.progress);
        let matched = consumer.matched;
        let emitted = consumer.finish()?;
        if let Some(e) = &report.source_error {
            error!(error = %e, "input stream ended with an error");
        }
        info!("read {} of {} records.", matched, progress.seen);
        Ok(RunStats {
            records_seen: progress.seen,
            records_matched: matched,
            emitted,
            decode_errors: progress.decode_errors,
            source_error: report.source_error,
        })
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    trace!(?from, ?to, "run state");
    to
}

enum Stage {
    Project(ColumnProjector),
    Summarize(SummaryAggregator),
}

/// Pulls records from the source and turns the matching ones into items.
struct Producer<'p> {
    filter: &'p TagFilter,
    measurement_filter: Option<&'p [u8]>,
    stage: Stage,
    measurement: Vec<u8>,
    progress: Progress,
}

impl<'p> Producer<'p> {
    fn new(pipeline: &'p Pipeline) -> Self {
        let stage = match pipeline.mode() {
            Mode::Projection => Stage::Project(ColumnProjector::new(pipeline.columns.clone())),
            Mode::Summary => Stage::Summarize(SummaryAggregator::new()),
        };
        Self {
            filter: &pipeline.filter,
            measurement_filter: pipeline.config.measurement.as_deref().map(str::as_bytes),
            stage,
            measurement: Vec::new(),
            progress: Progress::default(),
        }
    }

    /// The next matching record's item, or `None` once the source is exhausted.
    fn next_item<S: RecordSource + ?Sized>(&mut self, source: &mut S) -> Option<Produced> {
        while source.advance() {
            self.progress.seen += 1;
            let mut ctx = RecordContext::new(self.progress.seen);

            match source.measurement() {
                Ok(m) => {
                    self.measurement.clear();
                    self.measurement.extend_from_slice(&m);
                }
                Err(e) => {
                    warn!(record = ctx.number, error = %e, "skipping record");
                    self.progress.decode_errors += 1;
                    continue;
                }
            }
            if let Some(wanted) = self.measurement_filter {
                if self.measurement != wanted {
                    trace!(record = ctx.number, "other measurement");
                    continue;
                }
            }

            let item = match &mut self.stage {
                Stage::Project(projector) => projector
                    .project(source, self.filter, &mut ctx)
                    .map(Item::Row),
                Stage::Summarize(aggregator) => aggregator
                    .summarize(&self.measurement, source, self.filter, &mut ctx)
                    .map(Item::Facets),
            };
            self.progress.decode_errors += ctx.decode_errors;
            if let Some(item) = item {
                return Some(Produced {
                    progress: self.progress,
                    item,
                });
            }
        }
        None
    }

    fn finish<S: RecordSource + ?Sized>(self, source: &S) -> ProducerReport {
        ProducerReport {
            progress: self.progress,
            source_error: source.final_error().map(|e| e.to_string()),
        }
    }
}

enum Sink<W: Write> {
    Rows(csv::Writer<W>),
    Summary(SummaryTable, W),
}

/// Applies skip/limit and writes rows, or folds facets into the summary table.
struct Consumer<'p, W: Write> {
    pipeline: &'p Pipeline,
    sink: Sink<W>,
    skip: u64,
    remaining: Option<u64>,
    matched: u64,
    emitted: u64,
    /// Producer counters of the row that hit the limit.
    stopped_at: Option<Progress>,
}

impl<'p, W: Write> Consumer<'p, W> {
    /// Creates the sink. In projection mode the `#`-prefixed header row is written right
    /// away.
    fn new(pipeline: &'p Pipeline, mut out: W) -> Result<Self> {
        let sink = match pipeline.mode() {
            Mode::Projection => {
                out.write_all(b"#")?;
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(pipeline.config.format.delimiter())
                    .has_headers(false)
                    .from_writer(out);
                writer.write_record(pipeline.columns.names())?;
                Sink::Rows(writer)
            }
            Mode::Summary => Sink::Summary(SummaryTable::new(), out),
        };
        Ok(Self {
            pipeline,
            sink,
            skip: pipeline.config.skip,
            remaining: pipeline.config.limit,
            matched: 0,
            emitted: 0,
            stopped_at: None,
        })
    }

    fn is_satisfied(&self) -> bool {
        matches!(self.sink, Sink::Rows(_)) && self.remaining == Some(0)
    }

    fn accept(&mut self, produced: Produced) -> Result<Flow> {
        self.matched += 1;
        match (&mut self.sink, produced.item) {
            (Sink::Rows(writer), Item::Row(row)) => {
                if self.skip > 0 {
                    self.skip -= 1;
                    return Ok(Flow::Continue);
                }
                writer.write_record(&row)?;
                self.emitted += 1;
                if let Some(remaining) = &mut self.remaining {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        self.stopped_at = Some(produced.progress);
                        return Ok(Flow::Stop);
                    }
                }
                Ok(Flow::Continue)
            }
            (Sink::Summary(table, _), Item::Facets(facets)) => {
                table.fold(facets);
                self.emitted += 1;
                Ok(Flow::Continue)
            }
            (_, item) => {
                // The producer and consumer are built from the same mode.
                warn!(?item, mode = ?self.pipeline.mode(), "item does not fit the run mode");
                Ok(Flow::Continue)
            }
        }
    }

    /// Flushes rows or writes the summary report. Returns the emitted count.
    fn finish(self) -> Result<u64> {
        match self.sink {
            Sink::Rows(mut writer) => writer.flush()?,
            Sink::Summary(table, out) => table.write_report(out)?,
        }
        Ok(self.emitted)
    }
}
