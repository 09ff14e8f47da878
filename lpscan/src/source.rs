//! Streaming line protocol record source.
//!
//! A record is one line of the form
//!
//! ```text
//! <measurement>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,<field_key>=<field_value>...] [<timestamp>]
//! ```
//!
//! The decoder never materializes a whole record. Callers pull the measurement, then the
//! tag pairs, then the field pairs, each stream ending with `Ok(None)`. A malformed pair is
//! reported as a [`DecodeError`] and the decoder resynchronizes at the next separator, so the
//! remaining pairs of the same record can still be read.
//!
//! Escapes follow the line protocol rules: `\,`, `\=`, `\ ` and `\\` in identifiers and tag
//! values, `\"` and `\\` inside quoted string field values. Timestamps are not interpreted.
use std::{
    borrow::Cow,
    fmt,
    io::{self, BufRead},
};
use thiserror::Error;
use tracing::{trace, warn};

/// A decoded key/value pair. Keys are text, values are opaque bytes.
pub type Pair<'a> = (Cow<'a, str>, Cow<'a, [u8]>);

/// The boundary between the pipeline and whatever decodes raw input into records.
///
/// Borrowed results are only valid until the next call on the source.
pub trait RecordSource {
    /// Moves to the next record. Returns `false` once the input is exhausted or a terminal
    /// error occurred (see [`RecordSource::final_error`]).
    fn advance(&mut self) -> bool;

    /// The measurement name of the current record.
    fn measurement(&mut self) -> Result<Cow<'_, [u8]>, DecodeError>;

    /// The next tag pair of the current record, `Ok(None)` after the last one.
    fn next_tag(&mut self) -> Result<Option<Pair<'_>>, DecodeError>;

    /// The next field pair of the current record, `Ok(None)` after the last one.
    ///
    /// Any tags not yet consumed are skipped.
    fn next_field(&mut self) -> Result<Option<Pair<'_>>, DecodeError>;

    /// The error that ended the stream, if any.
    fn final_error(&self) -> Option<&io::Error>;
}

/// Which part of a record a pair belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    Tag,
    Field,
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairKind::Tag => f.write_str("tag"),
            PairKind::Field => f.write_str("field"),
        }
    }
}

/// Kinds of per-record decode failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("missing measurement")]
    MissingMeasurement,

    #[error("expected '=' after {0} key")]
    ExpectedEquals(PairKind),

    #[error("empty {0} key")]
    EmptyKey(PairKind),

    #[error("empty {0} value")]
    EmptyValue(PairKind),

    #[error("{0} key is not valid UTF-8")]
    InvalidUtf8(PairKind),

    #[error("unterminated string field value")]
    UnterminatedString,

    #[error("record has no fields")]
    MissingFields,

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

/// A failure decoding one unit (measurement or pair) of a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at column {column}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    /// 1-based byte offset into the line.
    pub column: usize,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, at: usize) -> Self {
        Self {
            kind,
            column: at + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Measurement,
    Tags,
    /// `first` is set until the first field pair has been attempted.
    Fields { first: bool },
    End,
}

/// Decodes line protocol from any buffered reader, one line per record.
///
/// Blank lines and lines starting with `#` are skipped and do not count as records.
///
/// # Example
///
/// ```rust
/// use lpscan::{LineProtocolDecoder, RecordSource};
///
/// let mut dec = LineProtocolDecoder::new(&b"cpu,host=a value=1i 1700000000\n"[..]);
/// assert!(dec.advance());
/// assert_eq!(&*dec.measurement().unwrap(), b"cpu");
/// let (k, v) = dec.next_tag().unwrap().unwrap();
/// assert_eq!((&*k, &*v), ("host", &b"a"[..]));
/// let (k, v) = dec.next_field().unwrap().unwrap();
/// assert_eq!((&*k, &*v), ("value", &b"1"[..]));
/// assert!(dec.next_field().unwrap().is_none());
/// assert!(!dec.advance());
/// ```
pub struct LineProtocolDecoder<R> {
    reader: R,
    line: Vec<u8>,
    body_start: usize,
    pos: usize,
    section: Section,
    line_number: usize,
    error: Option<io::Error>,
    exhausted: bool,
}

impl<R: BufRead> LineProtocolDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            body_start: 0,
            pos: 0,
            section: Section::End,
            line_number: 0,
            error: None,
            exhausted: false,
        }
    }

    /// 1-based number of the input line holding the current record.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn skip_measurement(&mut self) {
        let (end, _) = scan(&self.line, self.body_start, b", ");
        self.pos = end;
        self.section = if end == self.body_start {
            Section::End
        } else {
            Section::Tags
        };
    }
}

impl<R: BufRead> RecordSource for LineProtocolDecoder<R> {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.exhausted = true;
                    self.section = Section::End;
                    return false;
                }
                Ok(_) => {
                    self.line_number += 1;
                    while matches!(self.line.last(), Some(b'\n') | Some(b'\r')) {
                        self.line.pop();
                    }
                    let start = self
                        .line
                        .iter()
                        .position(|b| *b != b' ' && *b != b'\t')
                        .unwrap_or(self.line.len());
                    if start == self.line.len() || self.line[start] == b'#' {
                        trace!(line = self.line_number, "Skipping blank or comment line");
                        continue;
                    }
                    self.body_start = start;
                    self.pos = start;
                    self.section = Section::Measurement;
                    return true;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.error = Some(e);
                    self.exhausted = true;
                    self.section = Section::End;
                    return false;
                }
            }
        }
    }

    fn measurement(&mut self) -> Result<Cow<'_, [u8]>, DecodeError> {
        let line = &self.line;
        let start = self.body_start;
        let (end, escaped) = scan(line, start, b", ");
        if self.section == Section::Measurement {
            self.pos = end;
            self.section = Section::Tags;
        }
        if end == start {
            self.section = Section::End;
            return Err(DecodeError::new(DecodeErrorKind::MissingMeasurement, start));
        }
        Ok(token(&line[start..end], escaped))
    }

    fn next_tag(&mut self) -> Result<Option<Pair<'_>>, DecodeError> {
        if self.section == Section::Measurement {
            self.skip_measurement();
        }
        if self.section != Section::Tags {
            return Ok(None);
        }

        let line = &self.line;
        match line.get(self.pos) {
            Some(b',') => self.pos += 1,
            Some(b' ') | None => {
                let mut pos = self.pos;
                while line.get(pos) == Some(&b' ') {
                    pos += 1;
                }
                self.pos = pos;
                self.section = Section::Fields { first: true };
                return Ok(None);
            }
            Some(&b) => {
                let at = self.pos;
                self.pos = scan(line, at + 1, b", ").0;
                return Err(DecodeError::new(
                    DecodeErrorKind::UnexpectedChar(b as char),
                    at,
                ));
            }
        }

        let start = self.pos;
        let (key_end, key_escaped) = scan(line, start, b"=, ");
        if line.get(key_end) != Some(&b'=') {
            self.pos = key_end;
            return Err(DecodeError::new(
                DecodeErrorKind::ExpectedEquals(PairKind::Tag),
                key_end,
            ));
        }
        let (value_end, value_escaped) = scan(line, key_end + 1, b", ");
        self.pos = value_end;

        if key_end == start {
            return Err(DecodeError::new(
                DecodeErrorKind::EmptyKey(PairKind::Tag),
                start,
            ));
        }
        if value_end == key_end + 1 {
            return Err(DecodeError::new(
                DecodeErrorKind::EmptyValue(PairKind::Tag),
                value_end,
            ));
        }
        let key = key_text(token(&line[start..key_end], key_escaped))
            .ok_or_else(|| DecodeError::new(DecodeErrorKind::InvalidUtf8(PairKind::Tag), start))?;
        let value = token(&line[key_end + 1..value_end], value_escaped);
        Ok(Some((key, value)))
    }

    fn next_field(&mut self) -> Result<Option<Pair<'_>>, DecodeError> {
        if self.section == Section::Measurement {
            self.skip_measurement();
        }
        while self.section == Section::Tags {
            let _ = self.next_tag();
        }
        let first = match self.section {
            Section::Fields { first } => first,
            _ => return Ok(None),
        };

        let line = &self.line;
        if first {
            if self.pos >= line.len() {
                self.section = Section::End;
                return Err(DecodeError::new(DecodeErrorKind::MissingFields, self.pos));
            }
            self.section = Section::Fields { first: false };
        } else {
            match line.get(self.pos) {
                Some(b',') => self.pos += 1,
                // Whatever follows the field set is the timestamp.
                Some(b' ') | None => {
                    self.section = Section::End;
                    return Ok(None);
                }
                Some(&b) => {
                    let at = self.pos;
                    self.pos = resync_field(line, at);
                    return Err(DecodeError::new(
                        DecodeErrorKind::UnexpectedChar(b as char),
                        at,
                    ));
                }
            }
        }

        let start = self.pos;
        let (key_end, key_escaped) = scan(line, start, b"=, ");
        if line.get(key_end) != Some(&b'=') {
            self.pos = key_end;
            return Err(DecodeError::new(
                DecodeErrorKind::ExpectedEquals(PairKind::Field),
                key_end,
            ));
        }
        if key_end == start {
            self.pos = resync_field(line, key_end + 1);
            return Err(DecodeError::new(
                DecodeErrorKind::EmptyKey(PairKind::Field),
                start,
            ));
        }

        let value_start = key_end + 1;
        let value = if line.get(value_start) == Some(&b'"') {
            match scan_quoted(line, value_start + 1) {
                Some((close, escaped)) => {
                    self.pos = close + 1;
                    let raw = &line[value_start + 1..close];
                    if escaped {
                        Cow::Owned(unescape_string(raw))
                    } else {
                        Cow::Borrowed(raw)
                    }
                }
                None => {
                    self.section = Section::End;
                    return Err(DecodeError::new(
                        DecodeErrorKind::UnterminatedString,
                        value_start,
                    ));
                }
            }
        } else {
            let (value_end, _) = scan(line, value_start, b", ");
            self.pos = value_end;
            if value_end == value_start {
                return Err(DecodeError::new(
                    DecodeErrorKind::EmptyValue(PairKind::Field),
                    value_start,
                ));
            }
            Cow::Borrowed(strip_integer_suffix(&line[value_start..value_end]))
        };

        let key = key_text(token(&line[start..key_end], key_escaped)).ok_or_else(|| {
            DecodeError::new(DecodeErrorKind::InvalidUtf8(PairKind::Field), start)
        })?;
        Ok(Some((key, value)))
    }

    fn final_error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }
}

/// Bookkeeping for the record currently flowing through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordContext {
    /// 1-based record number, counting every record the source produced.
    pub number: u64,
    /// Pairs of this record that failed to decode and were skipped.
    pub decode_errors: u64,
}

impl RecordContext {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            decode_errors: 0,
        }
    }
}

/// Feeds every decodable tag pair of the current record to `f`, logging and skipping the
/// pairs that fail.
pub fn for_each_tag<S, F>(source: &mut S, ctx: &mut RecordContext, mut f: F)
where
    S: RecordSource + ?Sized,
    F: FnMut(&str, &[u8]),
{
    loop {
        match source.next_tag() {
            Ok(Some((key, value))) => f(&key, &value),
            Ok(None) => break,
            Err(e) => {
                warn!(record = ctx.number, error = %e, "skipping tag");
                ctx.decode_errors += 1;
            }
        }
    }
}

/// Field counterpart of [`for_each_tag`].
pub fn for_each_field<S, F>(source: &mut S, ctx: &mut RecordContext, mut f: F)
where
    S: RecordSource + ?Sized,
    F: FnMut(&str, &[u8]),
{
    loop {
        match source.next_field() {
            Ok(Some((key, value))) => f(&key, &value),
            Ok(None) => break,
            Err(e) => {
                warn!(record = ctx.number, error = %e, "skipping field");
                ctx.decode_errors += 1;
            }
        }
    }
}

/// Scans from `start` to the first unescaped byte in `stops` (or the end of the line).
/// Returns the stop position and whether a backslash escape was crossed.
fn scan(line: &[u8], start: usize, stops: &[u8]) -> (usize, bool) {
    let mut i = start;
    let mut escaped = false;
    while i < line.len() {
        let b = line[i];
        if b == b'\\' {
            escaped = true;
            i = (i + 2).min(line.len());
            continue;
        }
        if stops.contains(&b) {
            break;
        }
        i += 1;
    }
    (i, escaped)
}

/// Finds the closing quote of a string value whose body starts at `start`.
fn scan_quoted(line: &[u8], start: usize) -> Option<(usize, bool)> {
    let mut i = start;
    let mut escaped = false;
    while i < line.len() {
        match line[i] {
            b'\\' => {
                escaped = true;
                i += 2;
            }
            b'"' => return Some((i, escaped)),
            _ => i += 1,
        }
    }
    None
}

/// Skips the rest of a broken field pair, stepping over quoted sections.
fn resync_field(line: &[u8], start: usize) -> usize {
    let mut i = start;
    let mut quoted = false;
    while i < line.len() {
        match line[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' => quoted = !quoted,
            b',' | b' ' if !quoted => break,
            _ => {}
        }
        i += 1;
    }
    i.min(line.len())
}

fn token(raw: &[u8], escaped: bool) -> Cow<'_, [u8]> {
    if escaped {
        Cow::Owned(unescape_identifier(raw))
    } else {
        Cow::Borrowed(raw)
    }
}

fn key_text(raw: Cow<'_, [u8]>) -> Option<Cow<'_, str>> {
    match raw {
        Cow::Borrowed(b) => std::str::from_utf8(b).ok().map(Cow::Borrowed),
        Cow::Owned(v) => String::from_utf8(v).ok().map(Cow::Owned),
    }
}

fn unescape_identifier(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == b'\\' {
            if let Some(&next) = bytes.peek().filter(|n| matches!(n, b',' | b'=' | b' ' | b'\\')) {
                out.push(next);
                bytes.next();
                continue;
            }
        }
        out.push(b);
    }
    out
}

fn unescape_string(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == b'\\' {
            if let Some(&next) = bytes.peek().filter(|n| matches!(n, b'"' | b'\\')) {
                out.push(next);
                bytes.next();
                continue;
            }
        }
        out.push(b);
    }
    out
}

/// `42i` and `42u` are written as `42`.
fn strip_integer_suffix(value: &[u8]) -> &[u8] {
    match value.split_last() {
        Some((b'i' | b'u', digits)) if is_integer(digits) => digits,
        _ => value,
    }
}

fn is_integer(digits: &[u8]) -> bool {
    let digits = match digits.first() {
        Some(b'-' | b'+') => &digits[1..],
        _ => digits,
    };
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read};

    fn decoder(input: &str) -> LineProtocolDecoder<&[u8]> {
        LineProtocolDecoder::new(input.as_bytes())
    }

    fn tags<S: RecordSource>(src: &mut S) -> Vec<(String, String)> {
        let mut out = vec![];
        loop {
            match src.next_tag() {
                Ok(Some((k, v))) => out.push((k.into_owned(), String::from_utf8_lossy(&v).into())),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        out
    }

    fn fields<S: RecordSource>(src: &mut S) -> Vec<(String, String)> {
        let mut out = vec![];
        loop {
            match src.next_field() {
                Ok(Some((k, v))) => out.push((k.into_owned(), String::from_utf8_lossy(&v).into())),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        out
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_decode_simple_record() {
        let mut dec = decoder("cpu,host=server01,region=us-west usage=0.64,count=3i 1234567890\n");
        assert!(dec.advance());
        assert_eq!(&*dec.measurement().unwrap(), b"cpu");
        assert_eq!(
            tags(&mut dec),
            pairs(&[("host", "server01"), ("region", "us-west")])
        );
        assert_eq!(fields(&mut dec), pairs(&[("usage", "0.64"), ("count", "3")]));
        assert!(!dec.advance());
        assert!(dec.final_error().is_none());
    }

    #[test]
    fn test_record_without_tags() {
        let mut dec = decoder("temperature value=25.5");
        assert!(dec.advance());
        assert_eq!(&*dec.measurement().unwrap(), b"temperature");
        assert!(tags(&mut dec).is_empty());
        assert_eq!(fields(&mut dec), pairs(&[("value", "25.5")]));
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let mut dec = decoder("\n# a comment\n   \ncpu v=1\r\n\nmem v=2\n");
        let mut names = vec![];
        while dec.advance() {
            names.push(String::from_utf8_lossy(&dec.measurement().unwrap()).into_owned());
        }
        assert_eq!(names, vec!["cpu", "mem"]);
    }

    #[test]
    fn test_escaped_identifiers() {
        let mut dec = decoder(r#"my\ meas,tag\,key=a\ b\=c field\=x=1"#);
        assert!(dec.advance());
        assert_eq!(&*dec.measurement().unwrap(), b"my meas");
        assert_eq!(tags(&mut dec), pairs(&[("tag,key", "a b=c")]));
        assert_eq!(fields(&mut dec), pairs(&[("field=x", "1")]));
    }

    #[test]
    fn test_quoted_string_fields() {
        let mut dec = decoder(r#"events message="system started, ok",quote="say \"hi\"",code=200i 1234"#);
        assert!(dec.advance());
        assert_eq!(
            fields(&mut dec),
            pairs(&[
                ("message", "system started, ok"),
                ("quote", r#"say "hi""#),
                ("code", "200"),
            ])
        );
    }

    #[test]
    fn test_integer_suffix_only_stripped_from_integers() {
        assert_eq!(strip_integer_suffix(b"-12i"), b"-12");
        assert_eq!(strip_integer_suffix(b"12u"), b"12");
        assert_eq!(strip_integer_suffix(b"1.5"), b"1.5");
        assert_eq!(strip_integer_suffix(b"i"), b"i");
        assert_eq!(strip_integer_suffix(b"t"), b"t");
    }

    #[test]
    fn test_malformed_tag_is_skipped_and_rest_decodes() {
        let mut dec = decoder("cpu,broken,host=a,=x,region=eu v=1");
        assert!(dec.advance());
        dec.measurement().unwrap();

        let err = dec.next_tag().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::ExpectedEquals(PairKind::Tag));
        let (k, v) = dec.next_tag().unwrap().unwrap();
        assert_eq!((&*k, &*v), ("host", &b"a"[..]));
        let err = dec.next_tag().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::EmptyKey(PairKind::Tag));
        let (k, v) = dec.next_tag().unwrap().unwrap();
        assert_eq!((&*k, &*v), ("region", &b"eu"[..]));
        assert!(dec.next_tag().unwrap().is_none());
        assert_eq!(fields(&mut dec), pairs(&[("v", "1")]));
    }

    #[test]
    fn test_malformed_field_is_skipped_and_rest_decodes() {
        let mut dec = decoder(r#"cpu a=,b="x"junk,c=3"#);
        assert!(dec.advance());
        let err = dec.next_field().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::EmptyValue(PairKind::Field));
        let (k, v) = dec.next_field().unwrap().unwrap();
        assert_eq!((&*k, &*v), ("b", &b"x"[..]));
        let err = dec.next_field().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedChar('j'));
        let (k, v) = dec.next_field().unwrap().unwrap();
        assert_eq!((&*k, &*v), ("c", &b"3"[..]));
        assert!(dec.next_field().unwrap().is_none());
    }

    #[test]
    fn test_unterminated_string_ends_field_stream() {
        let mut dec = decoder(r#"cpu a=1,b="open"#);
        assert!(dec.advance());
        assert!(dec.next_field().unwrap().is_some());
        let err = dec.next_field().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnterminatedString);
        assert_eq!(err.column, 11);
        assert!(dec.next_field().unwrap().is_none());
    }

    #[test]
    fn test_missing_measurement_and_fields() {
        let mut dec = decoder(",host=a v=1\ncpu,host=a\n");
        assert!(dec.advance());
        let err = dec.measurement().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MissingMeasurement);
        assert!(dec.next_tag().unwrap().is_none());

        assert!(dec.advance());
        assert_eq!(dec.line_number(), 2);
        assert_eq!(tags(&mut dec), pairs(&[("host", "a")]));
        let err = dec.next_field().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MissingFields);
        assert!(dec.next_field().unwrap().is_none());
    }

    #[test]
    fn test_next_field_skips_unread_tags() {
        let mut dec = decoder("cpu,host=a,region=b v=1,w=2 99");
        assert!(dec.advance());
        assert_eq!(fields(&mut dec), pairs(&[("v", "1"), ("w", "2")]));
        assert!(dec.next_tag().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_key_is_a_pair_error() {
        let mut dec = LineProtocolDecoder::new(&b"cpu,\xff=a,ok=b v=1"[..]);
        assert!(dec.advance());
        let err = dec.next_tag().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidUtf8(PairKind::Tag));
        let (k, _) = dec.next_tag().unwrap().unwrap();
        assert_eq!(&*k, "ok");
    }

    #[test]
    fn test_pair_helpers_count_skipped_pairs() {
        let mut dec = decoder("cpu,a=1,oops,b=2 x=1,y=,z=3");
        assert!(dec.advance());
        let mut ctx = RecordContext::new(7);
        let mut seen = vec![];
        for_each_tag(&mut dec, &mut ctx, |k, _| seen.push(k.to_string()));
        for_each_field(&mut dec, &mut ctx, |k, _| seen.push(k.to_string()));
        assert_eq!(seen, vec!["a", "b", "x", "z"]);
        assert_eq!(ctx.decode_errors, 2);
        assert_eq!(ctx.number, 7);
    }

    struct FailingReader {
        data: &'static [u8],
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_terminal_read_error_is_reported() {
        let reader = BufReader::new(FailingReader {
            data: b"cpu v=1\n",
        });
        let mut dec = LineProtocolDecoder::new(reader);
        assert!(dec.advance());
        assert!(!dec.advance());
        assert!(!dec.advance());
        let err = dec.final_error().expect("read error should be kept");
        assert_eq!(err.to_string(), "disk on fire");
    }
}
