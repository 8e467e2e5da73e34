//! Benchmark list: one line per (group, mode) with every resolved knob, read
//! back by the launcher instead of re-discovering benchmarks.
//!
//! A line is `MBL <version>` followed by space-separated tagged fields in a
//! fixed order. Every optional field is either `E` (no value) or a tag with
//! its payload:
//!
//! | tag | payload |
//! |---|---|
//! | `I n` | integer |
//! | `S len text` | string of `len` bytes, may contain spaces |
//! | `TV len text` | time value such as `10 s` |
//! | `TU len text` | time unit label |
//! | `SC count S...` | string collection |
//! | `PM count (S key SC...)...` | param name to values |
//! | `IA count n...` | integer array, never empty-tagged |
//!
//! Payloads escape backslash, line feed and carriage return as `\\`, `\n`
//! and `\r`, so a line never breaks; `len` counts the escaped bytes.

use std::collections::BTreeMap;

use crate::error::{GenerationError, Result};
use crate::mode::Mode;
use crate::time::{TimeUnit, TimeValue};

/// Resource the list is written to.
pub const RESOURCE: &str = "microbench/BenchmarkList";

const MAGIC: &str = "MBL";
const VERSION: u32 = 1;

/// Resolved configuration of one group under one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkListEntry {
    pub user_class: String,
    pub generated_class: String,
    /// Group name; the method name for single-method groups.
    pub method: String,
    pub mode: Mode,
    pub threads: Option<i32>,
    pub thread_groups: Vec<i32>,
    pub thread_group_labels: Option<Vec<String>>,
    pub warmup_iterations: Option<i32>,
    pub warmup_time: Option<TimeValue>,
    pub warmup_batch_size: Option<i32>,
    pub measurement_iterations: Option<i32>,
    pub measurement_time: Option<TimeValue>,
    pub measurement_batch_size: Option<i32>,
    pub forks: Option<i32>,
    pub warmup_forks: Option<i32>,
    pub fork_executable: Option<String>,
    pub fork_args: Option<Vec<String>>,
    pub fork_args_prepend: Option<Vec<String>>,
    pub fork_args_append: Option<Vec<String>>,
    pub params: Option<BTreeMap<String, Vec<String>>>,
    pub time_unit: Option<TimeUnit>,
    pub ops_per_invocation: Option<i32>,
    pub timeout: Option<TimeValue>,
}

impl BenchmarkListEntry {
    /// An entry with every optional knob absent.
    pub fn new(
        user_class: impl Into<String>,
        generated_class: impl Into<String>,
        method: impl Into<String>,
        mode: Mode,
    ) -> Self {
        Self {
            user_class: user_class.into(),
            generated_class: generated_class.into(),
            method: method.into(),
            mode,
            threads: None,
            thread_groups: vec![1],
            thread_group_labels: None,
            warmup_iterations: None,
            warmup_time: None,
            warmup_batch_size: None,
            measurement_iterations: None,
            measurement_time: None,
            measurement_batch_size: None,
            forks: None,
            warmup_forks: None,
            fork_executable: None,
            fork_args: None,
            fork_args_prepend: None,
            fork_args_append: None,
            params: None,
            time_unit: None,
            ops_per_invocation: None,
            timeout: None,
        }
    }

    /// `org.a.B.measure`, the name benchmarks are filtered and reported by.
    pub fn username(&self) -> String {
        format!("{}.{}", self.user_class, self.method)
    }

    pub fn to_line(&self) -> String {
        let mut w = LineWriter::default();
        w.raw(MAGIC);
        w.raw(&VERSION.to_string());
        w.string(&self.user_class);
        w.string(&self.generated_class);
        w.string(&self.method);
        w.string(self.mode.short_label());
        w.opt_int(self.threads);
        w.int_array(&self.thread_groups);
        w.opt_strings(self.thread_group_labels.as_deref());
        w.opt_int(self.warmup_iterations);
        w.opt_time(self.warmup_time);
        w.opt_int(self.warmup_batch_size);
        w.opt_int(self.measurement_iterations);
        w.opt_time(self.measurement_time);
        w.opt_int(self.measurement_batch_size);
        w.opt_int(self.forks);
        w.opt_int(self.warmup_forks);
        w.opt_string(self.fork_executable.as_deref());
        w.opt_strings(self.fork_args.as_deref());
        w.opt_strings(self.fork_args_prepend.as_deref());
        w.opt_strings(self.fork_args_append.as_deref());
        w.opt_params(self.params.as_ref());
        w.opt_unit(self.time_unit);
        w.opt_int(self.ops_per_invocation);
        w.opt_time(self.timeout);
        w.finish()
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let mut r = LineReader::new(line);
        let magic = r.token()?;
        if magic != MAGIC {
            return Err(GenerationError::list_format(format!(
                "not a benchmark list line: {magic}"
            )));
        }
        let version = r.token()?;
        if version != VERSION.to_string() {
            return Err(GenerationError::list_format(format!(
                "unsupported benchmark list version {version}, expected {VERSION}"
            )));
        }
        let user_class = r.string()?;
        let generated_class = r.string()?;
        let method = r.string()?;
        let mode = r
            .string()?
            .parse::<Mode>()
            .map_err(GenerationError::list_format)?;
        let entry = Self {
            user_class,
            generated_class,
            method,
            mode,
            threads: r.opt_int()?,
            thread_groups: r.int_array()?,
            thread_group_labels: r.opt_strings()?,
            warmup_iterations: r.opt_int()?,
            warmup_time: r.opt_time()?,
            warmup_batch_size: r.opt_int()?,
            measurement_iterations: r.opt_int()?,
            measurement_time: r.opt_time()?,
            measurement_batch_size: r.opt_int()?,
            forks: r.opt_int()?,
            warmup_forks: r.opt_int()?,
            fork_executable: r.opt_string()?,
            fork_args: r.opt_strings()?,
            fork_args_prepend: r.opt_strings()?,
            fork_args_append: r.opt_strings()?,
            params: r.opt_params()?,
            time_unit: r.opt_unit()?,
            ops_per_invocation: r.opt_int()?,
            timeout: r.opt_time()?,
        };
        r.end()?;
        Ok(entry)
    }
}

/// The whole list, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchmarkList {
    entries: Vec<BenchmarkListEntry>,
}

impl BenchmarkList {
    pub fn new(mut entries: Vec<BenchmarkListEntry>) -> Self {
        entries.sort_by(|a, b| {
            (&a.user_class, &a.method, a.mode).cmp(&(&b.user_class, &b.method, b.mode))
        });
        entries.dedup();
        Self { entries }
    }

    pub fn entries(&self) -> &[BenchmarkListEntry] {
        &self.entries
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&e.to_line());
            out.push('\n');
        }
        out
    }

    /// Parse a rendered list. Blank lines are skipped; any malformed line
    /// fails the whole read.
    pub fn read(text: &str) -> Result<Self> {
        let entries = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(BenchmarkListEntry::from_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(entries))
    }
}

#[derive(Default)]
struct LineWriter {
    parts: Vec<String>,
}

impl LineWriter {
    fn raw(&mut self, s: &str) {
        self.parts.push(s.to_string());
    }

    fn empty(&mut self) {
        self.raw("E");
    }

    fn tagged(&mut self, tag: &str, s: &str) {
        let s = escape(s);
        self.parts.push(format!("{tag} {} {s}", s.len()));
    }

    fn string(&mut self, s: &str) {
        self.tagged("S", s);
    }

    fn opt_int(&mut self, v: Option<i32>) {
        match v {
            Some(n) => self.parts.push(format!("I {n}")),
            None => self.empty(),
        }
    }

    fn opt_string(&mut self, v: Option<&str>) {
        match v {
            Some(s) => self.string(s),
            None => self.empty(),
        }
    }

    fn opt_time(&mut self, v: Option<TimeValue>) {
        match v {
            Some(t) => self.tagged("TV", &t.to_string()),
            None => self.empty(),
        }
    }

    fn opt_unit(&mut self, v: Option<TimeUnit>) {
        match v {
            Some(u) => self.tagged("TU", u.label()),
            None => self.empty(),
        }
    }

    fn strings(&mut self, v: &[String]) {
        self.parts.push(format!("SC {}", v.len()));
        for s in v {
            self.string(s);
        }
    }

    fn opt_strings(&mut self, v: Option<&[String]>) {
        match v {
            Some(v) => self.strings(v),
            None => self.empty(),
        }
    }

    fn opt_params(&mut self, v: Option<&BTreeMap<String, Vec<String>>>) {
        let Some(map) = v else {
            self.empty();
            return;
        };
        self.parts.push(format!("PM {}", map.len()));
        for (key, values) in map {
            self.string(key);
            self.strings(values);
        }
    }

    fn int_array(&mut self, v: &[i32]) {
        self.parts.push(format!("IA {}", v.len()));
        for n in v {
            self.parts.push(n.to_string());
        }
    }

    fn finish(self) -> String {
        self.parts.join(" ")
    }
}

struct LineReader<'a> {
    rest: &'a str,
}

impl<'a> LineReader<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            rest: line.trim_end_matches(['\r', '\n']),
        }
    }

    fn error(&self, what: &str) -> GenerationError {
        GenerationError::list_format(format!("{what} at \"{}\"", preview(self.rest)))
    }

    /// Next space-delimited token.
    fn token(&mut self) -> Result<&'a str> {
        if self.rest.is_empty() {
            return Err(self.error("unexpected end of line"));
        }
        let (tok, rest) = match self.rest.find(' ') {
            Some(i) => (&self.rest[..i], &self.rest[i + 1..]),
            None => (self.rest, ""),
        };
        self.rest = rest;
        Ok(tok)
    }

    fn number<T: std::str::FromStr>(&mut self) -> Result<T> {
        let tok = self.token()?;
        tok.parse()
            .map_err(|_| GenerationError::list_format(format!("expected a number, got \"{tok}\"")))
    }

    fn expect_tag(&mut self, tag: &str) -> Result<()> {
        let tok = self.token()?;
        if tok != tag {
            return Err(GenerationError::list_format(format!(
                "expected tag {tag}, got \"{tok}\""
            )));
        }
        Ok(())
    }

    /// Payload of a length-prefixed field whose tag was already read.
    fn payload(&mut self) -> Result<String> {
        let len: usize = self.number()?;
        let text = self
            .rest
            .get(..len)
            .ok_or_else(|| self.error("string payload shorter than its length"))?;
        let after = &self.rest[len..];
        self.rest = match after.strip_prefix(' ') {
            Some(r) => r,
            None if after.is_empty() => after,
            None => return Err(self.error("missing separator after string payload")),
        };
        unescape(text).ok_or_else(|| self.error("bad escape in string payload"))
    }

    fn string(&mut self) -> Result<String> {
        self.expect_tag("S")?;
        self.payload()
    }

    /// Read the next tag; `None` when it is the empty marker.
    fn opt_tag(&mut self) -> Result<Option<&'a str>> {
        let tok = self.token()?;
        Ok(if tok == "E" { None } else { Some(tok) })
    }

    fn check_tag(&self, got: &str, want: &str) -> Result<()> {
        if got == want {
            Ok(())
        } else {
            Err(GenerationError::list_format(format!(
                "expected tag {want} or E, got \"{got}\""
            )))
        }
    }

    fn opt_int(&mut self) -> Result<Option<i32>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "I")?;
                Ok(Some(self.number()?))
            }
        }
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "S")?;
                self.payload().map(Some)
            }
        }
    }

    fn opt_time(&mut self) -> Result<Option<TimeValue>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "TV")?;
                let text = self.payload()?;
                text.parse().map(Some).map_err(GenerationError::list_format)
            }
        }
    }

    fn opt_unit(&mut self) -> Result<Option<TimeUnit>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "TU")?;
                let text = self.payload()?;
                text.parse().map(Some).map_err(GenerationError::list_format)
            }
        }
    }

    fn strings_body(&mut self) -> Result<Vec<String>> {
        let count: usize = self.number()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn opt_strings(&mut self) -> Result<Option<Vec<String>>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "SC")?;
                self.strings_body().map(Some)
            }
        }
    }

    fn opt_params(&mut self) -> Result<Option<BTreeMap<String, Vec<String>>>> {
        match self.opt_tag()? {
            None => Ok(None),
            Some(tag) => {
                self.check_tag(tag, "PM")?;
                let count: usize = self.number()?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let key = self.string()?;
                    self.expect_tag("SC")?;
                    map.insert(key, self.strings_body()?);
                }
                Ok(Some(map))
            }
        }
    }

    fn int_array(&mut self) -> Result<Vec<i32>> {
        self.expect_tag("IA")?;
        let count: usize = self.number()?;
        (0..count).map(|_| self.number()).collect()
    }

    fn end(&self) -> Result<()> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(self.error("trailing data"))
        }
    }
}

fn preview(s: &str) -> &str {
    match s.char_indices().nth(24) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn escape(s: &str) -> std::borrow::Cow<'_, str> {
    if !s.contains(['\\', '\n', '\r']) {
        return s.into();
    }
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.into()
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}
