//! Worker fan-out, cross-worker merge, and report generation.

use std::io::Write;
use std::ops::Range;
use std::str;
use std::thread;

use crate::error::Error;
use crate::partition::partition;
use crate::scan::{parse_record, SCAN_PADDING};
use crate::table::{AggregateTable, CityAggregate, TableConfig};

/// A borrowed view of the input: `len` logical bytes followed by at least
/// [`SCAN_PADDING`] readable bytes, so vectorized lookahead near the end of
/// the data stays inside the buffer.
#[derive(Clone, Copy)]
pub struct Input<'a> {
    bytes: &'a [u8],
    len: usize,
}

impl<'a> Input<'a> {
    /// Wraps a pre-padded buffer.
    ///
    /// # Panics
    /// Panics if `bytes` does not carry the scan padding past `len`; that
    /// is a caller bug at the mapping boundary, not an input error.
    pub fn new(bytes: &'a [u8], len: usize) -> Self {
        assert!(
            len + SCAN_PADDING <= bytes.len(),
            "input buffer lacks scan padding"
        );
        Self { bytes, len }
    }

    fn logical(&self) -> &'a [u8] {
        &self.bytes[..self.len]
    }

    fn padded(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Owns a copy of the input with the scan padding appended. For callers
/// without a pre-padded mapping, and for tests.
pub struct OwnedInput {
    buf: Vec<u8>,
    len: usize,
}

impl OwnedInput {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(data.len() + SCAN_PADDING);
        buf.extend_from_slice(data);
        buf.resize(data.len() + SCAN_PADDING, 0);
        Self {
            buf,
            len: data.len(),
        }
    }

    pub fn as_input(&self) -> Input<'_> {
        Input::new(&self.buf, self.len)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub workers: usize,
    pub table: TableConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            table: TableConfig::default(),
        }
    }
}

/// One worker per logical processing unit.
pub fn default_workers() -> usize {
    match thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(_) => {
            eprintln!("couldn't query the available parallelism, going single-threaded");
            1
        }
    }
}

/// Diagnostics the coordinator aggregates across the run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub distinct: usize,
    pub records: u64,
    pub max_probe: usize,
}

/// Scans one record-aligned range into the worker's own table and hands
/// the table back through the return value.
fn scan_range<'a>(
    input: Input<'a>,
    range: Range<usize>,
    mut table: AggregateTable<'a>,
) -> Result<(AggregateTable<'a>, u64), Error> {
    let buf = input.padded();
    let mut pos = range.start;
    let mut records = 0;
    while pos < range.end {
        let record = parse_record(buf, pos, range.end)?;
        table.insert(record.name, record.value)?;
        pos += record.len;
        records += 1;
    }
    Ok((table, records))
}

/// Runs the whole pipeline: partition, parallel scan, merge, sort, report.
///
/// For a fixed input and worker count the output is byte-identical across
/// runs, and the aggregates themselves do not depend on the worker count.
pub fn run(input: Input<'_>, config: &EngineConfig, out: &mut impl Write) -> Result<RunSummary, Error> {
    let workers = config.workers.max(1);
    let ranges = partition(input.logical(), workers)?;

    // each worker's table is built up front and moved into its thread;
    // ownership comes back through the join
    let mut tables = Vec::with_capacity(ranges.len());
    for _ in 0..ranges.len() {
        tables.push(AggregateTable::new(&config.table)?);
    }

    let results: Vec<Result<(AggregateTable, u64), Error>> = thread::scope(|s| {
        let handles: Vec<_> = ranges
            .into_iter()
            .zip(tables)
            .map(|(range, table)| s.spawn(move || scan_range(input, range, table)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread panicked"))
            .collect()
    });

    // fold every later table into the first, in worker order; the result
    // does not depend on the order, but a fixed order keeps runs
    // reproducible bit-for-bit
    let mut summary = RunSummary::default();
    let mut merged: Option<AggregateTable> = None;
    for result in results {
        let (table, records) = result?;
        summary.records += records;
        summary.max_probe = summary.max_probe.max(table.max_probe());
        match &mut merged {
            None => merged = Some(table),
            Some(primary) => {
                for aggregate in table.iter() {
                    primary.merge(aggregate)?;
                }
            }
        }
    }
    let merged = merged.expect("at least one worker");
    summary.max_probe = summary.max_probe.max(merged.max_probe());

    let mut aggregates: Vec<&CityAggregate> = merged.iter().collect();
    aggregates.sort_unstable_by_key(|aggregate| aggregate.name);
    summary.distinct = aggregates.len();

    // validate names before writing anything, so a bad name can't leave a
    // truncated report behind
    let mut rows = Vec::with_capacity(aggregates.len());
    for aggregate in aggregates {
        let name = str::from_utf8(aggregate.name).map_err(|_| Error::InvalidName {
            name: String::from_utf8_lossy(aggregate.name).into_owned(),
        })?;
        rows.push((name, aggregate));
    }

    for (name, aggregate) in rows {
        let avg = aggregate.sum as f64 / 10.0 / aggregate.count as f64;
        writeln!(
            out,
            "{}={:.1}/{:.1}/{:.1}",
            name,
            f64::from(aggregate.min) / 10.0,
            avg,
            f64::from(aggregate.max) / 10.0
        )?;
    }
    writeln!(out, "Distinct cities: {}", summary.distinct)?;

    Ok(summary)
}

#[cfg(test)]
mod test {
    use crate::engine::{run, EngineConfig, OwnedInput};
    use crate::error::Error;
    use crate::table::TableConfig;

    fn config(workers: usize) -> EngineConfig {
        EngineConfig {
            workers,
            table: TableConfig::default(),
        }
    }

    fn run_to_string(input: &str, config: &EngineConfig) -> String {
        let owned = OwnedInput::from_bytes(input.as_bytes());
        let mut out = Vec::new();
        run(owned.as_input(), config, &mut out)
            .unwrap_or_else(|e| panic!("unexpected error {e} for input `{input}`"));
        String::from_utf8(out).expect("report should be UTF-8")
    }

    #[test]
    fn aggregates_and_sorts() {
        let out = run_to_string("Hamburg;12.3\nHamburg;-4.5\nBerlin;0.0\n", &config(1));
        assert_eq!(
            "Berlin=0.0/0.0/0.0\nHamburg=-4.5/3.9/12.3\nDistinct cities: 2\n",
            out
        );
    }

    #[test]
    fn single_line_with_surplus_workers() {
        let out = run_to_string("Solo;1.0\n", &config(8));
        assert_eq!("Solo=1.0/1.0/1.0\nDistinct cities: 1\n", out);
    }

    #[test]
    fn empty_input_reports_zero_names() {
        let out = run_to_string("", &config(4));
        assert_eq!("Distinct cities: 0\n", out);
    }

    #[test]
    fn prefix_names_sort_before_extensions() {
        let out = run_to_string("abc;1.0\nab;2.0\nabcd;3.0\n", &config(1));
        assert_eq!(
            "ab=2.0/2.0/2.0\nabc=1.0/1.0/1.0\nabcd=3.0/3.0/3.0\nDistinct cities: 3\n",
            out
        );
    }

    #[test]
    fn true_average_not_fixed_point_truncation() {
        // 0.1 + 0.2 over two records: the true average is 0.15, printed as
        // 0.1 or 0.2 only through float rounding of 0.15, never through
        // integer truncation of the scaled sum
        let out = run_to_string("a;0.1\na;0.2\n", &config(1));
        assert_eq!("a=0.1/0.1/0.2\nDistinct cities: 1\n", out);
    }

    /// Deterministic synthetic input: `lines` records over `names` names.
    fn synthetic(names: &[&str], lines: usize) -> String {
        let mut input = String::new();
        for i in 0..lines {
            let value = (i as i32 * 7 + 13) % 1999 - 999;
            input.push_str(names[i % names.len()]);
            input.push(';');
            if value < 0 {
                input.push('-');
            }
            input.push_str(&format!("{}.{}", value.abs() / 10, value.abs() % 10));
            input.push('\n');
        }
        input
    }

    #[test]
    fn worker_count_does_not_change_results() {
        let names = ["Berlin", "Hamburg", "Jakarta", "Lima", "Oslo"];
        let input = synthetic(&names, 10_000);
        let reference = run_to_string(&input, &config(1));
        assert!(reference.ends_with("Distinct cities: 5\n"));
        for workers in [2, 4, 8] {
            let out = run_to_string(&input, &config(workers));
            assert_eq!(
                reference, out,
                "output changed when going from 1 to {workers} workers"
            );
        }
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let input = synthetic(&["a", "b", "c"], 1_000);
        let first = run_to_string(&input, &config(4));
        let second = run_to_string(&input, &config(4));
        assert_eq!(first, second);
    }

    #[test]
    fn matches_naive_aggregation() {
        use std::collections::BTreeMap;

        let names = ["x", "y", "zz"];
        let input = synthetic(&names, 997);
        let mut expected: BTreeMap<&str, (i32, i32, i64, u64)> = BTreeMap::new();
        for line in input.lines() {
            let (name, value) = line.split_once(';').unwrap();
            let scaled = (value.parse::<f64>().unwrap() * 10.0).round() as i32;
            let entry = expected.entry(name).or_insert((scaled, scaled, 0, 0));
            entry.0 = entry.0.min(scaled);
            entry.1 = entry.1.max(scaled);
            entry.2 += i64::from(scaled);
            entry.3 += 1;
        }

        let mut want = String::new();
        for (name, (min, max, sum, count)) in expected {
            want.push_str(&format!(
                "{}={:.1}/{:.1}/{:.1}\n",
                name,
                f64::from(min) / 10.0,
                sum as f64 / 10.0 / count as f64,
                f64::from(max) / 10.0
            ));
        }
        want.push_str("Distinct cities: 3\n");

        assert_eq!(want, run_to_string(&input, &config(3)));
    }

    #[test]
    fn worker_parse_error_aborts_run() {
        let owned = OwnedInput::from_bytes(b"good;1.0\nbad;oops\n");
        let mut out = Vec::new();
        match run(owned.as_input(), &config(2), &mut out) {
            Err(Error::Malformed { byte: b'o', .. }) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn table_overflow_aborts_run() {
        let owned = OwnedInput::from_bytes(b"a;1.0\nb;2.0\nc;3.0\n");
        let mut out = Vec::new();
        let config = EngineConfig {
            workers: 1,
            table: TableConfig {
                capacity: 2,
                ..TableConfig::default()
            },
        };
        match run(owned.as_input(), &config, &mut out) {
            Err(Error::TableFull { capacity: 2 }) => {}
            other => panic!("expected TableFull, got {other:?}"),
        }
    }

    #[test]
    fn summary_counts_records_and_names() {
        let owned = OwnedInput::from_bytes(b"a;1.0\nb;2.0\na;3.0\n");
        let mut out = Vec::new();
        let summary = run(owned.as_input(), &config(2), &mut out).unwrap();
        assert_eq!(3, summary.records);
        assert_eq!(2, summary.distinct);
        assert!(summary.max_probe < TableConfig::default().capacity);
    }
}
