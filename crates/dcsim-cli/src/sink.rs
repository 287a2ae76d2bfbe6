//! JSON-lines monitoring output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use dcsim_core::{DrDecision, MonitoringSink, SimError, SimResult, TickRecord};

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Row<'a> {
    Tick(&'a TickRecord),
    Decision(&'a DrDecision),
}

/// Writes one JSON object per tick and per DR decision.
pub struct JsonLinesSink<W: Write> {
    out: W,
    label: String,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> SimResult<Self> {
        let file = File::create(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file), path.display().to_string()))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            label: label.into(),
        }
    }

    pub fn flush(&mut self) -> SimResult<()> {
        self.out.flush().map_err(|source| self.io_error(source))
    }

    fn write_row(&mut self, row: &Row<'_>) -> SimResult<()> {
        let line = serde_json::to_string(row)?;
        writeln!(self.out, "{line}").map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> SimError {
        SimError::Io {
            path: self.label.clone(),
            source,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MonitoringSink for JsonLinesSink<W> {
    fn record_tick(&mut self, record: &TickRecord) -> SimResult<()> {
        self.write_row(&Row::Tick(record))
    }

    fn record_decision(&mut self, decision: &DrDecision) -> SimResult<()> {
        self.write_row(&Row::Decision(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_core::Direction;

    #[test]
    fn rows_are_tagged_one_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new(), "memory");
        let tick = TickRecord {
            tick: 3,
            occupied_nodes: 2,
            running_jobs: 1,
            waiting_jobs: 0,
            finished_jobs: 0,
            total_power_kw: 0.5,
            it_power_kw: 0.4,
            hvac_power_kw: 0.1,
            job_power_kw: 0.4,
            energy_cost: 0.01,
            sla_cost: 0.0,
        };
        let decision = DrDecision {
            tick: 3,
            request: 0,
            direction: Direction::Decrease,
            power_delta_kw: 0.2,
            window: 10,
            configuration: Some((0.5, 2.2)),
            fitted: true,
            shifted_node_steps: 4,
            additional_cost: Some(-1.0),
        };
        sink.record_tick(&tick).unwrap();
        sink.record_decision(&decision).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"], "tick");
        assert_eq!(lines[0]["occupied_nodes"], 2);
        assert_eq!(lines[1]["record"], "decision");
        assert_eq!(lines[1]["direction"], "positive");
    }
}
