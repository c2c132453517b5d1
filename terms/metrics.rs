//! Per-chip quality-control metrics and the tab-separated metrics report.

use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics output error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metric '{name}' reported for chip '{chip}' was never declared")]
    Undeclared { chip: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Double,
    Text,
}

/// The name and kind of a column in the metrics report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDeclaration {
    pub name: String,
    pub kind: MetricKind,
}

impl MetricDeclaration {
    pub fn double(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Double,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Double(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Double(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Double(v) => format!("{v:.6}"),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Double(value),
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Text(value.into()),
        }
    }
}

/// Every metric produced for one chip, in emission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChipMetrics {
    pub chip: String,
    pub metrics: Vec<Metric>,
}

impl ChipMetrics {
    pub fn new(chip: impl Into<String>) -> Self {
        Self {
            chip: chip.into(),
            metrics: Vec::new(),
        }
    }

    pub fn push(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|metric| metric.name == name)
            .map(|metric| &metric.value)
    }
}

/// A table of chips by declared metrics. Chips that skipped a metric leave
/// that cell empty.
#[derive(Debug, Clone, Default)]
pub struct MetricsReport {
    declarations: Vec<MetricDeclaration>,
    rows: Vec<ChipMetrics>,
}

impl MetricsReport {
    pub fn new(declarations: Vec<MetricDeclaration>) -> Self {
        Self {
            declarations,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ChipMetrics] {
        &self.rows
    }

    pub fn push(&mut self, chip: ChipMetrics) -> Result<(), MetricsError> {
        for metric in &chip.metrics {
            if !self.declarations.iter().any(|d| d.name == metric.name) {
                return Err(MetricsError::Undeclared {
                    chip: chip.chip.clone(),
                    name: metric.name.clone(),
                });
            }
        }
        self.rows.push(chip);
        Ok(())
    }

    /// Writes a `chip` column followed by one column per declaration.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), MetricsError> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = Vec::with_capacity(self.declarations.len() + 1);
        header.push("chip");
        header.extend(self.declarations.iter().map(|d| d.name.as_str()));
        out.write_record(&header)?;

        for row in &self.rows {
            let by_name: HashMap<&str, &MetricValue> = row
                .metrics
                .iter()
                .map(|m| (m.name.as_str(), &m.value))
                .collect();
            let mut record = Vec::with_capacity(header.len());
            record.push(row.chip.clone());
            for declaration in &self.declarations {
                record.push(
                    by_name
                        .get(declaration.name.as_str())
                        .map(|value| value.render())
                        .unwrap_or_default(),
                );
            }
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}
