use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mailprobe::{EmailCandidate, VerificationResult};

/// An input CSV table: header row plus data rows, order preserved.
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("open input file {}", path.display()))?;
        let headers = reader
            .headers()
            .context("read header row")?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("read data row")?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Turns every row into a candidate, taking the address from the named
    /// column. The full row travels with the candidate into the output.
    pub fn candidates(&self, column: &str) -> Result<Vec<EmailCandidate>> {
        let index = self
            .headers
            .iter()
            .position(|header| header == column)
            .with_context(|| {
                format!(
                    "column '{column}' not found, available: {}",
                    self.headers.join(", ")
                )
            })?;
        let mut candidates = Vec::with_capacity(self.rows.len());
        for (n, row) in self.rows.iter().enumerate() {
            let Some(address) = row.get(index) else {
                bail!("row {} is shorter than the header", n + 1);
            };
            candidates.push(EmailCandidate::with_row(address.clone(), row.clone()));
        }
        Ok(candidates)
    }
}

/// Deterministic artifact names: `valid_<stem>_<start>_<end>.csv` and
/// `invalid_<stem>_<start>_<end>.csv` next to the input (or in `out_dir`).
pub fn output_paths(
    input: &Path,
    out_dir: Option<&Path>,
    start: usize,
    end: usize,
) -> (PathBuf, PathBuf) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    (
        dir.join(format!("valid_{stem}_{start}_{end}.csv")),
        dir.join(format!("invalid_{stem}_{start}_{end}.csv")),
    )
}

/// Writes one result table: the original row fields plus `status` and
/// `elapsed_secs` (two decimals) columns.
pub fn write_results(
    path: &Path,
    headers: &[String],
    results: &[VerificationResult],
) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;

    let mut header_row: Vec<String> = headers.to_vec();
    header_row.push("status".to_string());
    header_row.push("elapsed_secs".to_string());
    writer.write_record(&header_row)?;

    for result in results {
        let mut row = result.candidate.source_row.clone();
        if row.is_empty() {
            row.push(result.candidate.address.clone());
        }
        row.push(result.status_label());
        row.push(format!("{:.2}", result.elapsed.as_secs_f64()));
        writer.write_record(&row)?;
    }
    writer.flush().context("flush output file")?;
    Ok(())
}
