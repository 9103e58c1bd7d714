//! CSV dump of estimation matrices.
//!
//! One matrix row per line. Incidence matrices (A, II) are written as their
//! real parts; every other matrix as `re,im` pairs per column. An optional
//! header line names each column and is only written in positive-sequence
//! mode.

use anyhow::{anyhow, ensure, Context, Result};
use lse_core::PhaseMode;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::estimator::CycleOutput;
use crate::sparse::{CalibrationReduction, Partition, PhasorMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// One real field per column
    RealParts,
    /// Two fields per column: real, imaginary
    ComplexPairs,
}

impl CsvLayout {
    pub fn for_partition(partition: Partition) -> Self {
        match partition {
            Partition::CurrentFlowIncidence | Partition::VoltageIncidence => CsvLayout::RealParts,
            _ => CsvLayout::ComplexPairs,
        }
    }
}

fn header_record(layout: CsvLayout, labels: &[String]) -> Vec<String> {
    match layout {
        CsvLayout::RealParts => labels.to_vec(),
        CsvLayout::ComplexPairs => labels
            .iter()
            .flat_map(|l| [format!("{l}.re"), format!("{l}.im")])
            .collect(),
    }
}

fn write_records<W: Write>(
    writer: &mut csv::Writer<W>,
    matrix: &PhasorMatrix,
    header: Option<&[String]>,
) -> Result<()> {
    let layout = CsvLayout::for_partition(matrix.partition());
    if let Some(labels) = header {
        ensure!(
            labels.len() == matrix.cols(),
            "{} has {} columns but {} header labels",
            matrix.partition(),
            matrix.cols(),
            labels.len()
        );
        writer.write_record(header_record(layout, labels))?;
    }

    for row in matrix.to_dense() {
        let record: Vec<String> = match layout {
            CsvLayout::RealParts => row.iter().map(|v| v.re.to_string()).collect(),
            CsvLayout::ComplexPairs => row
                .iter()
                .flat_map(|v| [v.re.to_string(), v.im.to_string()])
                .collect(),
        };
        writer.write_record(&record)?;
    }
    Ok(())
}

/// Render a matrix as CSV text.
pub fn matrix_to_csv_string(matrix: &PhasorMatrix, header: Option<&[String]>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_records(&mut writer, matrix, header)
        .with_context(|| format!("rendering {} as CSV", matrix.partition()))?;
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flushing CSV buffer: {}", err.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write a matrix to `path`, creating parent directories.
pub fn write_matrix_csv(
    path: &Path,
    matrix: &PhasorMatrix,
    header: Option<&[String]>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating CSV output '{}'", path.display()))?;
    write_records(&mut writer, matrix, header)
        .with_context(|| format!("writing {} to '{}'", matrix.partition(), path.display()))?;
    writer
        .flush()
        .with_context(|| format!("flushing '{}'", path.display()))?;
    Ok(())
}

fn column_labels(output: &CycleOutput, partition: Partition) -> Vec<String> {
    let assignment = &output.assignment;
    match partition {
        Partition::SeriesAdmittance => assignment.flow_labels(),
        Partition::Covariance | Partition::Gain => output.matrices.row_labels(),
        Partition::Calibration => {
            let labels = assignment.column_labels();
            CalibrationReduction::kept(labels.len(), &output.calibration.dropped_columns)
                .into_iter()
                .map(|i| labels[i].clone())
                .collect()
        }
        _ => assignment.column_labels(),
    }
}

/// Write every present matrix of a cycle into `dir` as `<symbol>.csv`.
///
/// Returns the paths written, in export order.
pub fn export_cycle(
    dir: &Path,
    output: &CycleOutput,
    include_header: bool,
) -> Result<Vec<PathBuf>> {
    let with_header = include_header && output.assignment.mode() == PhaseMode::PositiveSequence;

    let mut written = Vec::new();
    let matrices = output
        .matrices
        .present()
        .into_iter()
        .chain(output.calibration.matrix.as_ref().ok());
    for matrix in matrices {
        let path = dir.join(format!("{}.csv", matrix.partition().symbol()));
        let labels = with_header.then(|| column_labels(output, matrix.partition()));
        write_matrix_csv(&path, matrix, labels.as_deref())?;
        written.push(path);
    }
    Ok(written)
}
