use crate::Result;
use crate::model::Package;
use crate::pipeline::{PipelineOutput, RunMetadata};
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use camino::Utf8Path;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use tempfile::NamedTempFile;

const LOG_TARGET: &str = "   dataset";

/// The JSON document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub metadata: RunMetadata,
    pub packages: Vec<Package>,
}

impl From<PipelineOutput> for Dataset {
    fn from(output: PipelineOutput) -> Self {
        let mut packages = output.packages;
        packages.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            metadata: output.metadata,
            packages,
        }
    }
}

/// Serialize `dataset` to `dest`, replacing any previous file in one step.
///
/// The document is written to a temporary file next to `dest` and renamed over it,
/// so a failed write leaves the previous snapshot untouched.
pub fn write(dataset: &Dataset, dest: &Utf8Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    };

    fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent))?;

    let tmp = NamedTempFile::new_in(parent).into_app_err_with(|| format!("unable to create a temporary file in '{}'", parent))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, dataset).into_app_err_with(|| format!("unable to serialize dataset for '{}'", dest))?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .into_app_err_with(|| format!("unable to write dataset for '{}'", dest))?;
    }

    tmp.as_file()
        .sync_all()
        .into_app_err_with(|| format!("unable to sync dataset for '{}'", dest))?;

    let _ = tmp
        .persist(dest)
        .into_app_err_with(|| format!("unable to replace dataset file '{}'", dest))?;

    log::info!(target: LOG_TARGET, "Wrote {} packages to '{}'", dataset.packages.len(), dest);
    Ok(())
}

/// Load a dataset previously produced by [`write`].
pub fn read(path: &Utf8Path) -> Result<Dataset> {
    let file = File::open(path).into_app_err_with(|| format!("unable to open dataset file '{}'", path))?;
    serde_json::from_reader(BufReader::new(file)).into_app_err_with(|| format!("unable to parse dataset file '{}'", path))
}
