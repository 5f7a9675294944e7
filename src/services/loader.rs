use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::LoadError;
use crate::models::Invoice;

/// One read of the invoice source.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source: PathBuf,
    pub fingerprint: String,
    pub invoices: Arc<Vec<Invoice>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InvoiceFile {
    List(Vec<Invoice>),
    Wrapped { invoices: Vec<Invoice> },
}

impl InvoiceFile {
    fn into_invoices(self) -> Vec<Invoice> {
        match self {
            InvoiceFile::List(invoices) => invoices,
            InvoiceFile::Wrapped { invoices } => invoices,
        }
    }
}

pub fn load_invoices(source: &Path) -> Result<Snapshot, LoadError> {
    if !source.exists() {
        return Err(LoadError::Missing(source.to_path_buf()));
    }

    let files = if source.is_dir() {
        json_files(source)
    } else {
        vec![source.to_path_buf()]
    };

    let mut hasher = Sha256::new();
    let mut invoices = Vec::new();
    for path in files {
        let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        hasher.update(&bytes);
        let parsed: InvoiceFile =
            serde_json::from_slice(&bytes).map_err(|source| LoadError::Json { path: path.clone(), source })?;
        invoices.extend(parsed.into_invoices());
    }

    let fingerprint = hex::encode(hasher.finalize());
    debug!(source = %source.display(), count = invoices.len(), %fingerprint, "loaded invoices");

    Ok(Snapshot {
        source: source.to_path_buf(),
        fingerprint,
        invoices: Arc::new(invoices),
    })
}

fn json_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = walkdir::WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| is_json(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect::<Vec<_>>();
    files.sort();
    files
}

pub fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
