use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::cache::CacheStore;
use crate::diag::{DiagRecorder, DownloadRecord, TransferOutcome};
use crate::error::{Error, Result};
use crate::fetch::{self, Freshness, RemoteFileDescriptor};
use crate::merge::{merge_all, MappingTable};
use crate::parse;
use crate::table::TypedTable;

/// Pipeline-wide knobs. The timeout bounds each HTTP call up front; nothing
/// interrupts a fold in progress.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_root: PathBuf,
    pub diagnostics: bool,
    pub timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            cache_root: cache_root.into(),
            diagnostics: true,
            timeout: None,
        }
    }
}

/// One mapping input for a retrieval: either a remote file that still needs
/// the oracle/fetcher/parser treatment, or a table the caller already holds.
#[derive(Debug, Clone)]
pub enum MappingSource {
    Remote {
        descriptor: RemoteFileDescriptor,
        presentation_columns: HashSet<String>,
    },
    Inline(MappingTable),
}

impl MappingSource {
    pub fn remote(descriptor: RemoteFileDescriptor) -> Self {
        MappingSource::Remote {
            descriptor,
            presentation_columns: HashSet::new(),
        }
    }

    fn label(&self) -> String {
        match self {
            MappingSource::Remote { descriptor, .. } => descriptor.url.to_string(),
            MappingSource::Inline(_) => "inline table".to_string(),
        }
    }
}

/// The single value a retrieval produces. Owns its data outright; nothing
/// aliases back into cache files. The diagnostics vectors are empty when the
/// pipeline was built with diagnostics off.
#[derive(Debug, Clone)]
pub struct DataCollection {
    pub data: TypedTable,
    pub download_diagnostics: Vec<DownloadRecord>,
    pub processing_steps: Vec<String>,
    pub warnings: Vec<String>,
}

impl DataCollection {
    /// True when the retrieval completed without caveats.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Retrieval-cache-merge pipeline: freshness oracle, fetcher, tolerant
/// parser and join-key-inference fold behind one entry point. Dataset
/// wrappers construct the descriptors and post-process the result.
#[derive(Debug)]
pub struct Pipeline {
    client: Client,
    store: CacheStore,
    diagnostics: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(Error::Client)?;
        Ok(Pipeline {
            client,
            store: CacheStore::new(config.cache_root),
            diagnostics: config.diagnostics,
        })
    }

    /// Bytes for one remote file: cached copy when the oracle says it is
    /// fresh, otherwise a full fetch. Holds the per-key lock for the whole
    /// check-fetch-persist sequence.
    async fn acquire(
        &self,
        descriptor: &RemoteFileDescriptor,
        diag: &mut DiagRecorder,
    ) -> Result<Vec<u8>> {
        let lock = self.store.key_lock(&descriptor.cache_key);
        let _guard = lock.lock().await;

        if fetch::check_freshness(&self.client, descriptor, &self.store).await
            == Freshness::UseCached
        {
            let started = Instant::now();
            match self.store.read(&descriptor.cache_key) {
                Ok(bytes) => {
                    diag.download(DownloadRecord {
                        url: descriptor.url.to_string(),
                        cache_key: descriptor.cache_key.clone(),
                        size_bytes: bytes.len() as u64,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        fetched_at: Utc::now(),
                        outcome: TransferOutcome::CachedHit,
                    });
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!(cache_key = %descriptor.cache_key, error = %e, "cached payload unreadable");
                    diag.warning(format!(
                        "cached copy of `{}` unreadable ({e}); refetching",
                        descriptor.cache_key
                    ));
                }
            }
        }

        let fetched = fetch::fetch(&self.client, descriptor, &self.store).await?;
        if let Some(w) = &fetched.cache_warning {
            diag.warning(w.clone());
        }
        diag.download(DownloadRecord {
            url: descriptor.url.to_string(),
            cache_key: descriptor.cache_key.clone(),
            size_bytes: fetched.bytes.len() as u64,
            elapsed_ms: fetched.elapsed_ms,
            fetched_at: Utc::now(),
            outcome: TransferOutcome::Fetched,
        });
        Ok(fetched.bytes)
    }

    async fn resolve_mapping(
        &self,
        source: &MappingSource,
    ) -> Result<(MappingTable, DiagRecorder)> {
        let mut diag = DiagRecorder::new(self.diagnostics);
        match source {
            MappingSource::Inline(mapping) => Ok((mapping.clone(), diag)),
            MappingSource::Remote {
                descriptor,
                presentation_columns,
            } => {
                let bytes = self.acquire(descriptor, &mut diag).await?;
                let (table, warnings) = parse::parse(&bytes, &descriptor.format)?;
                for w in warnings {
                    diag.warning(format!("{}: {w}", descriptor.url));
                }
                Ok((
                    MappingTable::with_presentation_columns(
                        table,
                        presentation_columns.iter().cloned(),
                    ),
                    diag,
                ))
            }
        }
    }

    /// Retrieve the primary dataset, resolve every mapping file, fold them
    /// in order, and return the merged result.
    ///
    /// Network or parse failures on the primary file are fatal. The same
    /// failures on a mapping file only cost that table: a warning is
    /// recorded and the fold runs over the remaining ones. Partial metadata
    /// coverage beats total failure.
    #[instrument(level = "info", skip(self, mappings), fields(url = %primary.url))]
    pub async fn retrieve(
        &self,
        primary: &RemoteFileDescriptor,
        mappings: &[MappingSource],
    ) -> Result<DataCollection> {
        let mut diag = DiagRecorder::new(self.diagnostics);

        let bytes = self.acquire(primary, &mut diag).await?;
        let (primary_table, warnings) = parse::parse(&bytes, &primary.format)?;
        for w in warnings {
            diag.warning(format!("{}: {w}", primary.url));
        }
        diag.step(format!(
            "parsed primary table: {} rows, {} columns",
            primary_table.n_rows(),
            primary_table.n_columns()
        ));

        // Mapping files are independent of each other and resolved
        // concurrently; only the fold itself is sequential.
        let resolved = join_all(mappings.iter().map(|m| self.resolve_mapping(m))).await;
        let mut tables = Vec::with_capacity(mappings.len());
        for (source, outcome) in mappings.iter().zip(resolved) {
            match outcome {
                Ok((mapping, sub)) => {
                    diag.merge_from(sub);
                    tables.push(mapping);
                }
                Err(e) => {
                    warn!(mapping = %source.label(), error = %e, "mapping unavailable; skipped");
                    diag.warning(format!(
                        "mapping `{}` unavailable ({e}); skipped",
                        source.label()
                    ));
                }
            }
        }

        let data = merge_all(primary_table, &tables, &mut diag);
        info!(
            rows = data.n_rows(),
            columns = data.n_columns(),
            "retrieval complete"
        );

        let snapshot = diag.finalize();
        Ok(DataCollection {
            data,
            download_diagnostics: snapshot.download_diagnostics,
            processing_steps: snapshot.processing_steps,
            warnings: snapshot.warnings,
        })
    }
}
