use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::{Clock, TtlCache};
use crate::error::CatalogError;
use crate::http::Fetch;
use crate::metadata::Enricher;
use crate::models::{Scholarship, ScholarshipDetail, ScholarshipPreview};
use crate::settings::Settings;
use crate::sheet::fetch_sheet;
use crate::text::compare_names;

pub type Snapshot = Arc<Vec<ScholarshipPreview>>;

/// Sheet rows enriched with page metadata, served from a snapshot that is
/// rebuilt at most once per revalidation window.
pub struct Catalog<F> {
    fetcher: Arc<F>,
    enricher: Arc<Enricher<F>>,
    snapshot: TtlCache<(), Snapshot>,
    refresh: tokio::sync::Mutex<()>,
    sheet_url: String,
    workers: usize,
    progress: Option<ProgressBar>,
}

impl<F: Fetch> Catalog<F> {
    pub fn new(fetcher: Arc<F>, settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        let enricher = Enricher::new(Arc::clone(&fetcher), settings.metadata_ttl(), Arc::clone(&clock));
        Catalog {
            fetcher,
            enricher: Arc::new(enricher),
            snapshot: TtlCache::new(settings.revalidate_window(), clock),
            refresh: tokio::sync::Mutex::new(()),
            sheet_url: settings.sheet_url.clone(),
            workers: settings.concurrency.max(1),
            progress: None,
        }
    }

    /// Advance `progress` once per enriched record during loads.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current snapshot, loading it if the window has lapsed. Concurrent
    /// callers share one in-flight load.
    pub async fn load_scholarships(&self) -> Result<Snapshot, CatalogError> {
        if let Some(snapshot) = self.snapshot.get(&()) {
            debug!("Catalog snapshot hit ({} records)", snapshot.len());
            return Ok(snapshot);
        }
        let _guard = self.refresh.lock().await;
        if let Some(snapshot) = self.snapshot.get(&()) {
            return Ok(snapshot);
        }
        self.reload().await
    }

    /// Reload regardless of the window and replace the snapshot.
    pub async fn load_scholarships_fresh(&self) -> Result<Snapshot, CatalogError> {
        let _guard = self.refresh.lock().await;
        self.reload().await
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.snapshot.now()
    }

    pub async fn find(&self, id: &str) -> Result<Option<ScholarshipPreview>, CatalogError> {
        let snapshot = self.load_scholarships().await?;
        Ok(snapshot.iter().find(|p| p.id() == id).cloned())
    }

    pub async fn detail(&self, id: &str) -> Result<Option<ScholarshipDetail>, CatalogError> {
        match self.find(id).await? {
            Some(preview) => Ok(Some(self.enricher.resolve_detail(preview).await)),
            None => Ok(None),
        }
    }

    async fn reload(&self) -> Result<Snapshot, CatalogError> {
        let t0 = Instant::now();
        let rows = fetch_sheet(self.fetcher.as_ref(), &self.sheet_url, self.now()).await?;
        let purged = self.enricher.purge_expired();
        if purged > 0 {
            debug!("Purged {} expired metadata entries", purged);
        }

        if let Some(pb) = &self.progress {
            pb.set_length(rows.len() as u64);
            pb.set_position(0);
        }
        let total = rows.len();
        let previews = enrich_all(
            Arc::clone(&self.enricher),
            rows,
            self.workers,
            self.progress.clone(),
        )
        .await;
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let with_image = previews.iter().filter(|p| p.preview_image.is_some()).count();
        info!(
            "Catalog loaded: {} scholarships ({} with preview image) in {:.1}s",
            total,
            with_image,
            t0.elapsed().as_secs_f64()
        );

        let snapshot = Arc::new(previews);
        self.snapshot.insert((), Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

/// Enrich every record with at most `workers` fetches in flight. Output is
/// name-sorted regardless of completion order.
pub async fn enrich_all<F: Fetch>(
    enricher: Arc<Enricher<F>>,
    items: Vec<Scholarship>,
    workers: usize,
    progress: Option<ProgressBar>,
) -> Vec<ScholarshipPreview> {
    let total = items.len();
    let workers = workers.max(1).min(total.max(1));
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));

    // Workers send finished previews; the loop below collects them
    let (tx, mut rx) = mpsc::channel::<ScholarshipPreview>(workers * 2);

    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let enricher = Arc::clone(&enricher);
        let tx = tx.clone();

        tokio::spawn(async move {
            loop {
                let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                let Some(item) = next else { break };
                let preview = enricher.enrich_preview(item).await;
                if tx.send(preview).await.is_err() {
                    break;
                }
            }
        });
    }

    // rx closes once every worker has dropped its sender
    drop(tx);

    let mut previews = Vec::with_capacity(total);
    while let Some(preview) = rx.recv().await {
        if let Some(pb) = &progress {
            pb.inc(1);
        }
        previews.push(preview);
    }

    previews.sort_by(|a, b| compare_names(a.name(), b.name()));
    previews
}
