use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use tracing::{debug, info, warn};

use crate::models::{Invoice, InvoiceStats, MalformedPolicy, Settings};
use crate::services::aggregator::summarize_at;
use crate::services::clock::{Clock, SystemClock};
use crate::services::loader::{load_invoices, Snapshot};
use crate::services::watcher::{wait_for_stable_size, FileEvent, FileEventKind, WatcherService};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    fingerprint: String,
    year: i32,
    month: u32,
    policy: MalformedPolicy,
}

#[derive(Debug, Clone)]
struct CachedStats {
    key: CacheKey,
    stats: InvoiceStats,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Mutex<Settings>>,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
    cache: Arc<Mutex<Option<CachedStats>>>,
    clock: Arc<dyn Clock>,
    watcher: Arc<Mutex<Option<WatcherService>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        AppState {
            settings: Arc::new(Mutex::new(settings)),
            snapshot: Arc::new(Mutex::new(None)),
            cache: Arc::new(Mutex::new(None)),
            clock,
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self.settings.lock().map_err(|_| anyhow!("Settings lock"))?.clone())
    }

    fn source(&self) -> Result<PathBuf> {
        self.settings()?
            .source
            .ok_or_else(|| anyhow!("No invoice source configured"))
    }

    /// Re-reads the invoice source. Returns false when the content is unchanged.
    pub fn reload(&self) -> Result<bool> {
        let source = self.source()?;
        let fresh = load_invoices(&source).with_context(|| format!("Load {}", source.display()))?;

        let mut snapshot = self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))?;
        if let Some(existing) = snapshot.as_ref() {
            if existing.source == fresh.source && existing.fingerprint == fresh.fingerprint {
                debug!(source = %source.display(), "invoice source unchanged");
                return Ok(false);
            }
        }

        info!(source = %source.display(), count = fresh.invoices.len(), "invoice snapshot replaced");
        *snapshot = Some(fresh);
        drop(snapshot);
        self.clear_cache()?;
        Ok(true)
    }

    /// Current invoices, loading the source on first use.
    pub fn invoices(&self) -> Result<Arc<Vec<Invoice>>> {
        Ok(self.current_snapshot()?.invoices)
    }

    fn current_snapshot(&self) -> Result<Snapshot> {
        {
            let snapshot = self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))?;
            if let Some(existing) = snapshot.as_ref() {
                return Ok(existing.clone());
            }
        }
        self.reload()?;
        let snapshot = self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))?;
        snapshot.clone().ok_or_else(|| anyhow!("Invoice snapshot missing after load"))
    }

    pub fn stats(&self) -> Result<InvoiceStats> {
        self.stats_for(self.today())
    }

    /// Summary figures for the month containing `reference`, memoized on the
    /// snapshot fingerprint, that month and the malformed-input policy.
    pub fn stats_for(&self, reference: NaiveDate) -> Result<InvoiceStats> {
        let snapshot = self.current_snapshot()?;
        let policy = self.settings()?.malformed_policy;
        let key = CacheKey {
            fingerprint: snapshot.fingerprint.clone(),
            year: reference.year(),
            month: reference.month(),
            policy,
        };

        {
            let cache = self.cache.lock().map_err(|_| anyhow!("Cache lock"))?;
            if let Some(cached) = cache.as_ref().filter(|c| c.key == key) {
                debug!(fingerprint = %key.fingerprint, "stats cache hit");
                return Ok(cached.stats);
            }
        }

        let stats = summarize_at(&snapshot.invoices, reference, policy)?;
        let mut cache = self.cache.lock().map_err(|_| anyhow!("Cache lock"))?;
        *cache = Some(CachedStats { key, stats });
        Ok(stats)
    }

    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self.cache.lock().map_err(|_| anyhow!("Cache lock"))?;
        *cache = None;
        Ok(())
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let source_changed = {
            let mut locked = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
            let changed = locked.source != settings.source;
            *locked = settings;
            changed
        };
        self.clear_cache()?;

        if source_changed {
            {
                let mut snapshot = self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))?;
                *snapshot = None;
            }
            let mut guard = self.watcher.lock().map_err(|_| anyhow!("Watcher lock"))?;
            if guard.take().is_some() {
                warn!("invoice source changed; watcher stopped until restarted");
            }
        }
        Ok(())
    }

    /// Recomputes stats whenever the source changes on disk and hands them to `on_change`.
    pub fn start_watching<F>(&self, on_change: F) -> Result<()>
    where
        F: Fn(InvoiceStats) + Send + 'static,
    {
        let mut guard = self.watcher.lock().map_err(|_| anyhow!("Watcher lock"))?;
        *guard = None;

        let source = self.source()?;
        let (tx, rx) = mpsc::channel();
        let watcher = WatcherService::start(&source, tx)?;
        *guard = Some(watcher);
        info!(source = %source.display(), "watching invoice source");

        let state = self.clone();
        std::thread::spawn(move || {
            for event in rx {
                handle_event(event, &state, &on_change);
            }
            debug!("watcher channel closed");
        });

        Ok(())
    }

    pub fn stop_watching(&self) -> Result<()> {
        let mut guard = self.watcher.lock().map_err(|_| anyhow!("Watcher lock"))?;
        *guard = None;
        Ok(())
    }
}

fn handle_event<F>(event: FileEvent, state: &AppState, on_change: &F)
where
    F: Fn(InvoiceStats),
{
    let folder_source = state.source().map(|source| source.is_dir()).unwrap_or(false);
    let removed = event.kind == FileEventKind::Deleted || !event.path.exists();

    if removed {
        if folder_source {
            // the remaining files are still a valid snapshot
            refresh(state, on_change);
        } else {
            warn!(path = %event.path.display(), "invoice file removed; keeping last snapshot");
        }
        return;
    }

    let interval_ms = state.settings().map(|s| s.debounce_ms).unwrap_or(300);
    if wait_for_stable_size(&event.path, interval_ms).is_none() {
        debug!(path = %event.path.display(), "invoice file empty or gone; skipping");
        return;
    }
    refresh(state, on_change);
}

fn refresh<F>(state: &AppState, on_change: &F)
where
    F: Fn(InvoiceStats),
{
    match state.reload() {
        Ok(true) => match state.stats() {
            Ok(stats) => on_change(stats),
            Err(err) => warn!(error = %err, "recompute after change failed"),
        },
        Ok(false) => {}
        Err(err) => warn!(error = %err, "reload after change failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::FixedClock;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn state_for(source: &Path) -> AppState {
        let settings = Settings {
            source: Some(source.to_path_buf()),
            ..Settings::default()
        };
        AppState::with_clock(
            settings,
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 3, 18).unwrap())),
        )
    }

    #[test]
    fn stats_load_lazily_and_memoize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(
            &path,
            r#"[{"status":"pending","balanceAmount":"₹1,000"},
                {"status":"paid","balanceAmount":"₹500","paidAmount":"₹500","paymentDate":"2024-03-04"}]"#,
        )
        .unwrap();

        let state = state_for(&path);
        let stats = state.stats().unwrap();
        assert_eq!(stats.total_outstanding, 1000.0);
        assert_eq!(stats.paid_this_month, 500.0);
        assert_eq!(stats.pending_count, 1);

        assert!(!state.reload().unwrap());
        assert_eq!(state.stats().unwrap(), stats);
    }

    #[test]
    fn reload_picks_up_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(&path, r#"[{"status":"pending","balanceAmount":"₹100"}]"#).unwrap();

        let state = state_for(&path);
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);

        std::fs::write(
            &path,
            r#"[{"status":"pending","balanceAmount":"₹100"},{"status":"pending","balanceAmount":"₹50"}]"#,
        )
        .unwrap();
        assert!(state.reload().unwrap());
        let stats = state.stats().unwrap();
        assert_eq!(stats.total_outstanding, 150.0);
        assert_eq!(stats.pending_count, 2);
    }

    #[test]
    fn other_months_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(
            &path,
            r#"[{"status":"paid","balanceAmount":"₹0","paidAmount":"₹70","paymentDate":"2024-02-10"}]"#,
        )
        .unwrap();

        let state = state_for(&path);
        assert_eq!(state.stats().unwrap().paid_this_month, 0.0);
        let february = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(state.stats_for(february).unwrap().paid_this_month, 70.0);
    }

    #[test]
    fn policy_change_invalidates_memo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(&path, r#"[{"status":"pending","balanceAmount":"pending quote"}]"#).unwrap();

        let state = state_for(&path);
        assert_eq!(state.stats().unwrap().total_outstanding, 0.0);

        let mut settings = state.settings().unwrap();
        settings.malformed_policy = MalformedPolicy::Strict;
        state.update_settings(settings).unwrap();
        assert!(state.stats().is_err());
    }

    #[test]
    fn missing_source_is_an_error() {
        let state = AppState::new(Settings::default());
        assert!(state.stats().is_err());

        let dir = tempfile::tempdir().unwrap();
        let state = state_for(&dir.path().join("absent.json"));
        assert!(state.reload().is_err());
    }

    fn pending(amount: &str) -> String {
        format!(r#"[{{"status":"pending","balanceAmount":"{}"}}]"#, amount)
    }

    /// Waits for a callback carrying `expected` outstanding, ignoring stale ones.
    fn wait_for_outstanding(rx: &mpsc::Receiver<InvoiceStats>, expected: f64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(stats) if stats.total_outstanding == expected => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn deleted_folder_file_drops_out_of_stats() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("a.json");
        let removed = dir.path().join("b.json");
        std::fs::write(&kept, pending("₹100")).unwrap();
        std::fs::write(&removed, pending("₹50")).unwrap();

        let state = state_for(dir.path());
        assert_eq!(state.stats().unwrap().total_outstanding, 150.0);

        std::fs::remove_file(&removed).unwrap();
        let (tx, rx) = mpsc::channel();
        let notify = move |stats: InvoiceStats| {
            let _ = tx.send(stats);
        };
        handle_event(FileEvent { path: removed, kind: FileEventKind::Deleted }, &state, &notify);

        assert_eq!(rx.try_recv().unwrap().total_outstanding, 100.0);
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);
    }

    #[test]
    fn modify_event_for_vanished_folder_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("a.json");
        let renamed = dir.path().join("b.json");
        std::fs::write(&kept, pending("₹100")).unwrap();
        std::fs::write(&renamed, pending("₹50")).unwrap();

        let state = state_for(dir.path());
        assert_eq!(state.stats().unwrap().total_outstanding, 150.0);

        // some platforms report a rename away as a modify of the old name
        std::fs::rename(&renamed, dir.path().join("b.json.bak")).unwrap();
        handle_event(FileEvent { path: renamed, kind: FileEventKind::Modified }, &state, &|_: InvoiceStats| {});
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);
    }

    #[test]
    fn deleted_single_file_keeps_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(&path, pending("₹100")).unwrap();

        let state = state_for(&path);
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);

        std::fs::remove_file(&path).unwrap();
        let (tx, rx) = mpsc::channel();
        let notify = move |stats: InvoiceStats| {
            let _ = tx.send(stats);
        };
        handle_event(FileEvent { path, kind: FileEventKind::Deleted }, &state, &notify);

        assert!(rx.try_recv().is_err());
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);
    }

    #[test]
    fn watching_file_source_reports_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        std::fs::write(&path, pending("₹100")).unwrap();

        let state = state_for(&path);
        let mut settings = state.settings().unwrap();
        settings.debounce_ms = 20;
        state.update_settings(settings).unwrap();
        assert_eq!(state.stats().unwrap().total_outstanding, 100.0);

        let (tx, rx) = mpsc::channel();
        state
            .start_watching(move |stats| {
                let _ = tx.send(stats);
            })
            .unwrap();

        std::fs::write(&path, pending("₹250")).unwrap();
        assert!(wait_for_outstanding(&rx, 250.0));
        assert_eq!(state.stats().unwrap().total_outstanding, 250.0);

        state.stop_watching().unwrap();
    }

    #[test]
    fn watching_folder_source_reports_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let removed = dir.path().join("b.json");
        std::fs::write(dir.path().join("a.json"), pending("₹100")).unwrap();
        std::fs::write(&removed, pending("₹50")).unwrap();

        let state = state_for(dir.path());
        let mut settings = state.settings().unwrap();
        settings.debounce_ms = 20;
        state.update_settings(settings).unwrap();
        assert_eq!(state.stats().unwrap().total_outstanding, 150.0);

        let (tx, rx) = mpsc::channel();
        state
            .start_watching(move |stats| {
                let _ = tx.send(stats);
            })
            .unwrap();

        std::fs::remove_file(&removed).unwrap();
        assert!(wait_for_outstanding(&rx, 100.0));

        state.stop_watching().unwrap();
    }
}
