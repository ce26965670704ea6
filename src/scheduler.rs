//! Decides when a session is rebuilt and runs the rebuilds.
//!
//! Triggers are debounced: a trigger aborts the one still waiting, and the
//! session's generation counter makes sure a rebuild that was already
//! scanning when a newer trigger came in never lands.

use std::future::Future;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ReindexPolicy;
use crate::project::ReindexReport;
use crate::session::Session;

const SOURCE_EXTENSIONS: &[&str] = &["tex", "bib"];

pub struct ReindexScheduler {
    session: Arc<Session>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ReindexScheduler {
    pub fn new(session: Arc<Session>) -> ReindexScheduler {
        let debounce = Duration::from_millis(session.settings().debounce_ms);
        ReindexScheduler {
            session,
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn should_reindex_on_save(&self, path: &Path) -> bool {
        self.session.settings().reindex == ReindexPolicy::OnSave
            && is_project_source(path)
            && self.session.belongs_to_project(path)
    }

    /// Schedules a rebuild after the debounce period. `on_done` runs with the
    /// report if this rebuild is still the latest one when it finishes.
    pub async fn trigger<F, Fut>(&self, on_done: F)
    where
        F: FnOnce(ReindexReport) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.session.begin_rebuild();
        let session = self.session.clone();
        let debounce = self.debounce;

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let rebuilt = tokio::task::spawn_blocking(move || session.rebuild(token)).await;
            match rebuilt {
                Ok(Some(report)) => on_done(report).await,
                Ok(None) => {}
                Err(err) => tracing::error!("rebuild task failed: {err}"),
            }
        }));
    }

    /// Drops the pending rebuild, if any, without running its callback.
    pub async fn cancel(&self) {
        if let Some(pending) = self.pending.lock().await.take() {
            pending.abort();
        }
    }
}

pub fn is_project_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Watches the master's directory and rebuilds after every burst of changes
/// to `.tex` or `.bib` files. Blocks until the watcher shuts down.
pub fn watch(session: &Session, mut on_report: impl FnMut(ReindexReport)) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(session.settings().debounce_ms), tx)?;

    let root = session.master().parent().unwrap_or(Path::new("/"));
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    tracing::info!("watching {}", root.display());

    on_report(session.reindex());

    for result in rx {
        match result {
            Ok(events) => {
                if !events.iter().any(|event| is_project_source(&event.path)) {
                    continue;
                }
                tracing::debug!("{} changes, rebuilding", events.len());
                on_report(session.reindex());
            }
            Err(err) => tracing::warn!("watch error: {err}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::test_utils::create_test_project_dir;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler(dir: &Path, settings: Settings) -> ReindexScheduler {
        let session = Session::initialize(&dir.join("main.tex"), settings).unwrap();
        ReindexScheduler::new(Arc::new(session))
    }

    #[tokio::test]
    async fn test_burst_of_triggers_rebuilds_once() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\label{a}\n").unwrap();
        let settings = Settings {
            debounce_ms: 20,
            ..Settings::default()
        };
        let scheduler = scheduler(&dir, settings);
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let runs = runs.clone();
            scheduler
                .trigger(move |_| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(scheduler.session().resolve_label("a").is_some());
    }

    #[tokio::test]
    async fn test_trigger_picks_up_new_files() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\bibliography{refs}\n").unwrap();
        fs::write(dir.join("refs.bib"), "@misc{gone}\n").unwrap();
        let settings = Settings {
            debounce_ms: 10,
            ..Settings::default()
        };
        let scheduler = scheduler(&dir, settings);
        assert_eq!(scheduler.session().reindex().bib_files_used.len(), 1);

        fs::remove_file(dir.join("refs.bib")).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler
            .trigger(move |report| async move {
                let _ = tx.send(report);
            })
            .await;
        let report = rx.await.unwrap();

        assert!(report.bib_files_used.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_rebuild_never_reports() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\label{a}\n").unwrap();
        let settings = Settings {
            debounce_ms: 50,
            ..Settings::default()
        };
        let scheduler = scheduler(&dir, settings);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler
            .trigger(move |_report| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        scheduler.cancel().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_save_policy() {
        let (_temp_dir, dir) = create_test_project_dir();
        fs::write(dir.join("main.tex"), "\\input{a}\n").unwrap();
        fs::write(dir.join("a.tex"), "").unwrap();
        fs::write(dir.join("other.tex"), "").unwrap();

        let on_save = scheduler(&dir, Settings::default());
        on_save.session().reindex();
        assert!(on_save.should_reindex_on_save(&dir.join("a.tex")));
        assert!(!on_save.should_reindex_on_save(&dir.join("other.tex")));
        assert!(!on_save.should_reindex_on_save(&dir.join("notes.md")));

        let on_demand = scheduler(
            &dir,
            Settings {
                reindex: ReindexPolicy::OnDemand,
                ..Settings::default()
            },
        );
        on_demand.session().reindex();
        assert!(!on_demand.should_reindex_on_save(&dir.join("a.tex")));
    }
}
