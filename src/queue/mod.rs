//! The download queue.
//!
//! An explicit queue object owned by the host process: admission with a
//! duplicate check, a FIFO waiting list, a configurable concurrency bound,
//! and a broadcast stream of lifecycle events for collaborators (dashboard,
//! bot, history) to subscribe to.
//!
//! Scheduling: while fewer than N jobs are in flight and the queue is not
//! paused, the oldest pending item starts its pipeline. Each outcome frees
//! a slot and pulls the next item. No priorities, no reordering.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::error::Error;
use crate::model::{ContentType, DownloadResult, QueueItem, QueueStats, QueueStatus};
use crate::pipeline::{JobHooks, JobSpec, Pipeline};
use crate::quality::Quality;

/// Lifecycle events emitted over the queue's broadcast channel.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    ItemAdded {
        id: u64,
        content_type: ContentType,
        content_id: String,
        title: Option<String>,
    },
    ItemProgress {
        id: u64,
        percent: u8,
        status: QueueStatus,
    },
    ItemCompleted {
        id: u64,
        path: Option<PathBuf>,
    },
    ItemFailed {
        id: u64,
        reason: String,
    },
    QueueEmpty,
}

/// What `submit` hands back: the assigned id and the position among the
/// currently waiting items (1-based).
#[derive(Debug, Clone, Copy)]
pub struct SubmitReceipt {
    pub id: u64,
    pub queue_position: usize,
}

/// One admitted job: its public item plus the in-flight cancel flag.
struct Job {
    item: QueueItem,
    cancel: Arc<AtomicBool>,
}

struct QueueState {
    jobs: Vec<Job>,
    waiting: VecDeque<u64>,
    running: usize,
    paused: bool,
    next_id: u64,
}

struct QueueInner {
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    pipeline: Arc<Pipeline>,
    concurrency: usize,
}

/// The queue handle. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    pub fn new(pipeline: Arc<Pipeline>, concurrency: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    jobs: Vec::new(),
                    waiting: VecDeque::new(),
                    running: 0,
                    paused: false,
                    next_id: 1,
                }),
                events,
                pipeline,
                concurrency: concurrency.max(1),
            }),
        }
    }

    /// Subscribe to lifecycle events. Slow subscribers may lag and miss
    /// intermediate progress; terminal state is always available from
    /// [`DownloadQueue::snapshot`].
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Admit a new request. Rejects a submission whose (type, id) pair
    /// already has a non-terminal item in the queue.
    pub fn submit(
        &self,
        content_type: ContentType,
        content_id: &str,
        quality: Quality,
        title_hint: Option<String>,
    ) -> Result<SubmitReceipt, Error> {
        let receipt = {
            let mut state = self.inner.state.lock().unwrap();

            let duplicate = state.jobs.iter().any(|job| {
                job.item.content_type == content_type
                    && job.item.content_id == content_id
                    && job.item.is_active()
            });
            if duplicate {
                return Err(Error::DuplicateSubmission {
                    content_type,
                    content_id: content_id.to_string(),
                });
            }

            let id = state.next_id;
            state.next_id += 1;

            let item = QueueItem::new(id, content_type, content_id, quality, title_hint);
            self.inner.emit(QueueEvent::ItemAdded {
                id,
                content_type,
                content_id: content_id.to_string(),
                title: item.title.clone(),
            });

            state.jobs.push(Job {
                item,
                cancel: Arc::new(AtomicBool::new(false)),
            });
            state.waiting.push_back(id);
            SubmitReceipt {
                id,
                queue_position: state.waiting.len(),
            }
        };

        QueueInner::pump(&self.inner);
        tracing::info!(id = receipt.id, %content_type, content_id, "submission admitted");
        Ok(receipt)
    }

    /// Stop starting new jobs. In-flight jobs are unaffected.
    pub fn pause(&self) {
        self.inner.state.lock().unwrap().paused = true;
        tracing::info!("queue paused");
    }

    /// Resume starting jobs.
    pub fn resume(&self) {
        self.inner.state.lock().unwrap().paused = false;
        tracing::info!("queue resumed");
        QueueInner::pump(&self.inner);
    }

    /// Cancel an item. Pending items are cancelled immediately; in-flight
    /// items get their cancel flag raised and abort at the next stage or
    /// chunk boundary. Returns false for unknown or already-terminal items.
    pub fn cancel(&self, id: u64) -> bool {
        let cancelled = {
            let mut state = self.inner.state.lock().unwrap();
            let Some(job) = state.jobs.iter_mut().find(|j| j.item.id == id) else {
                return false;
            };

            match job.item.status {
                QueueStatus::Pending => {
                    job.item.status = QueueStatus::Cancelled;
                    job.item.finished_at = Some(chrono::Utc::now().timestamp());
                    self.inner.emit(QueueEvent::ItemProgress {
                        id,
                        percent: job.item.progress_percent,
                        status: QueueStatus::Cancelled,
                    });
                    state.waiting.retain(|&w| w != id);
                    true
                }
                QueueStatus::Downloading | QueueStatus::Processing => {
                    job.cancel.store(true, Ordering::Relaxed);
                    true
                }
                _ => false,
            }
        };

        self.inner.emit_empty_if_drained();
        cancelled
    }

    /// Drop all pending and terminal items. In-flight jobs keep running.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.waiting.clear();
            state
                .jobs
                .retain(|job| matches!(job.item.status, QueueStatus::Downloading | QueueStatus::Processing));
        }
        tracing::info!("queue cleared");
        self.inner.emit_empty_if_drained();
    }

    /// Item counts per status.
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in &state.jobs {
            match job.item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Downloading => stats.downloading += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
                QueueStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// A copy of every item, in admission order.
    pub fn snapshot(&self) -> Vec<QueueItem> {
        let state = self.inner.state.lock().unwrap();
        state.jobs.iter().map(|job| job.item.clone()).collect()
    }

    /// A copy of one item.
    pub fn item(&self, id: u64) -> Option<QueueItem> {
        let state = self.inner.state.lock().unwrap();
        state
            .jobs
            .iter()
            .find(|job| job.item.id == id)
            .map(|job| job.item.clone())
    }
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        // Errors only mean there are no subscribers right now
        let _ = self.events.send(event);
    }

    /// Start waiting jobs while slots are free.
    fn pump(inner: &Arc<QueueInner>) {
        loop {
            let started = {
                let mut state = inner.state.lock().unwrap();
                if state.paused || state.running >= inner.concurrency {
                    break;
                }
                let Some(id) = state.waiting.pop_front() else {
                    break;
                };
                let Some(job) = state.jobs.iter_mut().find(|j| j.item.id == id) else {
                    continue;
                };
                if job.item.status != QueueStatus::Pending {
                    continue;
                }

                job.item.status = QueueStatus::Downloading;
                let spec = JobSpec {
                    content_type: job.item.content_type,
                    content_id: job.item.content_id.clone(),
                    quality: job.item.requested_quality,
                };
                let cancel = job.cancel.clone();
                state.running += 1;
                (id, spec, cancel)
            };

            let (id, spec, cancel) = started;
            inner.emit(QueueEvent::ItemProgress {
                id,
                percent: 0,
                status: QueueStatus::Downloading,
            });

            let inner = inner.clone();
            tokio::spawn(async move {
                let hooks = JobHooks {
                    on_title: {
                        let inner = inner.clone();
                        Box::new(move |title| inner.set_title(id, title))
                    },
                    on_progress: {
                        let inner = inner.clone();
                        Box::new(move |percent, status| inner.report_progress(id, percent, status))
                    },
                };

                let result = inner.pipeline.run(&spec, &cancel, &hooks).await;
                QueueInner::finish_job(&inner, id, result);
            });
        }
    }

    fn set_title(&self, id: u64, title: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.item.id == id) {
            job.item.title = Some(title.to_string());
        }
    }

    /// Progress callback from a running pipeline. Status only ever moves
    /// forward; late or out-of-order callbacks are dropped.
    fn report_progress(&self, id: u64, percent: u8, status: QueueStatus) {
        let event = {
            let mut state = self.state.lock().unwrap();
            let Some(job) = state.jobs.iter_mut().find(|j| j.item.id == id) else {
                return;
            };
            if job.item.status != status && !job.item.status.can_transition_to(status) {
                return;
            }
            job.item.status = status;
            job.item.progress_percent = percent.min(100);
            QueueEvent::ItemProgress {
                id,
                percent: job.item.progress_percent,
                status,
            }
        };
        self.emit(event);
    }

    /// Record a finished pipeline run, free the slot, and keep pumping.
    fn finish_job(inner: &Arc<QueueInner>, id: u64, result: crate::error::Result<DownloadResult>) {
        let event = {
            let mut state = inner.state.lock().unwrap();
            state.running = state.running.saturating_sub(1);

            let Some(job) = state.jobs.iter_mut().find(|j| j.item.id == id) else {
                return;
            };
            let item = &mut job.item;
            item.finished_at = Some(chrono::Utc::now().timestamp());

            match result {
                Ok(result) if result.success => {
                    // Batches finish from Downloading; single tracks from Processing
                    if item.status == QueueStatus::Downloading {
                        item.status = QueueStatus::Processing;
                    }
                    item.status = QueueStatus::Completed;
                    item.progress_percent = 100;
                    item.result_path = result.file_path.clone();
                    QueueEvent::ItemCompleted {
                        id,
                        path: result.file_path,
                    }
                }
                Ok(result) => {
                    let reason = result
                        .error
                        .unwrap_or_else(|| "download failed".to_string());
                    item.status = QueueStatus::Failed;
                    item.result_path = result.file_path;
                    item.error_reason = Some(reason.clone());
                    QueueEvent::ItemFailed { id, reason }
                }
                Err(Error::Cancelled) => {
                    if item.status.can_transition_to(QueueStatus::Cancelled) {
                        item.status = QueueStatus::Cancelled;
                    } else {
                        item.status = QueueStatus::Failed;
                        item.error_reason = Some("cancelled".to_string());
                    }
                    QueueEvent::ItemProgress {
                        id,
                        percent: item.progress_percent,
                        status: item.status,
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    item.status = QueueStatus::Failed;
                    item.error_reason = Some(reason.clone());
                    QueueEvent::ItemFailed { id, reason }
                }
            }
        };

        inner.emit(event);
        QueueInner::pump(inner);
        inner.emit_empty_if_drained();
    }

    fn emit_empty_if_drained(&self) {
        let drained = {
            let state = self.state.lock().unwrap();
            state.waiting.is_empty() && state.running == 0
        };
        if drained {
            self.emit(QueueEvent::QueueEmpty);
        }
    }
}
