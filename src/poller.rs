//! ジョブ状態ポーラーのtokioドライバ
//!
//! 判断はすべて [`JobStatusPoller`]（common）が行い、ここではタイマーと取得だけを担当する。
//! - 開始直後にレコードを1回取得し、以降は固定周期で「レコード + 進捗」を取得
//! - 各取得は前回の完了を待たずに発行し、結果はチャネル経由でこのタスク上で適用する
//! - 終端に達したら統合状態を最後に1回送ってストリームを閉じ、タイマーを解放する
//! - 停止（`stop()` / Drop）後は何も送らない。取得中のタスクは中断する

use crate::api::ScanApi;
use card_scan_common::{Effect, FetchKind, FetchOutcome, FetchTicket, JobId, JobStatusPoller, JobView};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type Completion = (FetchTicket, FetchOutcome);

/// 実行中のポーラーへのハンドル（スコープ付きリソース）
///
/// Dropするとタスクごと中断する。
pub struct PollerHandle {
    job_id: JobId,
    stop_tx: Option<oneshot::Sender<()>>,
    updates: mpsc::UnboundedReceiver<JobView>,
    task: Option<JoinHandle<JobView>>,
}

impl PollerHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// 次の統合状態。終端到達・停止後は None
    pub async fn next(&mut self) -> Option<JobView> {
        self.updates.recv().await
    }

    /// 届いている統合状態を待たずに取り出す（UIスレッド用）
    pub fn try_next(&mut self) -> Option<JobView> {
        self.updates.try_recv().ok()
    }

    /// ポーリングを止める。何度呼んでもよい
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // 既に終端で終了していれば受け手はいない
            let _ = tx.send(());
        }
    }

    /// 停止し、ドライバのタスクも即座に中断する
    ///
    /// 中断されたタスクはそれ以上取得を発行しない。最後の統合状態は返らない。
    pub fn abort(&mut self) {
        self.stop();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// タイマーがまだ生きているか
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// ドライバの終了を待ち、最後の統合状態を返す
    pub async fn wait(&mut self) -> Option<JobView> {
        let task = self.task.take()?;
        match task.await {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(job = %self.job_id, error = %e, "poller task ended abnormally");
                None
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// ポーラーを起動する（tokioランタイム上で呼ぶこと）
pub fn spawn_poller(api: Arc<dyn ScanApi>, job_id: JobId, period: Duration) -> PollerHandle {
    let (update_tx, updates) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let driver = Driver {
        api,
        core: JobStatusPoller::new(job_id),
        period,
        updates: update_tx,
    };
    let task = tokio::spawn(driver.run(stop_rx));

    PollerHandle {
        job_id,
        stop_tx: Some(stop_tx),
        updates,
        task: Some(task),
    }
}

struct Driver {
    api: Arc<dyn ScanApi>,
    core: JobStatusPoller,
    period: Duration,
    updates: mpsc::UnboundedSender<JobView>,
}

impl Driver {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> JobView {
        let job_id = self.core.job_id();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut fetches = JoinSet::new();

        info!(job = %job_id, period_ms = self.period.as_millis() as u64, "start polling");
        self.emit();
        if let Some(ticket) = self.core.start() {
            self.spawn_fetch(&mut fetches, &done_tx, ticket, Duration::ZERO);
        }

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // 停止要求はティックより先に見る
                biased;

                _ = &mut stop_rx => {
                    if self.core.stop() {
                        info!(job = %job_id, "polling stopped");
                    }
                    break;
                }
                _ = ticker.tick(), if self.core.phase().is_ticking() => {
                    for ticket in self.core.tick() {
                        self.spawn_fetch(&mut fetches, &done_tx, ticket, Duration::ZERO);
                    }
                }
                Some((ticket, outcome)) = done_rx.recv() => {
                    match self.core.apply(ticket, outcome) {
                        Effect::Ignored => {
                            debug!(job = %job_id, tick = ticket.tick, kind = ?ticket.kind, "discarded stale result");
                        }
                        Effect::Unchanged => {}
                        Effect::Updated => self.emit(),
                        Effect::Finalize(final_ticket) => {
                            debug!(job = %job_id, tick = final_ticket.tick, "terminal reported, fetching final record");
                            self.spawn_fetch(&mut fetches, &done_tx, final_ticket, Duration::ZERO);
                        }
                        Effect::RetryFinal(final_ticket) => {
                            self.spawn_fetch(&mut fetches, &done_tx, final_ticket, self.period);
                        }
                        Effect::Resume => {
                            debug!(job = %job_id, "record not terminal yet, resuming");
                            ticker.reset();
                            self.emit();
                        }
                        Effect::Finished => {
                            info!(job = %job_id, status = ?self.core.view().status, "job reached terminal status");
                            self.emit();
                            break;
                        }
                    }
                }
                Some(_) = fetches.join_next() => {}
            }
        }

        // ここで fetches がDropされ、取得中のタスクは中断される
        self.core.view().clone()
    }

    fn emit(&self) {
        let _ = self.updates.send(self.core.view().clone());
    }

    fn spawn_fetch(
        &self,
        fetches: &mut JoinSet<()>,
        done: &mpsc::UnboundedSender<Completion>,
        ticket: FetchTicket,
        delay: Duration,
    ) {
        let api = Arc::clone(&self.api);
        let done = done.clone();

        fetches.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = match ticket.kind {
                FetchKind::Record => match api.fetch_record(ticket.job_id).await {
                    Ok(job) => FetchOutcome::Record(job),
                    Err(e) => transient(ticket, e.to_string()),
                },
                FetchKind::Progress => match api.fetch_progress(ticket.job_id).await {
                    Ok(snapshot) => FetchOutcome::Progress(snapshot),
                    Err(e) => transient(ticket, e.to_string()),
                },
            };
            let _ = done.send((ticket, outcome));
        });
    }
}

/// 一時的な失敗はログだけ残し、次のティックで再試行する
fn transient(ticket: FetchTicket, message: String) -> FetchOutcome {
    warn!(job = %ticket.job_id, tick = ticket.tick, kind = ?ticket.kind, error = %message, "fetch failed, retrying next tick");
    FetchOutcome::Failed(message)
}
