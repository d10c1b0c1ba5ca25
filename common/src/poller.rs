//! ジョブ状態ポーラー（I/Oなしの状態機械）
//!
//! タイマーや通信は持たず、「いつ何を取得するか」と「届いた結果をどう適用するか」だけを決める。
//! 実際の取得とタイマーは呼び出し側（CLI/デスクトップ）のドライバが担当する。
//!
//! 状態遷移: `Loading → Active → (Finalizing →) Terminal`、どこからでも `Stopped`。
//!
//! 取得結果はすべて [`FetchTicket`]（ジョブID + ティック番号）付きで返ってくる。
//! 次の結果は破棄する:
//! - 別ジョブのもの
//! - Terminal / Stopped 後に届いたもの
//! - 同じ種類のより新しいティックが適用済みのもの
//! - 最終取得の発行より前のティックのもの

use crate::reconcile::{reconcile, JobView};
use crate::types::{JobId, ProgressSnapshot, ScanJob};

/// ポーラーのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// まだレコードを一度も取得できていない
    Loading,
    /// pending / processing。タイマー稼働中
    Active,
    /// どちらかのソースが終端を報告。タイマー停止、最終レコード取得待ち
    Finalizing,
    /// completed / failed。以降は何も取得しない
    Terminal,
    /// 呼び出し側が停止した
    Stopped,
}

impl Phase {
    /// タイマーを回すべきフェーズか
    pub fn is_ticking(self) -> bool {
        matches!(self, Phase::Loading | Phase::Active)
    }

    /// もう何も起きないフェーズか
    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Terminal | Phase::Stopped)
    }
}

/// 取得の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Record,
    Progress,
}

/// 取得要求の刻印
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub job_id: JobId,
    pub tick: u64,
    pub kind: FetchKind,
}

/// 取得結果
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Record(ScanJob),
    /// None = トラッカーに進捗がない（未開始・クリア済み）
    Progress(Option<ProgressSnapshot>),
    /// 一時的な失敗（ログ用メッセージ）
    Failed(String),
}

/// 結果適用後にドライバが取るべき動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// 古い/無関係な結果として破棄した
    Ignored,
    /// 適用したが表示は変わらない
    Unchanged,
    /// 表示状態が変わった
    Updated,
    /// タイマーを止め、このチケットで最終レコード取得を1回だけ発行する
    Finalize(FetchTicket),
    /// 最終レコード取得が失敗した。1周期後にこのチケットで再発行する
    RetryFinal(FetchTicket),
    /// 最終レコードが終端でなかった。タイマーを再開する
    Resume,
    /// 終端に到達した。タイマーを解放して終了する
    Finished,
}

/// 1ジョブ分のポーラー状態機械
#[derive(Debug, Clone)]
pub struct JobStatusPoller {
    job_id: JobId,
    phase: Phase,
    view: JobView,
    next_tick: u64,
    started: bool,
    /// これより前のティックの結果は破棄する
    floor_tick: u64,
    applied_record_tick: Option<u64>,
    applied_progress_tick: Option<u64>,
    final_ticket: Option<FetchTicket>,
    record_fetches: u64,
    progress_fetches: u64,
}

impl JobStatusPoller {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            phase: Phase::Loading,
            view: JobView::default(),
            next_tick: 0,
            started: false,
            floor_tick: 0,
            applied_record_tick: None,
            applied_progress_tick: None,
            final_ticket: None,
            record_fetches: 0,
            progress_fetches: 0,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    /// 発行したレコード取得の回数
    pub fn record_fetches(&self) -> u64 {
        self.record_fetches
    }

    /// 発行した進捗取得の回数
    pub fn progress_fetches(&self) -> u64 {
        self.progress_fetches
    }

    /// 開始時の最初のレコード取得。2回目以降は None
    pub fn start(&mut self) -> Option<FetchTicket> {
        if self.started || self.phase != Phase::Loading {
            return None;
        }
        self.started = true;
        Some(self.issue(FetchKind::Record))
    }

    /// タイマー1周期分の取得要求（レコード + 進捗）
    pub fn tick(&mut self) -> Vec<FetchTicket> {
        if !self.phase.is_ticking() {
            return Vec::new();
        }
        self.started = true;
        let tick = self.next_tick;
        self.next_tick += 1;
        self.record_fetches += 1;
        self.progress_fetches += 1;
        vec![
            FetchTicket { job_id: self.job_id, tick, kind: FetchKind::Record },
            FetchTicket { job_id: self.job_id, tick, kind: FetchKind::Progress },
        ]
    }

    /// 停止する。すでに停止/終端なら何もしない（戻り値 false）
    pub fn stop(&mut self) -> bool {
        if self.phase.is_finished() {
            return false;
        }
        self.phase = Phase::Stopped;
        self.final_ticket = None;
        true
    }

    /// 取得結果を適用する
    pub fn apply(&mut self, ticket: FetchTicket, outcome: FetchOutcome) -> Effect {
        if ticket.job_id != self.job_id || self.phase.is_finished() || ticket.tick < self.floor_tick {
            return Effect::Ignored;
        }

        if self.phase == Phase::Finalizing {
            return self.apply_final(ticket, outcome);
        }

        match outcome {
            // 一時的な失敗: 状態は変えず、次のティックで再試行
            FetchOutcome::Failed(_) => Effect::Unchanged,
            FetchOutcome::Record(job) => {
                if is_stale(self.applied_record_tick, ticket.tick) || ticket.kind != FetchKind::Record {
                    return Effect::Ignored;
                }
                self.applied_record_tick = Some(ticket.tick);

                if job.is_terminal() {
                    if self.phase == Phase::Loading && self.view.is_loading() {
                        // 最初の取得で既に終端: このレコード自体が最終ペイロード
                        return self.finish(&job);
                    }
                    return self.begin_finalize();
                }

                self.phase = Phase::Active;
                self.update_view(Some(&job), None)
            }
            FetchOutcome::Progress(snapshot) => {
                if is_stale(self.applied_progress_tick, ticket.tick) || ticket.kind != FetchKind::Progress {
                    return Effect::Ignored;
                }
                self.applied_progress_tick = Some(ticket.tick);

                let Some(snapshot) = snapshot.filter(|p| !p.is_unknown()) else {
                    return Effect::Unchanged;
                };
                if snapshot.terminal_status().is_some() {
                    return self.begin_finalize();
                }
                self.update_view(None, Some(&snapshot))
            }
        }
    }

    fn apply_final(&mut self, ticket: FetchTicket, outcome: FetchOutcome) -> Effect {
        if self.final_ticket != Some(ticket) {
            return Effect::Ignored;
        }

        match outcome {
            FetchOutcome::Record(job) if job.is_terminal() => self.finish(&job),
            FetchOutcome::Record(job) => {
                // レコードが優先: まだ終端ではない
                self.final_ticket = None;
                self.applied_record_tick = Some(ticket.tick);
                self.phase = Phase::Active;
                self.view = reconcile(&self.view, Some(&job), None);
                Effect::Resume
            }
            FetchOutcome::Failed(_) => {
                let retry = self.issue(FetchKind::Record);
                self.floor_tick = retry.tick;
                self.final_ticket = Some(retry);
                Effect::RetryFinal(retry)
            }
            FetchOutcome::Progress(_) => Effect::Ignored,
        }
    }

    fn begin_finalize(&mut self) -> Effect {
        let ticket = self.issue(FetchKind::Record);
        self.phase = Phase::Finalizing;
        self.floor_tick = ticket.tick;
        self.final_ticket = Some(ticket);
        Effect::Finalize(ticket)
    }

    fn finish(&mut self, job: &ScanJob) -> Effect {
        self.view = reconcile(&self.view, Some(job), None);
        self.phase = Phase::Terminal;
        self.final_ticket = None;
        Effect::Finished
    }

    fn update_view(&mut self, record: Option<&ScanJob>, progress: Option<&ProgressSnapshot>) -> Effect {
        let next = reconcile(&self.view, record, progress);
        if next == self.view {
            Effect::Unchanged
        } else {
            self.view = next;
            Effect::Updated
        }
    }

    fn issue(&mut self, kind: FetchKind) -> FetchTicket {
        let tick = self.next_tick;
        self.next_tick += 1;
        match kind {
            FetchKind::Record => self.record_fetches += 1,
            FetchKind::Progress => self.progress_fetches += 1,
        }
        FetchTicket { job_id: self.job_id, tick, kind }
    }
}

fn is_stale(applied: Option<u64>, tick: u64) -> bool {
    applied.map(|t| tick <= t).unwrap_or(false)
}
