//! 状態統合（レコード + 進捗）
//!
//! 2つの独立に更新されるソースを1つの表示状態にまとめる:
//! - 進捗（インメモリトラッカー）: 非終端中の進捗率と短いラベルの正
//! - レコード（永続化）: 終端判定と最終ペイロード（fields / card_image_path）の正
//!
//! 両者が終端について食い違う場合はレコードを優先する。

use crate::types::{JobStatus, ProgressSnapshot, ScanJob};

/// 統合された表示状態
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobView {
    /// レコード由来の状態。None = まだ一度も取得できていない（Loading）
    pub status: Option<JobStatus>,

    /// 進捗トラッカーの短いラベル（例: "performing_ocr"）
    pub progress_label: Option<String>,

    /// 表示用進捗率（0〜100、非終端中は単調非減少）
    pub percent: f64,

    /// 最新のレコード
    pub record: Option<ScanJob>,
}

impl JobView {
    pub fn is_loading(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.map(JobStatus::is_terminal).unwrap_or(false)
    }

    /// 画面表示用ラベル（アンダースコアは空白に）
    pub fn display_label(&self) -> String {
        let raw = match self.status {
            None => self.progress_label.as_deref().unwrap_or("loading"),
            Some(status) if status.is_terminal() => status.as_str(),
            Some(status) => self.progress_label.as_deref().unwrap_or(status.as_str()),
        };
        raw.replace('_', " ")
    }
}

/// 前回の表示状態と、新たに届いたスナップショット（どちらも任意）から次の表示状態を作る
///
/// - 終端レコード: 状態・ラベルはレコードの終端状態、進捗率100、レコード差し替え
/// - 終端済みの前回状態: 以降の入力は無視（不変）
/// - 非終端: 状態はレコード、進捗率は max(前回, 進捗)、ラベルは進捗の非終端ラベル
/// - "unknown" の進捗は「なし」と同じ
/// - 進捗の終端ラベルはラベルに反映しない（終端はレコードで確定する）
pub fn reconcile(
    previous: &JobView,
    record: Option<&ScanJob>,
    progress: Option<&ProgressSnapshot>,
) -> JobView {
    if previous.is_terminal() {
        return previous.clone();
    }

    if let Some(job) = record.filter(|r| r.is_terminal()) {
        return JobView {
            status: Some(job.status),
            progress_label: previous.progress_label.clone(),
            percent: 100.0,
            record: Some(job.clone()),
        };
    }

    let mut next = previous.clone();

    if let Some(job) = record {
        next.status = Some(job.status);
        next.record = Some(job.clone());
    }

    if let Some(snapshot) = progress.filter(|p| !p.is_unknown()) {
        next.percent = next.percent.max(snapshot.clamped_percent());
        if snapshot.terminal_status().is_none() {
            next.progress_label = Some(snapshot.status.clone());
        }
    }

    next
}
