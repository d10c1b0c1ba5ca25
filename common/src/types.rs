//! スキャンジョブの型定義
//!
//! CLIとデスクトップビューアで共有される型:
//! - ScanJob: サーバーに永続化されたジョブレコード（確定情報）
//! - ProgressSnapshot: インメモリトラッカーの進捗（揮発性、非確定）
//! - Field: カード画像から抽出された項目（元画像のピクセル座標）

use serde::{Deserialize, Serialize};
use std::fmt;

/// ジョブID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(JobId)
    }
}

/// ジョブの状態（レコード側）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// completed / failed は終端状態。以降の遷移はない
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// 進捗ラベル文字列から終端状態を判定
    pub fn terminal_from_label(label: &str) -> Option<JobStatus> {
        match label {
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 抽出項目
///
/// 座標は元画像のピクセル空間。`width == 0` は「枠なし」（派生項目など）を表し、
/// オーバーレイには描画しない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub confidence: f64,          // 0.0〜1.0

    #[serde(default)]
    pub x: f64,

    #[serde(default)]
    pub y: f64,

    #[serde(default)]
    pub width: f64,

    #[serde(default)]
    pub height: f64,

    /// 切り出し画像のパス（ベースURL相対）
    #[serde(default)]
    pub image_path: Option<String>,
}

impl Field {
    /// 画像上に枠を持つか
    pub fn has_box(&self) -> bool {
        self.width > 0.0
    }
}

/// 永続化されたジョブレコード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default)]
    pub filename: String,

    /// 作成日時（タイムゾーンなしの文字列のまま保持）
    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub original_image_path: String,

    /// 検出したカード画像のパス（完了時のみ）
    #[serde(default)]
    pub card_image_path: Option<String>,

    /// 失敗理由（failed時のみ）
    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ScanJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// オーバーレイ対象（枠あり）の項目数
    pub fn boxed_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.has_box()).count()
    }
}

/// レスポンスボディからジョブレコードを読む
pub fn parse_record(body: &str) -> crate::Result<ScanJob> {
    Ok(serde_json::from_str(body)?)
}

/// レスポンスボディからジョブ一覧を読む
pub fn parse_records(body: &str) -> crate::Result<Vec<ScanJob>> {
    Ok(serde_json::from_str(body)?)
}

/// レスポンスボディから進捗を読む
pub fn parse_progress(body: &str) -> crate::Result<ProgressSnapshot> {
    Ok(serde_json::from_str(body)?)
}

/// インメモリトラッカーの進捗スナップショット
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub percent: f64,             // 0〜100
}

impl ProgressSnapshot {
    /// トラッカーが知らないジョブに返すラベル
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(status: impl Into<String>, percent: f64) -> Self {
        Self {
            status: status.into(),
            percent,
        }
    }

    /// 「未追跡」応答か（開始前、または完了後にクリア済み）
    pub fn is_unknown(&self) -> bool {
        self.status.is_empty() || self.status == Self::UNKNOWN
    }

    /// 終端ラベルなら対応するJobStatus
    pub fn terminal_status(&self) -> Option<JobStatus> {
        JobStatus::terminal_from_label(&self.status)
    }

    /// [0, 100] に丸めた進捗率。NaNは0扱い
    pub fn clamped_percent(&self) -> f64 {
        if self.percent.is_nan() {
            0.0
        } else {
            self.percent.clamp(0.0, 100.0)
        }
    }
}
