use card_scan_common::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("HTTP通信エラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("サーバーエラー ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("スキャンが見つかりません: {0}")]
    NotFound(JobId),

    #[error("アップロードに失敗しました: {0}")]
    Submission(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("レスポンスのパースに失敗: {0}")]
    ResponseParse(#[from] card_scan_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
