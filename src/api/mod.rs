//! スキャンAPIクライアント
//!
//! - 投入: `POST /api/scan`（multipart, field `file`）
//! - レコード: `GET /api/scans/{id}`
//! - 進捗: `GET /api/scan/{id}/progress`
//! - 一覧: `GET /api/scans`
//! - 削除: `DELETE /api/scans/{id}`
//!
//! カード画像・切り出し画像はレコード内の相対パスをベースURLに連結して取得する。

mod http;

pub use http::HttpScanApi;

use crate::error::Result;
use async_trait::async_trait;
use card_scan_common::{JobId, ProgressSnapshot, ScanJob};
use std::path::Path;

#[async_trait]
pub trait ScanApi: Send + Sync {
    /// 画像をアップロードしてジョブを作成する。失敗はそのまま呼び出し側へ返す（再試行しない）
    async fn submit(&self, image: &Path) -> Result<ScanJob>;

    /// 永続化レコード（終端判定と最終ペイロードの正）
    async fn fetch_record(&self, id: JobId) -> Result<ScanJob>;

    /// インメモリ進捗。トラッカーにない場合は None（エラーではない）
    async fn fetch_progress(&self, id: JobId) -> Result<Option<ProgressSnapshot>>;

    /// 履歴（新しい順）
    async fn list(&self) -> Result<Vec<ScanJob>>;

    async fn delete(&self, id: JobId) -> Result<()>;

    /// 静的ファイル（カード画像など）のバイト列
    async fn fetch_asset(&self, path: &str) -> Result<Vec<u8>>;
}

/// レコード内の相対パスをベースURLに連結
pub fn asset_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/').replace('\\', "/")
    )
}

/// 拡張子からアップロード時のContent-Typeを決める
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_url_joins_single_slash() {
        assert_eq!(
            asset_url("http://localhost:8000/", "/output/a_detected_card.jpg"),
            "http://localhost:8000/output/a_detected_card.jpg"
        );
        assert_eq!(
            asset_url("http://localhost:8000", "output/a_fields/1_2.jpg"),
            "http://localhost:8000/output/a_fields/1_2.jpg"
        );
    }

    #[test]
    fn test_asset_url_normalizes_backslashes() {
        assert_eq!(
            asset_url("http://localhost:8000", r"output\a_fields\1_2.jpg"),
            "http://localhost:8000/output/a_fields/1_2.jpg"
        );
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("card.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("card.png")), "image/png");
        assert_eq!(guess_mime(Path::new("card.bmp")), "image/bmp");
        assert_eq!(guess_mime(Path::new("card")), "application/octet-stream");
    }
}
