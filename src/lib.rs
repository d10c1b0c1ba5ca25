//! カード画像スキャンのクライアント
//!
//! - `api`: サーバーとのHTTP通信
//! - `poller`: ジョブ状態ポーラーのtokioドライバ
//! - `session`: 追跡中ジョブの管理
//! - `report`: 端末向けの整形

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod poller;
pub mod report;
pub mod session;
