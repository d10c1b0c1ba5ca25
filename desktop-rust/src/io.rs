//! バックグラウンド通信
//!
//! tokioランタイムを1つ持ち、API呼び出しと画像のデコードをUIスレッドの外で行う。
//! 結果は `UiMessage` としてチャネルに送り、UIスレッドが毎フレーム読み出す。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};
use card_scan::api::{HttpScanApi, ScanApi};
use card_scan::config::Config;
use card_scan::report::newest_first;
use card_scan_common::{JobId, ScanJob};
use eframe::egui;
use tokio::runtime::Runtime;

pub enum UiMessage {
    Submitted(std::result::Result<ScanJob, String>),
    History(std::result::Result<Vec<ScanJob>, String>),
    Deleted { id: JobId, result: std::result::Result<(), String> },
    Image(ImageData),
}

/// デコード済み画像（RGBA）。失敗時は size が [0, 0]
pub struct ImageData {
    pub path: String,
    pub size: [usize; 2],
    pub pixels: Vec<u8>,
}

pub struct Backend {
    runtime: Runtime,
    api: Arc<dyn ScanApi>,
    list_limit: usize,
    tx: Sender<UiMessage>,
    ctx: egui::Context,
}

impl Backend {
    pub fn new(config: &Config, ctx: egui::Context) -> Result<(Self, Receiver<UiMessage>)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("start tokio runtime")?;
        let api = HttpScanApi::new(config)
            .with_context(|| format!("create client for {}", config.base_url))?;
        let (tx, rx) = mpsc::channel();
        let backend = Self {
            runtime,
            api: Arc::new(api),
            list_limit: config.list_limit as usize,
            tx,
            ctx,
        };
        Ok((backend, rx))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn api(&self) -> Arc<dyn ScanApi> {
        Arc::clone(&self.api)
    }

    pub fn submit(&self, path: PathBuf) {
        let api = self.api();
        let notifier = self.notifier();
        self.runtime.spawn(async move {
            let result = api.submit(&path).await.map_err(|e| e.to_string());
            notifier.send(UiMessage::Submitted(result));
        });
    }

    pub fn refresh_history(&self) {
        let api = self.api();
        let notifier = self.notifier();
        let limit = self.list_limit;
        self.runtime.spawn(async move {
            let result = api
                .list()
                .await
                .map(|jobs| newest_first(jobs, limit))
                .map_err(|e| e.to_string());
            notifier.send(UiMessage::History(result));
        });
    }

    pub fn delete(&self, id: JobId) {
        let api = self.api();
        let notifier = self.notifier();
        self.runtime.spawn(async move {
            let result = api.delete(id).await.map_err(|e| e.to_string());
            notifier.send(UiMessage::Deleted { id, result });
        });
    }

    /// サーバー上の画像（カード画像・切り出し画像）を取得してデコードする
    pub fn load_image(&self, path: String) {
        let api = self.api();
        let notifier = self.notifier();
        self.runtime.spawn(async move {
            let fetched = api.fetch_asset(&path).await.map_err(anyhow::Error::from);
            let decoded = match fetched {
                Ok(bytes) => {
                    let name = path.clone();
                    tokio::task::spawn_blocking(move || decode_image(&name, &bytes))
                        .await
                        .context("decode task")
                        .and_then(|r| r)
                }
                Err(err) => Err(err),
            };
            let image = decoded.unwrap_or_else(|_| ImageData {
                path: path.clone(),
                size: [0, 0],
                pixels: Vec::new(),
            });
            notifier.send(UiMessage::Image(image));
        });
    }

    fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.tx.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

/// 送信と同時に再描画を要求する
struct Notifier {
    tx: Sender<UiMessage>,
    ctx: egui::Context,
}

impl Notifier {
    fn send(&self, message: UiMessage) {
        let _ = self.tx.send(message);
        self.ctx.request_repaint();
    }
}

fn decode_image(path: &str, bytes: &[u8]) -> Result<ImageData> {
    let image = image::load_from_memory(bytes).with_context(|| format!("decode {path}"))?;
    let rgba = image.to_rgba8();
    Ok(ImageData {
        path: path.to_string(),
        size: [rgba.width() as usize, rgba.height() as usize],
        pixels: rgba.into_raw(),
    })
}
