//! 追跡中のジョブを1つだけ保持するセッション
//!
//! 別のジョブへ切り替えるときは、古いポーラーを止めてから新しいものを起動する。

use crate::api::ScanApi;
use crate::error::Result;
use crate::poller::{spawn_poller, PollerHandle};
use card_scan_common::{JobId, ScanJob};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ScanSession {
    api: Arc<dyn ScanApi>,
    period: Duration,
    poller: Option<PollerHandle>,
}

impl ScanSession {
    pub fn new(api: Arc<dyn ScanApi>, period: Duration) -> Self {
        Self { api, period, poller: None }
    }

    pub fn api(&self) -> Arc<dyn ScanApi> {
        Arc::clone(&self.api)
    }

    /// 追跡中のジョブID
    pub fn job_id(&self) -> Option<JobId> {
        self.poller.as_ref().map(|p| p.job_id())
    }

    pub fn poller(&mut self) -> Option<&mut PollerHandle> {
        self.poller.as_mut()
    }

    /// 指定ジョブの追跡を開始する（tokioランタイム上で呼ぶこと）
    ///
    /// 同じジョブを追跡中ならそのまま返す。
    pub fn track(&mut self, job_id: JobId) -> &mut PollerHandle {
        let same_job = self.job_id() == Some(job_id);
        if !same_job {
            self.teardown();
            info!(job = %job_id, "tracking job");
        }
        let api = Arc::clone(&self.api);
        let period = self.period;
        self.poller
            .get_or_insert_with(|| spawn_poller(api, job_id, period))
    }

    /// 画像を投入し、受理されたらそのジョブの追跡へ移る
    ///
    /// 失敗時は現在の追跡に触れない。
    pub async fn submit(&mut self, image: &Path) -> Result<ScanJob> {
        let job = self.api.submit(image).await?;
        info!(job = %job.id, filename = %job.filename, "scan accepted");
        self.track(job.id);
        Ok(job)
    }

    /// 追跡を終了する。何度呼んでもよい
    pub fn teardown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
