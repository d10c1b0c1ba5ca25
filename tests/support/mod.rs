//! テスト用のインメモリScanApi
//!
//! 応答は呼び出し順に台本から返し、台本が尽きたら最後の応答を繰り返す。

#![allow(dead_code)]

use async_trait::async_trait;
use card_scan::api::ScanApi;
use card_scan::error::{Result, ScanError};
use card_scan_common::{JobId, JobStatus, ProgressSnapshot, ScanJob};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail,
}

pub struct FakeApi {
    records: Vec<Reply<ScanJob>>,
    progress: Vec<Reply<Option<ProgressSnapshot>>>,
    submitted: Option<ScanJob>,
    record_calls: Mutex<HashMap<JobId, usize>>,
    progress_calls: Mutex<HashMap<JobId, usize>>,
}

impl FakeApi {
    pub fn new(records: Vec<Reply<ScanJob>>, progress: Vec<Reply<Option<ProgressSnapshot>>>) -> Self {
        Self {
            records,
            progress,
            submitted: None,
            record_calls: Mutex::new(HashMap::new()),
            progress_calls: Mutex::new(HashMap::new()),
        }
    }

    /// submit が受理するジョブ（None なら拒否）
    pub fn with_submission(mut self, job: ScanJob) -> Self {
        self.submitted = Some(job);
        self
    }

    pub fn record_calls(&self, id: JobId) -> usize {
        self.record_calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn progress_calls(&self, id: JobId) -> usize {
        self.progress_calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

fn next_reply<T: Clone>(script: &[Reply<T>], calls: &Mutex<HashMap<JobId, usize>>, id: JobId) -> Reply<T> {
    let mut calls = calls.lock().unwrap();
    let count = calls.entry(id).or_insert(0);
    let index = (*count).min(script.len().saturating_sub(1));
    *count += 1;
    script.get(index).cloned().unwrap_or(Reply::Fail)
}

fn server_error() -> ScanError {
    ScanError::Status { status: 500, body: "internal error".into() }
}

#[async_trait]
impl ScanApi for FakeApi {
    async fn submit(&self, image: &Path) -> Result<ScanJob> {
        self.submitted
            .clone()
            .ok_or_else(|| ScanError::Submission(format!("rejected: {}", image.display())))
    }

    async fn fetch_record(&self, id: JobId) -> Result<ScanJob> {
        match next_reply(&self.records, &self.record_calls, id) {
            Reply::Ok(mut job) => {
                job.id = id;
                Ok(job)
            }
            Reply::Fail => Err(server_error()),
        }
    }

    async fn fetch_progress(&self, id: JobId) -> Result<Option<ProgressSnapshot>> {
        match next_reply(&self.progress, &self.progress_calls, id) {
            Reply::Ok(snapshot) => Ok(snapshot),
            Reply::Fail => Err(server_error()),
        }
    }

    async fn list(&self) -> Result<Vec<ScanJob>> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: JobId) -> Result<()> {
        Err(ScanError::NotFound(id))
    }

    async fn fetch_asset(&self, _path: &str) -> Result<Vec<u8>> {
        Err(server_error())
    }
}

pub fn record(status: JobStatus) -> Reply<ScanJob> {
    Reply::Ok(ScanJob {
        status,
        filename: "card.jpg".into(),
        created_at: "2024-05-01T09:00:00".into(),
        ..Default::default()
    })
}

pub fn progress(status: &str, percent: f64) -> Reply<Option<ProgressSnapshot>> {
    Reply::Ok(Some(ProgressSnapshot::new(status, percent)))
}
