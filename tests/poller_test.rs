//! ポーラードライバのテスト
//!
//! tokioの一時停止クロックで周期を進め、インメモリAPIへの呼び出し回数と
//! 送られてくる統合状態を検証する。

mod support;

use card_scan::poller::{spawn_poller, PollerHandle};
use card_scan_common::{JobId, JobStatus, JobView, ScanJob};
use std::sync::Arc;
use std::time::Duration;
use support::{progress, record, FakeApi, Reply};

const PERIOD: Duration = Duration::from_secs(1);
const JOB: JobId = JobId(7);

/// ストリームが閉じるまで統合状態を集める
async fn collect(handle: &mut PollerHandle) -> Vec<JobView> {
    let mut views = Vec::new();
    while let Some(view) = handle.next().await {
        views.push(view);
    }
    views
}

fn assert_monotonic(views: &[JobView]) {
    for pair in views.windows(2) {
        assert!(
            pair[1].percent >= pair[0].percent,
            "進捗率が後退: {} -> {}",
            pair[0].percent,
            pair[1].percent
        );
    }
}

/// pending → processing 55 → completed の流れで100%に到達し、最終レコードを1回だけ取得する
#[tokio::test(start_paused = true)]
async fn test_progress_reaches_completion_with_single_final_fetch() {
    let api = Arc::new(FakeApi::new(
        vec![
            record(JobStatus::Pending),
            record(JobStatus::Pending),
            record(JobStatus::Processing),
            record(JobStatus::Processing),
            record(JobStatus::Completed),
        ],
        vec![
            progress("pending", 0.0),
            progress("processing", 55.0),
            progress("completed", 100.0),
        ],
    ));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    let views = collect(&mut handle).await;

    assert!(views.first().expect("統合状態なし").is_loading());
    assert_monotonic(&views);
    assert!(views.iter().any(|v| v.percent == 55.0 && v.display_label() == "processing"));

    let last = views.last().expect("統合状態なし");
    assert_eq!(last.status, Some(JobStatus::Completed));
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.display_label(), "completed");
    assert!(last.record.is_some());

    // 初回 + 3ティック + 最終取得1回
    assert_eq!(api.record_calls(JOB), 5);
    assert_eq!(api.progress_calls(JOB), 3);

    // 終端後は取得しない
    tokio::time::sleep(PERIOD * 10).await;
    assert_eq!(api.record_calls(JOB), 5);
    assert_eq!(api.progress_calls(JOB), 3);
    assert!(!handle.is_running());
}

/// 一時的な失敗は表示に出さず、次のティックの値で更新する
#[tokio::test(start_paused = true)]
async fn test_transient_failure_keeps_state() {
    let api = Arc::new(FakeApi::new(
        vec![
            record(JobStatus::Processing),
            record(JobStatus::Processing),
            Reply::Fail,
            record(JobStatus::Processing),
        ],
        vec![
            progress("detecting_card", 40.0),
            Reply::Fail,
            progress("performing_ocr", 70.0),
        ],
    ));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    let mut views = Vec::new();
    while let Some(view) = handle.next().await {
        let reached = view.percent == 70.0;
        views.push(view);
        if reached {
            break;
        }
    }

    assert_monotonic(&views);
    let last = views.last().expect("統合状態なし");
    assert_eq!(last.status, Some(JobStatus::Processing));
    assert_eq!(last.display_label(), "performing ocr");
    assert!(views.iter().all(|v| v.status != Some(JobStatus::Failed)));

    handle.stop();
    assert!(handle.next().await.is_none());
}

/// 最初の取得は即時、以降は周期ごと
#[tokio::test(start_paused = true)]
async fn test_first_fetch_is_immediate() {
    let api = Arc::new(FakeApi::new(
        vec![record(JobStatus::Processing)],
        vec![progress("extracting_fields", 40.0)],
    ));

    let _handle = spawn_poller(api.clone(), JOB, PERIOD);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(api.record_calls(JOB), 1);
    assert_eq!(api.progress_calls(JOB), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.record_calls(JOB), 2);
    assert_eq!(api.progress_calls(JOB), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.record_calls(JOB), 3);
    assert_eq!(api.progress_calls(JOB), 2);
}

/// 最初のレコードが既に終端なら、そのまま終了する
#[tokio::test(start_paused = true)]
async fn test_already_terminal_job() {
    let failed = ScanJob {
        status: JobStatus::Failed,
        filename: "blurry.jpg".into(),
        error_message: Some("no card detected".into()),
        ..Default::default()
    };
    let api = Arc::new(FakeApi::new(vec![Reply::Ok(failed)], vec![progress("unknown", 0.0)]));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    let views = collect(&mut handle).await;

    let last = views.last().expect("統合状態なし");
    assert_eq!(last.status, Some(JobStatus::Failed));
    assert_eq!(last.percent, 100.0);
    let job = last.record.as_ref().expect("レコードなし");
    assert_eq!(job.error_message.as_deref(), Some("no card detected"));

    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(api.record_calls(JOB), 1);
    assert_eq!(api.progress_calls(JOB), 0);
}

/// 進捗が終端を報告してもレコードが非終端なら監視を続ける
#[tokio::test(start_paused = true)]
async fn test_record_wins_over_progress() {
    let api = Arc::new(FakeApi::new(
        vec![
            record(JobStatus::Processing),
            record(JobStatus::Processing),
            // 最終取得: まだ processing
            record(JobStatus::Processing),
            record(JobStatus::Completed),
        ],
        vec![progress("completed", 100.0), progress("performing_ocr", 70.0)],
    ));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    let views = collect(&mut handle).await;

    let last = views.last().expect("統合状態なし");
    assert_eq!(last.status, Some(JobStatus::Completed));
    assert!(views
        .iter()
        .any(|v| v.status == Some(JobStatus::Processing) && !v.is_terminal()));
    assert!(api.record_calls(JOB) >= 4);
}

/// 最終取得に失敗したら1周期後に再試行する
#[tokio::test(start_paused = true)]
async fn test_final_fetch_retried_after_failure() {
    let api = Arc::new(FakeApi::new(
        vec![
            record(JobStatus::Processing),
            record(JobStatus::Processing),
            Reply::Fail,
            record(JobStatus::Completed),
        ],
        vec![progress("completed", 100.0)],
    ));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    let views = collect(&mut handle).await;

    assert_eq!(views.last().and_then(|v| v.status), Some(JobStatus::Completed));
    // 初回 + ティック1回 + 最終（失敗） + 再試行
    assert_eq!(api.record_calls(JOB), 4);
    assert_eq!(api.progress_calls(JOB), 1);
}

/// stop は何度呼んでもよく、停止後は取得も送信もしない
#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let api = Arc::new(FakeApi::new(
        vec![record(JobStatus::Processing)],
        vec![progress("performing_ocr", 70.0)],
    ));

    let mut handle = spawn_poller(api.clone(), JOB, PERIOD);
    tokio::time::sleep(PERIOD * 2 + Duration::from_millis(100)).await;

    handle.stop();
    handle.stop();
    let last = handle.wait().await.expect("終了状態なし");
    assert!(!last.is_terminal());
    assert!(!handle.is_running());

    let calls = api.record_calls(JOB);
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(api.record_calls(JOB), calls);

    // 停止前に届いた分を読み切ったら閉じている
    while handle.try_next().is_some() {}
    assert!(handle.next().await.is_none());
    handle.stop();
}

/// ハンドルをDropすると停止する
#[tokio::test(start_paused = true)]
async fn test_drop_stops_polling() {
    let api = Arc::new(FakeApi::new(
        vec![record(JobStatus::Processing)],
        vec![progress("performing_ocr", 70.0)],
    ));

    let handle = spawn_poller(api.clone(), JOB, PERIOD);
    tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;
    drop(handle);
    tokio::task::yield_now().await;

    let calls = api.record_calls(JOB);
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(api.record_calls(JOB), calls);
}
