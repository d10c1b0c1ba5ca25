//! 端末出力の整形

use card_scan_common::{display_text, format_confidence, Field, OverlayBox, ScanJob};
use chrono::NaiveDateTime;

/// サーバーの作成日時（ISO 8601、タイムゾーンなし）を表示用に
pub fn format_created_at(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"));
    match parsed {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// 履歴を新しい順に並べ、件数を制限する
pub fn newest_first(mut jobs: Vec<ScanJob>, limit: usize) -> Vec<ScanJob> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
    jobs.truncate(limit);
    jobs
}

/// 履歴1行
pub fn history_line(job: &ScanJob) -> String {
    let mut line = format!(
        "#{:<5} {:<10} {:<16} {}",
        job.id,
        job.status,
        format_created_at(&job.created_at),
        job.filename
    );
    if !job.fields.is_empty() {
        line.push_str(&format!(" ({}項目)", job.fields.len()));
    }
    line
}

/// 抽出項目の一覧行
pub fn field_line(field: &Field) -> String {
    format!(
        "  [{}] {}  信頼度 {}  位置 ({}, {})",
        field.id,
        display_text(field),
        format_confidence(field.confidence),
        field.x,
        field.y
    )
}

/// オーバーレイ矩形の行（表示倍率適用後）
pub fn overlay_line(fields: &[Field], overlay: &OverlayBox) -> String {
    let text = fields
        .get(overlay.field_index)
        .map(display_text)
        .unwrap_or_default();
    let r = overlay.rect;
    format!(
        "  [{}] left={:.1} top={:.1} width={:.1} height={:.1}  {}",
        overlay.field_id, r.left, r.top, r.width, r.height, text
    )
}

/// ジョブの要約（終端時の表示用）
pub fn job_summary(job: &ScanJob) -> Vec<String> {
    let mut lines = vec![format!(
        "スキャン #{} {} ({})",
        job.id, job.status, job.filename
    )];
    if let Some(message) = &job.error_message {
        lines.push(format!("  エラー: {}", message));
    }
    if job.fields.is_empty() {
        lines.push("  抽出項目なし".to_string());
    } else {
        lines.extend(job.fields.iter().map(field_line));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_scan_common::{render_overlay, JobId, JobStatus, ScaleFactor};

    fn job(id: i64, created_at: &str) -> ScanJob {
        ScanJob {
            id: JobId(id),
            status: JobStatus::Completed,
            filename: format!("card{}.jpg", id),
            created_at: created_at.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_created_at() {
        assert_eq!(format_created_at("2024-05-01T09:30:12.123456"), "2024-05-01 09:30");
        assert_eq!(format_created_at("2024-05-01 09:30:12"), "2024-05-01 09:30");
        // 解釈できない値はそのまま
        assert_eq!(format_created_at("yesterday"), "yesterday");
    }

    #[test]
    fn test_newest_first() {
        let jobs = vec![
            job(1, "2024-05-01T09:00:00"),
            job(3, "2024-05-03T09:00:00"),
            job(2, "2024-05-02T09:00:00"),
        ];
        let sorted = newest_first(jobs, 2);
        let ids: Vec<i64> = sorted.iter().map(|j| j.id.0).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_field_line_empty_text() {
        let field = Field {
            id: 4,
            text: "  ".into(),
            confidence: 0.876,
            x: 10.0,
            y: 20.0,
            ..Default::default()
        };
        let line = field_line(&field);
        assert!(line.contains("Empty Field"));
        assert!(line.contains("87.6%"));
        assert!(line.contains("(10, 20)"));
    }

    #[test]
    fn test_overlay_line() {
        let fields = vec![Field {
            id: 1,
            text: "ACME".into(),
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 40.0,
            ..Default::default()
        }];
        let scale = ScaleFactor::new(0.5).expect("倍率作成失敗");
        let boxes = render_overlay(&fields, scale);
        assert_eq!(
            overlay_line(&fields, &boxes[0]),
            "  [1] left=50.0 top=25.0 width=100.0 height=20.0  ACME"
        );
    }

    #[test]
    fn test_job_summary_failed() {
        let mut failed = job(9, "2024-05-01T09:00:00");
        failed.status = JobStatus::Failed;
        failed.error_message = Some("no card detected".into());
        let lines = job_summary(&failed);
        assert_eq!(lines[0], "スキャン #9 failed (card9.jpg)");
        assert!(lines.iter().any(|l| l.contains("no card detected")));
        assert!(lines.iter().any(|l| l.contains("抽出項目なし")));
    }
}
