use card_scan_common::{Field, FieldInspector, JobId, JobStatus, JobView, ScaleTracker, ScanJob};

/// 抽出フィールドが1つもないときの表示
pub const NO_FIELDS_MESSAGE: &str = "No text extracted yet. Image might be unclear or processing failed.";

#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// ジョブID入力欄
    pub job_input: String,
    pub tracking: Option<JobId>,
    pub view: JobView,
    pub history: Vec<ScanJob>,
    /// 削除確認中のジョブ
    pub pending_delete: Option<JobId>,
    pub inspector: FieldInspector,
    pub scale: ScaleTracker,
}

impl AppState {
    /// 別ジョブの追跡を始めるときの初期化
    pub fn start_tracking(&mut self, id: JobId) {
        self.tracking = Some(id);
        self.view = JobView::default();
        self.inspector.dismiss();
    }

    pub fn stop_tracking(&mut self) {
        self.tracking = None;
        self.view = JobView::default();
        self.inspector.dismiss();
    }

    /// 完了したジョブのカード画像
    pub fn card_image(&self) -> Option<&str> {
        card_image_of(&self.view)
    }

    /// 表示するカード画像を切り替える
    ///
    /// テクスチャが既にある（再表示）なら、読み込み完了を待たずに元画像幅を反映する。
    pub fn show_card(&mut self, path: &str, cached_width: Option<f64>) {
        self.scale.track(path);
        if let Some(natural) = cached_width {
            self.feed_natural_width(path, natural);
        }
    }

    /// 元画像幅が未確定なら反映する
    pub fn feed_natural_width(&mut self, path: &str, natural: f64) {
        if self.scale.natural_width().is_some() {
            return;
        }
        let rendered = self.scale.rendered_width().unwrap_or(natural);
        self.scale.on_load(path, natural, rendered);
    }

    pub fn remove_from_history(&mut self, id: JobId) {
        self.history.retain(|job| job.id != id);
    }
}

/// 終端に達した統合状態からカード画像のパスを取り出す
pub fn card_image_of(view: &JobView) -> Option<&str> {
    if view.status != Some(JobStatus::Completed) {
        return None;
    }
    view.record.as_ref()?.card_image_path.as_deref()
}

/// フィールド一覧のサムネイルとして読み込む切り抜き画像
pub fn field_crop_paths(fields: &[Field]) -> Vec<&str> {
    fields
        .iter()
        .filter_map(|f| f.image_path.as_deref())
        .filter(|p| !p.is_empty())
        .collect()
}

/// プログレスバー用の 0.0〜1.0
pub fn progress_fraction(view: &JobView) -> f32 {
    (view.percent.clamp(0.0, 100.0) / 100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_view(card: Option<&str>) -> JobView {
        JobView {
            status: Some(JobStatus::Completed),
            progress_label: None,
            percent: 100.0,
            record: Some(ScanJob {
                id: JobId(1),
                status: JobStatus::Completed,
                card_image_path: card.map(str::to_string),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_card_image_only_when_completed() {
        assert_eq!(card_image_of(&completed_view(Some("output/1_card.jpg"))), Some("output/1_card.jpg"));
        assert_eq!(card_image_of(&completed_view(None)), None);

        let mut processing = completed_view(Some("output/1_card.jpg"));
        processing.status = Some(JobStatus::Processing);
        assert_eq!(card_image_of(&processing), None);
    }

    #[test]
    fn test_progress_fraction() {
        let view = JobView { percent: 55.0, ..Default::default() };
        assert!((progress_fraction(&view) - 0.55).abs() < 1e-6);
        let over = JobView { percent: 140.0, ..Default::default() };
        assert_eq!(progress_fraction(&over), 1.0);
    }

    #[test]
    fn test_field_crop_paths_skip_missing() {
        let fields = vec![
            Field { id: 1, image_path: Some("output/card_fields/1.jpg".into()), ..Default::default() },
            Field { id: 2, image_path: None, ..Default::default() },
            Field { id: 3, image_path: Some(String::new()), ..Default::default() },
        ];
        assert_eq!(field_crop_paths(&fields), vec!["output/card_fields/1.jpg"]);
        assert!(field_crop_paths(&[]).is_empty());
    }

    #[test]
    fn test_revisit_cached_card_restores_scale() {
        let mut state = AppState::default();

        state.show_card("output/a_card.jpg", None);
        state.scale.on_resize(500.0);
        state.feed_natural_width("output/a_card.jpg", 1000.0);
        assert_eq!(state.scale.current().get(), 0.5);

        state.show_card("output/b_card.jpg", None);
        state.feed_natural_width("output/b_card.jpg", 2000.0);
        assert_eq!(state.scale.current().get(), 0.25);

        // Aのテクスチャはキャッシュ済み: 読み込みイベントは来ない
        state.show_card("output/a_card.jpg", Some(1000.0));
        state.scale.on_resize(500.0);
        assert_eq!(state.scale.current().get(), 0.5);
    }

    #[test]
    fn test_feed_natural_width_ignores_other_image() {
        let mut state = AppState::default();
        state.show_card("output/a_card.jpg", None);
        state.scale.on_resize(400.0);
        state.feed_natural_width("output/b_card.jpg", 1000.0);
        assert_eq!(state.scale.natural_width(), None);
        assert_eq!(state.scale.current().get(), 1.0);
    }

    #[test]
    fn test_start_tracking_resets_view() {
        let mut state = AppState {
            view: completed_view(None),
            ..Default::default()
        };
        state.inspector.select(Default::default());
        state.start_tracking(JobId(2));
        assert_eq!(state.tracking, Some(JobId(2)));
        assert!(state.view.is_loading());
        assert!(!state.inspector.is_open());
    }
}
