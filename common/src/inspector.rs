//! 項目詳細の選択状態
//!
//! 同時に選択できるのは1項目だけ。新しい項目を選ぶと、未選択を挟まずに差し替わる。

use crate::types::Field;

/// 選択中の項目（なし or 1項目）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldInspector {
    selected: Option<Field>,
}

impl FieldInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 選択する（矩形クリック・一覧クリック）。差し替え前の項目を返す
    pub fn select(&mut self, field: Field) -> Option<Field> {
        self.selected.replace(field)
    }

    /// 閉じる（閉じるボタン・背景クリック）
    pub fn dismiss(&mut self) -> Option<Field> {
        self.selected.take()
    }

    pub fn selected(&self) -> Option<&Field> {
        self.selected.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.selected.is_some()
    }

    /// 指定IDの項目が選択中か
    pub fn is_selected(&self, field_id: i64) -> bool {
        self.selected.as_ref().map(|f| f.id == field_id).unwrap_or(false)
    }
}

/// 詳細表示用に整形した項目
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDetail {
    pub text: String,
    pub confidence: String,
    pub position: String,
    pub image_path: Option<String>,
}

impl FieldDetail {
    pub fn from_field(field: &Field) -> Self {
        Self {
            text: display_text(field).to_string(),
            confidence: format_confidence(field.confidence),
            position: format!("{}, {}", field.x, field.y),
            image_path: field.image_path.clone(),
        }
    }
}

/// 空テキストは "Empty Field"
pub fn display_text(field: &Field) -> &str {
    if field.text.trim().is_empty() {
        "Empty Field"
    } else {
        field.text.as_str()
    }
}

/// 信頼度（0〜1）を小数1桁のパーセント表記に
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}
