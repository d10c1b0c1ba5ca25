//! 注釈オーバーレイ
//!
//! 元画像座標の項目枠を、現在の表示倍率で画面座標の矩形へ写す。
//! 状態を持たない純粋な変換なので、描画のたびに呼び直してよい。

use crate::scale::ScaleFactor;
use crate::types::Field;

/// 画面座標の矩形（画像左上が原点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// 左上は含み、右下は含まない
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }
}

/// 1項目分のオーバーレイ（クリック対象）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayBox {
    /// `fields` 内の位置
    pub field_index: usize,
    pub field_id: i64,
    pub rect: ScreenRect,
}

/// 1項目の枠を画面座標へ。枠なし（width == 0）は None
pub fn scale_field(field: &Field, scale: ScaleFactor) -> Option<ScreenRect> {
    if !field.has_box() {
        return None;
    }
    Some(ScreenRect {
        left: scale.apply(field.x),
        top: scale.apply(field.y),
        width: scale.apply(field.width),
        height: scale.apply(field.height),
    })
}

/// 全項目のオーバーレイを作る（入力順を保つ）
pub fn render_overlay(fields: &[Field], scale: ScaleFactor) -> Vec<OverlayBox> {
    fields
        .iter()
        .enumerate()
        .filter_map(|(index, field)| {
            scale_field(field, scale).map(|rect| OverlayBox {
                field_index: index,
                field_id: field.id,
                rect,
            })
        })
        .collect()
}

/// 画面座標 (x, y) にある最前面（最後に描画された）のオーバーレイ
pub fn hit_test(boxes: &[OverlayBox], x: f64, y: f64) -> Option<&OverlayBox> {
    boxes.iter().rev().find(|b| b.rect.contains(x, y))
}

/// クリック位置から選択される項目
pub fn field_at<'a>(fields: &'a [Field], boxes: &[OverlayBox], x: f64, y: f64) -> Option<&'a Field> {
    hit_test(boxes, x, y).and_then(|b| fields.get(b.field_index))
}
