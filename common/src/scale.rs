//! 表示倍率の追跡
//!
//! 1枚の画像について「表示幅 / 元画像幅」を保持する。
//! 画像の読み込み完了・ビューポートのリサイズ・画像の差し替えで再計算し、
//! 元画像幅が未確定（未読み込み）の間は再計算をスキップして前回値を保つ。

use crate::error::{Error, Result};

/// 表示倍率（常に正の有限値）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor(1.0);

    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(ScaleFactor(value))
    }

    /// 表示幅と元画像幅から倍率を作る
    pub fn from_widths(rendered_width: f64, natural_width: f64) -> Result<Self> {
        let invalid = || Error::InvalidScale { rendered: rendered_width, natural: natural_width };
        if !(natural_width.is_finite() && natural_width > 0.0) {
            return Err(invalid());
        }
        Self::new(rendered_width / natural_width).ok_or_else(invalid)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// 元画像座標を画面座標へ
    pub fn apply(self, value: f64) -> f64 {
        value * self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 画像まわりのイベント
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEvent {
    /// 追跡対象の画像が変わった（新しいジョブ/画像）
    Retarget { image: String },
    /// 画像の読み込みが完了した
    Loaded { image: String, natural_width: f64, rendered_width: f64 },
    /// ビューポートのリサイズで表示幅が変わった
    Resized { rendered_width: f64 },
}

/// 1枚の画像の表示倍率を追跡する
#[derive(Debug, Clone, Default)]
pub struct ScaleTracker {
    image: Option<String>,
    natural_width: Option<f64>,
    rendered_width: Option<f64>,
    scale: ScaleFactor,
}

impl ScaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の倍率。リサイズで非同期に変わるので、1回の描画を超えて保持しないこと
    pub fn current(&self) -> ScaleFactor {
        self.scale
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn natural_width(&self) -> Option<f64> {
        self.natural_width
    }

    pub fn rendered_width(&self) -> Option<f64> {
        self.rendered_width
    }

    /// イベントを反映する。倍率を再計算できた場合はその値を返す
    pub fn handle(&mut self, event: ImageEvent) -> Option<ScaleFactor> {
        match event {
            ImageEvent::Retarget { image } => {
                if self.image.as_deref() == Some(image.as_str()) {
                    return None;
                }
                self.image = Some(image);
                self.natural_width = None;
                self.recompute()
            }
            ImageEvent::Loaded { image, natural_width, rendered_width } => {
                if self.image.as_deref() != Some(image.as_str()) {
                    // 差し替え前の画像の読み込み完了
                    return None;
                }
                self.natural_width = (natural_width > 0.0).then_some(natural_width);
                self.rendered_width = Some(rendered_width);
                self.recompute()
            }
            ImageEvent::Resized { rendered_width } => {
                self.rendered_width = Some(rendered_width);
                self.recompute()
            }
        }
    }

    pub fn track(&mut self, image: impl Into<String>) -> Option<ScaleFactor> {
        self.handle(ImageEvent::Retarget { image: image.into() })
    }

    pub fn on_load(&mut self, image: impl Into<String>, natural_width: f64, rendered_width: f64) -> Option<ScaleFactor> {
        self.handle(ImageEvent::Loaded { image: image.into(), natural_width, rendered_width })
    }

    pub fn on_resize(&mut self, rendered_width: f64) -> Option<ScaleFactor> {
        self.handle(ImageEvent::Resized { rendered_width })
    }

    fn recompute(&mut self) -> Option<ScaleFactor> {
        let natural = self.natural_width?;
        let rendered = self.rendered_width?;
        let scale = ScaleFactor::from_widths(rendered, natural).ok()?;
        self.scale = scale;
        Some(scale)
    }
}
