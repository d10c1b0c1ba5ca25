//! Card Scan Common Library
//!
//! CLIとデスクトップビューアで共有される型とロジック（I/Oなし）

pub mod types;
pub mod error;
pub mod reconcile;
pub mod poller;
pub mod scale;
pub mod overlay;
pub mod inspector;

pub use types::{Field, JobId, JobStatus, ProgressSnapshot, ScanJob, parse_progress, parse_record, parse_records};
pub use error::{Error, Result};
pub use reconcile::{JobView, reconcile};
pub use poller::{Effect, FetchKind, FetchOutcome, FetchTicket, JobStatusPoller, Phase};
pub use scale::{ImageEvent, ScaleFactor, ScaleTracker};
pub use overlay::{OverlayBox, ScreenRect, field_at, hit_test, render_overlay, scale_field};
pub use inspector::{FieldDetail, FieldInspector, display_text, format_confidence};
