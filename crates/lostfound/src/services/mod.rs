//! Services module - capabilities the conversation engine talks to

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod image;
pub mod notifier;
pub mod recorder;
pub mod render;
pub mod tags;

/// Shared database pool type
pub type DbPool = Arc<SqlitePool>;

pub use image::{image_file_name, HttpImageFetcher, ImageFetcher};
pub use notifier::{LogNotifier, Notifier, WeComCredentials, WeComNotifier};
pub use recorder::{Recorder, SqliteRecorder};
pub use render::record_markdown;
pub use tags::{JiebaTagExtractor, TagExtractor};
