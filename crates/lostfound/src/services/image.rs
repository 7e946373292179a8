//! Download of confirmed item pictures into the local image directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{LostFoundError, LostFoundResult};

/// Fetches a picture and stores it under a given file name
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, file_name: &str) -> LostFoundResult<PathBuf>;
}

/// Local file name for a picture: the media id when present, otherwise the URL's last
/// path segment. Anything outside `[A-Za-z0-9_-]` is replaced so the name cannot escape
/// the image directory.
pub fn image_file_name(picture_url: &str, media_id: &str) -> String {
    let base = if media_id.trim().is_empty() {
        picture_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    } else {
        media_id.trim()
    };

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(96)
        .collect();

    if sanitized.is_empty() {
        "image.png".to_string()
    } else {
        format!("{}.png", sanitized)
    }
}

/// Downloads over HTTP into `image_dir`
pub struct HttpImageFetcher {
    client: reqwest::Client,
    image_dir: PathBuf,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            image_dir: image_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str, file_name: &str) -> LostFoundResult<PathBuf> {
        if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(LostFoundError::Validation(format!(
                "Invalid image file name: {}",
                file_name
            )));
        }

        let mut resp = self.client.get(url).send().await?.error_for_status()?;

        tokio::fs::create_dir_all(&self.image_dir).await?;
        let path = self.image_dir.join(file_name);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0usize;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        info!(path = %path.display(), bytes = written, "Image downloaded");
        Ok(path)
    }
}
