use std::{path::PathBuf, time::Duration};

use axum::{
	body::Body,
	extract::{Path, State},
	response::IntoResponse,
};
use hyper::StatusCode;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{error::ApiError, AppState};

/// Disk-backed object store for uploaded images. Records are only ever
/// written after an upload has produced a stable URL, so a failed upload
/// never leaves a record pointing at a missing image.
#[derive(Clone)]
pub struct ImageStore {
	root: PathBuf,
	attempts: u32,
	timeout: Duration,
}

impl ImageStore {
	pub fn new(root: impl Into<PathBuf>) -> ImageStore {
		ImageStore { root: root.into(), attempts: 3, timeout: Duration::from_secs(15) }
	}

	/// Validates the payload decodes as an image, writes it under
	/// `root/folder/` and returns the serving URL.
	pub async fn put(&self, folder: &str, data: &[u8]) -> Result<String, String> {
		let format = image::guess_format(data).map_err(|e| e.to_string())?;
		image::load_from_memory(data).map_err(|e| e.to_string())?;

		let ext = format.extensions_str().first().copied().unwrap_or("png");
		let file_name = format!("{}.{}", Uuid::new_v4(), ext);
		let dir = self.root.join(folder);
		tokio::fs::create_dir_all(&dir).await.map_err(|e| e.to_string())?;
		tokio::fs::write(dir.join(&file_name), data).await.map_err(|e| e.to_string())?;

		Ok(format!("/images/{}/{}", folder, file_name))
	}

	/// Upload with a bounded timeout per attempt and doubling backoff between
	/// attempts. Exhausted retries surface as a terminal upstream error and
	/// the caller must not write its record.
	pub async fn put_with_retry(&self, folder: &str, data: &[u8]) -> Result<String, ApiError> {
		let mut backoff = Duration::from_millis(200);
		let mut last_err = String::new();
		for attempt in 1..=self.attempts {
			match tokio::time::timeout(self.timeout, self.put(folder, data)).await {
				Ok(Ok(url)) => return Ok(url),
				Ok(Err(e)) => last_err = e,
				Err(_) => last_err = "image store timed out".to_string(),
			}
			log::warn!("image upload attempt {}/{} failed: {}", attempt, self.attempts, last_err);
			if attempt < self.attempts {
				tokio::time::sleep(backoff).await;
				backoff *= 2;
			}
		}
		Err(ApiError::Upstream(last_err))
	}

	fn resolve(&self, folder: &str, file: &str) -> Option<PathBuf> {
		// no traversal out of the store root
		if [folder, file].iter().any(|p| p.is_empty() || p.contains("..") || p.contains('/') || p.contains('\\')) {
			return None;
		}
		Some(self.root.join(folder).join(file))
	}
}

pub async fn image_handler(state: State<AppState>, Path((folder, file)): Path<(String, String)>) -> impl IntoResponse {
	let Some(path) = state.images.resolve(&folder, &file) else {
		return (StatusCode::NOT_FOUND, Body::empty());
	};
	match File::open(&path).await {
		Ok(f) => (StatusCode::OK, Body::from_stream(ReaderStream::new(f))),
		Err(_) => (StatusCode::NOT_FOUND, Body::empty()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn png_bytes() -> Vec<u8> {
		let img = image::DynamicImage::new_rgb8(2, 2);
		let mut buf = Cursor::new(Vec::new());
		img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
		buf.into_inner()
	}

	fn temp_store() -> ImageStore {
		ImageStore::new(std::env::temp_dir().join(format!("fleet-store-{}", Uuid::new_v4())))
	}

	#[tokio::test]
	async fn put_writes_file_and_returns_url() {
		let store = temp_store();
		let url = store.put("cars", &png_bytes()).await.unwrap();
		assert!(url.starts_with("/images/cars/"));
		assert!(url.ends_with(".png"));

		let file = url.rsplit('/').next().unwrap();
		let on_disk = store.root.join("cars").join(file);
		assert!(on_disk.exists());
	}

	#[tokio::test]
	async fn put_rejects_non_image_payloads() {
		let store = temp_store();
		assert!(store.put("cars", b"definitely not an image").await.is_err());
	}

	#[tokio::test]
	async fn retry_surfaces_terminal_upstream_error() {
		let mut store = temp_store();
		store.attempts = 2;
		let err = store.put_with_retry("cars", b"garbage").await.unwrap_err();
		assert!(matches!(err, ApiError::Upstream(_)));
	}

	#[test]
	fn resolve_refuses_path_traversal() {
		let store = temp_store();
		assert!(store.resolve("cars", "../secrets").is_none());
		assert!(store.resolve("..", "img.png").is_none());
		assert!(store.resolve("cars", "a/b.png").is_none());
		assert!(store.resolve("cars", "img.png").is_some());
	}
}
