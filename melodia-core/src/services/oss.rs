//! Object storage uploads through pre-signed URLs.
//!
//! Storage keys are content-addressed: the SHA-256 of the file followed by its
//! extension, so the same audio always lands under the same key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Body, Client, Url, header};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::runtime::backend::protocol::{ObjectUploader, UploadError};

#[derive(Debug, Clone)]
pub struct OssConfig {
    /// Endpoint that answers `GET ?fileName=<key>` with `{ "signedUrl": ... }`.
    pub signed_url_api: String,
    /// Where artifacts are staged between download and upload.
    pub temp_dir: PathBuf,
    /// Budget for one download or one upload.
    pub transfer_timeout: Duration,
    pub signed_url_timeout: Duration,
}

impl OssConfig {
    pub fn new(signed_url_api: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            signed_url_api: signed_url_api.into(),
            temp_dir: temp_dir.into(),
            transfer_timeout: Duration::from_secs(60),
            signed_url_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    signed_url: Option<String>,
}

/// Removes the staged file when dropped, whatever happened to the upload.
struct StagedFile {
    path: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove staged file");
            }
        }
    }
}

/// `.mp3`, `mp3` → `.mp3`; empty stays empty.
fn normalize_extension(extension: &str) -> String {
    match extension {
        "" => String::new(),
        ext if ext.starts_with('.') => ext.to_owned(),
        ext => format!(".{ext}"),
    }
}

fn key_from_digest(hasher: Sha256, extension: &str) -> String {
    format!("{}{}", hex::encode(hasher.finalize()), normalize_extension(extension))
}

/// [`ObjectUploader`] that stages artifacts on disk and PUTs them to a
/// pre-signed URL.
#[derive(Debug, Clone)]
pub struct OssUploader {
    client: Client,
    config: OssConfig,
}

impl OssUploader {
    pub fn new(config: OssConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .user_agent(concat!("melodia/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Upload a file from local disk.
    ///
    /// The key is `custom_name` when given, otherwise derived from the content
    /// and the file's own extension.
    pub async fn upload_local_file(
        &self,
        path: &Path,
        custom_name: Option<&str>,
    ) -> Result<String, UploadError> {
        let key = match custom_name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_owned(),
            None => {
                let extension = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default();
                hash_file(path, extension).await?
            }
        };

        self.put_file(&key, path).await?;
        info!(path = %path.display(), storage_key = %key, "uploaded local file");
        Ok(key)
    }

    async fn signed_url(&self, key: &str) -> Result<String, UploadError> {
        let url = Url::parse_with_params(&self.config.signed_url_api, &[("fileName", key)])
            .map_err(|e| UploadError::SignedUrl(format!("invalid signing endpoint: {e}")))?;

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.signed_url_timeout)
            .send()
            .await
            .map_err(|e| UploadError::SignedUrl(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::SignedUrl(format!("HTTP {status}")));
        }
        response
            .json::<SignedUrlResponse>()
            .await
            .map_err(|e| UploadError::SignedUrl(e.to_string()))?
            .signed_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| UploadError::SignedUrl("response is missing signedUrl".into()))
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), UploadError> {
        let signed_url = self.signed_url(key).await?;
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        debug!(storage_key = %key, size, "uploading to object storage");
        let response = self
            .client
            .put(signed_url)
            .header(header::CONTENT_LENGTH, size)
            .timeout(self.config.transfer_timeout)
            .body(Body::from(file))
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Stream `url` to a staged file while hashing it.
    async fn download(
        &self,
        url: &str,
        staged: &StagedFile,
        extension: &str,
    ) -> Result<String, UploadError> {
        let download_error = |message: String| UploadError::Download {
            url: url.to_owned(),
            message,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.config.transfer_timeout)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(&staged.path).await?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(key_from_digest(hasher, extension))
    }
}

async fn hash_file(path: &Path, extension: &str) -> Result<String, UploadError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(key_from_digest(hasher, extension))
}

#[async_trait]
impl ObjectUploader for OssUploader {
    async fn upload_from_url(&self, url: &str, extension: &str) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let staged = StagedFile {
            path: self
                .config
                .temp_dir
                .join(format!("melodia-{}.part", Uuid::new_v4())),
        };

        let key = self.download(url, &staged, extension).await?;
        self.put_file(&key, &staged.path).await?;
        info!(source = url, storage_key = %key, "stored remote artifact");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[derive(Clone, Default)]
    struct Bucket {
        objects: Arc<Mutex<HashMap<String, (Bytes, Option<String>)>>>,
        base: Arc<Mutex<String>>,
        reject: bool,
    }

    async fn serve(bucket: Bucket) -> String {
        let router = Router::new()
            .route("/audio/a.mp3", get(|| async { "abc" }))
            .route(
                "/signed",
                get(
                    |State(bucket): State<Bucket>, Query(q): Query<HashMap<String, String>>| async move {
                        let base = bucket.base.lock().unwrap().clone();
                        Json(json!({ "signedUrl": format!("{base}/bucket/{}", q["fileName"]) }))
                    },
                ),
            )
            .route(
                "/bucket/{key}",
                put(
                    |State(bucket): State<Bucket>,
                     UrlPath(key): UrlPath<String>,
                     headers: HeaderMap,
                     body: Bytes| async move {
                        if bucket.reject {
                            return StatusCode::FORBIDDEN;
                        }
                        let length = headers
                            .get("content-length")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        bucket.objects.lock().unwrap().insert(key, (body, length));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(bucket.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        *bucket.base.lock().unwrap() = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base
    }

    fn uploader(base: &str, temp_dir: &Path) -> OssUploader {
        OssUploader::new(OssConfig::new(format!("{base}/signed"), temp_dir)).unwrap()
    }

    fn file_content_key(content: &[u8], extension: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        key_from_digest(hasher, extension)
    }

    #[test]
    fn content_key_is_sha256_hex_plus_extension() {
        assert_eq!(file_content_key(b"abc", ".mp3"), format!("{ABC_SHA256}.mp3"));
        assert_eq!(file_content_key(b"abc", "wav"), format!("{ABC_SHA256}.wav"));
        assert_eq!(file_content_key(b"abc", ""), ABC_SHA256);
    }

    #[tokio::test]
    async fn remote_artifact_is_streamed_hashed_and_put() {
        let bucket = Bucket::default();
        let base = serve(bucket.clone()).await;
        let temp = tempfile::tempdir().unwrap();

        let key = uploader(&base, temp.path())
            .upload_from_url(&format!("{base}/audio/a.mp3"), ".mp3")
            .await
            .unwrap();

        assert_eq!(key, format!("{ABC_SHA256}.mp3"));
        let objects = bucket.objects.lock().unwrap();
        let (body, length) = &objects[&key];
        assert_eq!(&body[..], b"abc");
        assert_eq!(length.as_deref(), Some("3"));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejected_put_is_an_error_and_cleans_up() {
        let bucket = Bucket {
            reject: true,
            ..Bucket::default()
        };
        let base = serve(bucket).await;
        let temp = tempfile::tempdir().unwrap();

        let err = uploader(&base, temp.path())
            .upload_from_url(&format!("{base}/audio/a.mp3"), ".mp3")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Rejected { status: 403 }), "{err:?}");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_artifact_is_a_download_error() {
        let base = serve(Bucket::default()).await;
        let temp = tempfile::tempdir().unwrap();

        let err = uploader(&base, temp.path())
            .upload_from_url(&format!("{base}/audio/missing.mp3"), ".mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Download { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn local_file_honours_custom_name() {
        let bucket = Bucket::default();
        let base = serve(bucket.clone()).await;
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("take.wav");
        std::fs::write(&file, b"abc").unwrap();
        let oss = uploader(&base, temp.path());

        let hashed = oss.upload_local_file(&file, None).await.unwrap();
        assert_eq!(hashed, format!("{ABC_SHA256}.wav"));

        let named = oss.upload_local_file(&file, Some("custom.wav")).await.unwrap();
        assert_eq!(named, "custom.wav");
        assert!(bucket.objects.lock().unwrap().contains_key("custom.wav"));
    }
}
