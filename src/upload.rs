//! Media upload collaborators: a third-party image host and a CDN upload
//! service. Both take a local file and hand back a public URL that replaces
//! the file reference in an entity payload.
use async_trait::async_trait;
use mime_guess::Mime;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::catalog::UploadTarget;
use crate::config::{Cdn, Config, ImageHost};
use crate::error::ApiError;

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload `path` to `target` and return the public URL.
    async fn upload(&self, path: &Path, target: UploadTarget) -> Result<String, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: Client,
    image_host: ImageHost,
    cdn: Cdn,
}

#[derive(Deserialize)]
struct ImageHostResponse {
    secure_url: String,
}

impl HttpUploader {
    pub fn new(image_host: ImageHost, cdn: Cdn) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("room-admin/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            image_host,
            cdn,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        Self::new(cfg.upload.image_host.clone(), cfg.upload.cdn.clone())
    }

    async fn file_part(path: &Path) -> Result<Part, ApiError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Upload(format!("invalid file name: {}", path.display())))?
            .to_string();
        let bytes = fs::read(path)
            .await
            .map_err(|err| ApiError::Upload(format!("failed to read {}: {err}", path.display())))?;
        Ok(Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type(path).as_ref())?)
    }

    async fn post_form(&self, endpoint: &str, form: Form) -> Result<Value, ApiError> {
        let res = self.http.post(endpoint).multipart(form).send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            warn!(%status, body = %text, endpoint, "upload rejected");
            return Err(ApiError::Upload(format!("{status}: {text}")));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn upload_image(&self, path: &Path) -> Result<String, ApiError> {
        let form = Form::new()
            .part("file", Self::file_part(path).await?)
            .text("upload_preset", self.image_host.upload_preset.clone());
        let body = self.post_form(&self.image_host.endpoint, form).await?;
        let resp: ImageHostResponse = serde_json::from_value(body)?;
        Ok(resp.secure_url)
    }

    async fn upload_cdn(&self, path: &Path) -> Result<String, ApiError> {
        let form = Form::new().part("file", Self::file_part(path).await?);
        let body = self.post_form(&self.cdn.endpoint, form).await?;
        let file_id = cdn_file_id(&body)
            .ok_or_else(|| ApiError::Upload(format!("no file id in CDN response: {body}")))?;
        Ok(cdn_url(&self.cdn.public_base_url, &file_id))
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    #[instrument(skip_all, fields(file = %path.display(), upload_target = ?target))]
    async fn upload(&self, path: &Path, target: UploadTarget) -> Result<String, ApiError> {
        let url = match target {
            UploadTarget::ImageHost => self.upload_image(path).await?,
            UploadTarget::Cdn => self.upload_cdn(path).await?,
        };
        info!(%url, "uploaded media");
        Ok(url)
    }
}

/// File identifier from a CDN upload response: `fileId`, `id`, or either
/// nested under `data`.
fn cdn_file_id(body: &Value) -> Option<String> {
    let lookup = |v: &Value| {
        ["fileId", "file_id", "id"]
            .iter()
            .find_map(|k| v.get(*k).and_then(crate::catalog::scalar_to_string))
    };
    lookup(body).or_else(|| body.get("data").and_then(lookup))
}

pub fn cdn_url(public_base_url: &str, file_id: &str) -> String {
    format!(
        "{}/{}",
        public_base_url.trim_end_matches('/'),
        file_id.trim_start_matches('/')
    )
}

/// MIME type sent with an uploaded file, guessed from its extension.
pub fn content_type(path: &Path) -> Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cdn_file_id_variants() {
        assert_eq!(cdn_file_id(&json!({"fileId": "abc"})).as_deref(), Some("abc"));
        assert_eq!(cdn_file_id(&json!({"data": {"id": 9}})).as_deref(), Some("9"));
        assert_eq!(cdn_file_id(&json!({"ok": true})), None);
    }

    #[test]
    fn cdn_url_joins_cleanly() {
        assert_eq!(
            cdn_url("https://cdn.example.com/files/", "/abc"),
            "https://cdn.example.com/files/abc"
        );
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type(Path::new("a.JPG")).essence_str(), "image/jpeg");
        assert_eq!(content_type(Path::new("clip.mp4")).essence_str(), "video/mp4");
        assert_eq!(
            content_type(Path::new("noext")).essence_str(),
            "application/octet-stream"
        );
    }

    #[test]
    fn audio_and_video_are_not_octet_stream() {
        for name in ["voice.wav", "track.aac", "a.ogg", "clip.mov"] {
            let mime = content_type(Path::new(name));
            assert!(
                mime.type_() == mime_guess::mime::AUDIO || mime.type_() == mime_guess::mime::VIDEO,
                "{name} guessed as {mime}"
            );
        }
        assert_eq!(content_type(Path::new("icon.bmp")).type_(), mime_guess::mime::IMAGE);
    }

    #[tokio::test]
    async fn missing_file_is_an_upload_error() {
        let err = HttpUploader::file_part(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upload(_)));
    }
}
