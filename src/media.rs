//! Binary media storage. The services only ever see the URL a stored file is
//! reachable at.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported content type: {0}")]
    Unsupported(String),

    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which folder an upload lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Post,
    Comment,
    Profile,
}

impl MediaKind {
    fn folder(&self) -> &'static str {
        match self {
            MediaKind::Post => "posts",
            MediaKind::Comment => "comments",
            MediaKind::Profile => "profiles",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl MediaUpload {
    /// Declared content type, falling back to a guess from the file name.
    fn resolved_type(&self) -> String {
        match &self.content_type {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.clone(),
            _ => mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }

    /// File extension to store under. The uploaded name's own extension wins
    /// when it agrees with `content_type`.
    fn extension_for(&self, content_type: &str) -> String {
        let own = std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if let Some(ext) = own {
            let agrees = mime_guess::from_ext(&ext)
                .iter()
                .any(|mime| mime.essence_str() == content_type);
            if agrees {
                return ext;
            }
        }

        match content_type {
            "image/jpeg" => "jpg".to_string(),
            other => mime_guess::get_mime_extensions_str(other)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist `upload` and return the public URL it is served at.
    async fn store(&self, kind: MediaKind, upload: MediaUpload) -> Result<String, MediaError>;
}

/// Files on local disk, served under `/uploads`.
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, kind: MediaKind, upload: MediaUpload) -> Result<String, MediaError> {
        let content_type = upload.resolved_type();
        if !content_type.starts_with("image/") {
            return Err(MediaError::Unsupported(content_type));
        }

        let extension = upload.extension_for(&content_type);
        let name = format!("{}.{}", uuid::Uuid::now_v7(), extension);

        let dir = self.root.join(kind.folder());
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), &upload.bytes).await?;

        tracing::debug!(
            "Stored {} bytes of {} as {}/{}",
            upload.bytes.len(),
            content_type,
            kind.folder(),
            name
        );
        Ok(format!("/uploads/{}/{}", kind.folder(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str, content_type: Option<&str>) -> MediaUpload {
        MediaUpload {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        }
    }

    #[tokio::test]
    async fn stores_image_under_kind_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf());

        let url = store
            .store(MediaKind::Post, png("cat.png", Some("image/png")))
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/posts/"));
        let file_name = url.rsplit('/').next().unwrap();
        let on_disk = tmp.path().join("posts").join(file_name);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn guesses_type_from_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf());

        let url = store
            .store(MediaKind::Profile, png("me.jpg", None))
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/profiles/"));
    }

    fn upload(name: &str, content_type: Option<&str>) -> MediaUpload {
        MediaUpload {
            bytes: Bytes::from_static(b"\xff\xd8\xff"),
            ..png(name, content_type)
        }
    }

    #[test]
    fn jpeg_uploads_keep_a_familiar_extension() {
        assert_eq!(upload("cat.jpeg", Some("image/jpeg")).extension_for("image/jpeg"), "jpeg");
        assert_eq!(upload("CAT.JPG", Some("image/jpeg")).extension_for("image/jpeg"), "jpg");
        assert_eq!(upload("blob", Some("image/jpeg")).extension_for("image/jpeg"), "jpg");
        // a name that disagrees with the declared type is ignored
        assert_eq!(upload("cat.png", Some("image/jpeg")).extension_for("image/jpeg"), "jpg");
        assert_eq!(upload("x", Some("image/png")).extension_for("image/png"), "png");
    }

    #[tokio::test]
    async fn stored_jpeg_is_not_renamed_jfif() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf());

        let url = store
            .store(MediaKind::Post, upload("photo", Some("image/jpeg")))
            .await
            .unwrap();
        assert!(url.ends_with(".jpg"), "unexpected url {}", url);
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf());

        let result = store
            .store(MediaKind::Comment, png("notes.txt", Some("text/plain")))
            .await;
        assert!(matches!(result, Err(MediaError::Unsupported(ct)) if ct == "text/plain"));
    }
}
