use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest image accepted for upload.
pub const MAX_IMAGE_SIZE: usize = 4 * 1024 * 1024;

/// Image formats accepted for profile photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
    /// False when identical bytes were already stored under this key
    pub created: bool,
}

/// Profile images on local disk, served under `/images/`.
///
/// Objects live at `{dir}/{owner_id}/{hash}.{ext}` where `hash` is a prefix
/// of the SHA-256 of the bytes, so uploading the same image twice yields
/// the same object.
pub struct ImageStore {
    dir: PathBuf,
    public_base: String,
}

impl ImageStore {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: format!("{}/images", public_url.trim_end_matches('/')),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Map one of our own image URLs back to its key. Foreign URLs and
    /// anything that does not look like a key we issued yield None.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_base)?.strip_prefix('/')?;
        is_valid_key(key).then(|| key.to_string())
    }

    pub async fn put(&self, owner: Uuid, kind: ImageType, data: &[u8]) -> Result<StoredImage> {
        if data.is_empty() {
            bail!("empty image");
        }
        if data.len() > MAX_IMAGE_SIZE {
            bail!("image of {} bytes exceeds limit", data.len());
        }

        let digest = hex::encode(Sha256::digest(data));
        let key = format!("{owner}/{}.{}", &digest[..32], kind.extension());
        let path = self.dir.join(&key);

        if fs::try_exists(&path).await? {
            return Ok(StoredImage {
                url: self.url_for(&key),
                key,
                created: false,
            });
        }

        fs::create_dir_all(self.dir.join(owner.to_string())).await?;

        // Write beside the target and rename so readers never see a partial file
        let tmp = path.with_extension(format!("{}.part", kind.extension()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        info!("Stored image {} ({} bytes)", key, data.len());
        Ok(StoredImage {
            url: self.url_for(&key),
            key,
            created: true,
        })
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        if !is_valid_key(key) {
            bail!("invalid image key '{}'", key);
        }
        match fs::remove_file(self.dir.join(key)).await {
            Ok(()) => {
                info!("Deleted image {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `<uuid>/<32 hex>.<ext>` and nothing else, so a key can never escape the
/// storage directory.
fn is_valid_key(key: &str) -> bool {
    let Some((owner, file)) = key.split_once('/') else {
        return false;
    };
    let Some((hash, ext)) = file.split_once('.') else {
        return false;
    };
    owner.parse::<Uuid>().is_ok()
        && hash.len() == 32
        && hash.bytes().all(|b| b.is_ascii_hexdigit())
        && ImageType::from_extension(ext).is_some()
}
