use anyhow::Result;
use std::env;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Public base for object URLs; virtual-hosted S3 style when unset.
    pub public_base_url: Option<String>,
    pub endpoint_url: Option<String>,
}

impl S3Config {
    pub fn object_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }

    /// Inverse of [`object_url`](Self::object_url); `None` for foreign URLs.
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let base = match &self.public_base_url {
            Some(base) => format!("{}/", base.trim_end_matches('/')),
            None => format!("https://{}.s3.{}.amazonaws.com/", self.bucket, self.region),
        };
        url.strip_prefix(base.as_str()).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum MediaBackend {
    Local { upload_dir: String },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub backend: MediaBackend,
    pub max_upload_bytes: usize,
}

impl MediaConfig {
    pub fn from_env() -> Result<Self> {
        let backend = match env::var("MEDIA_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "s3" => {
                let bucket = env::var("AWS_BUCKET_NAME").map_err(|_| {
                    anyhow::anyhow!("AWS_BUCKET_NAME must be set when MEDIA_BACKEND=s3")
                })?;
                MediaBackend::S3(S3Config {
                    bucket,
                    region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                    public_base_url: env::var("S3_PUBLIC_BASE_URL").ok(),
                    endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
                })
            }
            "local" => MediaBackend::Local {
                upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            },
            other => {
                return Err(anyhow::anyhow!(
                    "Unsupported MEDIA_BACKEND '{}', expected local or s3",
                    other
                ))
            }
        };

        Ok(Self {
            backend,
            max_upload_bytes: super::parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn local_upload_dir(&self) -> Option<&str> {
        match &self.backend {
            MediaBackend::Local { upload_dir } => Some(upload_dir),
            MediaBackend::S3(_) => None,
        }
    }
}
