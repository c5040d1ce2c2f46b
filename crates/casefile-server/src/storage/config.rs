use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which blob store backs archives and artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    #[default]
    S3,
    Fs,
}

impl FromStr for ObjectStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" | "minio" => Ok(ObjectStoreKind::S3),
            "fs" | "file" | "local" => Ok(ObjectStoreKind::Fs),
            other => anyhow::bail!("Invalid OBJECT_STORE: {}. Must be 's3' or 'fs'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kind: ObjectStoreKind,
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    /// Root directory when `kind` is `Fs`
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: ObjectStoreKind::S3,
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: "casefile-archives".to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
            root: PathBuf::from("./data/objects"),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let kind = match env::var("OBJECT_STORE") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => ObjectStoreKind::S3,
        };

        let config = Self {
            kind,
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "casefile-archives".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .ok(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .ok(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            root: env::var("OBJECT_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/objects")),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            kind: ObjectStoreKind::S3,
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            root: PathBuf::new(),
        }
    }

    pub fn for_directory(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: ObjectStoreKind::Fs,
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            path_style: false,
            root: root.into(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.kind {
            ObjectStoreKind::S3 => {
                if self.bucket.is_empty() {
                    anyhow::bail!("S3_BUCKET cannot be empty");
                }
                if self.access_key.is_some() != self.secret_key.is_some() {
                    anyhow::bail!("S3 access key and secret key must be set together");
                }
            },
            ObjectStoreKind::Fs => {
                if self.root.as_os_str().is_empty() {
                    anyhow::bail!("OBJECT_STORE_ROOT cannot be empty");
                }
            },
        }
        Ok(())
    }
}
