//! Cloudflare R2 client for frame uploads.
//!
//! R2 speaks the S3 API, so this is the AWS SDK pointed at the account
//! endpoint with path-style addressing and static credentials.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use lastframe_models::CapturedFrame;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Region R2 expects when none is configured.
const DEFAULT_REGION: &str = "auto";

/// Connection settings for an R2 bucket.
#[derive(Clone)]
pub struct R2Config {
    /// Account endpoint, e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl R2Config {
    /// Read the `R2_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{} not set", name)))
        };

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: lookup("R2_REGION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        })
    }
}

/// S3-API client bound to one R2 bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "lastframe-r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Put a captured frame at `key`, replacing whatever is there.
    pub async fn put_frame(&self, key: &str, frame: &CapturedFrame) -> StorageResult<()> {
        debug!(identity = %frame.identity, key, bytes = frame.len(), "Putting frame object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CapturedFrame::CONTENT_TYPE)
            .content_length(frame.len() as i64)
            .body(ByteStream::from(frame.png.clone()))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        Ok(())
    }

    /// Fail early when the bucket is unreachable or the credentials are wrong.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("bucket {}: {}", self.bucket, e)))?;
        info!(bucket = %self.bucket, "R2 bucket reachable");
        Ok(())
    }
}
