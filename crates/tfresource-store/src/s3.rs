use crate::{config_bool, config_str, StateStore, StoreError};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

/// Settings for [`S3Store`], read from the Terraform s3 backend config.
#[derive(Debug, Clone, Default)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
}

impl S3StoreConfig {
    pub fn from_backend_config(config: &Map<String, Value>) -> Result<Self, StoreError> {
        let bucket = config_str(config, "bucket")
            .ok_or_else(|| StoreError::Config("s3 backend requires 'bucket'".to_owned()))?;
        let owned = |key: &str| config_str(config, key).map(str::to_owned);
        // Terraform >= 1.6 renamed force_path_style to use_path_style.
        let force_path_style =
            config_bool(config, "use_path_style")? || config_bool(config, "force_path_style")?;
        let endpoint = owned("endpoint").or_else(|| {
            config
                .get("endpoints")
                .and_then(Value::as_object)
                .and_then(|e| config_str(e, "s3"))
                .map(str::to_owned)
        });
        Ok(Self {
            bucket: bucket.to_owned(),
            region: owned("region"),
            endpoint,
            force_path_style,
            access_key: owned("access_key"),
            secret_key: owned("secret_key"),
            token: owned("token"),
        })
    }
}

/// S3-backed state store.
///
/// The SDK is async; every call is driven to completion on a private
/// runtime so the store presents the same blocking interface as the others.
pub struct S3Store {
    client: Client,
    bucket: String,
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3Store {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3Store {
    pub fn from_backend_config(config: &Map<String, Value>) -> Result<Self, StoreError> {
        Self::new(S3StoreConfig::from_backend_config(config)?)
    }

    pub fn new(config: S3StoreConfig) -> Result<Self, StoreError> {
        if config.bucket.trim().is_empty() {
            return Err(StoreError::Config("bucket must be set".to_owned()));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let shared_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key)
            {
                loader = loader.credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    config.token.clone(),
                    None,
                    "tfresource-backend-config",
                ));
            }
            loader.load().await
        });
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = Client::from_conf(s3_builder.build());
        Ok(Self {
            client,
            bucket: config.bucket,
            runtime: Some(Arc::new(runtime)),
        })
    }

    fn runtime(&self) -> Result<&Runtime, StoreError> {
        self.runtime
            .as_deref()
            .ok_or_else(|| StoreError::Backend("s3 store closed".to_owned()))
    }

    /// HEAD the object; `None` when it does not exist.
    fn head(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        debug!("HEAD s3://{}/{key}", self.bucket);
        let result = self.runtime()?.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        );
        match result {
            Ok(output) => {
                let modified = output
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                    .ok_or_else(|| {
                        StoreError::Backend(format!(
                            "s3://{}/{key} has no Last-Modified",
                            self.bucket
                        ))
                    })?;
                Ok(Some(modified))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    Ok(None)
                } else {
                    Err(StoreError::Backend(format!(
                        "HEAD s3://{}/{key}: {err}",
                        self.bucket
                    )))
                }
            }
        }
    }
}

impl StateStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.head(key)?.is_some())
    }

    fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, StoreError> {
        self.head(key)?
            .ok_or_else(|| StoreError::NotFound(format!("s3://{}/{key}", self.bucket)))
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        debug!("DELETE s3://{}/{key}", self.bucket);
        self.runtime()?
            .block_on(
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|e| StoreError::Backend(format!("DELETE s3://{}/{key}: {e}", self.bucket)))?;
        Ok(())
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        debug!("GET s3://{}/{key}", self.bucket);
        let bucket = self.bucket.clone();
        let client = self.client.clone();
        let key = key.to_owned();
        self.runtime()?.block_on(async move {
            let output = match client.get_object().bucket(&bucket).key(&key).send().await {
                Ok(output) => output,
                Err(err) => {
                    if err
                        .as_service_error()
                        .is_some_and(GetObjectError::is_no_such_key)
                    {
                        return Err(StoreError::NotFound(format!("s3://{bucket}/{key}")));
                    }
                    return Err(StoreError::Backend(format!(
                        "GET s3://{bucket}/{key}: {err}"
                    )));
                }
            };
            let body = output
                .body
                .collect()
                .await
                .map_err(|e| StoreError::Backend(format!("GET s3://{bucket}/{key}: {e}")))?;
            Ok(body.into_bytes().to_vec())
        })
    }

    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        debug!("PUT s3://{}/{key} ({} bytes)", self.bucket, data.len());
        self.runtime()?
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data.to_vec()))
                    .content_type("application/json")
                    .send(),
            )
            .map_err(|e| StoreError::Backend(format!("PUT s3://{}/{key}: {e}", self.bucket)))?;
        Ok(())
    }
}
