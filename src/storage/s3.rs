use super::{
    normalize_etag, with_timeout, HeadResult, ObjectMeta, PutRequest, RemoteStore,
    IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
};
use crate::error::{StoreError, SyncError, SyncResult};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tracing::{debug, info};

/// 查询 bucket 区域时使用的初始区域
pub const REGION_HINT: &str = "us-west-2";

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// S3 连接参数
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// 为空时自动查询
    pub region: Option<String>,
    /// S3 兼容服务的地址（MinIO 等）
    pub endpoint: Option<String>,
}

pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    name: String,
}

impl S3Store {
    /// 建立连接；未配置区域时先查询 bucket 所在区域
    pub async fn connect(bucket: &str, options: &S3Options) -> SyncResult<Self> {
        if bucket.is_empty() {
            return Err(SyncError::Configuration("未指定 bucket".to_string()));
        }

        let region = match options.region.as_deref().filter(|r| !r.is_empty()) {
            Some(region) => region.to_string(),
            None => {
                let probe = Self::with_region(bucket, options, REGION_HINT).await;
                let region = probe.resolve_region(bucket).await.map_err(|e| {
                    SyncError::Configuration(format!("无法获取 bucket {} 的区域: {}", bucket, e))
                })?;
                info!("bucket {} 位于区域 {}", bucket, region);
                region
            }
        };

        if region.is_empty() {
            return Err(SyncError::Configuration("未知区域".to_string()));
        }

        Ok(Self::with_region(bucket, options, &region).await)
    }

    async fn with_region(bucket: &str, options: &S3Options, region: &str) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            // 重试由上传调度器负责
            .retry_config(RetryConfig::disabled());

        if let (Some(access_key), Some(secret_key)) = (&options.access_key, &options.secret_key) {
            if !access_key.is_empty() && !secret_key.is_empty() {
                loader = loader.credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "s3up",
                ));
            }
        }

        let config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint) = options.endpoint.as_deref().filter(|e| !e.is_empty()) {
            // S3 兼容服务一般需要 path-style
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let name = format!("s3://{}", bucket);
        debug!("初始化 S3 客户端: {} ({})", name, region);

        Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            region: region.to_string(),
            name,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn put(&self, request: &PutRequest) -> Result<(), StoreError> {
        // 每次尝试都重新打开文件，句柄随请求体一起释放
        let body = ByteStream::from_path(&request.source_path)
            .await
            .map_err(|e| StoreError::LocalIo {
                path: request.source_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        let mut op = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key(&request.key))
            .acl(ObjectCannedAcl::from(request.acl.as_str()))
            .content_type(&request.content_type)
            .body(body);

        if let Some(cache_control) = &request.cache_control {
            op = op.cache_control(cache_control);
        }
        if let Some(expires) = request.expires {
            op = op.expires(DateTime::from_secs(expires.timestamp()));
        }

        with_timeout(IO_TIMEOUT_SECS, op.send())
            .await?
            .map_err(service_error)?;

        Ok(())
    }

    async fn head(&self, key: &str) -> Result<HeadResult, StoreError> {
        let result = with_timeout(
            OP_TIMEOUT_SECS,
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(object_key(key))
                .send(),
        )
        .await?;

        match result {
            Ok(output) => Ok(HeadResult::Found(ObjectMeta {
                etag: output.e_tag().map(normalize_etag),
            })),
            Err(e) if is_not_found(&e) => Ok(HeadResult::NotFound),
            Err(e) => Err(service_error(e)),
        }
    }

    async fn resolve_region(&self, bucket: &str) -> Result<String, StoreError> {
        let result = with_timeout(
            OP_TIMEOUT_SECS,
            self.client.head_bucket().bucket(bucket).send(),
        )
        .await?;

        let region = match &result {
            Ok(output) => output.bucket_region().map(str::to_string),
            // bucket 不在当前区域时，重定向响应里同样带有区域头
            Err(e) => e
                .raw_response()
                .and_then(|resp| resp.headers().get(BUCKET_REGION_HEADER))
                .map(str::to_string),
        };

        match (region, result) {
            (Some(region), _) if !region.is_empty() => Ok(region),
            (_, Err(e)) => Err(service_error(e)),
            (_, Ok(_)) => Err(StoreError::service("响应中没有区域信息")),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 远程 key 以 `/` 开头，S3 对象名不带前导 `/`
fn object_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

fn is_not_found(err: &SdkError<HeadObjectError>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(service_err.err(), HeadObjectError::NotFound(_))
                || service_err.raw().status().as_u16() == 404
        }
        _ => false,
    }
}

fn service_error<E>(err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Service(DisplayErrorContext(err).to_string())
}
