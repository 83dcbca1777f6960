use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use tracing;

/// The AWS clients the service talks to, built from one shared SDK config.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub dynamodb: DynamoDbClient,
    pub s3: S3Client,
}

impl AwsClients {
    pub async fn connect(config: &Config) -> Self {
        let sdk_config = load_sdk_config(config).await;
        AwsClients {
            dynamodb: DynamoDbClient::new(&sdk_config),
            s3: s3_client(&sdk_config),
        }
    }
}

/// Region and optional endpoint override come from `Config`; credentials
/// come from the default provider chain.
async fn load_sdk_config(config: &Config) -> SdkConfig {
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()));

    match &config.localstack_endpoint {
        Some(endpoint_url) => {
            tracing::info!(%endpoint_url, "Using endpoint override");
            loader = loader.endpoint_url(endpoint_url);
        }
        None => tracing::info!("Using default AWS endpoints and credential resolution"),
    }
    loader.load().await
}

// Path-style addressing keeps LocalStack bucket URLs resolvable.
fn s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
