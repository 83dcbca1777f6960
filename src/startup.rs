use crate::{
    aws_clients::AwsClients,
    config::{Config, StoreBackend},
    errors::AppError,
    render,
    repositories::{DynamoDbMemeRepository, DynamoDbUserRepository, InMemoryMemeRepository, InMemoryUserRepository},
    storage::{InMemoryFileStorage, S3FileStorage},
    AppState,
};
use aws_sdk_dynamodb::{
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus},
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
};
use aws_sdk_s3::{
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client, error::SdkError as S3SdkError,
};
use aws_smithy_types::error::operation::BuildError;
use backoff::ExponentialBackoff;
use std::{sync::Arc, time::Duration};
use tracing;

const REMOTE_IMAGE_TIMEOUT: Duration = Duration::from_secs(10);
const TABLE_READY_TIMEOUT: Duration = Duration::from_secs(60);

fn build_error(e: BuildError) -> AppError {
    AppError::InitError(format!("Failed to build table definition: {e}"))
}

/// Creates a table keyed by a single string hash key if it doesn't exist.
/// Returns whether it was created by this call.
async fn create_table_if_not_exists(client: &DynamoDbClient, table: &str, key: &str) -> Result<bool, AppError> {
    let result = client
        .create_table()
        .table_name(table)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(key)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(build_error)?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(key)
                .key_type(KeyType::Hash)
                .build()
                .map_err(build_error)?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!(%table, "Startup: Table created");
            Ok(true)
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!(%table, "Startup: Table already exists, no action needed");
            Ok(false)
        }
        Err(e) => {
            tracing::error!(%table, error = %e, "Startup: Error creating DynamoDB table");
            Err(AppError::InitError(format!("Startup: Failed to create DynamoDB table '{table}': {e}")))
        }
    }
}

/// Polls DescribeTable with exponential backoff until the table is ACTIVE.
async fn wait_until_active(client: &DynamoDbClient, table: &str) -> Result<(), AppError> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_elapsed_time: Some(TABLE_READY_TIMEOUT),
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, || async {
        let output = match client.describe_table().table_name(table).send().await {
            Ok(output) => output,
            Err(e) => {
                return Err(backoff::Error::permanent(AppError::InitError(format!(
                    "Startup: Failed to describe table '{table}': {e}"
                ))));
            }
        };
        match output.table().and_then(|t| t.table_status()) {
            Some(TableStatus::Active) => Ok(()),
            status => {
                tracing::debug!(%table, ?status, "Startup: Waiting for table to become active");
                Err(backoff::Error::transient(AppError::InitError(format!(
                    "Startup: Table '{table}' did not become active in time"
                ))))
            }
        }
    })
    .await
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut request = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!(bucket = %bucket_name, "Startup: S3 bucket created");
            Ok(())
        }
        Err(S3SdkError::ServiceError(service_err))
            if service_err.err().is_bucket_already_owned_by_you() || service_err.err().is_bucket_already_exists() =>
        {
            tracing::info!(bucket = %bucket_name, "Startup: S3 bucket already exists");
            Ok(())
        }
        Err(e) => {
            tracing::error!(bucket = %bucket_name, error = %e, "Startup: Error creating S3 bucket");
            Err(AppError::InitError(format!("Startup: Failed to create S3 bucket '{bucket_name}': {e}")))
        }
    }
}

/// Creates the memes, users and user_identities tables and the image
/// bucket when they are missing.
pub async fn init_resources(clients: &AwsClients, config: &Config) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    let tables = [
        (config.memes_table.as_str(), "meme_id"),
        (config.users_table.as_str(), "user_id"),
        (config.user_identities_table.as_str(), "identity"),
    ];
    for (table, key) in tables {
        if create_table_if_not_exists(&clients.dynamodb, table, key).await? {
            wait_until_active(&clients.dynamodb, table).await?;
        }
    }
    ensure_s3_bucket_exists(&clients.s3, &config.meme_bucket_name, &config.aws_region).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}

/// Builds the shared state for the configured backend.
pub async fn build_state(config: Config) -> Result<AppState, AppError> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Startup: Using the in-memory store; data is lost on exit");
            memory_state(config)
        }
        StoreBackend::Aws => {
            let clients = AwsClients::connect(&config).await;
            init_resources(&clients, &config).await?;
            let caption_font = caption_font(&config)?;
            Ok(AppState {
                meme_repo: Arc::new(DynamoDbMemeRepository::new(clients.dynamodb.clone(), config.memes_table.clone())),
                user_repo: Arc::new(DynamoDbUserRepository::new(
                    clients.dynamodb.clone(),
                    config.users_table.clone(),
                    config.user_identities_table.clone(),
                )),
                file_storage: Arc::new(S3FileStorage::new(clients.s3, config.meme_bucket_name.clone())),
                http_client: http_client()?,
                caption_font,
                config,
            })
        }
    }
}

/// State backed entirely by process memory, regardless of `store_backend`.
pub fn memory_state(config: Config) -> Result<AppState, AppError> {
    Ok(AppState {
        meme_repo: Arc::new(InMemoryMemeRepository::new()),
        user_repo: Arc::new(InMemoryUserRepository::new()),
        file_storage: Arc::new(InMemoryFileStorage::new()),
        http_client: http_client()?,
        caption_font: caption_font(&config)?,
        config,
    })
}

/// `MEME_FONT_PATH` overrides the bundled bold face.
fn caption_font(config: &Config) -> Result<ab_glyph::FontArc, AppError> {
    let Some(path) = &config.font_path else {
        tracing::debug!("Startup: Using the bundled caption font");
        return render::bundled_font().map_err(|e| AppError::InitError(format!("Startup: {e}")));
    };
    let font = render::load_font(path).map_err(|e| AppError::InitError(format!("Startup: {e}")))?;
    tracing::info!(font = %path.display(), "Startup: Caption font loaded");
    Ok(font)
}

fn http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(REMOTE_IMAGE_TIMEOUT)
        .build()
        .map_err(|e| AppError::InitError(format!("Startup: Failed to build HTTP client: {e}")))
}
