//! Users table plus a `user_identities` table holding one claim item per
//! username and email. Claims are written in the same transaction as the
//! user, so uniqueness holds without a read-check-write race.

use super::items::{self, email_identity, item_to_user, user_to_item, username_identity, Item};
use crate::{domain::UserRepository, errors::RepoError, models::User};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, Delete, KeysAndAttributes, Put, TransactWriteItem},
    Client as DynamoDbClient,
};
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

const BATCH_GET_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct DynamoDbUserRepository {
    client: DynamoDbClient,
    users_table: String,
    identities_table: String,
}

/// One transaction step. `claim` names the unique field a failed condition
/// on this step means is taken.
struct Step {
    item: TransactWriteItem,
    claim: Option<&'static str>,
}

impl DynamoDbUserRepository {
    pub fn new(client: DynamoDbClient, users_table: String, identities_table: String) -> Self {
        info!(%users_table, %identities_table, "Initializing DynamoDbUserRepository");
        Self { client, users_table, identities_table }
    }

    fn put_user(&self, user: &User, condition: &str) -> Result<Step, RepoError> {
        let put = Put::builder()
            .table_name(&self.users_table)
            .set_item(Some(user_to_item(user)))
            .condition_expression(condition)
            .build()
            .context("Failed to build user Put")?;
        Ok(Step { item: TransactWriteItem::builder().put(put).build(), claim: None })
    }

    fn claim(&self, identity: String, user_id: Uuid, field: &'static str) -> Result<Step, RepoError> {
        let put = Put::builder()
            .table_name(&self.identities_table)
            .item("identity", items::s(identity))
            .item("user_id", items::s(user_id.to_string()))
            .condition_expression("attribute_not_exists(identity)")
            .build()
            .context("Failed to build identity Put")?;
        Ok(Step { item: TransactWriteItem::builder().put(put).build(), claim: Some(field) })
    }

    fn release(&self, table: &str, key: &str, value: String) -> Result<Step, RepoError> {
        let delete = Delete::builder()
            .table_name(table)
            .key(key, items::s(value))
            .build()
            .context("Failed to build Delete")?;
        Ok(Step { item: TransactWriteItem::builder().delete(delete).build(), claim: None })
    }

    async fn transact(&self, steps: Vec<Step>, user_id: Uuid, operation: &str) -> Result<(), RepoError> {
        let claims: Vec<Option<&'static str>> = steps.iter().map(|s| s.claim).collect();
        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(steps.into_iter().map(|s| s.item).collect()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) => {
                if let TransactWriteItemsError::TransactionCanceledException(cancelled) = service_err.err() {
                    let taken = cancelled
                        .cancellation_reasons()
                        .iter()
                        .zip(&claims)
                        .find(|(reason, _)| reason.code() == Some("ConditionalCheckFailed"))
                        .map(|(_, claim)| *claim);
                    match taken {
                        Some(Some(field)) => {
                            tracing::info!(%user_id, field, "DynamoDB: Uniqueness claim rejected");
                            return Err(RepoError::Duplicate(field));
                        }
                        Some(None) => {
                            tracing::warn!(%user_id, operation, "DynamoDB: User record condition failed");
                            return Err(RepoError::NotFound { entity: "User", id: user_id });
                        }
                        None => {}
                    }
                }
                Err(RepoError::BackendError(anyhow::Error::new(service_err.into_err()).context(format!(
                    "DynamoDB (table: {}): Failed to {} (user id: {})",
                    self.users_table, operation, user_id
                ))))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to {} (user id: {})",
                self.users_table, operation, user_id
            )))),
        }
    }

    fn parse(&self, item: &Item) -> Result<User, RepoError> {
        item_to_user(item).ok_or_else(|| {
            let item_id = item.get("user_id").and_then(|v| v.as_s().ok());
            tracing::error!(
                item.id = ?item_id,
                table_name = %self.users_table,
                "DynamoDB: Failed to parse item into User"
            );
            RepoError::DataCorruption(format!(
                "Failed to parse user {:?} from DynamoDB table '{}'",
                item_id, self.users_table
            ))
        })
    }
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepoError> {
        let steps = vec![
            self.put_user(user, "attribute_not_exists(user_id)")?,
            self.claim(username_identity(&user.username), user.user_id, "username")?,
            self.claim(email_identity(&user.email), user.user_id, "email")?,
        ];
        self.transact(steps, user.user_id, "create user").await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .key("user_id", items::s(id.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get user (id: {})", self.users_table, id))
            .map_err(RepoError::BackendError)?;
        resp.item.as_ref().map(|item| self.parse(item)).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.identities_table)
            .key("identity", items::s(email_identity(email)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to look up email identity", self.identities_table))
            .map_err(RepoError::BackendError)?;

        let user_id = resp
            .item
            .as_ref()
            .and_then(|item| item.get("user_id"))
            .and_then(|v| v.as_s().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        match user_id {
            Some(id) => self.get_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<User>, RepoError> {
        let mut users = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_GET_LIMIT) {
            let keys: Vec<HashMap<String, AttributeValue>> = chunk
                .iter()
                .map(|id| HashMap::from([("user_id".to_string(), items::s(id.to_string()))]))
                .collect();
            let mut pending = Some(HashMap::from([(
                self.users_table.clone(),
                KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .build()
                    .context("Failed to build BatchGetItem keys")?,
            )]));

            while let Some(request_items) = pending.take() {
                let resp = self
                    .client
                    .batch_get_item()
                    .set_request_items(Some(request_items))
                    .send()
                    .await
                    .context(format!("DynamoDB (table: {}): Failed to batch get users", self.users_table))
                    .map_err(RepoError::BackendError)?;

                if let Some(mut responses) = resp.responses {
                    for item in responses.remove(&self.users_table).unwrap_or_default() {
                        users.push(self.parse(&item)?);
                    }
                }
                pending = resp.unprocessed_keys.filter(|unprocessed| !unprocessed.is_empty());
                if pending.is_some() {
                    tracing::debug!(table_name = %self.users_table, "DynamoDB: Retrying unprocessed batch keys");
                }
            }
        }
        Ok(users)
    }

    async fn update(&self, previous: &User, updated: &User) -> Result<(), RepoError> {
        let mut steps = vec![self.put_user(updated, "attribute_exists(user_id)")?];
        if username_identity(&previous.username) != username_identity(&updated.username) {
            steps.push(self.release(&self.identities_table, "identity", username_identity(&previous.username))?);
            steps.push(self.claim(username_identity(&updated.username), updated.user_id, "username")?);
        }
        if previous.email != updated.email {
            steps.push(self.release(&self.identities_table, "identity", email_identity(&previous.email))?);
            steps.push(self.claim(email_identity(&updated.email), updated.user_id, "email")?);
        }
        self.transact(steps, updated.user_id, "update user").await
    }

    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        let steps = vec![
            self.release(&self.users_table, "user_id", user.user_id.to_string())?,
            self.release(&self.identities_table, "identity", username_identity(&user.username))?,
            self.release(&self.identities_table, "identity", email_identity(&user.email))?,
        ];
        self.transact(steps, user.user_id, "delete user").await
    }
}
