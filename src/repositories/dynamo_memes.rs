use super::items::{
    self, Item, comment_to_attribute, design_attributes, item_to_meme, meme_to_item, report_to_attribute,
};
use crate::{
    domain::MemeRepository,
    errors::RepoError,
    ledger::VoteType,
    models::{Comment, Meme, ReportDetails},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    operation::update_item::{builders::UpdateItemFluentBuilder, UpdateItemError},
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

const MEME_EXISTS: &str = "attribute_exists(meme_id)";

/// The existence check, joined with an operation's own condition if any.
fn update_condition(extra: Option<&str>) -> String {
    match extra {
        Some(extra) => format!("{MEME_EXISTS} AND ({extra})"),
        None => MEME_EXISTS.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMemeRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMemeRepository");
        Self { client, table_name }
    }

    /// UpdateItem on an existing meme, returning the full new image.
    fn update(&self, id: Uuid) -> UpdateItemFluentBuilder {
        self.update_where(id, None)
    }

    /// Like [`Self::update`] with an extra condition ANDed onto the existence check.
    fn update_where(&self, id: Uuid, condition: Option<&str>) -> UpdateItemFluentBuilder {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("meme_id", items::s(id.to_string()))
            .condition_expression(update_condition(condition))
            .return_values(ReturnValue::AllNew)
    }

    /// Sends an update built by [`Self::update`]. A failed condition becomes
    /// `NotFound` when the meme is gone, otherwise `stale` if the caller gave
    /// one.
    async fn send_update(
        &self,
        id: Uuid,
        request: UpdateItemFluentBuilder,
        operation: &str,
        stale: Option<&str>,
    ) -> Result<Meme, RepoError> {
        let output = match request.send().await {
            Ok(output) => output,
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), UpdateItemError::ConditionalCheckFailedException(_)) =>
            {
                tracing::warn!(meme_id = %id, operation, "DynamoDB: Conditional check failed");
                let Some(reason) = stale else {
                    return Err(RepoError::NotFound { entity: "Meme", id });
                };
                return Err(match self.get_by_id(id).await? {
                    Some(_) => RepoError::StaleWrite(reason.to_string()),
                    None => RepoError::NotFound { entity: "Meme", id },
                });
            }
            Err(e) => {
                return Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to {} (meme id: {})",
                    self.table_name, operation, id
                ))));
            }
        };
        let attributes = output.attributes.unwrap_or_default();
        self.parse(&attributes, id)
    }

    fn parse(&self, item: &Item, id: Uuid) -> Result<Meme, RepoError> {
        item_to_meme(item).ok_or_else(|| {
            tracing::error!(meme_id = %id, table_name = %self.table_name, "DynamoDB: Failed to parse item into Meme");
            RepoError::DataCorruption(format!(
                "Failed to parse meme data from DynamoDB table '{}' for id {}",
                self.table_name, id
            ))
        })
    }

    /// Scans the table, optionally with a filter. Handles pagination.
    async fn scan(
        &self,
        filter: Option<(&str, HashMap<String, AttributeValue>)>,
    ) -> Result<Vec<Meme>, RepoError> {
        let mut memes: Vec<Meme> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.table_name);
            if let Some((expression, values)) = &filter {
                request_builder = request_builder
                    .filter_expression(*expression)
                    .set_expression_attribute_values(Some(values.clone()));
            }
            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_meme(&item) {
                    Some(meme) => memes.push(meme),
                    None => {
                        let item_id = item.get("meme_id").and_then(|v| v.as_s().ok());
                        tracing::error!(
                            item.id = ?item_id,
                            table_name = %self.table_name,
                            "DynamoDB: Failed to parse item from scan into Meme"
                        );
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::debug!("DynamoDB (table: {}): Scanned {} memes", self.table_name, memes.len());
        Ok(memes)
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(meme_to_item(meme)))
            .condition_expression("attribute_not_exists(meme_id)")
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put meme (id: {})", self.table_name, meme.meme_id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        let id_str = id.to_string();
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => self.parse(&item, id).map(Some),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all memes", self.table_name);
        self.scan(None).await
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Meme>, RepoError> {
        let values = HashMap::from([(":creator".to_string(), items::s(creator_id.to_string()))]);
        self.scan(Some(("creator_id = :creator", values))).await
    }

    async fn update_content(&self, meme: &Meme) -> Result<Meme, RepoError> {
        let mut request = self.update(meme.meme_id);
        let mut assignments = Vec::new();
        let mut attributes = design_attributes(&meme.design);
        attributes.push(("is_draft", AttributeValue::Bool(meme.is_draft)));
        attributes.push(("updated_at", items::time(meme.updated_at)));
        if let Some(url) = &meme.image_url {
            attributes.push(("image_url", items::s(url)));
        }
        if let Some(key) = &meme.image_key {
            attributes.push(("image_key", items::s(key)));
        }
        for (index, (name, value)) in attributes.into_iter().enumerate() {
            assignments.push(format!("#f{index} = :v{index}"));
            request = request
                .expression_attribute_names(format!("#f{index}"), name)
                .expression_attribute_values(format!(":v{index}"), value);
        }

        let mut removals = Vec::new();
        if meme.image_url.is_none() {
            removals.push("image_url");
        }
        if meme.image_key.is_none() {
            removals.push("image_key");
        }
        let mut expression = format!("SET {}", assignments.join(", "));
        if !removals.is_empty() {
            expression.push_str(&format!(" REMOVE {}", removals.join(", ")));
        }

        tracing::debug!(meme_id = %meme.meme_id, "DynamoDB: Updating meme content");
        self.send_update(meme.meme_id, request.update_expression(expression), "update meme content", None)
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let id_str = id.to_string();
        tracing::debug!(meme_id = %id_str, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn cast_vote(&self, id: Uuid, user_id: Uuid, vote: VoteType) -> Result<Meme, RepoError> {
        let (add_to, delete_from) = match vote {
            VoteType::Up => ("upvotes", "downvotes"),
            VoteType::Down => ("downvotes", "upvotes"),
        };
        let request = self
            .update(id)
            .update_expression(format!("ADD {add_to} :user DELETE {delete_from} :user SET updated_at = :now"))
            .expression_attribute_values(":user", AttributeValue::Ss(vec![user_id.to_string()]))
            .expression_attribute_values(":now", items::time(Utc::now()));
        tracing::debug!(meme_id = %id, %user_id, vote = %vote, "DynamoDB: Casting vote");
        self.send_update(id, request, "cast vote", None).await
    }

    async fn add_comment(&self, id: Uuid, comment: &Comment) -> Result<Meme, RepoError> {
        let request = self
            .update(id)
            .update_expression(
                "SET comments = list_append(if_not_exists(comments, :empty), :comment), updated_at = :now",
            )
            .expression_attribute_values(":empty", AttributeValue::L(Vec::new()))
            .expression_attribute_values(":comment", AttributeValue::L(vec![comment_to_attribute(comment)]))
            .expression_attribute_values(":now", items::time(Utc::now()));
        self.send_update(id, request, "append comment", None).await
    }

    async fn remove_comment(&self, id: Uuid, comment_id: Uuid, position: usize) -> Result<Meme, RepoError> {
        let slot_holds_comment = format!("comments[{position}].comment_id = :comment_id");
        let request = self
            .update_where(id, Some(&slot_holds_comment))
            .update_expression(format!("REMOVE comments[{position}] SET updated_at = :now"))
            .expression_attribute_values(":comment_id", items::s(comment_id.to_string()))
            .expression_attribute_values(":now", items::time(Utc::now()));
        self.send_update(id, request, "remove comment", Some("Comment list changed, reload and try again"))
            .await
    }

    async fn record_view(&self, id: Uuid) -> Result<u64, RepoError> {
        let request = self
            .update(id)
            .update_expression("ADD #views :one")
            .expression_attribute_names("#views", "views")
            .expression_attribute_values(":one", items::n(1));
        let meme = self.send_update(id, request, "record view", None).await?;
        Ok(meme.views)
    }

    async fn report(&self, id: Uuid, details: &ReportDetails) -> Result<Meme, RepoError> {
        let request = self
            .update(id)
            .update_expression("SET is_reported = :reported, #report = :details, updated_at = :now")
            .expression_attribute_names("#report", "report")
            .expression_attribute_values(":reported", AttributeValue::Bool(true))
            .expression_attribute_values(":details", report_to_attribute(details))
            .expression_attribute_values(":now", items::time(details.reported_at));
        self.send_update(id, request, "report meme", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_conditions_keep_the_existence_check() {
        assert_eq!(update_condition(None), "attribute_exists(meme_id)");
        assert_eq!(
            update_condition(Some("comments[2].comment_id = :comment_id")),
            "attribute_exists(meme_id) AND (comments[2].comment_id = :comment_id)"
        );
    }
}
