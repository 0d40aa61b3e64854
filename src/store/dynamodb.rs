//! DynamoDB adapter.
//!
//! Four tables, named with a configurable prefix:
//!
//! * `users` keyed by `id`
//! * `user_keys` keyed by `lookup` (`email#…` / `username#…`), one sentinel per
//!   unique field, written in the same transaction as the user
//! * `reports` keyed by `id`, location stored as a GeoJSON point map with no
//!   spatial index; DynamoDB has no native geo index and nothing queries by
//!   distance
//! * `upvotes` keyed by (`report_id`, `user_id`), so the primary key itself is
//!   the per-pair uniqueness constraint
//!
//! Multi-item writes go through `TransactWriteItems`; the cancellation reasons
//! tell us which condition failed.

use super::{
    paginate_in_memory, GeoPoint, ManualLocation, NewReport, NewUser, Priority, ReportChanges,
    ReportFilter, ReportLocation, ReportQuery, ReportRecord, ReportStatus, ReportStore,
    StoreError, StoreHealth, StoreResult, UpvoteRecord, UpvoteStore, UpvoteToggle, UserLookup,
    UserRecord, UserStore,
};
use crate::config::database::DynamoConfig;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::{
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, Delete, KeySchemaElement, KeyType,
        Put, ReturnValue, ScalarAttributeType, TransactWriteItem, Update,
    },
    Client,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, from_items, to_item};
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

/// Bound on add/remove transactions when other toggles keep racing us.
const MAX_TOGGLE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportItem {
    id: Uuid,
    author_id: Uuid,
    title: String,
    description: String,
    category: String,
    priority: Priority,
    status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<GeoJsonPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manual_location: Option<ManualLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo_url: Option<String>,
    upvote_count: i64,
    is_anonymous: bool,
    resolution_rewarded: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReportRecord> for ReportItem {
    fn from(r: ReportRecord) -> Self {
        let (location, manual_location) = match r.location {
            ReportLocation::Point(p) => (
                Some(GeoJsonPoint {
                    kind: "Point".to_string(),
                    coordinates: [p.longitude, p.latitude],
                }),
                None,
            ),
            ReportLocation::Manual(m) => (None, Some(m)),
        };
        Self {
            id: r.id,
            author_id: r.author_id,
            title: r.title,
            description: r.description,
            category: r.category,
            priority: r.priority,
            status: r.status,
            location,
            manual_location,
            photo_url: r.photo_url,
            upvote_count: r.upvote_count,
            is_anonymous: r.is_anonymous,
            resolution_rewarded: r.resolution_rewarded,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl TryFrom<ReportItem> for ReportRecord {
    type Error = StoreError;

    fn try_from(item: ReportItem) -> Result<Self, Self::Error> {
        let location = match (item.location, item.manual_location) {
            (Some(point), _) => ReportLocation::Point(GeoPoint {
                longitude: point.coordinates[0],
                latitude: point.coordinates[1],
            }),
            (None, Some(manual)) => ReportLocation::Manual(manual),
            (None, None) => {
                return Err(StoreError::backend(format!(
                    "report {} has no location",
                    item.id
                )))
            }
        };
        Ok(Self {
            id: item.id,
            author_id: item.author_id,
            title: item.title,
            description: item.description,
            category: item.category,
            priority: item.priority,
            status: item.status,
            location,
            photo_url: item.photo_url,
            upvote_count: item.upvote_count,
            is_anonymous: item.is_anonymous,
            resolution_rewarded: item.resolution_rewarded,
            created_at: item.created_at,
            updated_at: item.updated_at,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserKeyItem {
    lookup: String,
    user_id: Uuid,
}

fn email_key(email: &str) -> String {
    format!("email#{}", email)
}

fn username_key(username: &str) -> String {
    format!("username#{}", username)
}

fn s(value: impl ToString) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

fn n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn decode_report(item: Item) -> StoreResult<ReportRecord> {
    let item: ReportItem = from_item(item).map_err(StoreError::backend)?;
    item.try_into()
}

/// Which transaction items failed their condition, by position.
fn failed_conditions(err: &SdkError<TransactWriteItemsError>) -> Option<Vec<bool>> {
    match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => Some(
            cancelled
                .cancellation_reasons()
                .iter()
                .map(|reason| reason.code() == Some("ConditionalCheckFailed"))
                .collect(),
        ),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TxOutcome {
    Applied,
    Rejected(Vec<bool>),
}

/// Sign-up writes the user, then the email and username sentinels.
fn rejected_unique_field(reasons: &[bool]) -> &'static str {
    if reasons.get(1).copied().unwrap_or(false) {
        "email"
    } else if reasons.get(2).copied().unwrap_or(false) {
        "username"
    } else {
        "record"
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ToggleStep {
    Settled { upvoted: bool },
    ReportMissing,
    Raced,
}

/// Toggle transactions hold the upvote at item 0 and the report counter at
/// item 1. A failed counter condition means the report is gone; a failed
/// upvote condition means the pair is in the opposite state.
fn toggle_step(adding: bool, outcome: &TxOutcome) -> ToggleStep {
    match outcome {
        TxOutcome::Applied => ToggleStep::Settled { upvoted: adding },
        TxOutcome::Rejected(reasons) if reasons.get(1).copied().unwrap_or(false) => {
            ToggleStep::ReportMissing
        }
        TxOutcome::Rejected(_) => ToggleStep::Raced,
    }
}

/// Alternates add and remove attempts, starting with add, until one applies.
/// Returns whether the upvote exists afterwards.
async fn settle_toggle<F, Fut>(mut attempt: F) -> StoreResult<bool>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = StoreResult<TxOutcome>>,
{
    let mut adding = true;
    for _ in 0..MAX_TOGGLE_ATTEMPTS {
        let outcome = attempt(adding).await?;
        match toggle_step(adding, &outcome) {
            ToggleStep::Settled { upvoted } => return Ok(upvoted),
            ToggleStep::ReportMissing => return Err(StoreError::NotFound),
            ToggleStep::Raced => {
                tracing::debug!(adding, "Upvote toggle raced, flipping");
                adding = !adding;
            }
        }
    }

    Err(StoreError::backend(format!(
        "upvote toggle did not settle after {MAX_TOGGLE_ATTEMPTS} attempts"
    )))
}

pub struct DynamoStore {
    client: Client,
    users_table: String,
    user_keys_table: String,
    reports_table: String,
    upvotes_table: String,
}

impl DynamoStore {
    pub async fn connect(config: &DynamoConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let store = Self::with_client(Client::new(&sdk_config), &config.table_prefix);
        if config.create_tables {
            store.create_tables().await?;
        }
        Ok(store)
    }

    pub fn with_client(client: Client, table_prefix: &str) -> Self {
        Self {
            client,
            users_table: format!("{table_prefix}users"),
            user_keys_table: format!("{table_prefix}user_keys"),
            reports_table: format!("{table_prefix}reports"),
            upvotes_table: format!("{table_prefix}upvotes"),
        }
    }

    /// Idempotent; used against local DynamoDB and in fresh environments.
    pub async fn create_tables(&self) -> anyhow::Result<()> {
        let specs: [(&str, &[(&str, KeyType)]); 4] = [
            (self.users_table.as_str(), &[("id", KeyType::Hash)]),
            (self.user_keys_table.as_str(), &[("lookup", KeyType::Hash)]),
            (self.reports_table.as_str(), &[("id", KeyType::Hash)]),
            (
                self.upvotes_table.as_str(),
                &[("report_id", KeyType::Hash), ("user_id", KeyType::Range)],
            ),
        ];

        for (table, keys) in specs {
            let mut request = self
                .client
                .create_table()
                .table_name(table)
                .billing_mode(BillingMode::PayPerRequest);
            for (name, key_type) in keys {
                request = request
                    .attribute_definitions(
                        AttributeDefinition::builder()
                            .attribute_name(*name)
                            .attribute_type(ScalarAttributeType::S)
                            .build()?,
                    )
                    .key_schema(
                        KeySchemaElement::builder()
                            .attribute_name(*name)
                            .key_type(key_type.clone())
                            .build()?,
                    );
            }

            match request.send().await {
                Ok(_) => tracing::info!("Created DynamoDB table {}", table),
                Err(err)
                    if err
                        .as_service_error()
                        .map(|e| e.is_resource_in_use_exception())
                        .unwrap_or(false) =>
                {
                    tracing::debug!("DynamoDB table {} already exists", table);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn get(&self, table: &str, key: Item) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key))
            .consistent_read(true)
            .send()
            .await
            .map_err(StoreError::backend)?;
        Ok(output.item)
    }

    async fn scan_all(&self, table: &str) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(table)
                .consistent_read(true)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(StoreError::backend)?;
            if let Some(page) = output.items {
                items.extend(page);
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn scan_reports(&self, filter: &ReportFilter) -> StoreResult<Vec<ReportRecord>> {
        let mut reports = Vec::new();
        for item in self.scan_all(&self.reports_table).await? {
            let report = decode_report(item)?;
            if filter.matches(&report) {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    async fn upvote_keys_for(&self, report_id: Uuid) -> StoreResult<Vec<Item>> {
        let mut keys = Vec::new();
        let mut start_key = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.upvotes_table)
                .key_condition_expression("report_id = :r")
                .expression_attribute_values(":r", s(report_id))
                .consistent_read(true)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(StoreError::backend)?;
            for item in output.items.unwrap_or_default() {
                let mut key = Item::new();
                if let Some(user_id) = item.get("user_id") {
                    key.insert("report_id".to_string(), s(report_id));
                    key.insert("user_id".to_string(), user_id.clone());
                    keys.push(key);
                }
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(keys)
    }

    fn counter_update(&self, report_id: Uuid, delta: i64) -> StoreResult<Update> {
        Update::builder()
            .table_name(&self.reports_table)
            .key("id", s(report_id))
            .update_expression("SET upvote_count = upvote_count + :d")
            .condition_expression("attribute_exists(id)")
            .expression_attribute_values(":d", n(delta))
            .build()
            .map_err(StoreError::backend)
    }

    async fn transact(&self, items: Vec<TransactWriteItem>) -> StoreResult<TxOutcome> {
        match self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => Ok(TxOutcome::Applied),
            Err(err) => match failed_conditions(&err) {
                Some(reasons) => Ok(TxOutcome::Rejected(reasons)),
                None => Err(StoreError::backend(err)),
            },
        }
    }

    async fn add_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<TxOutcome> {
        let record = UpvoteRecord {
            id: Uuid::new_v4(),
            user_id,
            report_id,
            created_at: Utc::now(),
        };
        let put = Put::builder()
            .table_name(&self.upvotes_table)
            .set_item(Some(to_item(&record).map_err(StoreError::backend)?))
            .condition_expression("attribute_not_exists(user_id)")
            .build()
            .map_err(StoreError::backend)?;

        self.transact(vec![
            TransactWriteItem::builder().put(put).build(),
            TransactWriteItem::builder()
                .update(self.counter_update(report_id, 1)?)
                .build(),
        ])
        .await
    }

    async fn remove_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<TxOutcome> {
        let delete = Delete::builder()
            .table_name(&self.upvotes_table)
            .key("report_id", s(report_id))
            .key("user_id", s(user_id))
            .condition_expression("attribute_exists(user_id)")
            .build()
            .map_err(StoreError::backend)?;

        self.transact(vec![
            TransactWriteItem::builder().delete(delete).build(),
            TransactWriteItem::builder()
                .update(self.counter_update(report_id, -1)?)
                .build(),
        ])
        .await
    }

    async fn load_report(&self, id: Uuid) -> StoreResult<ReportRecord> {
        let key = HashMap::from([("id".to_string(), s(id))]);
        let item = self
            .get(&self.reports_table, key)
            .await?
            .ok_or(StoreError::NotFound)?;
        decode_report(item)
    }
}

#[async_trait]
impl UserStore for DynamoStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let key = HashMap::from([("id".to_string(), s(id))]);
        match self.get(&self.users_table, key).await? {
            Some(item) => Ok(Some(from_item(item).map_err(StoreError::backend)?)),
            None => Ok(None),
        }
    }

    async fn find_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<UserRecord>> {
        let lookup_key = match lookup {
            UserLookup::Email(email) => email_key(email),
            UserLookup::Username(username) => username_key(username),
        };
        let key = HashMap::from([("lookup".to_string(), s(lookup_key))]);
        let Some(item) = self.get(&self.user_keys_table, key).await? else {
            return Ok(None);
        };
        let sentinel: UserKeyItem = from_item(item).map_err(StoreError::backend)?;
        self.find_user_by_id(sentinel.user_id).await
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<UserRecord> {
        let record = new_user.into_record(Utc::now());

        let mut items = Vec::with_capacity(3);
        let user_put = Put::builder()
            .table_name(&self.users_table)
            .set_item(Some(to_item(&record).map_err(StoreError::backend)?))
            .condition_expression("attribute_not_exists(id)")
            .build()
            .map_err(StoreError::backend)?;
        items.push(TransactWriteItem::builder().put(user_put).build());

        for lookup in [email_key(&record.email), username_key(&record.username)] {
            let sentinel = UserKeyItem {
                lookup,
                user_id: record.id,
            };
            let put = Put::builder()
                .table_name(&self.user_keys_table)
                .set_item(Some(to_item(&sentinel).map_err(StoreError::backend)?))
                .condition_expression("attribute_not_exists(lookup)")
                .build()
                .map_err(StoreError::backend)?;
            items.push(TransactWriteItem::builder().put(put).build());
        }

        match self.transact(items).await? {
            TxOutcome::Applied => Ok(record),
            TxOutcome::Rejected(reasons) => {
                Err(StoreError::duplicate(rejected_unique_field(&reasons)))
            }
        }
    }

    async fn increment_points(&self, id: Uuid, delta: i64) -> StoreResult<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.users_table)
            .key("id", s(id))
            .update_expression("SET points = points + :d, updated_at = :u")
            .condition_expression("attribute_exists(id)")
            .expression_attribute_values(":d", n(delta))
            .expression_attribute_values(":u", s(Utc::now().to_rfc3339()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::NotFound)
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn top_users(&self, limit: u64) -> StoreResult<Vec<UserRecord>> {
        let items = self.scan_all(&self.users_table).await?;
        let mut users: Vec<UserRecord> = from_items(items).map_err(StoreError::backend)?;
        users.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.username.cmp(&b.username)));
        users.truncate(limit as usize);
        Ok(users)
    }
}

#[async_trait]
impl ReportStore for DynamoStore {
    async fn find_report_by_id(&self, id: Uuid) -> StoreResult<Option<ReportRecord>> {
        match self.load_report(id).await {
            Ok(report) => Ok(Some(report)),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn find_reports(&self, query: &ReportQuery) -> StoreResult<(Vec<ReportRecord>, u64)> {
        let matching = self.scan_reports(&query.filter).await?;
        Ok(paginate_in_memory(matching, query))
    }

    async fn count_reports(&self, filter: &ReportFilter) -> StoreResult<u64> {
        Ok(self.scan_reports(filter).await?.len() as u64)
    }

    async fn create_report(&self, new_report: NewReport) -> StoreResult<ReportRecord> {
        let record = new_report.into_record(Utc::now());
        let item = to_item(ReportItem::from(record.clone())).map_err(StoreError::backend)?;
        self.client
            .put_item()
            .table_name(&self.reports_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(StoreError::backend)?;
        Ok(record)
    }

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> StoreResult<ReportRecord> {
        // SET only the changed attributes; upvote_count is never rewritten here.
        let mut sets = vec!["updated_at = :updated_at".to_string()];
        let mut values: Item = HashMap::from([(":updated_at".to_string(), s(Utc::now().to_rfc3339()))]);
        let mut names: HashMap<String, String> = HashMap::new();

        if let Some(title) = changes.title {
            sets.push("title = :title".to_string());
            values.insert(":title".to_string(), s(title));
        }
        if let Some(description) = changes.description {
            sets.push("description = :description".to_string());
            values.insert(":description".to_string(), s(description));
        }
        if let Some(status) = changes.status {
            // `status` is a reserved word
            sets.push("#status = :status".to_string());
            names.insert("#status".to_string(), "status".to_string());
            values.insert(":status".to_string(), s(status.as_str()));
        }
        if let Some(rewarded) = changes.resolution_rewarded {
            sets.push("resolution_rewarded = :rewarded".to_string());
            values.insert(":rewarded".to_string(), AttributeValue::Bool(rewarded));
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.reports_table)
            .key("id", s(id))
            .update_expression(format!("SET {}", sets.join(", ")))
            .condition_expression("attribute_exists(id)")
            .set_expression_attribute_names((!names.is_empty()).then_some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => {
                let item = output
                    .attributes
                    .ok_or_else(|| StoreError::backend("update returned no attributes"))?;
                decode_report(item)
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::NotFound)
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn delete_report(&self, id: Uuid) -> StoreResult<()> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.reports_table)
            .key("id", s(id))
            .condition_expression("attribute_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                return Err(StoreError::NotFound)
            }
            Err(err) => return Err(StoreError::backend(err)),
        }

        // The report is gone, so no toggle can add more upvotes for it.
        for key in self.upvote_keys_for(id).await? {
            self.client
                .delete_item()
                .table_name(&self.upvotes_table)
                .set_key(Some(key))
                .send()
                .await
                .map_err(StoreError::backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl UpvoteStore for DynamoStore {
    async fn find_upvote(
        &self,
        user_id: Uuid,
        report_id: Uuid,
    ) -> StoreResult<Option<UpvoteRecord>> {
        let key = HashMap::from([
            ("report_id".to_string(), s(report_id)),
            ("user_id".to_string(), s(user_id)),
        ]);
        match self.get(&self.upvotes_table, key).await? {
            Some(item) => Ok(Some(from_item(item).map_err(StoreError::backend)?)),
            None => Ok(None),
        }
    }

    async fn count_upvotes(&self, report_id: Uuid) -> StoreResult<u64> {
        Ok(self.upvote_keys_for(report_id).await?.len() as u64)
    }

    async fn toggle_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<UpvoteToggle> {
        let upvoted = settle_toggle(|adding| async move {
            if adding {
                self.add_upvote(user_id, report_id).await
            } else {
                self.remove_upvote(user_id, report_id).await
            }
        })
        .await?;

        Ok(UpvoteToggle {
            upvoted,
            report: self.load_report(report_id).await?,
        })
    }
}

#[async_trait]
impl StoreHealth for DynamoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .describe_table()
            .table_name(&self.reports_table)
            .send()
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(location: ReportLocation) -> ReportRecord {
        NewReport {
            author_id: Uuid::new_v4(),
            title: "Streetlight out".to_string(),
            description: "Dark corner since Monday".to_string(),
            category: "Streetlight".to_string(),
            priority: Priority::Low,
            location,
            photo_url: None,
            is_anonymous: true,
        }
        .into_record(Utc::now())
    }

    #[test]
    fn point_location_stored_as_geojson() {
        let record = sample(ReportLocation::Point(GeoPoint {
            longitude: -73.98,
            latitude: 40.75,
        }));
        let item: Item = to_item(ReportItem::from(record.clone())).unwrap();
        let location = item.get("location").unwrap().as_m().unwrap();
        assert_eq!(location.get("type").unwrap().as_s().unwrap(), "Point");
        assert!(!item.contains_key("manual_location"));

        let back = decode_report(item).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn manual_location_survives_item_encoding() {
        let record = sample(ReportLocation::Manual(ManualLocation {
            state: "Karnataka".to_string(),
            district: "Bengaluru Urban".to_string(),
            city: "Bengaluru".to_string(),
            address: "MG Road".to_string(),
        }));
        let item: Item = to_item(ReportItem::from(record.clone())).unwrap();
        assert_eq!(
            item.get("status").unwrap().as_s().unwrap(),
            record.status.as_str()
        );
        assert_eq!(decode_report(item).unwrap().location, record.location);
    }

    #[test]
    fn lookup_keys_are_namespaced() {
        assert_eq!(email_key("a@b.c"), "email#a@b.c");
        assert_eq!(username_key("alice"), "username#alice");
    }

    /// Feeds scripted transaction outcomes to the toggle loop and records
    /// which direction each attempt took.
    async fn run_toggle(script: Vec<TxOutcome>) -> (StoreResult<bool>, Vec<bool>) {
        let mut script = std::collections::VecDeque::from(script);
        let mut calls = Vec::new();
        let result = settle_toggle(|adding| {
            calls.push(adding);
            let outcome = script
                .pop_front()
                .unwrap_or_else(|| TxOutcome::Rejected(vec![true, false]));
            async move { Ok(outcome) }
        })
        .await;
        (result, calls)
    }

    #[tokio::test]
    async fn toggle_adds_when_absent() {
        let (result, calls) = run_toggle(vec![TxOutcome::Applied]).await;
        assert!(result.unwrap());
        assert_eq!(calls, vec![true]);
    }

    #[tokio::test]
    async fn toggle_flips_to_remove_when_upvote_exists() {
        let (result, calls) = run_toggle(vec![
            TxOutcome::Rejected(vec![true, false]),
            TxOutcome::Applied,
        ])
        .await;
        assert!(!result.unwrap());
        assert_eq!(calls, vec![true, false]);
    }

    #[tokio::test]
    async fn toggle_flips_back_when_a_concurrent_remove_wins() {
        let (result, calls) = run_toggle(vec![
            TxOutcome::Rejected(vec![true, false]),
            TxOutcome::Rejected(vec![true, false]),
            TxOutcome::Applied,
        ])
        .await;
        assert!(result.unwrap());
        assert_eq!(calls, vec![true, false, true]);
    }

    #[tokio::test]
    async fn toggle_on_missing_report_is_not_found() {
        let (result, calls) = run_toggle(vec![TxOutcome::Rejected(vec![false, true])]).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        assert_eq!(calls, vec![true]);

        let (result, calls) = run_toggle(vec![
            TxOutcome::Rejected(vec![true, false]),
            TxOutcome::Rejected(vec![false, true]),
        ])
        .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        assert_eq!(calls, vec![true, false]);
    }

    #[tokio::test]
    async fn toggle_gives_up_after_bounded_attempts() {
        let (result, calls) = run_toggle(Vec::new()).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.len(), MAX_TOGGLE_ATTEMPTS);
        assert!(calls.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[tokio::test]
    async fn toggle_propagates_backend_errors() {
        let result = settle_toggle(|_| async { Err(StoreError::backend("throttled")) }).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[test]
    fn signup_cancellation_names_the_taken_field() {
        assert_eq!(rejected_unique_field(&[false, true, false]), "email");
        assert_eq!(rejected_unique_field(&[false, false, true]), "username");
        assert_eq!(rejected_unique_field(&[false, true, true]), "email");
        assert_eq!(rejected_unique_field(&[true, false, false]), "record");
        assert_eq!(rejected_unique_field(&[]), "record");
    }
}
