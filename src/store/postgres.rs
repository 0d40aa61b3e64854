use super::{
    GeoPoint, ManualLocation, NewReport, NewUser, Priority, ReportChanges, ReportFilter,
    ReportLocation, ReportQuery, ReportRecord, ReportStatus, ReportStore, SortField, SortOrder,
    StoreError, StoreHealth, StoreResult, UpvoteRecord, UpvoteStore, UpvoteToggle, UserLookup,
    UserRecord, UserStore,
};
use crate::config::database::DatabaseConfig;
use crate::migration::Migrator;
use crate::models::{report, upvote, user, Report, Upvote, User};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, SqlErr, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use uuid::Uuid;

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                StoreError::duplicate(duplicate_field(&detail))
            }
            _ => StoreError::backend(err),
        }
    }
}

/// Map a unique-violation message back to the user-facing field name.
fn duplicate_field(detail: &str) -> &'static str {
    if detail.contains("email") {
        "email"
    } else if detail.contains("username") {
        "username"
    } else if detail.contains("upvotes") {
        "upvote"
    } else {
        "record"
    }
}

#[derive(Clone)]
pub struct PostgresStore {
    db: DatabaseConnection,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable must be set"))?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(true);

        let db = Database::connect(opt).await?;
        tracing::info!("Database connected successfully");

        Migrator::up(&db, None).await?;
        tracing::info!("Database migrations applied successfully");

        Ok(Self { db })
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl From<user::Model> for UserRecord {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            email: m.email,
            password_hash: m.password_hash,
            points: m.points,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl TryFrom<report::Model> for ReportRecord {
    type Error = StoreError;

    fn try_from(m: report::Model) -> Result<Self, Self::Error> {
        let status = ReportStatus::parse(&m.status)
            .ok_or_else(|| StoreError::backend(format!("unknown report status '{}'", m.status)))?;
        let priority = Priority::parse(&m.priority).unwrap_or_default();
        let location = match (m.longitude, m.latitude) {
            (Some(longitude), Some(latitude)) => ReportLocation::Point(GeoPoint {
                longitude,
                latitude,
            }),
            _ => ReportLocation::Manual(ManualLocation {
                state: m.manual_state.unwrap_or_default(),
                district: m.manual_district.unwrap_or_default(),
                city: m.manual_city.unwrap_or_default(),
                address: m.manual_address.unwrap_or_default(),
            }),
        };

        Ok(Self {
            id: m.id,
            author_id: m.author_id,
            title: m.title,
            description: m.description,
            category: m.category,
            priority,
            status,
            location,
            photo_url: m.photo_url,
            upvote_count: m.upvote_count,
            is_anonymous: m.is_anonymous,
            resolution_rewarded: m.resolution_rewarded,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

fn filtered(filter: &ReportFilter) -> Select<Report> {
    let mut select = Report::find();
    if let Some(status) = filter.status {
        select = select.filter(report::Column::Status.eq(status.as_str()));
    }
    if let Some(author_id) = filter.author_id {
        select = select.filter(report::Column::AuthorId.eq(author_id));
    }
    select
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let found = User::find_by_id(id).one(&self.db).await?;
        Ok(found.map(UserRecord::from))
    }

    async fn find_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<UserRecord>> {
        let condition = match lookup {
            UserLookup::Email(email) => user::Column::Email.eq(email),
            UserLookup::Username(username) => user::Column::Username.eq(username),
        };
        let found = User::find().filter(condition).one(&self.db).await?;
        Ok(found.map(UserRecord::from))
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<UserRecord> {
        let record = new_user.into_record(Utc::now());
        let model = user::ActiveModel {
            id: Set(record.id),
            username: Set(record.username),
            email: Set(record.email),
            password_hash: Set(record.password_hash),
            points: Set(record.points),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };
        let inserted = model.insert(&self.db).await?;
        Ok(inserted.into())
    }

    async fn increment_points(&self, id: Uuid, delta: i64) -> StoreResult<()> {
        let result = User::update_many()
            .col_expr(
                user::Column::Points,
                Expr::col(user::Column::Points).add(delta),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn top_users(&self, limit: u64) -> StoreResult<Vec<UserRecord>> {
        let users = User::find()
            .order_by_desc(user::Column::Points)
            .order_by_asc(user::Column::Username)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(users.into_iter().map(UserRecord::from).collect())
    }
}

#[async_trait]
impl ReportStore for PostgresStore {
    async fn find_report_by_id(&self, id: Uuid) -> StoreResult<Option<ReportRecord>> {
        Report::find_by_id(id)
            .one(&self.db)
            .await?
            .map(ReportRecord::try_from)
            .transpose()
    }

    async fn find_reports(&self, query: &ReportQuery) -> StoreResult<(Vec<ReportRecord>, u64)> {
        let select = filtered(&query.filter);
        let total = select.clone().count(&self.db).await?;

        let column = match query.sort.field {
            SortField::CreatedAt => report::Column::CreatedAt,
            SortField::UpdatedAt => report::Column::UpdatedAt,
            SortField::UpvoteCount => report::Column::UpvoteCount,
            SortField::Title => report::Column::Title,
        };
        let order = match query.sort.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };

        let rows = select
            .order_by(column, order)
            .order_by_asc(report::Column::Id)
            .offset(query.skip)
            .limit(query.limit)
            .all(&self.db)
            .await?;

        let reports = rows
            .into_iter()
            .map(ReportRecord::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((reports, total))
    }

    async fn count_reports(&self, filter: &ReportFilter) -> StoreResult<u64> {
        Ok(filtered(filter).count(&self.db).await?)
    }

    async fn create_report(&self, new_report: NewReport) -> StoreResult<ReportRecord> {
        let record = new_report.into_record(Utc::now());
        let (longitude, latitude, manual) = match &record.location {
            ReportLocation::Point(p) => (Some(p.longitude), Some(p.latitude), None),
            ReportLocation::Manual(m) => (None, None, Some(m.clone())),
        };

        let model = report::ActiveModel {
            id: Set(record.id),
            author_id: Set(record.author_id),
            title: Set(record.title.clone()),
            description: Set(record.description.clone()),
            category: Set(record.category.clone()),
            priority: Set(record.priority.as_str().to_string()),
            status: Set(record.status.as_str().to_string()),
            longitude: Set(longitude),
            latitude: Set(latitude),
            manual_state: Set(manual.as_ref().map(|m| m.state.clone())),
            manual_district: Set(manual.as_ref().map(|m| m.district.clone())),
            manual_city: Set(manual.as_ref().map(|m| m.city.clone())),
            manual_address: Set(manual.map(|m| m.address)),
            photo_url: Set(record.photo_url.clone()),
            upvote_count: Set(0),
            is_anonymous: Set(record.is_anonymous),
            resolution_rewarded: Set(false),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };
        model.insert(&self.db).await?;
        Ok(record)
    }

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> StoreResult<ReportRecord> {
        let existing = Report::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut active = existing.into_active_model();
        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(status) = changes.status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(rewarded) = changes.resolution_rewarded {
            active.resolution_rewarded = Set(rewarded);
        }
        active.updated_at = Set(Utc::now());

        // Only the columns set above are written, so a concurrent toggle's
        // counter change is never overwritten.
        let updated = active.update(&self.db).await?;
        updated.try_into()
    }

    async fn delete_report(&self, id: Uuid) -> StoreResult<()> {
        let result = Report::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UpvoteStore for PostgresStore {
    async fn find_upvote(
        &self,
        user_id: Uuid,
        report_id: Uuid,
    ) -> StoreResult<Option<UpvoteRecord>> {
        let found = Upvote::find()
            .filter(upvote::Column::UserId.eq(user_id))
            .filter(upvote::Column::ReportId.eq(report_id))
            .one(&self.db)
            .await?;
        Ok(found.map(|m| UpvoteRecord {
            id: m.id,
            user_id: m.user_id,
            report_id: m.report_id,
            created_at: m.created_at,
        }))
    }

    async fn count_upvotes(&self, report_id: Uuid) -> StoreResult<u64> {
        Ok(Upvote::find()
            .filter(upvote::Column::ReportId.eq(report_id))
            .count(&self.db)
            .await?)
    }

    async fn toggle_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<UpvoteToggle> {
        let txn = self.db.begin().await?;

        // Row lock serialises concurrent toggles on the same report.
        Report::find_by_id(report_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let removed = Upvote::delete_many()
            .filter(upvote::Column::UserId.eq(user_id))
            .filter(upvote::Column::ReportId.eq(report_id))
            .exec(&txn)
            .await?
            .rows_affected;

        let upvoted = removed == 0;
        if upvoted {
            upvote::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                report_id: Set(report_id),
                created_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await?;
        }

        let counter = Expr::col(report::Column::UpvoteCount);
        Report::update_many()
            .col_expr(
                report::Column::UpvoteCount,
                if upvoted { counter.add(1) } else { counter.sub(1) },
            )
            .filter(report::Column::Id.eq(report_id))
            .exec(&txn)
            .await?;

        let report = Report::find_by_id(report_id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound)?;
        txn.commit().await?;

        Ok(UpvoteToggle {
            upvoted,
            report: report.try_into()?,
        })
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        self.db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_field_from_constraint_name() {
        assert_eq!(
            duplicate_field(
                "duplicate key value violates unique constraint \"idx_users_email_unique\""
            ),
            "email"
        );
        assert_eq!(
            duplicate_field("Key (username)=(alice) already exists."),
            "username"
        );
        assert_eq!(duplicate_field("something else"), "record");
    }
}
