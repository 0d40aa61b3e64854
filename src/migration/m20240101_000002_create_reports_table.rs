use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Reports {
    Table,
    Id,
    AuthorId,
    Title,
    Description,
    Category,
    Priority,
    Status,
    Longitude,
    Latitude,
    ManualState,
    ManualDistrict,
    ManualCity,
    ManualAddress,
    PhotoUrl,
    UpvoteCount,
    IsAnonymous,
    ResolutionRewarded,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reports::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reports::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Reports::AuthorId).uuid().not_null())
                    .col(ColumnDef::new(Reports::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Reports::Description).text().not_null())
                    .col(
                        ColumnDef::new(Reports::Category)
                            .string_len(50)
                            .not_null()
                            .default("Other"),
                    )
                    .col(
                        ColumnDef::new(Reports::Priority)
                            .string_len(10)
                            .not_null()
                            .default("Medium"),
                    )
                    .col(
                        ColumnDef::new(Reports::Status)
                            .string_len(20)
                            .not_null()
                            .default("Open"),
                    )
                    .col(ColumnDef::new(Reports::Longitude).double().null())
                    .col(ColumnDef::new(Reports::Latitude).double().null())
                    .col(ColumnDef::new(Reports::ManualState).string_len(100).null())
                    .col(ColumnDef::new(Reports::ManualDistrict).string_len(100).null())
                    .col(ColumnDef::new(Reports::ManualCity).string_len(100).null())
                    .col(ColumnDef::new(Reports::ManualAddress).string_len(500).null())
                    .col(ColumnDef::new(Reports::PhotoUrl).string_len(1024).null())
                    .col(
                        ColumnDef::new(Reports::UpvoteCount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Reports::UpvoteCount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Reports::IsAnonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Reports::ResolutionRewarded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Reports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Reports::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reports_author_id")
                            .from(Reports::Table, Reports::AuthorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();
        db.execute_unprepared(
            "ALTER TABLE reports ADD CONSTRAINT chk_reports_single_location CHECK (\
                 (longitude IS NOT NULL AND latitude IS NOT NULL AND manual_address IS NULL) \
                 OR (longitude IS NULL AND latitude IS NULL AND manual_address IS NOT NULL)\
             )",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reports_status_created")
                    .table(Reports::Table)
                    .col(Reports::Status)
                    .col(Reports::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reports_author")
                    .table(Reports::Table)
                    .col(Reports::AuthorId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reports::Table).to_owned())
            .await
    }
}
