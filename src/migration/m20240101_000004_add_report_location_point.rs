use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // Native point kept in sync with the coordinate columns
        db.execute_unprepared(
            "ALTER TABLE reports ADD COLUMN location point \
             GENERATED ALWAYS AS (\
                 CASE WHEN longitude IS NOT NULL AND latitude IS NOT NULL \
                 THEN point(longitude, latitude) END\
             ) STORED",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX idx_reports_location ON reports USING GIST (location)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("DROP INDEX IF EXISTS idx_reports_location")
            .await?;

        db.execute_unprepared("ALTER TABLE reports DROP COLUMN IF EXISTS location")
            .await?;

        Ok(())
    }
}
