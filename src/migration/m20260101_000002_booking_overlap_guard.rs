use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Two reserving bookings of one product may never share a day, even when
// writers race past the application-level check.
const UP: &str = r#"
CREATE EXTENSION IF NOT EXISTS btree_gist;
ALTER TABLE bookings
    ADD CONSTRAINT bookings_no_overlap
    EXCLUDE USING gist (
        product_id WITH =,
        daterange(start_date, end_date, '[)') WITH &&
    )
    WHERE (status IN ('pending', 'confirmed', 'active'));
"#;

const DOWN: &str = r#"
ALTER TABLE bookings DROP CONSTRAINT IF EXISTS bookings_no_overlap;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(DOWN).await?;
        Ok(())
    }
}
