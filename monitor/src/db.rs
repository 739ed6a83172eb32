use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::model::{
    AlertFilter, AlertRecord, HeartbeatApplied, HeartbeatUpdate, NewAlert, PriorState, Tablet,
};
use crate::store::TabletStore;

const UNIQUE_VIOLATION: &str = "23505";

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// `TabletStore` backed by the `tablets` and `alert_history` tables
#[derive(Debug, Clone)]
pub struct PgTabletStore {
    pool: PgPool,
}

impl PgTabletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TabletStore for PgTabletStore {
    async fn apply_heartbeat(&self, update: &HeartbeatUpdate) -> Result<Option<HeartbeatApplied>> {
        // The row lock serializes concurrent heartbeats for one tablet so the
        // previous_* bookkeeping cannot interleave.
        let mut tx = self.pool.begin().await?;

        let prior = sqlx::query_as::<_, PriorState>(
            r#"
            SELECT device_name, battery_level, is_charging, last_battery_alert_level, alert_sent
            FROM tablets
            WHERE device_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&update.device_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(prior) = prior else {
            tx.rollback().await?;
            return Ok(None);
        };

        let result = sqlx::query(
            r#"
            UPDATE tablets SET
                previous_is_charging = is_charging,
                previous_battery_level = battery_level,
                last_seen = $2,
                battery_level = $3,
                is_charging = $4,
                status = 'online',
                updated_at = NOW()
            WHERE device_id = $1
            "#,
        )
        .bind(&update.device_id)
        .bind(update.seen_at)
        .bind(update.battery_level)
        .bind(update.is_charging)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Heartbeat stored for {} ({} row(s))",
            update.device_id,
            result.rows_affected()
        );

        Ok(Some(HeartbeatApplied {
            prior,
            changes: result.rows_affected(),
        }))
    }

    async fn log_alert(&self, alert: &NewAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_history (device_id, alert_type, message, battery_level)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&alert.device_id)
        .bind(&alert.alert_type)
        .bind(&alert.message)
        .bind(alert.battery_level)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_tablets(&self) -> Result<Vec<Tablet>> {
        let tablets = sqlx::query_as::<_, Tablet>("SELECT * FROM tablets ORDER BY device_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tablets)
    }

    async fn get_tablet(&self, device_id: &str) -> Result<Option<Tablet>> {
        let tablet = sqlx::query_as::<_, Tablet>("SELECT * FROM tablets WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tablet)
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        let alerts = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT ah.id, ah.device_id, ah.alert_type, ah.message, ah.battery_level,
                   ah.created_at, t.device_name
            FROM alert_history ah
            LEFT JOIN tablets t ON ah.device_id = t.device_id
            WHERE ($1::text IS NULL OR ah.device_id = $1)
            ORDER BY ah.created_at DESC, ah.id DESC
            LIMIT $2
            "#,
        )
        .bind(&filter.device_id)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    async fn register_tablet(&self, device_id: &str, device_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tablets (device_id, device_name, status)
            VALUES ($1, $2, 'offline')
            "#,
        )
        .bind(device_id)
        .bind(device_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateDevice(device_id.to_string())
            } else {
                Error::Database(e)
            }
        })?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_duplicates() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }
}
