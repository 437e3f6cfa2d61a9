use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{StateStore, VmRecord, VmState};
use crate::error::{Error, Result};
use crate::provider::VmDescriptor;

/// A `sqlx::PgPool`-backed [`StateStore`] (spec §4.2).
///
/// Grounded on the teacher's own commented-out sqlx dependency line and,
/// for the skip-locked shape specifically, on the `for update skip locked`
/// CTE pattern used elsewhere in the pack for claiming queue rows: select
/// the single candidate row inside a CTE with `FOR UPDATE SKIP LOCKED`, then
/// update through it in the same statement so the row-pick and the mutation
/// are one round trip and one lock acquisition.
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `vm_records` table if it does not already exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            create table if not exists vm_records (
                id bigserial primary key,
                pool text not null,
                vmid text not null,
                state text not null,
                creation_time timestamptz not null default now(),
                ready_time timestamptz,
                assign_time timestamptz,
                heartbeat_time timestamptz,
                reset_time timestamptz,
                retries integer not null default 0,
                room_id text,
                uid text,
                data jsonb,
                unique (pool, vmid)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> std::result::Result<VmRecord, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let data: Option<serde_json::Value> = row.try_get("data")?;
        Ok(VmRecord {
            id: row.try_get("id")?,
            pool: row.try_get("pool")?,
            vmid: row.try_get("vmid")?,
            state: match state.as_str() {
                "staging" => VmState::Staging,
                "available" => VmState::Available,
                "used" => VmState::Used,
                other => {
                    return Err(sqlx::Error::Decode(
                        format!("unknown vm state: {other}").into(),
                    ))
                }
            },
            creation_time: row.try_get("creation_time")?,
            ready_time: row.try_get("ready_time")?,
            assign_time: row.try_get("assign_time")?,
            heartbeat_time: row.try_get("heartbeat_time")?,
            reset_time: row.try_get("reset_time")?,
            retries: row.try_get("retries")?,
            room_id: row.try_get("room_id")?,
            uid: row.try_get("uid")?,
            data: data
                .map(|v| serde_json::from_value(v))
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        })
    }

    fn state_str(state: VmState) -> &'static str {
        match state {
            VmState::Staging => "staging",
            VmState::Available => "available",
            VmState::Used => "used",
        }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn count(&self, pool: &str, state: Option<VmState>) -> Result<u64> {
        let count: i64 = if let Some(state) = state {
            sqlx::query_scalar(
                "select count(*) from vm_records where pool = $1 and state = $2",
            )
            .bind(pool)
            .bind(Self::state_str(state))
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar("select count(*) from vm_records where pool = $1")
                .bind(pool)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count as u64)
    }

    async fn insert_staging(&self, pool: &str, vmid: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "insert into vm_records (pool, vmid, state) values ($1, $2, 'staging') returning id",
        )
        .bind(pool)
        .bind(vmid)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn atomic_lease(
        &self,
        pool: &str,
        room_id: &str,
        uid: &str,
    ) -> Result<Option<VmRecord>> {
        let row = sqlx::query(
            r#"
            with candidate as (
                select id from vm_records
                where pool = $1 and state = 'available'
                order by id asc
                limit 1
                for update skip locked
            )
            update vm_records
               set state = 'used', room_id = $2, uid = $3, assign_time = now()
             where id in (select id from candidate)
            returning id, pool, vmid, state, creation_time, ready_time,
                      assign_time, heartbeat_time, reset_time, retries,
                      room_id, uid, data
            "#,
        )
        .bind(pool)
        .bind(room_id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_record(&r))
            .transpose()
            .map_err(Error::from)
    }

    async fn atomic_oldest_eligible_delete(
        &self,
        pool: &str,
        min_size: u64,
        min_uptime_seconds: u64,
    ) -> Result<Option<String>> {
        let vmid: Option<String> = sqlx::query_scalar(
            r#"
            with ranked as (
                select id, vmid, creation_time,
                       row_number() over (order by id asc) as rank
                from vm_records
                where pool = $1 and state = 'available'
            ),
            candidate as (
                select id, vmid from ranked
                where rank > $2
                  and extract(epoch from (now() - creation_time))::bigint % 3600 > $3
                order by id asc
                limit 1
                for update skip locked
            )
            delete from vm_records
            where id in (select id from candidate)
            returning vmid
            "#,
        )
        .bind(pool)
        .bind(min_size as i64)
        .bind(min_uptime_seconds as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vmid)
    }

    async fn staging_rows(&self, pool: &str) -> Result<Vec<VmRecord>> {
        let rows = sqlx::query("select * from vm_records where pool = $1 and state = 'staging'")
            .bind(pool)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(Self::row_to_record)
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::from)
    }

    async fn available_rows(&self, pool: &str) -> Result<Vec<VmRecord>> {
        let rows =
            sqlx::query("select * from vm_records where pool = $1 and state = 'available'")
                .bind(pool)
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(Self::row_to_record)
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::from)
    }

    async fn increment_retries(&self, id: i64) -> Result<Option<VmRecord>> {
        let row = sqlx::query(
            "update vm_records set retries = retries + 1 where id = $1 returning *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_record(&r))
            .transpose()
            .map_err(Error::from)
    }

    async fn set_data(&self, id: i64, data: VmDescriptor) -> Result<()> {
        let value = serde_json::to_value(&data)?;
        sqlx::query("update vm_records set data = $1 where id = $2")
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_available(&self, id: i64) -> Result<()> {
        sqlx::query(
            "update vm_records set state = 'available', ready_time = now() where id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("delete from vm_records where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_row(&self, pool: &str, vmid: &str, uid: Option<&str>) -> Result<bool> {
        let result = if let Some(uid) = uid {
            sqlx::query(
                r#"
                update vm_records
                   set room_id = null, uid = null, retries = 0, heartbeat_time = null,
                       ready_time = null, assign_time = null, data = null,
                       reset_time = now(), state = 'staging'
                 where pool = $1 and vmid = $2 and uid = $3
                "#,
            )
            .bind(pool)
            .bind(vmid)
            .bind(uid)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                update vm_records
                   set room_id = null, uid = null, retries = 0, heartbeat_time = null,
                       ready_time = null, assign_time = null, data = null,
                       reset_time = now(), state = 'staging'
                 where pool = $1 and vmid = $2
                "#,
            )
            .bind(pool)
            .bind(vmid)
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_vmid(&self, vmid: &str) -> Result<Option<VmRecord>> {
        let row = sqlx::query("select * from vm_records where vmid = $1")
            .bind(vmid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_record(&r)).transpose().map_err(Error::from)
    }

    async fn keep_set(&self, pool: &str, heartbeat_window_seconds: i64) -> Result<Vec<VmRecord>> {
        let rows = sqlx::query(
            r#"
            select * from vm_records
            where pool = $1
              and (state in ('staging', 'available')
                   or (heartbeat_time is not null
                       and extract(epoch from (now() - heartbeat_time)) <= $2))
            "#,
        )
        .bind(pool)
        .bind(heartbeat_window_seconds)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(Self::row_to_record)
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::from)
    }
}
