//! MySQL-backed diagnostics connection
//!
//! Issues the read-only probe queries against a managed server's `sys`
//! schema over sqlx. All timestamps are taken in UTC on the server side
//! so elapsed-time math never mixes clocks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Row};

use super::ConnectionProvider;
use crate::models::Uptime;
use crate::probe::DbConnection;

const SERVER_NOW: &str = "SELECT UTC_TIMESTAMP(6) AS server_now";

const STATUS_VALUE: &str =
    "SELECT VARIABLE_VALUE FROM performance_schema.global_status WHERE VARIABLE_NAME = ?";

/// Latest audit-log row from any principal not matching the excluded
/// patterns; built per call because the exclusion list is variable.
fn latest_event_query(excluded: usize) -> String {
    let mut sql = String::from("SELECT event_time FROM mysql.general_log WHERE 1 = 1");
    for _ in 0..excluded {
        sql.push_str(" AND user_host NOT LIKE ?");
    }
    sql.push_str(" ORDER BY event_time DESC LIMIT 1");
    sql
}

/// Opens sqlx connections to managed MySQL servers.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

#[async_trait]
impl ConnectionProvider for MySqlConnector {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Box<dyn DbConnection>> {
        let options = MySqlConnectOptions::new()
            .host(host)
            .username(user)
            .password(password)
            .database(database);

        let conn = MySqlConnection::connect_with(&options)
            .await
            .with_context(|| format!("failed to connect to {host}"))?;

        Ok(Box::new(MySqlDbConnection { conn }))
    }
}

struct MySqlDbConnection {
    conn: MySqlConnection,
}

impl MySqlDbConnection {
    async fn status_value(&mut self, name: &str) -> Result<Option<u64>> {
        let row = sqlx::query(STATUS_VALUE)
            .bind(name)
            .fetch_optional(&mut self.conn)
            .await
            .with_context(|| format!("status query for {name} failed"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("VARIABLE_VALUE")
            .context("unexpected status row shape")?;
        let value = raw
            .parse::<u64>()
            .with_context(|| format!("status variable {name} was not numeric: {raw}"))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl DbConnection for MySqlDbConnection {
    async fn latest_client_event(
        &mut self,
        excluded_users: &[&str],
    ) -> Result<Option<DateTime<Utc>>> {
        let sql = latest_event_query(excluded_users.len());
        let mut query = sqlx::query(&sql);
        for user in excluded_users {
            query = query.bind(format!("%{user}%"));
        }

        let row = query
            .fetch_optional(&mut self.conn)
            .await
            .context("audit log query failed")?;

        match row {
            Some(row) => {
                let event_time: DateTime<Utc> = row
                    .try_get("event_time")
                    .context("unexpected audit log row shape")?;
                Ok(Some(event_time))
            }
            None => Ok(None),
        }
    }

    async fn server_now(&mut self) -> Result<DateTime<Utc>> {
        let row = sqlx::query(SERVER_NOW)
            .fetch_one(&mut self.conn)
            .await
            .context("server clock query failed")?;
        let now: NaiveDateTime = row
            .try_get("server_now")
            .context("unexpected clock row shape")?;
        Ok(now.and_utc())
    }

    async fn uptime(&mut self) -> Result<Option<Uptime>> {
        Ok(self.status_value("Uptime").await?.map(Uptime::from_seconds))
    }

    async fn select_count(&mut self) -> Result<Option<u64>> {
        self.status_value("Com_select").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let MySqlDbConnection { conn } = *self;
        conn.close().await.context("failed to close connection")
    }
}
