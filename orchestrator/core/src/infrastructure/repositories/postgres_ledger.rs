// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL ledger.
//!
//! The debit is one conditional `UPDATE ... WHERE balance >= amount`,
//! never a read followed by a write, so concurrent debits against one
//! account serialize on the row and at most one passes a balance that
//! covers only one of them. The refund guard is a partial unique index
//! on `(related_job_id)` for refund entries; a second refund inserts
//! nothing and credits nothing.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::job::{JobId, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerError, REASON_CHARGE};
use crate::domain::repository::LedgerRepository;

pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn debit(&self, user_id: UserId, amount: i64, job_id: JobId) -> Result<i64, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET balance = balance - $2
            WHERE user_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(user_id.0)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let balance: Option<i64> =
                sqlx::query("SELECT balance FROM credit_accounts WHERE user_id = $1")
                    .bind(user_id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?
                    .map(|r| r.get("balance"));
            tx.rollback().await.map_err(db_err)?;
            return Err(LedgerError::InsufficientFunds {
                balance: balance.unwrap_or(0),
                required: amount,
            });
        };
        let new_balance: i64 = row.get("balance");

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, user_id, delta, reason, related_job_id, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(-amount)
        .bind(REASON_CHARGE)
        .bind(job_id.0)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(new_balance)
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        job_id: JobId,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The partial unique index uq_ledger_refund_per_job makes this
        // insert a no-op for a second refund of the same job.
        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, user_id, delta, reason, related_job_id, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (related_job_id) WHERE reason = 'refund' DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(amount)
        .bind(reason)
        .bind(job_id.0)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if inserted > 0 {
            sqlx::query(
                r#"
                INSERT INTO credit_accounts (user_id, balance)
                VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE SET balance = credit_accounts.balance + $2
                "#,
            )
            .bind(user_id.0)
            .bind(amount)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT balance FROM credit_accounts WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get("balance")).unwrap_or(0))
    }

    async fn deposit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO credit_accounts (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET balance = credit_accounts.balance + $2
            RETURNING balance
            "#,
        )
        .bind(user_id.0)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get("balance"))
    }

    async fn entries_for_job(&self, job_id: JobId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, delta, reason, related_job_id, created_at
            FROM ledger_entries
            WHERE related_job_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| LedgerEntry {
                id: row.get("id"),
                user_id: UserId(row.get("user_id")),
                delta: row.get("delta"),
                reason: row.get("reason"),
                related_job_id: row.get::<Option<Uuid>, _>("related_job_id").map(JobId),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
