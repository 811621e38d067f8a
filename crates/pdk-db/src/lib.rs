//! Postgres persistence for the ledger.
//!
//! `PgLedgerStore` implements the engine's `HoldingsStore` and
//! `TransactionLog` traits on top of three tables (accounts, holdings,
//! transactions). Every save runs in one SQL transaction guarded by the
//! account's version stamp, so cash, positions, and the trade log commit
//! together or not at all.

use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row};

use pdk_engine::{HistoryQuery, HoldingsStore, SortOrder, StoreError, TransactionLog, Versioned};
use pdk_schemas::{AccountId, AccountState, Holding, TradeSide, Transaction};

pub const ENV_DB_URL: &str = "PDK_DATABASE_URL";

/// Connect to Postgres using PDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_holdings<'e, E>(executor: E, account_id: AccountId) -> Result<Vec<(String, Holding)>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query(
            r#"
            select symbol, quantity, avg_cost_micros
            from holdings
            where account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_all(executor)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push((
                row.try_get("symbol")?,
                Holding {
                    quantity: row.try_get("quantity")?,
                    avg_cost_micros: row.try_get("avg_cost_micros")?,
                },
            ));
        }
        Ok(out)
    }
}

/// Detect a Postgres unique/primary-key violation (error code 23505).
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn storage(err: sqlx::Error, what: &'static str) -> StoreError {
    StoreError::unavailable(anyhow::Error::new(err).context(what))
}

#[async_trait::async_trait]
impl HoldingsStore for PgLedgerStore {
    async fn create(
        &self,
        account_id: AccountId,
        starting_cash_micros: i64,
    ) -> Result<Versioned<AccountState>, StoreError> {
        let res = sqlx::query(
            r#"
            insert into accounts (id, cash_micros, version)
            values ($1, $2, 1)
            "#,
        )
        .bind(account_id)
        .bind(starting_cash_micros)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(StoreError::Conflict),
            Err(e) => return Err(storage(e, "account insert failed")),
        }

        Ok(Versioned {
            value: AccountState::new(account_id, starting_cash_micros),
            version: 1,
        })
    }

    async fn load(&self, account_id: AccountId) -> Result<Versioned<AccountState>, StoreError> {
        // Both selects share one REPEATABLE READ snapshot so the
        // returned cash and holdings always belong to the same version;
        // a save committing between them must not produce a mixed state.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage(e, "begin failed"))?;
        sqlx::query("set transaction isolation level repeatable read")
            .execute(&mut *tx)
            .await
            .map_err(|e| storage(e, "set isolation failed"))?;

        let row = sqlx::query(
            r#"
            select cash_micros, version
            from accounts
            where id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage(e, "account select failed"))?
        .ok_or(StoreError::NotFound)?;

        let cash_micros: i64 = row
            .try_get("cash_micros")
            .map_err(|e| storage(e, "account row decode failed"))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| storage(e, "account row decode failed"))?;

        let mut state = AccountState::new(account_id, cash_micros);
        let holdings = Self::load_holdings(&mut *tx, account_id)
            .await
            .map_err(|e| storage(e, "holdings select failed"))?;
        for (symbol, holding) in holdings {
            state.holdings.insert(symbol, holding);
        }

        tx.commit()
            .await
            .map_err(|e| storage(e, "read commit failed"))?;

        Ok(Versioned {
            value: state,
            version: version as u64,
        })
    }

    async fn save(
        &self,
        account_id: AccountId,
        state: &AccountState,
        expected_version: u64,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        let expected = i64::try_from(expected_version)
            .map_err(|_| StoreError::unavailable(anyhow!("version out of range")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage(e, "begin failed"))?;

        // Version-guarded update. Zero rows means either the account is
        // gone or another writer got there first.
        let updated = sqlx::query(
            r#"
            update accounts
            set cash_micros = $2,
                version = version + 1
            where id = $1 and version = $3
            "#,
        )
        .bind(account_id)
        .bind(state.account.cash_micros)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage(e, "account update failed"))?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("select 1 from accounts where id = $1")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| storage(e, "account probe failed"))?
                .is_some();
            return Err(if exists {
                StoreError::Conflict
            } else {
                StoreError::NotFound
            });
        }

        // Rewrite the position set wholesale. Positions that went to zero
        // simply don't get reinserted.
        sqlx::query("delete from holdings where account_id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage(e, "holdings delete failed"))?;

        for (symbol, holding) in &state.holdings {
            sqlx::query(
                r#"
                insert into holdings (account_id, symbol, quantity, avg_cost_micros)
                values ($1, $2, $3, $4)
                "#,
            )
            .bind(account_id)
            .bind(symbol)
            .bind(holding.quantity)
            .bind(holding.avg_cost_micros)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage(e, "holding insert failed"))?;
        }

        sqlx::query(
            r#"
            insert into transactions (
              id, account_id, symbol, side, quantity, price_micros,
              total_value_micros, executed_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8
            )
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.account_id)
        .bind(transaction.symbol.as_str())
        .bind(transaction.side.as_str())
        .bind(transaction.quantity)
        .bind(transaction.price_micros)
        .bind(transaction.total_value_micros)
        .bind(transaction.executed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage(e, "transaction insert failed"))?;

        tx.commit().await.map_err(|e| storage(e, "commit failed"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransactionLog for PgLedgerStore {
    async fn query(
        &self,
        account_id: AccountId,
        query: HistoryQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        let order = match query.order {
            SortOrder::NewestFirst => "desc",
            SortOrder::OldestFirst => "asc",
        };
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let sql = format!(
            r#"
            select id, account_id, symbol, side, quantity, price_micros,
                   total_value_micros, executed_at
            from transactions
            where account_id = $1
            order by seq {order}
            limit $2
            "#,
        );

        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage(e, "history select failed"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(decode_transaction(&row).map_err(StoreError::unavailable)?);
        }
        Ok(out)
    }
}

fn decode_transaction(row: &sqlx::postgres::PgRow) -> Result<Transaction> {
    let side_str: String = row.try_get("side")?;
    let side = TradeSide::parse(&side_str).map_err(|s| anyhow!("invalid side in row: {s}"))?;

    Ok(Transaction {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        symbol: row.try_get("symbol")?,
        side,
        quantity: row.try_get("quantity")?,
        price_micros: row.try_get("price_micros")?,
        total_value_micros: row.try_get("total_value_micros")?,
        executed_at: row.try_get("executed_at")?,
    })
}
