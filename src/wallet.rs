use dashmap::DashMap;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::AppError;
use crate::models::{Wallet, WalletTransaction, WalletTxnType};

/// Per-user async mutexes so a debit and its compensating refund for the
/// same user never interleave within this process. SQLite already
/// serializes writers against the file; this closes the read-check-write
/// race between two async tasks inside one process touching the same user.
#[derive(Default)]
pub struct WalletLocks {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub fn get_wallet(conn: &Connection, user_id: &str) -> Option<Wallet> {
    conn.query_row(
        "SELECT user_id, balance, updated_at FROM wallets WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(Wallet {
                user_id: row.get(0)?,
                balance: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )
    .ok()
}

/// Read a user's wallet, creating it with `initial_balance` if this is
/// their first touch.
pub fn get_or_create_wallet(conn: &Connection, user_id: &str, initial_balance: i64) -> Wallet {
    crate::db::ensure_wallet(conn, user_id, initial_balance);
    get_wallet(conn, user_id).expect("wallet row was just ensured")
}

/// Debit `amount` from a user's wallet inside one IMMEDIATE transaction,
/// logging a `WalletTransaction` row. Fails with `InsufficientBalance` if
/// the balance would go negative — callers are expected to hold the
/// per-user lock from `WalletLocks` for the duration of the admission
/// pipeline step that wraps this call.
pub fn debit(
    conn: &mut Connection,
    user_id: &str,
    session_id: Option<&str>,
    amount: i64,
    description: &str,
    reference_id: Option<&str>,
    initial_balance: i64,
) -> Result<WalletTransaction, AppError> {
    apply_delta(
        conn,
        user_id,
        session_id,
        -amount,
        WalletTxnType::Debit,
        description,
        reference_id,
        initial_balance,
    )
}

/// Credit (refund or top-up) a user's wallet.
pub fn credit(
    conn: &mut Connection,
    user_id: &str,
    session_id: Option<&str>,
    amount: i64,
    description: &str,
    reference_id: Option<&str>,
    initial_balance: i64,
) -> Result<WalletTransaction, AppError> {
    apply_delta(
        conn,
        user_id,
        session_id,
        amount,
        WalletTxnType::Credit,
        description,
        reference_id,
        initial_balance,
    )
}

fn apply_delta(
    conn: &mut Connection,
    user_id: &str,
    session_id: Option<&str>,
    delta: i64,
    txn_type: WalletTxnType,
    description: &str,
    reference_id: Option<&str>,
    initial_balance: i64,
) -> Result<WalletTransaction, AppError> {
    let tx = conn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    crate::db::ensure_wallet(&tx, user_id, initial_balance);

    let balance_before: i64 = tx
        .query_row(
            "SELECT balance FROM wallets WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let balance_after = balance_before + delta;
    if balance_after < 0 {
        return Err(AppError::InsufficientBalance {
            required: -delta,
            available: balance_before,
        });
    }

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE wallets SET balance = ?1, updated_at = ?2 WHERE user_id = ?3",
        params![balance_after, &now, user_id],
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let txn = WalletTransaction {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        session_id: session_id.map(|s| s.to_string()),
        txn_type: txn_type.as_str().to_string(),
        amount: delta,
        balance_before,
        balance_after,
        description: description.to_string(),
        reference_id: reference_id.map(|s| s.to_string()),
        created_at: now.clone(),
    };

    tx.execute(
        "INSERT INTO wallet_transactions (id, user_id, session_id, txn_type, amount, balance_before, balance_after, description, reference_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &txn.id,
            &txn.user_id,
            &txn.session_id,
            &txn.txn_type,
            txn.amount,
            txn.balance_before,
            txn.balance_after,
            &txn.description,
            &txn.reference_id,
            &txn.created_at,
        ],
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    tx.commit().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(txn)
}

pub fn list_transactions(conn: &Connection, user_id: &str, limit: i64) -> Vec<WalletTransaction> {
    let mut stmt = match conn.prepare(
        "SELECT id, user_id, session_id, txn_type, amount, balance_before, balance_after, description, reference_id, created_at
         FROM wallet_transactions WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    stmt.query_map(params![user_id, limit], |row| {
        Ok(WalletTransaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            txn_type: row.get(3)?,
            amount: row.get(4)?,
            balance_before: row.get(5)?,
            balance_after: row.get(6)?,
            description: row.get(7)?,
            reference_id: row.get(8)?,
            created_at: row.get(9)?,
        })
    })
    .map(|rows| rows.filter_map(|r| r.ok()).collect())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> crate::db::Db {
        crate::db::Db::new(":memory:")
    }

    #[test]
    fn debit_then_credit_conserves_balance() {
        let db = memory_db();
        let mut conn = db.conn();
        let debit_txn = debit(&mut conn, "u1", None, 10, "outbound message", None, 1000).unwrap();
        assert_eq!(debit_txn.balance_after, 990);
        let credit_txn = credit(&mut conn, "u1", None, 10, "refund", Some("refund_1"), 1000).unwrap();
        assert_eq!(credit_txn.balance_after, 1000);
        assert_eq!(get_wallet(&conn, "u1").unwrap().balance, 1000);
    }

    #[test]
    fn debit_beyond_balance_is_rejected_without_mutating_balance() {
        let db = memory_db();
        let mut conn = db.conn();
        ensure_wallet(&conn, "u1", 5);
        let result = debit(&mut conn, "u1", None, 10, "outbound message", None, 5);
        assert!(matches!(result, Err(AppError::InsufficientBalance { required: 10, available: 5 })));
        assert_eq!(get_wallet(&conn, "u1").unwrap().balance, 5);
        assert!(list_transactions(&conn, "u1", 10).iter().all(|t| t.txn_type != "debit"));
    }

    #[test]
    fn get_or_create_wallet_seeds_initial_balance_once() {
        let db = memory_db();
        let conn = db.conn();
        let first = get_or_create_wallet(&conn, "u1", 1000);
        let second = get_or_create_wallet(&conn, "u1", 1000);
        assert_eq!(first.balance, 1000);
        assert_eq!(second.balance, 1000);
        let initial_rows = list_transactions(&conn, "u1", 10).iter().filter(|t| t.txn_type == "initial").count();
        assert_eq!(initial_rows, 1);
    }
}
