//! Budget period table access.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{BudgetPeriod, BudgetPeriodKind};
use crate::time;

impl Store {
    /// Fetch the budget row for `(period, period_start)`, if one exists.
    pub fn get_budget_period(
        &self,
        period: BudgetPeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<BudgetPeriod>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT period, period_start, budget_limit, spent FROM budget_tracking \
                 WHERE period = ?1 AND period_start = ?2",
                params![period.as_db_str(), time::to_storage_string(period_start)],
                row_to_period,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Insert a budget row if absent, with an initial `spent` of zero.
    pub fn ensure_budget_period(
        &self,
        period: BudgetPeriodKind,
        period_start: DateTime<Utc>,
        budget_limit: f64,
    ) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO budget_tracking (period, period_start, budget_limit, spent) \
                 VALUES (?1, ?2, ?3, 0)",
                params![
                    period.as_db_str(),
                    time::to_storage_string(period_start),
                    budget_limit
                ],
            )?;
            Ok(())
        })
    }

    /// Atomically increment the spend for a budget period as a sandbox run completes.
    pub fn increment_spend(
        &self,
        period: BudgetPeriodKind,
        period_start: DateTime<Utc>,
        amount: f64,
    ) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "UPDATE budget_tracking SET spent = spent + ?1 WHERE period = ?2 AND period_start = ?3",
                params![amount, period.as_db_str(), time::to_storage_string(period_start)],
            )?;
            Ok(())
        })
    }
}

fn row_to_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<BudgetPeriod> {
    let period: String = row.get("period")?;
    let period_start: String = row.get("period_start")?;
    Ok(BudgetPeriod {
        period: BudgetPeriodKind::parse(&period).unwrap_or(BudgetPeriodKind::Monthly),
        period_start: time::from_storage_string(&period_start).unwrap_or_else(|_| time::now()),
        budget_limit: row.get("budget_limit")?,
        spent: row.get("spent")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_then_increment_spend() {
        let store = Store::open_in_memory().unwrap();
        let start = time::now();
        store
            .ensure_budget_period(BudgetPeriodKind::Monthly, start, 100.0)
            .unwrap();
        store
            .increment_spend(BudgetPeriodKind::Monthly, start, 12.5)
            .unwrap();
        let period = store
            .get_budget_period(BudgetPeriodKind::Monthly, start)
            .unwrap()
            .unwrap();
        assert_eq!(period.spent, 12.5);
        assert_eq!(period.budget_limit, 100.0);
    }

    #[test]
    fn ensure_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let start = time::now();
        store
            .ensure_budget_period(BudgetPeriodKind::Daily, start, 10.0)
            .unwrap();
        store
            .increment_spend(BudgetPeriodKind::Daily, start, 5.0)
            .unwrap();
        store
            .ensure_budget_period(BudgetPeriodKind::Daily, start, 10.0)
            .unwrap();
        let period = store
            .get_budget_period(BudgetPeriodKind::Daily, start)
            .unwrap()
            .unwrap();
        assert_eq!(period.spent, 5.0, "re-ensuring must not reset spend");
    }
}
