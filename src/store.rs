use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, warn};

use crate::errors::{LedgerError, Result};
use crate::loan::LoanAggregate;
use crate::types::LoanId;

/// persistence seam for loan aggregates. every mutation runs through
/// `transact`, which either commits the whole change or none of it.
pub trait LoanRepository {
    /// store a new aggregate. fails if the id is already taken.
    fn insert(&self, aggregate: LoanAggregate) -> Result<()>;

    /// snapshot of the committed aggregate
    fn load(&self, id: LoanId) -> Result<LoanAggregate>;

    /// run `operation` against a working copy of the aggregate. the copy is
    /// committed only when the operation succeeds and the aggregate still
    /// satisfies its invariants.
    fn transact<T, F>(&self, id: LoanId, operation: F) -> Result<T>
    where
        F: FnOnce(&mut LoanAggregate) -> Result<T>;

    fn loan_ids(&self) -> Result<Vec<LoanId>>;
}

type Slot = Arc<Mutex<LoanAggregate>>;

/// in-process store. each loan sits behind its own mutex, so transactions
/// on different loans do not wait on each other.
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    loans: RwLock<HashMap<LoanId, Slot>>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: LoanId) -> Result<Slot> {
        let loans = self.loans.read().map_err(|_| poisoned("loan index"))?;
        loans.get(&id).cloned().ok_or(LedgerError::LoanNotFound { id })
    }
}

/// the committed aggregate is only ever replaced whole, so a panic inside an
/// operation leaves it intact and the lock can be taken back
fn lock_loan(id: LoanId, slot: &Slot) -> MutexGuard<'_, LoanAggregate> {
    slot.lock().unwrap_or_else(|poison| {
        warn!(loan_id = %id, "recovering loan lock after a panicked transaction");
        slot.clear_poison();
        poison.into_inner()
    })
}

fn poisoned(what: &str) -> LedgerError {
    LedgerError::StoreUnavailable {
        message: format!("{} lock poisoned", what),
    }
}

impl LoanRepository for InMemoryLoanStore {
    fn insert(&self, aggregate: LoanAggregate) -> Result<()> {
        aggregate.verify_invariants()?;

        let mut loans = self.loans.write().map_err(|_| poisoned("loan index"))?;
        let id = aggregate.id();
        if loans.contains_key(&id) {
            return Err(LedgerError::DuplicateLoan { id });
        }
        loans.insert(id, Arc::new(Mutex::new(aggregate)));
        Ok(())
    }

    fn load(&self, id: LoanId) -> Result<LoanAggregate> {
        let slot = self.slot(id)?;
        let aggregate = lock_loan(id, &slot);
        Ok(aggregate.clone())
    }

    fn transact<T, F>(&self, id: LoanId, operation: F) -> Result<T>
    where
        F: FnOnce(&mut LoanAggregate) -> Result<T>,
    {
        let slot = self.slot(id)?;
        let mut committed = lock_loan(id, &slot);

        let mut working = committed.clone();
        let outcome = operation(&mut working).and_then(|value| {
            working.verify_invariants()?;
            Ok(value)
        });

        match outcome {
            Ok(value) => {
                working.version = committed.version + 1;
                *committed = working;
                debug!(loan_id = %id, version = committed.version, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                warn!(loan_id = %id, error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    fn loan_ids(&self) -> Result<Vec<LoanId>> {
        let loans = self.loans.read().map_err(|_| poisoned("loan index"))?;
        Ok(loans.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanApplication;
    use crate::decimal::{Money, Rate};
    use crate::loan::Loan;
    use crate::types::{LoanStatus, LoanType, RepaymentFrequency};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn aggregate() -> LoanAggregate {
        let application = LoanApplication::new(
            Uuid::new_v4(),
            LoanType::Personal,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            12,
            RepaymentFrequency::Monthly,
        );
        let mut aggregate =
            LoanAggregate::new(Loan::from_application(&application, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        aggregate.recompute_ledger();
        aggregate
    }

    #[test]
    fn test_commit_bumps_version() {
        let store = InMemoryLoanStore::new();
        let aggregate = aggregate();
        let id = aggregate.id();
        store.insert(aggregate).unwrap();

        store
            .transact(id, |a| a.loan.transition(LoanStatus::Approved, "approve"))
            .unwrap();

        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.loan.status, LoanStatus::Approved);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_failed_operation_rolls_back() {
        let store = InMemoryLoanStore::new();
        let aggregate = aggregate();
        let id = aggregate.id();
        store.insert(aggregate).unwrap();

        let result: Result<()> = store.transact(id, |a| {
            a.loan.transition(LoanStatus::Approved, "approve")?;
            Err(LedgerError::validation("abort"))
        });

        assert!(result.is_err());
        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.loan.status, LoanStatus::Pending);
        assert_eq!(loaded.version, 0);
    }

    #[test]
    fn test_invariant_breach_blocks_commit() {
        let store = InMemoryLoanStore::new();
        let aggregate = aggregate();
        let id = aggregate.id();
        store.insert(aggregate).unwrap();

        // principal changed without recomputing the ledger
        let err = store
            .transact(id, |a| {
                a.loan.rebase(Money::from_major(10), Rate::from_percentage(10), 1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, LedgerError::LedgerImbalance { .. }));
        assert_eq!(store.load(id).unwrap().loan.total_loan_amount(), Money::from_major(1_100));
    }

    #[test]
    fn test_panicked_operation_leaves_loan_usable() {
        let store = Arc::new(InMemoryLoanStore::new());
        let aggregate = aggregate();
        let id = aggregate.id();
        store.insert(aggregate).unwrap();

        let worker = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _: Result<()> = worker.transact(id, |a| {
                a.loan.transition(LoanStatus::Approved, "approve")?;
                panic!("operation blew up mid-transaction");
            });
        })
        .join();
        assert!(joined.is_err());

        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.loan.status, LoanStatus::Pending);
        assert_eq!(loaded.version, 0);

        store
            .transact(id, |a| a.loan.transition(LoanStatus::Approved, "approve"))
            .unwrap();
        assert_eq!(store.load(id).unwrap().version, 1);
    }

    #[test]
    fn test_duplicate_and_missing_loans() {
        let store = InMemoryLoanStore::new();
        let aggregate = aggregate();
        let id = aggregate.id();
        store.insert(aggregate.clone()).unwrap();

        assert!(matches!(store.insert(aggregate), Err(LedgerError::DuplicateLoan { .. })));
        assert!(matches!(store.load(Uuid::new_v4()), Err(LedgerError::LoanNotFound { .. })));
        assert_eq!(store.loan_ids().unwrap(), vec![id]);
    }
}
