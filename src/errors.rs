use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{LoanId, LoanStatus, RenewalId, ScheduleEntryId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// rejected before any mutation
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("allocation mismatch: allocated {allocated}, payment {amount}")]
    AllocationMismatch {
        allocated: Money,
        amount: Money,
    },

    #[error("schedule conflict: {message}")]
    ScheduleConflict {
        message: String,
    },

    #[error("cannot {operation} a loan in status {status:?}")]
    StateTransition {
        status: LoanStatus,
        operation: String,
    },

    #[error("ledger out of balance: expected balance {expected}, found {actual}")]
    LedgerImbalance {
        expected: Money,
        actual: Money,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("loan already exists: {id}")]
    DuplicateLoan {
        id: LoanId,
    },

    #[error("renewal not found: {id}")]
    RenewalNotFound {
        id: RenewalId,
    },

    #[error("schedule entry {id} not found on loan {loan_id}")]
    ScheduleEntryNotFound {
        id: ScheduleEntryId,
        loan_id: LoanId,
    },

    #[error("loan {loan_id} already has closure {closure_id}")]
    ClosureExists {
        loan_id: LoanId,
        closure_id: Uuid,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("loan store unavailable: {message}")]
    StoreUnavailable {
        message: String,
    },
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    pub fn transition(status: LoanStatus, operation: impl Into<String>) -> Self {
        LedgerError::StateTransition {
            status,
            operation: operation.into(),
        }
    }

    /// accounting failures that must never be retried or masked
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::AllocationMismatch { .. }
                | LedgerError::ScheduleConflict { .. }
                | LedgerError::LedgerImbalance { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
