use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::LoanAggregate;
use crate::types::{ClosureId, LoanId, LoanStatus, SettlementType};

/// terminal record of a loan. at most one per loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub id: ClosureId,
    pub loan_id: LoanId,
    pub closure_date: NaiveDate,
    pub settlement_type: SettlementType,
    pub final_settlement_amount: Money,
    /// balance left uncollected by a partial settlement or write-off
    pub written_off_amount: Money,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureRequest {
    pub settlement_type: SettlementType,
    pub final_settlement_amount: Money,
    /// defaults to today
    pub closure_date: Option<NaiveDate>,
    pub notes: String,
}

impl ClosureRequest {
    pub fn new(settlement_type: SettlementType, final_settlement_amount: Money) -> Self {
        Self {
            settlement_type,
            final_settlement_amount,
            closure_date: None,
            notes: String::new(),
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.closure_date = Some(date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// close the loan and attach the closure record
pub fn close(aggregate: &mut LoanAggregate, request: &ClosureRequest, today: NaiveDate) -> Result<Closure> {
    if let Some(existing) = &aggregate.closure {
        return Err(LedgerError::ClosureExists {
            loan_id: aggregate.loan.id,
            closure_id: existing.id,
        });
    }
    if request.final_settlement_amount.is_negative() {
        return Err(LedgerError::validation("final settlement amount cannot be negative"));
    }

    let balance = aggregate.loan.current_balance();
    let shortfall = (balance - request.final_settlement_amount).non_negative();

    let written_off_amount = match request.settlement_type {
        SettlementType::Full => {
            if shortfall.is_positive() {
                return Err(LedgerError::validation(format!(
                    "full settlement of {} does not cover the balance of {}",
                    request.final_settlement_amount, balance
                )));
            }
            Money::ZERO
        }
        SettlementType::Partial | SettlementType::WriteOff => shortfall,
    };

    aggregate.loan.transition(LoanStatus::Closed, "close")?;

    let closure = Closure {
        id: Uuid::new_v4(),
        loan_id: aggregate.loan.id,
        closure_date: request.closure_date.unwrap_or(today),
        settlement_type: request.settlement_type,
        final_settlement_amount: request.final_settlement_amount,
        written_off_amount,
        notes: request.notes.clone(),
    };

    if written_off_amount.is_positive() {
        warn!(loan_id = %closure.loan_id, written_off = %written_off_amount, "loan closed with uncollected balance");
    }
    info!(loan_id = %closure.loan_id, settlement = ?closure.settlement_type, "loan closed");

    aggregate.closure = Some(closure.clone());
    Ok(closure)
}
