use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{FeeChargeId, FeeType, FineChargeId, FineType, LoanId};

/// append-only fee row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCharge {
    pub id: FeeChargeId,
    pub loan_id: LoanId,
    pub fee_type: FeeType,
    pub amount: Money,
    pub charge_date: NaiveDate,
    pub description: String,
}

impl FeeCharge {
    pub fn new(
        loan_id: LoanId,
        fee_type: FeeType,
        amount: Money,
        charge_date: NaiveDate,
        description: impl Into<String>,
    ) -> Result<Self> {
        if amount.is_negative() {
            return Err(LedgerError::validation(format!("fee amount cannot be negative, got {}", amount)));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            loan_id,
            fee_type,
            amount,
            charge_date,
            description: description.into(),
        })
    }
}

/// append-only fine row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineCharge {
    pub id: FineChargeId,
    pub loan_id: LoanId,
    pub fine_type: FineType,
    pub amount: Money,
    pub charge_date: NaiveDate,
    pub reason: String,
}

impl FineCharge {
    pub fn new(
        loan_id: LoanId,
        fine_type: FineType,
        amount: Money,
        charge_date: NaiveDate,
        reason: impl Into<String>,
    ) -> Result<Self> {
        if amount.is_negative() {
            return Err(LedgerError::validation(format!("fine amount cannot be negative, got {}", amount)));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            loan_id,
            fine_type,
            amount,
            charge_date,
            reason: reason.into(),
        })
    }
}
