pub mod allocation;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::ledger::LoanTotals;
use crate::loan::Loan;
use crate::schedule::ScheduleEntry;
use crate::types::{LoanId, PaymentId, PaymentMode, ScheduleEntryId};

pub use allocation::{Allocation, AllocationComponent, PaymentAllocator, ALLOCATION_ORDER};

/// incoming cash event as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub mode: PaymentMode,
    /// defaults to today
    pub payment_date: Option<NaiveDate>,
    pub schedule_entry_id: Option<ScheduleEntryId>,
    pub receipt_number: String,
    pub notes: String,
}

impl PaymentRequest {
    pub fn new(amount: Money, mode: PaymentMode) -> Self {
        Self {
            amount,
            mode,
            payment_date: None,
            schedule_entry_id: None,
            receipt_number: String::new(),
            notes: String::new(),
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.payment_date = Some(date);
        self
    }

    pub fn for_installment(mut self, entry_id: ScheduleEntryId) -> Self {
        self.schedule_entry_id = Some(entry_id);
        self
    }

    pub fn receipt(mut self, receipt_number: impl Into<String>) -> Self {
        self.receipt_number = receipt_number.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// booked payment. immutable once allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub schedule_entry_id: Option<ScheduleEntryId>,
    pub payment_date: NaiveDate,
    pub amount_paid: Money,
    pub payment_mode: PaymentMode,
    pub receipt_number: String,
    pub allocation: Allocation,
    pub is_late: bool,
    /// renewal cycle the payment was booked in
    pub cycle: u32,
    pub notes: String,
}

/// late when linked to an installment and paid after its due date
pub fn is_late(entry: Option<&ScheduleEntry>, payment_date: NaiveDate) -> bool {
    entry.map(|e| payment_date > e.due_date).unwrap_or(false)
}

/// outstanding balances a payment is allocated against
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentContext {
    pub loan_id: LoanId,
    pub outstanding_fines: Money,
    pub outstanding_fees: Money,
    pub outstanding_interest: Money,
    pub outstanding_principal: Money,
}

impl PaymentContext {
    /// charged minus already allocated, per category
    pub fn from_ledger(loan: &Loan, totals: &LoanTotals) -> Self {
        Self {
            loan_id: loan.id,
            outstanding_fines: totals.outstanding_fines(),
            outstanding_fees: totals.outstanding_fees(),
            outstanding_interest: (loan.interest_charged() - totals.total_interest_paid).non_negative(),
            outstanding_principal: (loan.principal_amount - totals.total_principal_paid).non_negative(),
        }
    }

    pub fn total_outstanding(&self) -> Money {
        self.outstanding_fines + self.outstanding_fees + self.outstanding_interest + self.outstanding_principal
    }

    pub fn validate_payment(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanApplication;
    use crate::decimal::Rate;
    use crate::types::{LoanType, RepaymentFrequency};
    use uuid::Uuid;

    #[test]
    fn test_context_from_ledger() {
        let application = LoanApplication::new(
            Uuid::new_v4(),
            LoanType::Emergency,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            6,
            RepaymentFrequency::Weekly,
        );
        let loan = Loan::from_application(&application, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let totals = LoanTotals {
            total_fines_charged: Money::from_major(50),
            total_fines_paid: Money::from_major(20),
            total_fees_charged: Money::from_major(10),
            total_interest_paid: Money::from_major(120),
            ..*loan.totals()
        };

        let context = PaymentContext::from_ledger(&loan, &totals);

        assert_eq!(context.outstanding_fines, Money::from_major(30));
        assert_eq!(context.outstanding_fees, Money::from_major(10));
        // interest overpaid in the ledger never goes negative
        assert_eq!(context.outstanding_interest, Money::ZERO);
        assert_eq!(context.outstanding_principal, Money::from_major(1_000));
        assert_eq!(context.total_outstanding(), Money::from_major(1_040));
    }

    #[test]
    fn test_late_flag() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let entry = ScheduleEntry {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            installment_number: 1,
            due_date: due,
            principal_amount: Money::from_major(100),
            interest_amount: Money::ZERO,
            fees_amount: Money::ZERO,
            total_amount_due: Money::from_major(100),
            is_paid: false,
        };

        assert!(!is_late(Some(&entry), due));
        assert!(is_late(Some(&entry), due.succ_opt().unwrap()));
        assert!(!is_late(None, due.succ_opt().unwrap()));
    }

    #[test]
    fn test_request_builder() {
        let entry_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let request = PaymentRequest::new(Money::from_major(75), PaymentMode::Momo)
            .on(date)
            .for_installment(entry_id)
            .receipt("RCPT-0042");

        assert_eq!(request.payment_date, Some(date));
        assert_eq!(request.schedule_entry_id, Some(entry_id));
        assert_eq!(request.receipt_number, "RCPT-0042");
    }
}
