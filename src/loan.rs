use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::charges::{FeeCharge, FineCharge};
use crate::closure::Closure;
use crate::config::{Collateral, Guarantor, LoanApplication, UpfrontFees};
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::ledger::{self, LoanTotals};
use crate::payments::Payment;
use crate::renewal::RenewalRecord;
use crate::schedule::ScheduleEntry;
use crate::types::{
    ClientId, DisbursementId, LoanId, LoanStatus, LoanType, PaymentMode, RenewalId,
    RepaymentFrequency, ScheduleEntryId,
};

/// one lending agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub client_id: ClientId,
    pub loan_type: LoanType,
    pub purpose: String,

    // terms
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub term: u32,
    pub repayment_frequency: RepaymentFrequency,
    pub upfront_fees: UpfrontFees,

    // security
    pub collateral: Option<Collateral>,
    pub guarantor: Option<Guarantor>,

    // status and dates
    pub status: LoanStatus,
    pub application_date: NaiveDate,
    pub approval_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    /// renewal generation; payments count toward the balance of their own cycle only
    pub cycle: u32,

    // fixed at creation and at each renewal
    total_loan_amount: Money,
    // owned by the ledger
    totals: LoanTotals,
}

impl Loan {
    /// open a pending loan from a validated application
    pub fn from_application(application: &LoanApplication, today: NaiveDate) -> Self {
        let total_loan_amount =
            total_loan_amount(application.principal_amount, application.interest_rate);

        Self {
            id: Uuid::new_v4(),
            client_id: application.client_id,
            loan_type: application.loan_type,
            purpose: application.purpose.clone(),
            principal_amount: application.principal_amount,
            interest_rate: application.interest_rate,
            term: application.term,
            repayment_frequency: application.repayment_frequency,
            upfront_fees: application.fees,
            collateral: application.collateral.clone(),
            guarantor: application.guarantor.clone(),
            status: LoanStatus::Pending,
            application_date: application.application_date.unwrap_or(today),
            approval_date: None,
            start_date: None,
            due_date: None,
            cycle: 0,
            total_loan_amount,
            totals: LoanTotals::opening(total_loan_amount),
        }
    }

    /// principal plus flat interest for the current cycle
    pub fn total_loan_amount(&self) -> Money {
        self.total_loan_amount
    }

    pub fn totals(&self) -> &LoanTotals {
        &self.totals
    }

    pub fn current_balance(&self) -> Money {
        self.totals.current_balance
    }

    pub fn total_amount_paid(&self) -> Money {
        self.totals.total_amount_paid
    }

    pub fn total_fees_charged(&self) -> Money {
        self.totals.total_fees_charged
    }

    pub fn total_fines_charged(&self) -> Money {
        self.totals.total_fines_charged
    }

    /// interest booked for the current cycle
    pub fn interest_charged(&self) -> Money {
        (self.total_loan_amount - self.principal_amount).non_negative()
    }

    /// move to `next`, returning the previous status
    pub fn transition(&mut self, next: LoanStatus, operation: &str) -> Result<LoanStatus> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::transition(self.status, operation));
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }

    /// re-base onto renewed terms and open a new cycle
    pub(crate) fn rebase(&mut self, principal: Money, rate: Rate, term: u32, due_date: NaiveDate) {
        self.principal_amount = principal;
        self.interest_rate = rate;
        self.term = term;
        self.due_date = Some(due_date);
        self.total_loan_amount = total_loan_amount(principal, rate);
        self.cycle += 1;
    }

    pub(crate) fn apply_totals(&mut self, totals: LoanTotals) {
        self.totals = totals;
    }
}

/// principal * (1 + rate / 100)
pub fn total_loan_amount(principal: Money, rate: Rate) -> Money {
    principal + principal.percentage(rate)
}

/// cash handed to the borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disbursement {
    pub id: DisbursementId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub disbursement_date: NaiveDate,
    pub mode: PaymentMode,
    pub reference: String,
}

/// a loan together with every row that references it. all engine mutations
/// go through one aggregate inside one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAggregate {
    pub loan: Loan,
    pub fee_charges: Vec<FeeCharge>,
    pub fine_charges: Vec<FineCharge>,
    pub schedule: Vec<ScheduleEntry>,
    pub payments: Vec<Payment>,
    pub disbursements: Vec<Disbursement>,
    pub renewals: Vec<RenewalRecord>,
    pub closure: Option<Closure>,
    /// bumped on every committed transaction
    pub version: u64,
}

impl LoanAggregate {
    pub fn new(loan: Loan) -> Self {
        Self {
            loan,
            fee_charges: Vec::new(),
            fine_charges: Vec::new(),
            schedule: Vec::new(),
            payments: Vec::new(),
            disbursements: Vec::new(),
            renewals: Vec::new(),
            closure: None,
            version: 0,
        }
    }

    pub fn id(&self) -> LoanId {
        self.loan.id
    }

    /// recompute derived totals from the child rows and store them on the loan
    pub fn recompute_ledger(&mut self) -> LoanTotals {
        let totals = ledger::recompute(
            &self.loan,
            &self.fee_charges,
            &self.fine_charges,
            &self.payments,
        );
        self.loan.apply_totals(totals);
        totals
    }

    pub fn schedule_entry(&self, id: ScheduleEntryId) -> Result<&ScheduleEntry> {
        self.schedule
            .iter()
            .find(|e| e.id == id)
            .ok_or(LedgerError::ScheduleEntryNotFound { id, loan_id: self.loan.id })
    }

    pub fn renewal(&self, id: RenewalId) -> Result<&RenewalRecord> {
        self.renewals
            .iter()
            .find(|r| r.id == id)
            .ok_or(LedgerError::RenewalNotFound { id })
    }

    /// checks run before a transaction is allowed to commit
    pub fn verify_invariants(&self) -> Result<()> {
        let totals = ledger::recompute(
            &self.loan,
            &self.fee_charges,
            &self.fine_charges,
            &self.payments,
        );
        if totals != *self.loan.totals() {
            return Err(LedgerError::LedgerImbalance {
                expected: totals.current_balance,
                actual: self.loan.current_balance(),
            });
        }

        let expected_balance = self.loan.total_loan_amount() - self.loan.total_amount_paid();
        if self.loan.current_balance() != expected_balance {
            return Err(LedgerError::LedgerImbalance {
                expected: expected_balance,
                actual: self.loan.current_balance(),
            });
        }

        for payment in &self.payments {
            payment.allocation.verify(payment.amount_paid)?;
        }

        if self.schedule.windows(2).any(|w| w[0].due_date > w[1].due_date) {
            return Err(LedgerError::ScheduleConflict {
                message: "schedule entries out of due date order".to_string(),
            });
        }

        if self.closure.is_some() && !self.loan.status.is_closed() {
            return Err(LedgerError::transition(self.loan.status, "keep a closure on"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanApplication;

    fn sample_loan() -> Loan {
        let application = LoanApplication::new(
            Uuid::new_v4(),
            LoanType::Personal,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            12,
            RepaymentFrequency::Monthly,
        );
        Loan::from_application(&application, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn test_new_loan_balances() {
        let loan = sample_loan();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.total_loan_amount(), Money::from_major(1_100));
        assert_eq!(loan.current_balance(), Money::from_major(1_100));
        assert_eq!(loan.interest_charged(), Money::from_major(100));
        assert_eq!(loan.application_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_transition_guard() {
        let mut loan = sample_loan();
        let err = loan.transition(LoanStatus::Active, "activate").unwrap_err();
        assert!(matches!(err, LedgerError::StateTransition { status: LoanStatus::Pending, .. }));

        assert_eq!(loan.transition(LoanStatus::Approved, "approve").unwrap(), LoanStatus::Pending);
        assert_eq!(loan.status, LoanStatus::Approved);
    }

    #[test]
    fn test_rebase_opens_new_cycle() {
        let mut loan = sample_loan();
        let due = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        loan.rebase(Money::from_major(500), Rate::from_percentage(10), 12, due);

        assert_eq!(loan.cycle, 1);
        assert_eq!(loan.total_loan_amount(), Money::from_major(550));
        assert_eq!(loan.due_date, Some(due));
    }

    #[test]
    fn test_fresh_aggregate_is_consistent() {
        let mut aggregate = LoanAggregate::new(sample_loan());
        aggregate.recompute_ledger();
        assert!(aggregate.verify_invariants().is_ok());
    }
}
