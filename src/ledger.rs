//! Loan ledger: the derived monetary totals of one loan.
//!
//! Totals are always recomputed from the child rows (fee charges, fine
//! charges, payments) and never edited in place. Fee and fine totals are
//! lifetime sums so charges survive a renewal; paid amounts and the balance
//! only count payments booked in the loan's current renewal cycle, which
//! keeps `current_balance == total_loan_amount - total_amount_paid` true
//! against the re-based `total_loan_amount`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::charges::{FeeCharge, FineCharge};
use crate::decimal::Money;
use crate::loan::Loan;
use crate::payments::Payment;

/// derived totals for one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoanTotals {
    pub total_loan_amount: Money,
    pub total_fees_charged: Money,
    pub total_fines_charged: Money,
    pub total_amount_paid: Money,
    pub current_balance: Money,

    // allocation counters
    pub total_fines_paid: Money,
    pub total_fees_paid: Money,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
}

impl LoanTotals {
    /// totals of a loan with no charges or payments yet
    pub fn opening(total_loan_amount: Money) -> Self {
        Self {
            total_loan_amount,
            current_balance: total_loan_amount,
            ..Self::default()
        }
    }

    pub fn outstanding_fines(&self) -> Money {
        (self.total_fines_charged - self.total_fines_paid).non_negative()
    }

    pub fn outstanding_fees(&self) -> Money {
        (self.total_fees_charged - self.total_fees_paid).non_negative()
    }
}

/// recompute every derived total of `loan` from its rows. idempotent.
pub fn recompute(
    loan: &Loan,
    fee_charges: &[FeeCharge],
    fine_charges: &[FineCharge],
    payments: &[Payment],
) -> LoanTotals {
    let total_fees_charged = fee_charges.iter().map(|f| f.amount).sum();
    let total_fines_charged = fine_charges.iter().map(|f| f.amount).sum();

    let total_fines_paid = payments.iter().map(|p| p.allocation.fines).sum();
    let total_fees_paid = payments.iter().map(|p| p.allocation.fees).sum();

    let mut total_amount_paid = Money::ZERO;
    let mut total_interest_paid = Money::ZERO;
    let mut total_principal_paid = Money::ZERO;
    for payment in payments.iter().filter(|p| p.cycle == loan.cycle) {
        total_amount_paid += payment.amount_paid;
        total_interest_paid += payment.allocation.interest;
        total_principal_paid += payment.allocation.principal;
    }

    let total_loan_amount = loan.total_loan_amount();
    let current_balance = total_loan_amount - total_amount_paid;

    debug!(
        loan_id = %loan.id,
        cycle = loan.cycle,
        %total_amount_paid,
        %current_balance,
        "ledger recomputed"
    );

    LoanTotals {
        total_loan_amount,
        total_fees_charged,
        total_fines_charged,
        total_amount_paid,
        current_balance,
        total_fines_paid,
        total_fees_paid,
        total_interest_paid,
        total_principal_paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanApplication;
    use crate::decimal::Rate;
    use crate::payments::Allocation;
    use crate::types::{FeeType, FineType, LoanType, PaymentMode, RepaymentFrequency};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn loan() -> Loan {
        let application = LoanApplication::new(
            Uuid::new_v4(),
            LoanType::Personal,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            12,
            RepaymentFrequency::Monthly,
        );
        Loan::from_application(&application, date())
    }

    fn payment(loan: &Loan, amount: i64, allocation: Allocation) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            schedule_entry_id: None,
            payment_date: date(),
            amount_paid: Money::from_major(amount),
            payment_mode: PaymentMode::Cash,
            receipt_number: String::new(),
            allocation,
            is_late: false,
            cycle: loan.cycle,
            notes: String::new(),
        }
    }

    #[test]
    fn test_recompute_sums_rows() {
        let loan = loan();
        let fees = vec![
            FeeCharge::new(loan.id, FeeType::Processing, Money::from_major(20), date(), "").unwrap(),
            FeeCharge::new(loan.id, FeeType::Service, Money::from_major(5), date(), "").unwrap(),
        ];
        let fines = vec![FineCharge::new(loan.id, FineType::LatePayment, Money::from_major(50), date(), "").unwrap()];
        let payments = vec![payment(
            &loan,
            80,
            Allocation {
                fines: Money::from_major(50),
                fees: Money::from_major(25),
                interest: Money::from_major(5),
                principal: Money::ZERO,
            },
        )];

        let totals = recompute(&loan, &fees, &fines, &payments);

        assert_eq!(totals.total_loan_amount, Money::from_major(1_100));
        assert_eq!(totals.total_fees_charged, Money::from_major(25));
        assert_eq!(totals.total_fines_charged, Money::from_major(50));
        assert_eq!(totals.total_amount_paid, Money::from_major(80));
        assert_eq!(totals.current_balance, Money::from_major(1_020));
        assert_eq!(totals.outstanding_fines(), Money::ZERO);
        assert_eq!(totals.outstanding_fees(), Money::ZERO);
        assert_eq!(totals.total_interest_paid, Money::from_major(5));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let loan = loan();
        let fines = vec![FineCharge::new(loan.id, FineType::Default, Money::from_major(15), date(), "").unwrap()];
        let payments = vec![payment(&loan, 100, Allocation { principal: Money::from_major(85), fines: Money::from_major(15), ..Allocation::default() })];

        let first = recompute(&loan, &[], &fines, &payments);
        let second = recompute(&loan, &[], &fines, &payments);
        assert_eq!(first, second);
    }

    #[test]
    fn test_previous_cycle_payments_excluded_from_balance() {
        let mut loan = loan();
        let old = payment(&loan, 600, Allocation { principal: Money::from_major(500), interest: Money::from_major(100), ..Allocation::default() });
        loan.rebase(Money::from_major(500), Rate::from_percentage(10), 12, date());
        let new = payment(&loan, 50, Allocation { interest: Money::from_major(50), ..Allocation::default() });

        let totals = recompute(&loan, &[], &[], &[old, new]);

        assert_eq!(totals.total_loan_amount, Money::from_major(550));
        assert_eq!(totals.total_amount_paid, Money::from_major(50));
        assert_eq!(totals.current_balance, Money::from_major(500));
        assert_eq!(totals.total_interest_paid, Money::from_major(50));
    }
}
