use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::charges::FeeCharge;
use crate::config::{validate_term, FrequencyIntervals};
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::loan::{Loan, LoanAggregate};
use crate::schedule::{RegenerationOutcome, ScheduleGenerator};
use crate::types::{FeeType, LoanId, LoanStatus, RenewalId, RenewalType};

/// loan terms captured before a renewal touches them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenewalSnapshot {
    pub previous_balance: Money,
    pub previous_interest_rate: Rate,
    pub previous_term: u32,
    pub previous_due_date: Option<NaiveDate>,
}

impl RenewalSnapshot {
    pub fn of(loan: &Loan) -> Self {
        Self {
            previous_balance: loan.current_balance(),
            previous_interest_rate: loan.interest_rate,
            previous_term: loan.term,
            previous_due_date: loan.due_date,
        }
    }
}

/// caller-supplied renewal terms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenewalParams {
    /// required for partial and extended renewals, rejected on full ones
    pub new_term: Option<u32>,
    /// required for partial and extended renewals, rejected on full ones
    pub new_interest_rate: Option<Rate>,
    pub reason: String,
    /// booked as a renewal fee charge when the renewal is applied
    pub renewal_fee: Option<Money>,
    pub terms_accepted: bool,
}

impl RenewalParams {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn terms(mut self, term: u32, rate: Rate) -> Self {
        self.new_term = Some(term);
        self.new_interest_rate = Some(rate);
        self
    }

    pub fn renewal_fee(mut self, fee: Money) -> Self {
        self.renewal_fee = Some(fee);
        self
    }

    pub fn accepted(mut self) -> Self {
        self.terms_accepted = true;
        self
    }
}

/// a proposed or applied renewal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalRecord {
    pub id: RenewalId,
    pub loan_id: LoanId,
    pub renewal_date: NaiveDate,
    pub renewal_type: RenewalType,
    pub snapshot: RenewalSnapshot,
    pub new_principal_amount: Money,
    pub new_interest_rate: Rate,
    pub new_loan_term: u32,
    pub new_due_date: NaiveDate,
    pub reason: String,
    pub renewal_fee: Option<Money>,
    pub terms_accepted: bool,
    pub applied: bool,
}

/// renewal engine: rolls the outstanding balance into a fresh cycle
#[derive(Debug, Clone, Copy)]
pub struct RenewalEngine {
    intervals: FrequencyIntervals,
}

impl RenewalEngine {
    pub fn new(intervals: FrequencyIntervals) -> Self {
        Self { intervals }
    }

    /// build a renewal record from the loan's current state. has no side effects.
    pub fn propose(
        &self,
        loan: &Loan,
        renewal_type: RenewalType,
        params: &RenewalParams,
        renewal_date: NaiveDate,
    ) -> Result<RenewalRecord> {
        Self::check_eligible(loan, "renew")?;

        let snapshot = RenewalSnapshot::of(loan);
        if !snapshot.previous_balance.is_positive() {
            return Err(LedgerError::validation(format!(
                "loan {} has no outstanding balance to renew",
                loan.id
            )));
        }

        let (term, rate) = match renewal_type {
            RenewalType::Full => {
                if params.new_term.is_some() || params.new_interest_rate.is_some() {
                    return Err(LedgerError::validation(
                        "full renewal keeps the loan's term and rate, use a partial or extended renewal to change them",
                    ));
                }
                (loan.term, loan.interest_rate)
            }
            RenewalType::Partial | RenewalType::Extended => {
                match (params.new_term, params.new_interest_rate) {
                    (Some(term), Some(rate)) => (term, rate),
                    _ => {
                        return Err(LedgerError::validation(format!(
                            "{:?} renewal requires a new term and interest rate",
                            renewal_type
                        )))
                    }
                }
            }
        };

        validate_term(term)?;
        if rate.is_negative() {
            return Err(LedgerError::validation("renewal interest rate cannot be negative"));
        }
        if let Some(fee) = params.renewal_fee {
            if fee.is_negative() {
                return Err(LedgerError::validation("renewal fee cannot be negative"));
            }
        }

        let new_due_date = self.intervals.advance(renewal_date, loan.repayment_frequency, term)?;

        Ok(RenewalRecord {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            renewal_date,
            renewal_type,
            snapshot,
            new_principal_amount: snapshot.previous_balance,
            new_interest_rate: rate,
            new_loan_term: term,
            new_due_date,
            reason: params.reason.clone(),
            renewal_fee: params.renewal_fee,
            terms_accepted: params.terms_accepted,
            applied: false,
        })
    }

    /// apply an accepted renewal: re-base the loan, open a new cycle,
    /// recompute the ledger and regenerate the unpaid schedule
    pub fn apply(
        &self,
        aggregate: &mut LoanAggregate,
        renewal_id: RenewalId,
        generator: &ScheduleGenerator,
    ) -> Result<RegenerationOutcome> {
        let record = aggregate.renewal(renewal_id)?.clone();

        if record.applied {
            return Err(LedgerError::transition(aggregate.loan.status, "re-apply renewal on"));
        }
        if !record.terms_accepted {
            return Err(LedgerError::validation(format!(
                "renewal {} terms have not been accepted",
                record.id
            )));
        }
        Self::check_eligible(&aggregate.loan, "renew")?;
        if aggregate.loan.current_balance() != record.snapshot.previous_balance {
            return Err(LedgerError::validation(format!(
                "renewal {} was proposed against a balance of {}, loan now owes {}",
                record.id,
                record.snapshot.previous_balance,
                aggregate.loan.current_balance()
            )));
        }

        aggregate.loan.transition(LoanStatus::Renewal, "renew")?;
        aggregate.loan.rebase(
            record.new_principal_amount,
            record.new_interest_rate,
            record.new_loan_term,
            record.new_due_date,
        );

        if let Some(fee) = record.renewal_fee.filter(|f| f.is_positive()) {
            aggregate.fee_charges.push(FeeCharge::new(
                aggregate.loan.id,
                FeeType::Renewal,
                fee,
                record.renewal_date,
                format!("renewal {}", record.id),
            )?);
        }

        let totals = aggregate.recompute_ledger();
        debug!(loan_id = %aggregate.loan.id, balance = %totals.current_balance, "renewal re-based ledger");

        let outcome = generator.regenerate(
            &aggregate.loan,
            &mut aggregate.schedule,
            &mut aggregate.payments,
            record.renewal_date,
        )?;

        for stored in aggregate.renewals.iter_mut().filter(|r| r.id == renewal_id) {
            stored.applied = true;
        }

        info!(
            loan_id = %aggregate.loan.id,
            renewal_id = %renewal_id,
            principal = %record.new_principal_amount,
            term = record.new_loan_term,
            "renewal applied"
        );

        Ok(outcome)
    }

    fn check_eligible(loan: &Loan, operation: &str) -> Result<()> {
        if !loan.status.is_renewable() {
            return Err(LedgerError::transition(loan.status, operation));
        }
        Ok(())
    }
}
