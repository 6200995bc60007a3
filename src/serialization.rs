/// serializable views over a loan aggregate
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::ledger::LoanTotals;
use crate::loan::LoanAggregate;
use crate::payments::PaymentContext;
use crate::renewal::RenewalRecord;
use crate::schedule;
use crate::types::{ClientId, LoanId, LoanStatus, LoanType, RenewalId, RepaymentFrequency};

/// serializable view of a loan's state
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub client_id: ClientId,
    pub loan_type: LoanType,
    pub purpose: String,
    pub status: LoanStatus,
    pub terms: TermsView,
    pub totals: LoanTotals,
    pub outstanding: OutstandingView,
    pub schedule: ScheduleView,
    pub payment_count: usize,
    pub renewal_count: usize,
    pub closed_on: Option<NaiveDate>,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub term: u32,
    pub repayment_frequency: RepaymentFrequency,
    pub interest_charged: Money,
    pub application_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub cycle: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutstandingView {
    pub fines: Money,
    pub fees: Money,
    pub interest: Money,
    pub principal: Money,
    pub total: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleView {
    pub installments: usize,
    pub paid_installments: usize,
    pub overdue_installments: usize,
    pub next_due_date: Option<NaiveDate>,
    pub next_amount_due: Option<Money>,
}

impl LoanView {
    pub fn from_aggregate(aggregate: &LoanAggregate, as_of: NaiveDate, grace_days: u32) -> Self {
        let loan = &aggregate.loan;
        let context = PaymentContext::from_ledger(loan, loan.totals());
        let next = schedule::next_unpaid(&aggregate.schedule);

        LoanView {
            id: loan.id,
            client_id: loan.client_id,
            loan_type: loan.loan_type,
            purpose: loan.purpose.clone(),
            status: loan.status,
            terms: TermsView {
                principal_amount: loan.principal_amount,
                interest_rate: loan.interest_rate,
                term: loan.term,
                repayment_frequency: loan.repayment_frequency,
                interest_charged: loan.interest_charged(),
                application_date: loan.application_date,
                start_date: loan.start_date,
                due_date: loan.due_date,
                cycle: loan.cycle,
            },
            totals: *loan.totals(),
            outstanding: OutstandingView {
                fines: context.outstanding_fines,
                fees: context.outstanding_fees,
                interest: context.outstanding_interest,
                principal: context.outstanding_principal,
                total: context.total_outstanding(),
            },
            schedule: ScheduleView {
                installments: aggregate.schedule.len(),
                paid_installments: aggregate.schedule.iter().filter(|e| e.is_paid).count(),
                overdue_installments: schedule::overdue(&aggregate.schedule, as_of, grace_days).count(),
                next_due_date: next.map(|e| e.due_date),
                next_amount_due: next.map(|e| e.total_amount_due),
            },
            payment_count: aggregate.payments.len(),
            renewal_count: aggregate.renewals.len(),
            closed_on: aggregate.closure.as_ref().map(|c| c.closure_date),
            version: aggregate.version,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// human-facing summary of a renewal's new terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalSummary {
    pub renewal_id: RenewalId,
    pub new_principal: Money,
    /// e.g. "10%"
    pub new_interest_rate: String,
    /// e.g. "12 months"
    pub new_term: String,
    pub new_due_date: NaiveDate,
    pub previous_balance: Money,
    pub applied: bool,
}

impl RenewalSummary {
    pub fn from_record(record: &RenewalRecord, frequency: RepaymentFrequency) -> Self {
        let unit = match frequency {
            RepaymentFrequency::Daily => "days",
            RepaymentFrequency::Weekly => "weeks",
            RepaymentFrequency::Monthly => "months",
        };

        RenewalSummary {
            renewal_id: record.id,
            new_principal: record.new_principal_amount,
            new_interest_rate: record.new_interest_rate.to_string(),
            new_term: format!("{} {}", record.new_loan_term, unit),
            new_due_date: record.new_due_date,
            previous_balance: record.snapshot.previous_balance,
            applied: record.applied,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
