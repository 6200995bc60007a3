use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{validate_term, EngineConfig, FeeShare, FrequencyIntervals, InterestShare, ScheduleConfig};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::{self, Loan};
use crate::payments::Payment;
use crate::types::{LoanId, ScheduleEntryId};

/// one installment of the repayment plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleEntryId,
    pub loan_id: LoanId,
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub fees_amount: Money,
    /// fixed at generation
    pub total_amount_due: Money,
    pub is_paid: bool,
}

/// what a regeneration did to the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenerationOutcome {
    pub removed: usize,
    pub retained: usize,
    pub generated: usize,
    pub unlinked_payments: usize,
}

/// repayment schedule generator
#[derive(Debug, Clone, Copy)]
pub struct ScheduleGenerator {
    config: ScheduleConfig,
    intervals: FrequencyIntervals,
}

impl ScheduleGenerator {
    pub fn new(config: ScheduleConfig, intervals: FrequencyIntervals) -> Self {
        Self { config, intervals }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.schedule, config.intervals)
    }

    /// `term` installments spaced by the loan's frequency, first one a full
    /// interval after `start_date`. principal is split evenly with the last
    /// installment absorbing the rounding residue.
    pub fn generate(
        &self,
        loan: &Loan,
        term: u32,
        principal: Money,
        start_date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>> {
        validate_term(term)?;
        if principal.is_negative() {
            return Err(LedgerError::validation(format!(
                "cannot schedule a negative principal of {}",
                principal
            )));
        }

        let principal_shares = principal.split_evenly(term);
        let interest_shares = match self.config.interest_share {
            InterestShare::PrincipalOnly => vec![Money::ZERO; term as usize],
            InterestShare::FlatInterest => {
                let interest = loan::total_loan_amount(principal, loan.interest_rate) - principal;
                interest.split_evenly(term)
            }
        };
        // upfront fees belong to the first cycle only
        let fee_shares = match self.config.fee_share {
            FeeShare::SpreadUpfrontFees if loan.cycle == 0 => loan.upfront_fees.total().split_evenly(term),
            _ => vec![Money::ZERO; term as usize],
        };

        (1..=term)
            .zip(principal_shares)
            .zip(interest_shares)
            .zip(fee_shares)
            .map(|(((number, principal_amount), interest_amount), fees_amount)| {
                Ok(ScheduleEntry {
                    id: Uuid::new_v4(),
                    loan_id: loan.id,
                    installment_number: number,
                    due_date: self.intervals.advance(start_date, loan.repayment_frequency, number)?,
                    principal_amount,
                    interest_amount,
                    fees_amount,
                    total_amount_due: principal_amount + interest_amount + fees_amount,
                    is_paid: false,
                })
            })
            .collect()
    }

    /// first schedule of a loan. any unpaid placeholder entries are replaced,
    /// but a schedule that has already collected installments is never rebuilt
    /// from scratch.
    pub fn initial_schedule(
        &self,
        loan: &Loan,
        entries: &mut Vec<ScheduleEntry>,
        payments: &mut [Payment],
        start_date: NaiveDate,
    ) -> Result<RegenerationOutcome> {
        if entries.iter().any(|e| e.is_paid) {
            return Err(LedgerError::ScheduleConflict {
                message: format!("loan {} already has paid installments", loan.id),
            });
        }
        self.regenerate(loan, entries, payments, start_date)
    }

    /// drop unpaid installments and append a fresh schedule for the loan's
    /// current term and principal. paid installments are kept as history and
    /// payments linked to dropped installments lose their link.
    pub fn regenerate(
        &self,
        loan: &Loan,
        entries: &mut Vec<ScheduleEntry>,
        payments: &mut [Payment],
        start_date: NaiveDate,
    ) -> Result<RegenerationOutcome> {
        let paid_before: Vec<ScheduleEntry> = entries.iter().filter(|e| e.is_paid).cloned().collect();
        let removed_ids: Vec<ScheduleEntryId> =
            entries.iter().filter(|e| !e.is_paid).map(|e| e.id).collect();

        let fresh = self.generate(loan, loan.term, loan.principal_amount, start_date)?;

        let mut unlinked_payments = 0;
        for payment in payments.iter_mut() {
            if payment
                .schedule_entry_id
                .map(|id| removed_ids.contains(&id))
                .unwrap_or(false)
            {
                payment.schedule_entry_id = None;
                unlinked_payments += 1;
            }
        }

        entries.retain(|e| e.is_paid);
        let retained = entries.len();
        // numbering continues past the highest kept installment
        let offset = entries.iter().map(|e| e.installment_number).max().unwrap_or(0);
        let generated = fresh.len();
        entries.extend(fresh.into_iter().map(|mut e| {
            e.installment_number += offset;
            e
        }));
        entries.sort_by_key(|e| e.due_date);

        let paid_after: Vec<&ScheduleEntry> = entries.iter().filter(|e| e.is_paid).collect();
        if paid_after.len() != paid_before.len()
            || paid_before.iter().zip(paid_after).any(|(before, after)| before != after)
        {
            return Err(LedgerError::ScheduleConflict {
                message: format!("regeneration would alter paid installments of loan {}", loan.id),
            });
        }

        debug!(
            loan_id = %loan.id,
            removed = removed_ids.len(),
            retained,
            generated,
            "schedule regenerated"
        );

        Ok(RegenerationOutcome {
            removed: removed_ids.len(),
            retained,
            generated,
            unlinked_payments,
        })
    }
}

/// re-derive `is_paid` from the payments linked to `entry`. returns the new flag.
pub fn reconcile(entry: &mut ScheduleEntry, payments: &[Payment]) -> bool {
    let paid: Money = payments
        .iter()
        .filter(|p| p.schedule_entry_id == Some(entry.id))
        .map(|p| p.amount_paid)
        .sum();
    entry.is_paid = paid >= entry.total_amount_due;
    entry.is_paid
}

/// earliest installment still open
pub fn next_unpaid(entries: &[ScheduleEntry]) -> Option<&ScheduleEntry> {
    entries.iter().filter(|e| !e.is_paid).min_by_key(|e| e.due_date)
}

/// unpaid installments whose due date plus grace has passed by `as_of`
pub fn overdue<'a>(
    entries: &'a [ScheduleEntry],
    as_of: NaiveDate,
    grace_days: u32,
) -> impl Iterator<Item = &'a ScheduleEntry> + 'a {
    let grace = Days::new(u64::from(grace_days));
    entries.iter().filter(move |e| {
        !e.is_paid
            && e
                .due_date
                .checked_add_days(grace)
                .map_or(false, |deadline| deadline < as_of)
    })
}
