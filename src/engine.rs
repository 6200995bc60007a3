use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::charges::{FeeCharge, FineCharge};
use crate::closure::{self, Closure, ClosureRequest};
use crate::config::{EngineConfig, LoanApplication};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::LoanTotals;
use crate::loan::{Disbursement, Loan, LoanAggregate};
use crate::payments::{self, Payment, PaymentAllocator, PaymentContext, PaymentRequest};
use crate::renewal::{RenewalEngine, RenewalParams, RenewalRecord};
use crate::schedule::{self, RegenerationOutcome, ScheduleEntry, ScheduleGenerator};
use crate::serialization::{LoanView, RenewalSummary};
use crate::store::{InMemoryLoanStore, LoanRepository};
use crate::types::{
    FeeChargeId, FeeType, FineChargeId, FineType, LoanId, LoanStatus, PaymentMode, RenewalId,
    RenewalType,
};

/// cash handed over at disbursement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementRequest {
    /// defaults to the loan principal
    pub amount: Option<Money>,
    pub mode: PaymentMode,
    /// defaults to today
    pub disbursement_date: Option<NaiveDate>,
    pub reference: String,
}

impl DisbursementRequest {
    pub fn new(mode: PaymentMode) -> Self {
        Self {
            amount: None,
            mode,
            disbursement_date: None,
            reference: String::new(),
        }
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.disbursement_date = Some(date);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }
}

/// loan accounting engine. every mutating call is one transaction against one
/// loan; events are published only once the transaction commits.
pub struct LoanEngine<R: LoanRepository = InMemoryLoanStore> {
    store: R,
    config: EngineConfig,
    time: SafeTimeProvider,
    allocator: PaymentAllocator,
    generator: ScheduleGenerator,
    renewals: RenewalEngine,
    events: Mutex<EventStore>,
}

impl LoanEngine<InMemoryLoanStore> {
    pub fn new(config: EngineConfig, time: SafeTimeProvider) -> Result<Self> {
        Self::with_store(InMemoryLoanStore::new(), config, time)
    }
}

impl<R: LoanRepository> LoanEngine<R> {
    pub fn with_store(store: R, config: EngineConfig, time: SafeTimeProvider) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            allocator: PaymentAllocator::new(),
            generator: ScheduleGenerator::from_config(&config),
            renewals: RenewalEngine::new(config.intervals),
            config,
            time,
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// shared clock; tests drive it through `test_control`
    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn publish(&self, pending: Vec<Event>) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.extend(pending);
    }

    /// run `operation` in a store transaction, buffering its events until commit
    fn transact<T, F>(&self, loan_id: LoanId, operation: F) -> Result<T>
    where
        F: FnOnce(&mut LoanAggregate, &mut Vec<Event>) -> Result<T>,
    {
        let mut pending = Vec::new();
        let value = self
            .store
            .transact(loan_id, |aggregate| operation(aggregate, &mut pending))?;
        self.publish(pending);
        Ok(value)
    }

    /// drain events published so far
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take_events()
    }

    // lifecycle

    /// open a pending loan. upfront fees are booked as fee charges.
    pub fn create_loan(&self, application: LoanApplication) -> Result<LoanId> {
        application.validate()?;

        let loan = Loan::from_application(&application, self.today());
        let loan_id = loan.id;
        let charge_date = loan.application_date;
        let mut aggregate = LoanAggregate::new(loan);

        let fees = application.fees;
        for (fee_type, amount, description) in [
            (FeeType::Processing, fees.processing_fee, "processing fee"),
            (FeeType::Insurance, fees.insurance_fee, "insurance fee"),
            (FeeType::Other, fees.other_fees, "other upfront fees"),
        ] {
            if amount.is_positive() {
                aggregate
                    .fee_charges
                    .push(FeeCharge::new(loan_id, fee_type, amount, charge_date, description)?);
            }
        }
        aggregate.recompute_ledger();

        let now = self.now();
        let mut pending = vec![Event::LoanCreated {
            loan_id,
            principal: aggregate.loan.principal_amount,
            interest_rate: aggregate.loan.interest_rate,
            total_loan_amount: aggregate.loan.total_loan_amount(),
            timestamp: now,
        }];
        pending.extend(aggregate.fee_charges.iter().map(|fee| Event::FeeCharged {
            loan_id,
            fee_type: fee.fee_type,
            amount: fee.amount,
            timestamp: now,
        }));

        info!(
            loan_id = %loan_id,
            client_id = %application.client_id,
            principal = %application.principal_amount,
            rate = %application.interest_rate,
            "loan created"
        );

        self.store.insert(aggregate)?;
        self.publish(pending);
        Ok(loan_id)
    }

    pub fn approve_loan(&self, loan_id: LoanId, approval_date: Option<NaiveDate>) -> Result<()> {
        let now = self.now();
        let approval_date = approval_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            change_status(aggregate, LoanStatus::Approved, "approve", "loan approved", now, events)?;
            aggregate.loan.approval_date = Some(approval_date);
            events.push(Event::LoanApproved {
                loan_id,
                approval_date,
                timestamp: now,
            });
            info!(loan_id = %loan_id, %approval_date, "loan approved");
            Ok(())
        })
    }

    /// hand over the funds, fix start and due dates and build the initial schedule
    pub fn disburse_loan(&self, loan_id: LoanId, request: DisbursementRequest) -> Result<Disbursement> {
        let now = self.now();
        let date = request.disbursement_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            let principal = aggregate.loan.principal_amount;
            let amount = request.amount.unwrap_or(principal);
            if !amount.is_positive() || amount > principal {
                return Err(LedgerError::validation(format!(
                    "disbursement of {} must be positive and within the principal of {}",
                    amount, principal
                )));
            }

            change_status(aggregate, LoanStatus::Disbursed, "disburse", "funds disbursed", now, events)?;

            let loan = &mut aggregate.loan;
            let due_date = self.config.intervals.advance(date, loan.repayment_frequency, loan.term)?;
            loan.start_date = Some(date);
            loan.due_date = Some(due_date);

            let disbursement = Disbursement {
                id: Uuid::new_v4(),
                loan_id,
                amount,
                disbursement_date: date,
                mode: request.mode,
                reference: request.reference.clone(),
            };
            aggregate.disbursements.push(disbursement.clone());

            let outcome = self.generator.initial_schedule(
                &aggregate.loan,
                &mut aggregate.schedule,
                &mut aggregate.payments,
                date,
            )?;
            events.push(Event::LoanDisbursed {
                loan_id,
                amount,
                start_date: date,
                due_date,
                timestamp: now,
            });
            events.push(schedule_event(aggregate, outcome, now));

            info!(loan_id = %loan_id, %amount, %due_date, "loan disbursed");
            Ok(disbursement)
        })
    }

    pub fn activate_loan(&self, loan_id: LoanId) -> Result<()> {
        let now = self.now();
        self.transact(loan_id, |aggregate, events| {
            change_status(aggregate, LoanStatus::Active, "activate", "loan activated", now, events)
        })
    }

    /// flag the loan delinquent when an installment is overdue past the grace
    /// period, and back to active once nothing is overdue. returns the status.
    pub fn refresh_status(&self, loan_id: LoanId) -> Result<LoanStatus> {
        let now = self.now();
        let today = self.today();
        let grace = self.config.delinquency_grace_days;

        self.transact(loan_id, |aggregate, events| {
            let overdue = schedule::overdue(&aggregate.schedule, today, grace).count();
            let status = aggregate.loan.status;

            match status {
                LoanStatus::Active | LoanStatus::Disbursed | LoanStatus::Renewal | LoanStatus::Restructured
                    if overdue > 0 =>
                {
                    warn!(loan_id = %loan_id, overdue, "loan is delinquent");
                    change_status(
                        aggregate,
                        LoanStatus::Delinquent,
                        "flag delinquent",
                        &format!("{} installment(s) overdue", overdue),
                        now,
                        events,
                    )?;
                }
                LoanStatus::Delinquent if overdue == 0 => {
                    change_status(aggregate, LoanStatus::Active, "cure", "arrears cleared", now, events)?;
                }
                _ => {}
            }

            Ok(aggregate.loan.status)
        })
    }

    pub fn mark_defaulted(&self, loan_id: LoanId, reason: &str) -> Result<()> {
        let now = self.now();
        self.transact(loan_id, |aggregate, events| {
            change_status(aggregate, LoanStatus::Defaulted, "default", reason, now, events)?;
            warn!(loan_id = %loan_id, reason, "loan defaulted");
            Ok(())
        })
    }

    /// flag an open loan as restructured. payments keep flowing and
    /// `activate_loan` returns it to active.
    pub fn restructure_loan(&self, loan_id: LoanId, reason: &str) -> Result<()> {
        let now = self.now();
        self.transact(loan_id, |aggregate, events| {
            change_status(aggregate, LoanStatus::Restructured, "restructure", reason, now, events)?;
            info!(loan_id = %loan_id, reason, "loan restructured");
            Ok(())
        })
    }

    // charges

    pub fn charge_fee(
        &self,
        loan_id: LoanId,
        fee_type: FeeType,
        amount: Money,
        charge_date: Option<NaiveDate>,
        description: &str,
    ) -> Result<FeeChargeId> {
        let now = self.now();
        let date = charge_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            ensure_open(&aggregate.loan, "charge a fee on")?;
            let fee = FeeCharge::new(loan_id, fee_type, amount, date, description)?;
            let id = fee.id;
            aggregate.fee_charges.push(fee);
            let totals = aggregate.recompute_ledger();

            events.push(Event::FeeCharged {
                loan_id,
                fee_type,
                amount,
                timestamp: now,
            });
            info!(loan_id = %loan_id, ?fee_type, %amount, total_fees = %totals.total_fees_charged, "fee charged");
            Ok(id)
        })
    }

    pub fn charge_fine(
        &self,
        loan_id: LoanId,
        fine_type: FineType,
        amount: Money,
        charge_date: Option<NaiveDate>,
        reason: &str,
    ) -> Result<FineChargeId> {
        let now = self.now();
        let date = charge_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            ensure_open(&aggregate.loan, "charge a fine on")?;
            let fine = FineCharge::new(loan_id, fine_type, amount, date, reason)?;
            let id = fine.id;
            aggregate.fine_charges.push(fine);
            let totals = aggregate.recompute_ledger();

            events.push(Event::FineCharged {
                loan_id,
                fine_type,
                amount,
                timestamp: now,
            });
            info!(loan_id = %loan_id, ?fine_type, %amount, total_fines = %totals.total_fines_charged, "fine charged");
            Ok(id)
        })
    }

    // payments

    /// allocate and book a payment, recompute the ledger and reconcile the
    /// linked installment
    pub fn record_payment(&self, loan_id: LoanId, request: PaymentRequest) -> Result<Payment> {
        let now = self.now();
        let payment_date = request.payment_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            if !aggregate.loan.status.accepts_payments() {
                return Err(LedgerError::transition(aggregate.loan.status, "record a payment on"));
            }

            let entry_id = match request.schedule_entry_id {
                Some(id) => Some(aggregate.schedule_entry(id)?.id),
                None if self.config.auto_link_payments => {
                    schedule::next_unpaid(&aggregate.schedule).map(|e| e.id)
                }
                None => None,
            };
            let entry = entry_id.and_then(|id| aggregate.schedule.iter().find(|e| e.id == id));
            let is_late = payments::is_late(entry, payment_date);

            let context = PaymentContext::from_ledger(&aggregate.loan, aggregate.loan.totals());
            let allocation = self.allocator.allocate(&context, request.amount)?;

            let payment = Payment {
                id: Uuid::new_v4(),
                loan_id,
                schedule_entry_id: entry_id,
                payment_date,
                amount_paid: request.amount,
                payment_mode: request.mode,
                receipt_number: request.receipt_number.clone(),
                allocation,
                is_late,
                cycle: aggregate.loan.cycle,
                notes: request.notes.clone(),
            };
            aggregate.payments.push(payment.clone());
            let totals = aggregate.recompute_ledger();

            if let Some(entry) = entry_id.and_then(|id| aggregate.schedule.iter_mut().find(|e| e.id == id)) {
                let was_paid = entry.is_paid;
                if schedule::reconcile(entry, &aggregate.payments) && !was_paid {
                    events.push(Event::InstallmentPaid {
                        loan_id,
                        entry_id: entry.id,
                        installment_number: entry.installment_number,
                        timestamp: now,
                    });
                }
            }

            events.push(Event::PaymentRecorded {
                loan_id,
                payment_id: payment.id,
                amount: payment.amount_paid,
                allocation,
                is_late,
                new_balance: totals.current_balance,
                timestamp: now,
            });

            if totals.current_balance.is_negative() {
                warn!(loan_id = %loan_id, balance = %totals.current_balance, "loan overpaid");
            }
            info!(
                loan_id = %loan_id,
                amount = %payment.amount_paid,
                fines = %allocation.fines,
                fees = %allocation.fees,
                interest = %allocation.interest,
                principal = %allocation.principal,
                balance = %totals.current_balance,
                is_late,
                "payment recorded"
            );
            Ok(payment)
        })
    }

    // renewals

    /// record a renewal proposal. a proposal submitted with its terms already
    /// accepted is applied in the same transaction.
    pub fn propose_renewal(
        &self,
        loan_id: LoanId,
        renewal_type: RenewalType,
        params: RenewalParams,
        renewal_date: Option<NaiveDate>,
    ) -> Result<RenewalRecord> {
        let now = self.now();
        let renewal_date = renewal_date.unwrap_or_else(|| self.today());

        self.transact(loan_id, |aggregate, events| {
            let record = self.renewals.propose(&aggregate.loan, renewal_type, &params, renewal_date)?;
            let renewal_id = record.id;
            aggregate.renewals.push(record.clone());
            events.push(Event::RenewalProposed {
                loan_id,
                renewal_id,
                renewal_type,
                new_principal: record.new_principal_amount,
                timestamp: now,
            });
            info!(loan_id = %loan_id, renewal_id = %renewal_id, ?renewal_type, "renewal proposed");

            if record.terms_accepted {
                self.apply_renewal(aggregate, renewal_id, now, events)
            } else {
                Ok(record)
            }
        })
    }

    /// client accepted the terms of an earlier proposal; apply it
    pub fn accept_renewal(&self, loan_id: LoanId, renewal_id: RenewalId) -> Result<RenewalRecord> {
        let now = self.now();

        self.transact(loan_id, |aggregate, events| {
            aggregate.renewal(renewal_id)?;
            for record in aggregate.renewals.iter_mut().filter(|r| r.id == renewal_id) {
                record.terms_accepted = true;
            }
            self.apply_renewal(aggregate, renewal_id, now, events)
        })
    }

    fn apply_renewal(
        &self,
        aggregate: &mut LoanAggregate,
        renewal_id: RenewalId,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<RenewalRecord> {
        let old_status = aggregate.loan.status;
        let outcome = self.renewals.apply(aggregate, renewal_id, &self.generator)?;
        let record = aggregate.renewal(renewal_id)?.clone();

        events.push(Event::StatusChanged {
            loan_id: aggregate.loan.id,
            old_status,
            new_status: aggregate.loan.status,
            reason: record.reason.clone(),
            timestamp: now,
        });
        events.push(Event::RenewalApplied {
            loan_id: aggregate.loan.id,
            renewal_id,
            new_principal: record.new_principal_amount,
            new_interest_rate: record.new_interest_rate,
            new_term: record.new_loan_term,
            new_due_date: record.new_due_date,
            timestamp: now,
        });
        events.push(schedule_event(aggregate, outcome, now));
        Ok(record)
    }

    // closure

    pub fn close_loan(&self, loan_id: LoanId, request: ClosureRequest) -> Result<Closure> {
        let now = self.now();
        let today = self.today();

        self.transact(loan_id, |aggregate, events| {
            let old_status = aggregate.loan.status;
            let closure = closure::close(aggregate, &request, today)?;

            events.push(Event::StatusChanged {
                loan_id,
                old_status,
                new_status: LoanStatus::Closed,
                reason: format!("{:?} settlement", closure.settlement_type),
                timestamp: now,
            });
            events.push(Event::LoanClosed {
                loan_id,
                settlement_type: closure.settlement_type,
                final_settlement_amount: closure.final_settlement_amount,
                written_off_amount: closure.written_off_amount,
                timestamp: now,
            });
            Ok(closure)
        })
    }

    // queries

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        Ok(self.store.load(loan_id)?.loan)
    }

    pub fn get_schedule(&self, loan_id: LoanId) -> Result<Vec<ScheduleEntry>> {
        Ok(self.store.load(loan_id)?.schedule)
    }

    pub fn get_balance(&self, loan_id: LoanId) -> Result<Money> {
        Ok(self.store.load(loan_id)?.loan.current_balance())
    }

    pub fn get_totals(&self, loan_id: LoanId) -> Result<LoanTotals> {
        Ok(*self.store.load(loan_id)?.loan.totals())
    }

    pub fn get_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        Ok(self.store.load(loan_id)?.payments)
    }

    pub fn get_renewals(&self, loan_id: LoanId) -> Result<Vec<RenewalRecord>> {
        Ok(self.store.load(loan_id)?.renewals)
    }

    pub fn get_closure(&self, loan_id: LoanId) -> Result<Option<Closure>> {
        Ok(self.store.load(loan_id)?.closure)
    }

    pub fn renewal_summary(&self, loan_id: LoanId, renewal_id: RenewalId) -> Result<RenewalSummary> {
        let aggregate = self.store.load(loan_id)?;
        let record = aggregate.renewal(renewal_id)?;
        Ok(RenewalSummary::from_record(record, aggregate.loan.repayment_frequency))
    }

    pub fn loan_view(&self, loan_id: LoanId) -> Result<LoanView> {
        let aggregate = self.store.load(loan_id)?;
        Ok(LoanView::from_aggregate(
            &aggregate,
            self.today(),
            self.config.delinquency_grace_days,
        ))
    }

    pub fn loan_ids(&self) -> Result<Vec<LoanId>> {
        self.store.loan_ids()
    }
}

fn ensure_open(loan: &Loan, operation: &str) -> Result<()> {
    if loan.status.is_closed() {
        return Err(LedgerError::transition(loan.status, operation));
    }
    Ok(())
}

fn change_status(
    aggregate: &mut LoanAggregate,
    next: LoanStatus,
    operation: &str,
    reason: &str,
    now: DateTime<Utc>,
    events: &mut Vec<Event>,
) -> Result<()> {
    let old_status = aggregate.loan.transition(next, operation)?;
    events.push(Event::StatusChanged {
        loan_id: aggregate.loan.id,
        old_status,
        new_status: next,
        reason: reason.to_string(),
        timestamp: now,
    });
    Ok(())
}

fn schedule_event(aggregate: &LoanAggregate, outcome: RegenerationOutcome, now: DateTime<Utc>) -> Event {
    Event::ScheduleGenerated {
        loan_id: aggregate.loan.id,
        installments: outcome.generated,
        removed: outcome.removed,
        first_due_date: schedule::next_unpaid(&aggregate.schedule).map(|e| e.due_date),
        timestamp: now,
    }
}
