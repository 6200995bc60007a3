use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::payments::Allocation;
use crate::types::{
    FeeType, FineType, LoanId, LoanStatus, PaymentId, RenewalId, RenewalType, ScheduleEntryId,
    SettlementType,
};

/// all events that can be emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        principal: Money,
        interest_rate: Rate,
        total_loan_amount: Money,
        timestamp: DateTime<Utc>,
    },
    LoanApproved {
        loan_id: LoanId,
        approval_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    LoanDisbursed {
        loan_id: LoanId,
        amount: Money,
        start_date: NaiveDate,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    LoanClosed {
        loan_id: LoanId,
        settlement_type: SettlementType,
        final_settlement_amount: Money,
        written_off_amount: Money,
        timestamp: DateTime<Utc>,
    },

    // charge events
    FeeCharged {
        loan_id: LoanId,
        fee_type: FeeType,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    FineCharged {
        loan_id: LoanId,
        fine_type: FineType,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        allocation: Allocation,
        is_late: bool,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },
    InstallmentPaid {
        loan_id: LoanId,
        entry_id: ScheduleEntryId,
        installment_number: u32,
        timestamp: DateTime<Utc>,
    },

    // schedule events
    ScheduleGenerated {
        loan_id: LoanId,
        installments: usize,
        removed: usize,
        first_due_date: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },

    // renewal events
    RenewalProposed {
        loan_id: LoanId,
        renewal_id: RenewalId,
        renewal_type: RenewalType,
        new_principal: Money,
        timestamp: DateTime<Utc>,
    },
    RenewalApplied {
        loan_id: LoanId,
        renewal_id: RenewalId,
        new_principal: Money,
        new_interest_rate: Rate,
        new_term: u32,
        new_due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    // status change events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanCreated { loan_id, .. }
            | Event::LoanApproved { loan_id, .. }
            | Event::LoanDisbursed { loan_id, .. }
            | Event::LoanClosed { loan_id, .. }
            | Event::FeeCharged { loan_id, .. }
            | Event::FineCharged { loan_id, .. }
            | Event::PaymentRecorded { loan_id, .. }
            | Event::InstallmentPaid { loan_id, .. }
            | Event::ScheduleGenerated { loan_id, .. }
            | Event::RenewalProposed { loan_id, .. }
            | Event::RenewalApplied { loan_id, .. }
            | Event::StatusChanged { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_take_drains_store() {
        let loan_id = Uuid::new_v4();
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut store = EventStore::new();
        store.emit(Event::FineCharged {
            loan_id,
            fine_type: FineType::LatePayment,
            amount: Money::from_major(50),
            timestamp,
        });
        store.extend([Event::StatusChanged {
            loan_id,
            old_status: LoanStatus::Active,
            new_status: LoanStatus::Delinquent,
            reason: "installment overdue".to_string(),
            timestamp,
        }]);

        assert_eq!(store.len(), 2);
        let drained = store.take_events();
        assert!(store.is_empty());
        assert!(drained.iter().all(|e| e.loan_id() == loan_id));
    }
}
