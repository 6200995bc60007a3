pub mod charges;
pub mod closure;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod renewal;
pub mod schedule;
pub mod serialization;
pub mod store;
pub mod types;

// re-export key types
pub use charges::{FeeCharge, FineCharge};
pub use closure::{Closure, ClosureRequest};
pub use config::{
    Collateral, EngineConfig, FeeShare, FrequencyIntervals, Guarantor, InterestShare,
    LoanApplication, ScheduleConfig, UpfrontFees,
};
pub use decimal::{Money, Rate};
pub use engine::{DisbursementRequest, LoanEngine};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use ledger::LoanTotals;
pub use loan::{Disbursement, Loan, LoanAggregate};
pub use payments::{Allocation, Payment, PaymentAllocator, PaymentContext, PaymentRequest};
pub use renewal::{RenewalEngine, RenewalParams, RenewalRecord, RenewalSnapshot};
pub use schedule::{ScheduleEntry, ScheduleGenerator};
pub use serialization::{LoanView, RenewalSummary};
pub use store::{InMemoryLoanStore, LoanRepository};
pub use types::{
    ClientId, FeeType, FineType, LoanId, LoanStatus, LoanType, PaymentMode, RenewalId,
    RenewalType, RepaymentFrequency, SettlementType,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
