use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;
pub type ClientId = Uuid;
pub type FeeChargeId = Uuid;
pub type FineChargeId = Uuid;
pub type ScheduleEntryId = Uuid;
pub type PaymentId = Uuid;
pub type DisbursementId = Uuid;
pub type ClosureId = Uuid;
pub type RenewalId = Uuid;

/// loan products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Personal,
    Business,
    Mortgage,
    SchoolFees,
    Emergency,
    Other,
}

/// how often installments fall due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// application received, awaiting approval
    Pending,
    Approved,
    Disbursed,
    /// performing loan
    Active,
    /// renewed terms applied, awaiting re-activation
    Renewal,
    /// an installment is overdue past the grace period
    Delinquent,
    /// terms reworked outside a renewal, still collecting
    Restructured,
    Closed,
    Defaulted,
}

impl LoanStatus {
    /// statuses that can receive repayments
    pub fn accepts_payments(self) -> bool {
        matches!(
            self,
            LoanStatus::Disbursed
                | LoanStatus::Active
                | LoanStatus::Renewal
                | LoanStatus::Delinquent
                | LoanStatus::Restructured
                | LoanStatus::Defaulted
        )
    }

    /// statuses a renewal may be proposed or applied from
    pub fn is_renewable(self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Delinquent)
    }

    pub fn is_closed(self) -> bool {
        self == LoanStatus::Closed
    }

    /// allowed status moves. closing is allowed from anywhere but closed.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Pending, Approved) => true,
            (Approved, Disbursed) => true,
            (Disbursed | Renewal | Delinquent | Restructured, Active) => true,
            (Active | Disbursed | Renewal | Restructured, Delinquent) => true,
            (Active | Delinquent, Renewal) => true,
            (Active | Delinquent, Restructured) => true,
            (Delinquent, Defaulted) => true,
            _ => false,
        }
    }
}

/// fee categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    Processing,
    Insurance,
    Service,
    Renewal,
    Other,
}

/// fine categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineType {
    LatePayment,
    Default,
    Other,
}

/// how cash moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Momo,
    Bank,
    MobileMoney,
}

/// closure settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    Full,
    Partial,
    WriteOff,
}

/// renewal flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalType {
    /// roll the outstanding balance over on the existing rate and term
    Full,
    /// outstanding balance on caller-supplied rate and term
    Partial,
    /// term extension on caller-supplied rate and term
    Extended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Approved));
        assert!(LoanStatus::Approved.can_transition_to(LoanStatus::Disbursed));
        assert!(LoanStatus::Disbursed.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Renewal));
        assert!(LoanStatus::Renewal.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Delinquent.can_transition_to(LoanStatus::Defaulted));
        assert!(LoanStatus::Delinquent.can_transition_to(LoanStatus::Restructured));
        assert!(LoanStatus::Restructured.can_transition_to(LoanStatus::Active));

        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Active));
        assert!(!LoanStatus::Renewal.can_transition_to(LoanStatus::Renewal));
        assert!(!LoanStatus::Closed.can_transition_to(LoanStatus::Active));
        assert!(!LoanStatus::Closed.can_transition_to(LoanStatus::Closed));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Restructured));
    }

    #[test]
    fn test_any_open_loan_can_close() {
        for status in [
            LoanStatus::Pending,
            LoanStatus::Approved,
            LoanStatus::Active,
            LoanStatus::Defaulted,
            LoanStatus::Renewal,
        ] {
            assert!(status.can_transition_to(LoanStatus::Closed));
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LoanStatus::Delinquent).unwrap();
        assert_eq!(json, "\"delinquent\"");
        let mode: PaymentMode = serde_json::from_str("\"mobile_money\"").unwrap();
        assert_eq!(mode, PaymentMode::MobileMoney);
    }
}
