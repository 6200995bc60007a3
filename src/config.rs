use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{ClientId, LoanType, RepaymentFrequency};

/// longest repayment plan, in installments, a loan or renewal may carry
pub const MAX_TERM: u32 = 10_000;

/// engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub schedule: ScheduleConfig,
    pub intervals: FrequencyIntervals,
    /// days an installment may stay unpaid past its due date before the
    /// loan is flagged delinquent
    pub delinquency_grace_days: u32,
    /// link payments without an explicit installment to the earliest unpaid one
    pub auto_link_payments: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            intervals: FrequencyIntervals::default(),
            delinquency_grace_days: 0,
            auto_link_payments: false,
        }
    }
}

/// how the non-principal portions of an installment are filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interest_share: InterestShare,
    pub fee_share: FeeShare,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interest_share: InterestShare::PrincipalOnly,
            fee_share: FeeShare::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestShare {
    /// installments carry principal only, interest portion is zero
    PrincipalOnly,
    /// total flat interest split evenly across installments
    FlatInterest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeShare {
    None,
    /// upfront processing/insurance/other fees split evenly across installments
    SpreadUpfrontFees,
}

/// day spacing between installments per repayment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyIntervals {
    pub daily_days: u32,
    pub weekly_days: u32,
    pub monthly_days: u32,
}

impl Default for FrequencyIntervals {
    fn default() -> Self {
        Self {
            daily_days: 1,
            weekly_days: 7,
            monthly_days: 30,
        }
    }
}

impl FrequencyIntervals {
    pub fn days(&self, frequency: RepaymentFrequency) -> u32 {
        match frequency {
            RepaymentFrequency::Daily => self.daily_days,
            RepaymentFrequency::Weekly => self.weekly_days,
            RepaymentFrequency::Monthly => self.monthly_days,
        }
    }

    /// date `periods` installments after `start`. fails instead of running
    /// past the calendar's range.
    pub fn advance(&self, start: NaiveDate, frequency: RepaymentFrequency, periods: u32) -> Result<NaiveDate> {
        let days = u64::from(self.days(frequency)) * u64::from(periods);
        start.checked_add_days(Days::new(days)).ok_or_else(|| {
            LedgerError::validation(format!(
                "{} {:?} periods from {} falls outside the supported calendar",
                periods, frequency, start
            ))
        })
    }
}

impl EngineConfig {
    /// parse from json; missing fields fall back to defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// schedule that also books flat interest and upfront fees per installment
    pub fn flat_interest() -> Self {
        Self {
            schedule: ScheduleConfig {
                interest_share: InterestShare::FlatInterest,
                fee_share: FeeShare::SpreadUpfrontFees,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("daily", self.intervals.daily_days),
            ("weekly", self.intervals.weekly_days),
            ("monthly", self.intervals.monthly_days),
        ];
        for (name, days) in intervals {
            if days == 0 {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("{} interval must be at least one day", name),
                });
            }
        }
        Ok(())
    }
}

/// upfront fees declared on the loan application
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpfrontFees {
    pub processing_fee: Money,
    pub insurance_fee: Money,
    pub other_fees: Money,
}

impl UpfrontFees {
    pub fn total(&self) -> Money {
        self.processing_fee + self.insurance_fee + self.other_fees
    }
}

/// collateral pledged against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub description: String,
    pub value: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guarantor {
    pub name: String,
    pub contact: String,
    pub id_reference: String,
}

/// everything needed to open a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub client_id: ClientId,
    pub loan_type: LoanType,
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub term: u32,
    pub repayment_frequency: RepaymentFrequency,
    pub fees: UpfrontFees,
    pub purpose: String,
    pub collateral: Option<Collateral>,
    pub guarantor: Option<Guarantor>,
    pub application_date: Option<NaiveDate>,
}

impl LoanApplication {
    pub fn new(
        client_id: ClientId,
        loan_type: LoanType,
        principal_amount: Money,
        interest_rate: Rate,
        term: u32,
        repayment_frequency: RepaymentFrequency,
    ) -> Self {
        Self {
            client_id,
            loan_type,
            principal_amount,
            interest_rate,
            term,
            repayment_frequency,
            fees: UpfrontFees::default(),
            purpose: String::new(),
            collateral: None,
            guarantor: None,
            application_date: None,
        }
    }

    pub fn fees(mut self, fees: UpfrontFees) -> Self {
        self.fees = fees;
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn collateral(mut self, collateral: Collateral) -> Self {
        self.collateral = Some(collateral);
        self
    }

    pub fn guarantor(mut self, guarantor: Guarantor) -> Self {
        self.guarantor = Some(guarantor);
        self
    }

    pub fn application_date(mut self, date: NaiveDate) -> Self {
        self.application_date = Some(date);
        self
    }

    /// reject anything the ledger cannot book
    pub fn validate(&self) -> Result<()> {
        if self.principal_amount.is_negative() || self.principal_amount.is_zero() {
            return Err(LedgerError::validation(format!(
                "principal must be positive, got {}",
                self.principal_amount
            )));
        }
        if self.interest_rate.is_negative() {
            return Err(LedgerError::validation(format!(
                "interest rate cannot be negative, got {}",
                self.interest_rate
            )));
        }
        validate_term(self.term)?;

        let fees = [
            ("processing fee", self.fees.processing_fee),
            ("insurance fee", self.fees.insurance_fee),
            ("other fees", self.fees.other_fees),
        ];
        for (name, amount) in fees {
            if amount.is_negative() {
                return Err(LedgerError::validation(format!("{} cannot be negative", name)));
            }
        }

        if let Some(value) = self.collateral.as_ref().and_then(|c| c.value) {
            if value.is_negative() {
                return Err(LedgerError::validation("collateral value cannot be negative"));
            }
        }

        if let Some(guarantor) = &self.guarantor {
            if guarantor.name.trim().is_empty() {
                return Err(LedgerError::validation("guarantor name is required"));
            }
            if !is_plausible_phone(&guarantor.contact) {
                return Err(LedgerError::validation(format!(
                    "malformed guarantor contact: {}",
                    guarantor.contact
                )));
            }
        }

        Ok(())
    }
}

/// a term must be at least one installment and at most `MAX_TERM`
pub fn validate_term(term: u32) -> Result<()> {
    if term == 0 {
        return Err(LedgerError::validation("loan term must be at least one period"));
    }
    if term > MAX_TERM {
        return Err(LedgerError::validation(format!(
            "loan term of {} periods exceeds the maximum of {}",
            term, MAX_TERM
        )));
    }
    Ok(())
}

/// digits with an optional leading '+', spaces and dashes allowed
fn is_plausible_phone(contact: &str) -> bool {
    let trimmed = contact.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        && (7..=15).contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn application() -> LoanApplication {
        LoanApplication::new(
            Uuid::new_v4(),
            LoanType::Business,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            12,
            RepaymentFrequency::Monthly,
        )
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.schedule.interest_share, InterestShare::PrincipalOnly);
        assert_eq!(config.intervals.days(RepaymentFrequency::Monthly), 30);
        assert_eq!(config.intervals.days(RepaymentFrequency::Weekly), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = EngineConfig::from_json_str(
            r#"{ "schedule": { "interest_share": "flat_interest" }, "delinquency_grace_days": 5 }"#,
        )
        .unwrap();

        assert_eq!(config.schedule.interest_share, InterestShare::FlatInterest);
        assert_eq!(config.schedule.fee_share, FeeShare::None);
        assert_eq!(config.delinquency_grace_days, 5);
        assert_eq!(config.intervals, FrequencyIntervals::default());
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let err = EngineConfig::from_json_str(r#"{ "intervals": { "weekly_days": 0 } }"#).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));

        let err = EngineConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_advance_by_periods() {
        let intervals = FrequencyIntervals::default();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            intervals.advance(start, RepaymentFrequency::Monthly, 12).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 26).unwrap()
        );
        assert_eq!(
            intervals.advance(start, RepaymentFrequency::Weekly, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_advance_past_calendar_is_an_error() {
        let intervals = FrequencyIntervals::default();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = intervals.advance(start, RepaymentFrequency::Monthly, 4_000_000).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
        assert!(intervals.advance(start, RepaymentFrequency::Monthly, u32::MAX).is_err());
    }

    #[test]
    fn test_application_validation() {
        assert!(application().validate().is_ok());

        let mut app = application();
        app.principal_amount = Money::from_major(-5);
        assert!(matches!(app.validate(), Err(LedgerError::Validation { .. })));

        let mut app = application();
        app.interest_rate = Rate::from_percentage(-1);
        assert!(app.validate().is_err());

        let mut app = application();
        app.term = 0;
        assert!(app.validate().is_err());

        let mut app = application();
        app.term = MAX_TERM;
        assert!(app.validate().is_ok());
        app.term = 4_000_000;
        assert!(matches!(app.validate(), Err(LedgerError::Validation { .. })));

        let app = application().fees(UpfrontFees {
            processing_fee: Money::from_major(-1),
            ..UpfrontFees::default()
        });
        assert!(app.validate().is_err());
    }

    #[test]
    fn test_guarantor_contact_validation() {
        let ok = application().guarantor(Guarantor {
            name: "Ama Mensah".to_string(),
            contact: "+233 24-123-4567".to_string(),
            id_reference: "GHA-123".to_string(),
        });
        assert!(ok.validate().is_ok());

        let bad = application().guarantor(Guarantor {
            name: "Ama Mensah".to_string(),
            contact: "call me".to_string(),
            id_reference: String::new(),
        });
        assert!(bad.validate().is_err());
    }
}
