use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

use super::PaymentContext;

/// split of one payment across obligation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub fines: Money,
}

impl Allocation {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees + self.fines
    }

    /// the split must account for the payment to the cent
    pub fn verify(&self, amount: Money) -> Result<()> {
        let allocated = self.total();
        if allocated != amount {
            return Err(LedgerError::AllocationMismatch { allocated, amount });
        }
        Ok(())
    }
}

/// obligation categories in settlement order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationComponent {
    Fines,
    Fees,
    Interest,
    Principal,
}

/// fines, then fees, then interest, then principal
pub const ALLOCATION_ORDER: [AllocationComponent; 4] = [
    AllocationComponent::Fines,
    AllocationComponent::Fees,
    AllocationComponent::Interest,
    AllocationComponent::Principal,
];

/// payment allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentAllocator;

impl PaymentAllocator {
    pub fn new() -> Self {
        Self
    }

    /// allocate `amount` against the outstanding balances in `context`.
    /// each category is capped at what is outstanding; whatever is left after
    /// interest lands on principal, even beyond the outstanding principal.
    pub fn allocate(&self, context: &PaymentContext, amount: Money) -> Result<Allocation> {
        context.validate_payment(amount)?;

        let mut remaining = amount;
        let mut allocation = Allocation::default();

        for component in ALLOCATION_ORDER {
            remaining = self.apply_to_component(component, remaining, context, &mut allocation);
            if remaining.is_zero() {
                break;
            }
        }

        allocation.verify(amount)?;
        Ok(allocation)
    }

    fn apply_to_component(
        &self,
        component: AllocationComponent,
        available: Money,
        context: &PaymentContext,
        allocation: &mut Allocation,
    ) -> Money {
        let (outstanding, applied) = match component {
            AllocationComponent::Fines => (context.outstanding_fines, &mut allocation.fines),
            AllocationComponent::Fees => (context.outstanding_fees, &mut allocation.fees),
            AllocationComponent::Interest => (context.outstanding_interest, &mut allocation.interest),
            AllocationComponent::Principal => {
                allocation.principal = available;
                return Money::ZERO;
            }
        };

        let payment = available.min(outstanding.non_negative());
        *applied = payment;

        available - payment
    }
}
