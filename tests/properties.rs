use chrono::{NaiveDate, TimeZone, Utc};
use loan_ledger_rs::payments::PaymentContext;
use loan_ledger_rs::{
    DisbursementRequest, EngineConfig, FeeType, FineType, LoanApplication, LoanEngine, LoanType,
    Money, PaymentAllocator, PaymentMode, PaymentRequest, Rate, RepaymentFrequency,
    SafeTimeProvider, ScheduleGenerator, TimeSource, Uuid,
};
use proptest::prelude::*;
use proptest::test_runner::Config;

#[derive(Debug, Clone)]
enum Operation {
    Fee(i64),
    Fine(i64),
    Pay(i64),
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (0_i64..50_000).prop_map(Operation::Fee),
        (0_i64..50_000).prop_map(Operation::Fine),
        // zero and negative payments are rejected and must leave no trace
        (-1_000_i64..200_000).prop_map(Operation::Pay),
    ]
}

fn application(principal_cents: i64, rate_bps: u32, term: u32) -> LoanApplication {
    LoanApplication::new(
        Uuid::new_v4(),
        LoanType::Personal,
        Money::from_minor(principal_cents),
        Rate::from_bps(rate_bps),
        term,
        RepaymentFrequency::Weekly,
    )
}

proptest! {
    #![proptest_config(Config::with_cases(128))]
    #[test]
    fn allocation_sums_to_payment(
        fines in 0_i64..100_000,
        fees in 0_i64..100_000,
        interest in 0_i64..100_000,
        principal in 0_i64..1_000_000,
        amount in 1_i64..2_000_000
    ) {
        let context = PaymentContext {
            loan_id: Uuid::new_v4(),
            outstanding_fines: Money::from_minor(fines),
            outstanding_fees: Money::from_minor(fees),
            outstanding_interest: Money::from_minor(interest),
            outstanding_principal: Money::from_minor(principal),
        };
        let amount = Money::from_minor(amount);
        let allocation = PaymentAllocator::new().allocate(&context, amount).expect("allocation");

        prop_assert_eq!(allocation.total(), amount);
        prop_assert!(allocation.fines <= context.outstanding_fines);
        prop_assert!(allocation.fees <= context.outstanding_fees);
        prop_assert!(allocation.interest <= context.outstanding_interest);
        // nothing reaches a later category while an earlier one is open
        if allocation.fees.is_positive() {
            prop_assert_eq!(allocation.fines, context.outstanding_fines);
        }
        if allocation.principal.is_positive() {
            prop_assert_eq!(allocation.interest, context.outstanding_interest);
        }
    }

    #[test]
    fn schedule_principal_sums_exactly(
        principal_cents in 1_i64..100_000_000,
        term in 1_u32..120
    ) {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let application = application(principal_cents, 1_000, term);
        let loan = loan_ledger_rs::Loan::from_application(&application, today);
        let principal = Money::from_minor(principal_cents);

        let entries = ScheduleGenerator::from_config(&EngineConfig::default())
            .generate(&loan, term, principal, today)
            .expect("schedule");

        prop_assert_eq!(entries.len(), term as usize);
        let total: Money = entries.iter().map(|e| e.principal_amount).sum();
        prop_assert_eq!(total, principal);
        prop_assert!(entries.iter().all(|e| !e.principal_amount.is_negative()));
        prop_assert!(entries.windows(2).all(|w| w[0].due_date < w[1].due_date));
    }

    #[test]
    fn balance_invariant_holds_after_every_operation(
        principal_cents in 10_000_i64..10_000_000,
        rate_bps in 0_u32..5_000,
        operations in proptest::collection::vec(operation_strategy(), 1..25)
    ) {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        ));
        let engine = LoanEngine::new(EngineConfig::default(), time).expect("engine");
        let id = engine.create_loan(application(principal_cents, rate_bps, 10)).expect("loan");
        engine.approve_loan(id, None).expect("approve");
        engine.disburse_loan(id, DisbursementRequest::new(PaymentMode::Cash)).expect("disburse");

        for operation in operations {
            let before = engine.get_totals(id).expect("totals");
            let result = match operation {
                Operation::Fee(cents) => engine
                    .charge_fee(id, FeeType::Service, Money::from_minor(cents), None, "")
                    .map(|_| ()),
                Operation::Fine(cents) => engine
                    .charge_fine(id, FineType::LatePayment, Money::from_minor(cents), None, "")
                    .map(|_| ()),
                Operation::Pay(cents) => engine
                    .record_payment(id, PaymentRequest::new(Money::from_minor(cents), PaymentMode::Cash))
                    .map(|_| ()),
            };

            let totals = engine.get_totals(id).expect("totals");
            if result.is_err() {
                prop_assert_eq!(totals, before);
            }

            let payments = engine.get_payments(id).expect("payments");
            let paid: Money = payments.iter().map(|p| p.amount_paid).sum();
            prop_assert_eq!(totals.total_amount_paid, paid);
            prop_assert_eq!(totals.current_balance, totals.total_loan_amount - totals.total_amount_paid);
            prop_assert!(payments.iter().all(|p| p.allocation.total() == p.amount_paid));
        }
    }
}
