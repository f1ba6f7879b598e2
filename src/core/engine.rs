use super::error::LoanError;
use super::types::{AmortizationEntry, AmortizationResult, LoanRequest, PaymentFrequency};

/// How a term that is not a whole number of periods is turned into a period count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeriodRounding {
    Floor,
    /// Half away from zero.
    Nearest,
    Ceil,
}

impl PeriodRounding {
    fn apply(self, periods: f64) -> f64 {
        match self {
            PeriodRounding::Floor => periods.floor(),
            PeriodRounding::Nearest => periods.round(),
            PeriodRounding::Ceil => periods.ceil(),
        }
    }
}

/// Rounding used by [`compute`]: 2.5 years is 30 monthly periods, 1.04 years is 12.
pub const PERIOD_ROUNDING: PeriodRounding = PeriodRounding::Nearest;

/// Upper bound on periods per loan (500 years of monthly payments).
pub const MAX_PERIODS: u32 = 6_000;

/// A balance at or below `BALANCE_EPSILON * principal` counts as paid off.
pub const BALANCE_EPSILON: f64 = 1e-9;

/// Level-payment amortization of `request`.
///
/// The final emitted period pays off exactly the balance left before it, so the
/// principal portions always add back up to the principal and the last
/// remaining balance is zero. The schedule stops early if the balance is
/// exhausted before the last period.
pub fn compute(request: &LoanRequest) -> Result<AmortizationResult, LoanError> {
    validate(request)?;

    let periods = period_count(request.term_years, request.payment_frequency);
    if periods > MAX_PERIODS {
        return Err(LoanError::invalid(
            "termYears",
            format!(
                "term produces {periods} payment periods, at most {MAX_PERIODS} are supported"
            ),
        ));
    }

    let rate = periodic_rate(request);
    let periodic_payment = level_payment(request.principal, rate, periods);
    Ok(amortize(request.principal, rate, periodic_payment, periods))
}

pub fn periodic_rate(request: &LoanRequest) -> f64 {
    request.annual_interest_rate_percent
        / 100.0
        / f64::from(request.payment_frequency.periods_per_year())
}

pub fn period_count(term_years: f64, frequency: PaymentFrequency) -> u32 {
    period_count_with(term_years, frequency, PERIOD_ROUNDING)
}

/// Never returns less than one period. Saturates at `u32::MAX`.
pub fn period_count_with(
    term_years: f64,
    frequency: PaymentFrequency,
    rounding: PeriodRounding,
) -> u32 {
    let raw = term_years * f64::from(frequency.periods_per_year());
    rounding.apply(raw).max(1.0) as u32
}

/// Constant payment that retires `principal` over `periods` at `rate` per period.
pub fn level_payment(principal: f64, rate: f64, periods: u32) -> f64 {
    let n = f64::from(periods);
    if rate == 0.0 {
        return principal / n;
    }

    // 1 - (1 + r)^-n, evaluated without cancellation for small r.
    let discount = -(-n * rate.ln_1p()).exp_m1();
    principal * rate / discount
}

fn validate(request: &LoanRequest) -> Result<(), LoanError> {
    if !request.principal.is_finite() || request.principal <= 0.0 {
        return Err(LoanError::invalid("principal", "must be a number > 0"));
    }

    if !request.annual_interest_rate_percent.is_finite()
        || request.annual_interest_rate_percent < 0.0
    {
        return Err(LoanError::invalid(
            "annualInterestRatePercent",
            "must be a number >= 0",
        ));
    }

    if !request.term_years.is_finite() || request.term_years <= 0.0 {
        return Err(LoanError::invalid("termYears", "must be a number > 0"));
    }

    Ok(())
}

fn amortize(principal: f64, rate: f64, payment: f64, periods: u32) -> AmortizationResult {
    let schedule = build_schedule(principal, rate, payment, periods);
    let number_of_periods = schedule.len() as u32;
    let total_paid = payment * f64::from(number_of_periods);

    AmortizationResult {
        periodic_payment: payment,
        number_of_periods,
        total_paid,
        total_interest: total_paid - principal,
        schedule,
    }
}

fn build_schedule(
    principal: f64,
    rate: f64,
    payment: f64,
    periods: u32,
) -> Vec<AmortizationEntry> {
    let epsilon = BALANCE_EPSILON * principal;
    let mut schedule = Vec::with_capacity(periods as usize);
    let mut balance = principal;

    for period_index in 1..=periods {
        let interest_portion = balance * rate;
        let mut principal_portion = payment - interest_portion;
        let mut remaining_balance = balance - principal_portion;

        let settles = period_index == periods || remaining_balance <= epsilon;
        if settles {
            principal_portion = balance;
            remaining_balance = 0.0;
        }

        schedule.push(AmortizationEntry {
            period_index,
            interest_portion,
            principal_portion,
            remaining_balance: remaining_balance.max(0.0),
        });

        if settles {
            break;
        }
        balance = remaining_balance;
    }

    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn principal_sum(result: &AmortizationResult) -> f64 {
        result.schedule.iter().map(|e| e.principal_portion).sum()
    }

    #[test]
    fn thirty_year_mortgage_matches_annuity_formula() {
        let result = compute(&LoanRequest::new(250_000.0, 4.5, 30.0)).expect("valid loan");

        assert_eq!(result.number_of_periods, 360);
        assert_eq!(result.schedule.len(), 360);
        assert_approx_tol(result.periodic_payment, 1266.71, 0.005);
        assert_approx_tol(result.total_paid, 456_016.78, 0.01);
        assert_approx_tol(result.total_interest, 206_016.78, 0.01);
        // Paying the cent-rounded instalment instead gives 1266.71 * 360.
        assert_approx_tol(
            (result.periodic_payment * 100.0).round() / 100.0 * 360.0,
            456_015.60,
            1e-6,
        );

        let first = result.schedule[0];
        assert_eq!(first.period_index, 1);
        assert_approx(first.interest_portion, 250_000.0 * 0.00375);
        assert_approx(
            first.principal_portion,
            result.periodic_payment - first.interest_portion,
        );

        let last = result.schedule[359];
        assert_eq!(last.remaining_balance, 0.0);
        assert_approx_tol(principal_sum(&result), 250_000.0, 1e-6);
    }

    #[test]
    fn zero_rate_loan_is_linear() {
        let result = compute(&LoanRequest::new(10_000.0, 0.0, 2.0)).expect("valid loan");

        assert_eq!(result.number_of_periods, 24);
        assert_approx(result.periodic_payment, 10_000.0 / 24.0);
        assert_approx(result.total_interest, 0.0);

        let (last, rest) = result.schedule.split_last().expect("non-empty schedule");
        for entry in &result.schedule {
            assert_eq!(entry.interest_portion, 0.0);
        }
        for entry in rest {
            assert_eq!(entry.principal_portion, result.periodic_payment);
        }
        assert_approx(last.principal_portion, result.periodic_payment);
        assert_eq!(last.remaining_balance, 0.0);
    }

    #[test]
    fn single_period_repays_principal_plus_one_period_of_interest() {
        let request = LoanRequest::new(1_200.0, 12.0, 1.0 / 12.0);
        let result = compute(&request).expect("valid loan");

        assert_eq!(result.schedule.len(), 1);
        let only = result.schedule[0];
        assert_eq!(only.period_index, 1);
        assert_eq!(only.principal_portion, 1_200.0);
        assert_eq!(only.remaining_balance, 0.0);
        assert_approx(only.interest_portion, 12.0);
        assert_approx(result.periodic_payment, 1_212.0);
    }

    #[test]
    fn yearly_frequency_uses_annual_periods() {
        let request =
            LoanRequest::new(10_000.0, 5.0, 3.0).with_frequency(PaymentFrequency::Yearly);
        let result = compute(&request).expect("valid loan");

        assert_eq!(result.number_of_periods, 3);
        assert_approx_tol(result.periodic_payment, 3672.0856, 1e-4);
        assert_approx(result.schedule[0].interest_portion, 500.0);
    }

    #[test]
    fn rejects_non_positive_principal() {
        for principal in [0.0, -1.0, f64::NAN] {
            let err = compute(&LoanRequest::new(principal, 4.5, 30.0))
                .expect_err("must reject principal");
            let LoanError::InvalidInput { field, .. } = err;
            assert_eq!(field, "principal");
        }
    }

    #[test]
    fn rejects_negative_rate_and_non_positive_term() {
        let err = compute(&LoanRequest::new(1_000.0, -0.1, 5.0)).expect_err("negative rate");
        assert!(err.to_string().contains("annualInterestRatePercent"));

        let err = compute(&LoanRequest::new(1_000.0, 3.0, 0.0)).expect_err("zero term");
        assert!(err.to_string().contains("termYears"));

        let err = compute(&LoanRequest::new(1_000.0, 3.0, f64::INFINITY)).expect_err("inf term");
        assert!(err.to_string().contains("termYears"));
    }

    #[test]
    fn rejects_terms_beyond_period_cap() {
        let err = compute(&LoanRequest::new(1_000.0, 3.0, 501.0)).expect_err("too long");
        assert!(err.to_string().contains("at most 6000"));
        assert!(compute(&LoanRequest::new(1_000.0, 3.0, 500.0)).is_ok());
    }

    #[test]
    fn period_rounding_rule() {
        assert_eq!(PERIOD_ROUNDING, PeriodRounding::Nearest);
        assert_eq!(period_count(30.0, PaymentFrequency::Monthly), 360);
        assert_eq!(period_count(2.5, PaymentFrequency::Monthly), 30);
        assert_eq!(period_count(1.04, PaymentFrequency::Monthly), 12);
        assert_eq!(period_count(1.0 / 24.0, PaymentFrequency::Monthly), 1);
        assert_eq!(period_count(2.6, PaymentFrequency::Yearly), 3);

        let term = 1.3;
        assert_eq!(
            period_count_with(term, PaymentFrequency::Monthly, PeriodRounding::Floor),
            15
        );
        assert_eq!(
            period_count_with(term, PaymentFrequency::Monthly, PeriodRounding::Nearest),
            16
        );
        assert_eq!(
            period_count_with(term, PaymentFrequency::Monthly, PeriodRounding::Ceil),
            16
        );
        assert_eq!(
            period_count_with(0.01, PaymentFrequency::Yearly, PeriodRounding::Floor),
            1
        );
    }

    #[test]
    fn extreme_rate_stays_finite() {
        let result = compute(&LoanRequest::new(1_000.0, 1.0e6, 400.0)).expect("valid loan");
        assert!(result.periodic_payment.is_finite());
        assert_eq!(result.schedule.last().map(|e| e.remaining_balance), Some(0.0));
        assert_approx_tol(principal_sum(&result), 1_000.0, 1e-6);
    }

    #[test]
    fn sub_unit_principal_runs_full_term() {
        for principal in [1e-7, 1e-3, 0.5] {
            let result = compute(&LoanRequest::new(principal, 0.0, 30.0)).expect("valid loan");
            assert_eq!(result.schedule.len(), 360, "principal {principal}");
            assert_eq!(result.number_of_periods, 360);
            assert!(
                result.total_interest.abs() <= 1e-9 * principal,
                "principal {principal}, interest {}",
                result.total_interest
            );
            assert_approx_tol(principal_sum(&result), principal, 1e-6 * principal);
        }
    }

    #[test]
    fn schedule_stops_once_balance_is_exhausted() {
        // A payment of 300 clears 1000 during the fourth of ten periods.
        let result = amortize(1_000.0, 0.0, 300.0, 10);

        assert_eq!(result.schedule.len(), 4);
        assert_eq!(result.number_of_periods, 4);
        assert_approx(result.total_paid, 1_200.0);
        assert_approx(result.total_interest, 200.0);

        let indices: Vec<u32> = result.schedule.iter().map(|e| e.period_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_approx(result.schedule[2].remaining_balance, 100.0);

        let last = result.schedule[3];
        assert_approx(last.principal_portion, 100.0);
        assert_eq!(last.remaining_balance, 0.0);
        assert_approx(principal_sum(&result), 1_000.0);
    }

    #[test]
    fn balance_within_epsilon_counts_as_paid_off() {
        let principal = 1_000.0;
        let slack = BALANCE_EPSILON * principal / 4.0;
        // Two payments leave 2 * slack, well under the paid-off threshold.
        let result = amortize(principal, 0.0, 500.0 - slack, 3);

        assert_eq!(result.schedule.len(), 2);
        assert_approx(result.schedule[1].principal_portion, 500.0);
        assert_eq!(result.schedule[1].remaining_balance, 0.0);
        assert_approx(principal_sum(&result), principal);
    }

    #[test]
    fn tiny_rate_matches_zero_rate_limit() {
        let result = compute(&LoanRequest::new(12_000.0, 1e-10, 1.0)).expect("valid loan");
        assert_approx_tol(result.periodic_payment, 1_000.0, 1e-6);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_schedule_invariants(
            principal_cents in 100u64..500_000_000,
            rate_bp in 0u32..3_000,
            term_months in 1u32..=600,
        ) {
            let principal = principal_cents as f64 / 100.0;
            let request = LoanRequest::new(
                principal,
                rate_bp as f64 / 100.0,
                term_months as f64 / 12.0,
            );
            let result = compute(&request).expect("valid loan");

            prop_assert!(!result.schedule.is_empty());
            prop_assert!(result.schedule.len() <= term_months as usize);
            prop_assert_eq!(result.number_of_periods as usize, result.schedule.len());

            let mut previous_balance = principal;
            for (idx, entry) in result.schedule.iter().enumerate() {
                prop_assert_eq!(entry.period_index as usize, idx + 1);
                prop_assert!(entry.interest_portion >= 0.0);
                prop_assert!(entry.remaining_balance >= 0.0);
                prop_assert!(entry.remaining_balance <= previous_balance);
                previous_balance = entry.remaining_balance;
            }
            prop_assert_eq!(previous_balance, 0.0);

            let sum = principal_sum(&result);
            prop_assert!(((sum - principal) / principal).abs() <= 1e-6);
            prop_assert!(
                (result.total_paid - result.periodic_payment * result.schedule.len() as f64).abs()
                    <= 1e-9 * result.total_paid.max(1.0)
            );
        }

        #[test]
        fn prop_zero_rate_has_no_interest(
            principal_cents in 100u64..100_000_000,
            term_months in 1u32..=480,
        ) {
            let principal = principal_cents as f64 / 100.0;
            let request = LoanRequest::new(principal, 0.0, term_months as f64 / 12.0);
            let result = compute(&request).expect("valid loan");

            prop_assert_eq!(result.schedule.len(), term_months as usize);
            let last_index = result.schedule.len() - 1;
            for (idx, entry) in result.schedule.iter().enumerate() {
                prop_assert_eq!(entry.interest_portion, 0.0);
                if idx < last_index {
                    prop_assert_eq!(entry.principal_portion, result.periodic_payment);
                }
            }
        }

        #[test]
        fn prop_compute_is_deterministic(
            principal in 1.0f64..10_000_000.0,
            rate in 0.0f64..25.0,
            term in 0.1f64..40.0,
        ) {
            let request = LoanRequest::new(principal, rate, term);
            let first = compute(&request).expect("valid loan");
            let second = compute(&request).expect("valid loan");
            prop_assert_eq!(first, second);
        }
    }
}
