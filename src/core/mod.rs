mod engine;
mod error;
mod history;
mod types;

pub use engine::{
    BALANCE_EPSILON, MAX_PERIODS, PERIOD_ROUNDING, PeriodRounding, compute, level_payment,
    period_count, period_count_with, periodic_rate,
};
pub use error::{HistoryError, LoanError};
pub use history::{
    ANONYMOUS_USER, CalculationLog, CalculationRecord, InMemoryCalculationLog, LOAN_CALCULATOR,
    LoanSummary, NewCalculation, loan_title,
};
pub use types::{AmortizationEntry, AmortizationResult, LoanRequest, PaymentFrequency};
