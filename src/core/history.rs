use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::HistoryError;
use super::types::{AmortizationResult, LoanRequest};

pub const LOAN_CALCULATOR: &str = "loan";
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanSummary {
    pub periodic_payment: f64,
    pub total_paid: f64,
    pub total_interest: f64,
    pub schedule_length: usize,
}

impl From<&AmortizationResult> for LoanSummary {
    fn from(result: &AmortizationResult) -> Self {
        Self {
            periodic_payment: result.periodic_payment,
            total_paid: result.total_paid,
            total_interest: result.total_interest,
            schedule_length: result.schedule.len(),
        }
    }
}

/// A computation the caller wants kept, before the log assigns it an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCalculation {
    pub user_id: String,
    pub calculator_type: &'static str,
    pub title: String,
    pub inputs: LoanRequest,
    pub results: LoanSummary,
}

impl NewCalculation {
    pub fn loan(user_id: &str, request: &LoanRequest, result: &AmortizationResult) -> Self {
        Self {
            user_id: user_id.to_string(),
            calculator_type: LOAN_CALCULATOR,
            title: loan_title(request),
            inputs: *request,
            results: result.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRecord {
    pub id: u64,
    pub user_id: String,
    pub calculator_type: &'static str,
    pub title: String,
    pub inputs: LoanRequest,
    pub results: LoanSummary,
    pub created_at: DateTime<Utc>,
}

/// Somewhere computed loans can be kept for later review.
///
/// The engine never calls this; request handlers record a result after
/// `compute` succeeds.
pub trait CalculationLog: Send + Sync {
    fn record(&self, entry: NewCalculation) -> Result<CalculationRecord, HistoryError>;

    /// Newest first.
    fn recent(&self, limit: usize) -> Result<Vec<CalculationRecord>, HistoryError>;
}

#[derive(Debug)]
struct LogState {
    next_id: u64,
    records: VecDeque<CalculationRecord>,
}

/// Bounded in-process log; the oldest record is dropped once `capacity` is reached.
#[derive(Debug)]
pub struct InMemoryCalculationLog {
    capacity: usize,
    state: Mutex<LogState>,
}

impl InMemoryCalculationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LogState {
                next_id: 1,
                records: VecDeque::with_capacity(capacity.min(1024)),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CalculationLog for InMemoryCalculationLog {
    fn record(&self, entry: NewCalculation) -> Result<CalculationRecord, HistoryError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| HistoryError::Storage("history lock poisoned".to_string()))?;

        let record = CalculationRecord {
            id: state.next_id,
            user_id: entry.user_id,
            calculator_type: entry.calculator_type,
            title: entry.title,
            inputs: entry.inputs,
            results: entry.results,
            created_at: Utc::now(),
        };
        state.next_id += 1;

        if state.records.len() == self.capacity {
            state.records.pop_front();
        }
        state.records.push_back(record.clone());
        Ok(record)
    }

    fn recent(&self, limit: usize) -> Result<Vec<CalculationRecord>, HistoryError> {
        let state = self
            .state
            .lock()
            .map_err(|_| HistoryError::Storage("history lock poisoned".to_string()))?;
        Ok(state.records.iter().rev().take(limit).cloned().collect())
    }
}

/// `Loan: $250,000 at 4.5% for 30 years`
pub fn loan_title(request: &LoanRequest) -> String {
    format!(
        "Loan: ${} at {}% for {} years",
        group_thousands(request.principal),
        request.annual_interest_rate_percent,
        request.term_years
    )
}

/// `en-US` grouping with up to three fraction digits and trailing zeros dropped.
fn group_thousands(amount: f64) -> String {
    let fixed = format!("{amount:.3}");
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3 + 4);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if !fraction.is_empty() {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}
