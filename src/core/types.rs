use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    #[default]
    Monthly,
    Yearly,
}

impl PaymentFrequency {
    pub fn periods_per_year(self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 12,
            PaymentFrequency::Yearly => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Yearly => "yearly",
        }
    }
}

/// Loan parameters as entered by the borrower.
///
/// The rate is a nominal annual percentage (4.5 means 4.5%), compounded once
/// per payment period.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
    pub principal: f64,
    pub annual_interest_rate_percent: f64,
    pub term_years: f64,
    #[serde(default)]
    pub payment_frequency: PaymentFrequency,
}

impl LoanRequest {
    pub fn new(principal: f64, annual_interest_rate_percent: f64, term_years: f64) -> Self {
        Self {
            principal,
            annual_interest_rate_percent,
            term_years,
            payment_frequency: PaymentFrequency::Monthly,
        }
    }

    pub fn with_frequency(mut self, payment_frequency: PaymentFrequency) -> Self {
        self.payment_frequency = payment_frequency;
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationEntry {
    pub period_index: u32,
    pub interest_portion: f64,
    pub principal_portion: f64,
    pub remaining_balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationResult {
    pub periodic_payment: f64,
    pub number_of_periods: u32,
    pub total_paid: f64,
    pub total_interest: f64,
    pub schedule: Vec<AmortizationEntry>,
}
