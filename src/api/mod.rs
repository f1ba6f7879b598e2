use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    ANONYMOUS_USER, AmortizationEntry, AmortizationResult, CalculationLog, CalculationRecord,
    InMemoryCalculationLog, LoanRequest, NewCalculation, PaymentFrequency, compute, loan_title,
};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPaymentFrequency {
    Monthly,
    Yearly,
}

impl From<CliPaymentFrequency> for PaymentFrequency {
    fn from(value: CliPaymentFrequency) -> Self {
        match value {
            CliPaymentFrequency::Monthly => PaymentFrequency::Monthly,
            CliPaymentFrequency::Yearly => PaymentFrequency::Yearly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPaymentFrequency {
    #[serde(alias = "month", alias = "Monthly")]
    Monthly,
    #[serde(alias = "year", alias = "annual", alias = "annually", alias = "Yearly")]
    Yearly,
}

impl From<ApiPaymentFrequency> for PaymentFrequency {
    fn from(value: ApiPaymentFrequency) -> Self {
        match value {
            ApiPaymentFrequency::Monthly => PaymentFrequency::Monthly,
            ApiPaymentFrequency::Yearly => PaymentFrequency::Yearly,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LoanPayload {
    principal: Option<f64>,
    #[serde(alias = "annualInterestRatePercent")]
    interest_rate: Option<f64>,
    #[serde(alias = "termYears")]
    loan_term: Option<f64>,
    payment_frequency: Option<ApiPaymentFrequency>,
    user_id: Option<String>,
    include_schedule: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(
    name = "amortize",
    about = "Level-payment loan amortization (schedule printer + HTTP API)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(
            long,
            default_value_t = 1000,
            help = "Number of computed loans kept in the calculation history"
        )]
        history_capacity: usize,
    },
    /// Print the amortization schedule for one loan
    Schedule(ScheduleArgs),
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[arg(long, help = "Amount borrowed")]
    pub principal: f64,
    #[arg(long, help = "Nominal annual interest rate in percent, e.g. 4.5")]
    pub rate: f64,
    #[arg(long, help = "Loan term in years")]
    pub years: f64,
    #[arg(long, value_enum, default_value_t = CliPaymentFrequency::Monthly)]
    pub frequency: CliPaymentFrequency,
    #[arg(long, help = "Print JSON instead of a text table")]
    pub json: bool,
}

#[derive(Debug)]
struct ApiRequest {
    loan: LoanRequest,
    user_id: String,
    include_schedule: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoanResponse {
    periodic_payment: f64,
    total_paid: f64,
    total_interest: f64,
    number_of_periods: u32,
    payment_frequency: PaymentFrequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Vec<AmortizationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    calculations: Vec<CalculationRecord>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
pub struct AppState {
    history: Arc<dyn CalculationLog>,
}

impl AppState {
    pub fn new(history: Arc<dyn CalculationLog>) -> Self {
        Self { history }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/loan", get(loan_get_handler).post(loan_post_handler))
        .route("/api/history", get(history_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16, history_capacity: usize) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let history = Arc::new(InMemoryCalculationLog::new(history_capacity));
    let app = router(AppState::new(history));

    let listener = TcpListener::bind(addr).await?;
    info!("Loan amortization API listening on http://{addr}");
    info!(history_capacity, "Local access: http://127.0.0.1:{port}/api/loan");

    axum::serve(listener, app).await
}

pub fn run_schedule(args: &ScheduleArgs) -> Result<String, String> {
    let request = LoanRequest::new(args.principal, args.rate, args.years)
        .with_frequency(args.frequency.into());
    let result = compute(&request).map_err(|e| e.to_string())?;

    if args.json {
        let response = build_loan_response(&request, result, true, None);
        let mut json = serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to serialize schedule: {e}"))?;
        json.push('\n');
        Ok(json)
    } else {
        Ok(render_schedule_table(&request, &result))
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn loan_get_handler(
    State(state): State<AppState>,
    payload: Result<Query<LoanPayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => loan_handler_impl(&state, payload),
        Err(rejection) => rejection_response(rejection.status(), rejection.body_text()),
    }
}

async fn loan_post_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoanPayload>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => loan_handler_impl(&state, payload),
        Err(rejection) => rejection_response(rejection.status(), rejection.body_text()),
    }
}

fn rejection_response(status: StatusCode, msg: String) -> Response {
    debug!(reason = %msg, "rejected malformed loan request");
    error_response(status, &msg)
}

fn loan_handler_impl(state: &AppState, payload: LoanPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            debug!(reason = %msg, "rejected loan request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let result = match compute(&request.loan) {
        Ok(result) => result,
        Err(e) => {
            debug!(error = %e, "rejected loan request");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    debug!(
        principal = request.loan.principal,
        rate = request.loan.annual_interest_rate_percent,
        periods = result.number_of_periods,
        "computed amortization schedule"
    );

    let entry = NewCalculation::loan(&request.user_id, &request.loan, &result);
    let record_id = match state.history.record(entry) {
        Ok(record) => Some(record.id),
        Err(e) => {
            warn!(error = %e, "failed to record calculation");
            None
        }
    };

    let response = build_loan_response(
        &request.loan,
        result,
        request.include_schedule,
        record_id,
    );
    json_response(StatusCode::OK, response)
}

async fn history_handler(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text()),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match state.history.recent(limit) {
        Ok(calculations) => json_response(StatusCode::OK, HistoryResponse { calculations }),
        Err(e) => {
            warn!(error = %e, "failed to read calculation history");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<LoanPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: LoanPayload) -> Result<ApiRequest, String> {
    let Some(principal) = payload.principal else {
        return Err("principal is required".to_string());
    };
    let Some(interest_rate) = payload.interest_rate else {
        return Err("interestRate is required".to_string());
    };
    let Some(loan_term) = payload.loan_term else {
        return Err("loanTerm is required".to_string());
    };

    let mut loan = LoanRequest::new(principal, interest_rate, loan_term);
    if let Some(v) = payload.payment_frequency {
        loan = loan.with_frequency(v.into());
    }

    let user_id = payload
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    Ok(ApiRequest {
        loan,
        user_id,
        include_schedule: payload.include_schedule.unwrap_or(true),
    })
}

fn build_loan_response(
    request: &LoanRequest,
    result: AmortizationResult,
    include_schedule: bool,
    record_id: Option<u64>,
) -> LoanResponse {
    LoanResponse {
        periodic_payment: result.periodic_payment,
        total_paid: result.total_paid,
        total_interest: result.total_interest,
        number_of_periods: result.number_of_periods,
        payment_frequency: request.payment_frequency,
        schedule: include_schedule.then_some(result.schedule),
        record_id,
    }
}

fn render_schedule_table(request: &LoanRequest, result: &AmortizationResult) -> String {
    let mut out = format!(
        "{}\n\
         Payment frequency: {}\n\
         Periodic payment:  {:.2}\n\
         Total paid:        {:.2}\n\
         Total interest:    {:.2}\n\
         \n\
         {:>8} {:>14} {:>14} {:>14}\n",
        loan_title(request),
        request.payment_frequency.as_str(),
        result.periodic_payment,
        result.total_paid,
        result.total_interest,
        "Period",
        "Interest",
        "Principal",
        "Balance"
    );

    for entry in &result.schedule {
        out.push_str(&format!(
            "{:>8} {:>14.2} {:>14.2} {:>14.2}\n",
            entry.period_index,
            entry.interest_portion,
            entry.principal_portion,
            entry.remaining_balance
        ));
    }
    out
}
