//! AWS Lambda handler for the student loan calculator
//!
//! Serves the calculator over a Lambda Function URL:
//! - `GET /health`, `GET /`
//! - `POST /calculate` with a calculator request
//! - `POST /complete-mtr` with a marginal rate request and its simulated series
//! - `GET /parameters/{year}`
//!
//! Every response carries CORS headers. Parameters are cached across
//! invocations of the same container.

use std::path::Path;
use std::sync::Arc;

use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use aws_lambda_events::encodings::Body;
use aws_lambda_events::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use student_loan_calculator::marginal::{SimulationSeries, SuppliedSeries};
use student_loan_calculator::parameters::validate_tax_year;
use student_loan_calculator::{
    BuiltinParameters, CachedParameters, CalcError, CalculatorRequest, CsvParameterProvider, MtrRequest,
    ScenarioRunner, TaxParameterProvider,
};

const SERVICE_NAME: &str = "student-loan-calculator-api";

type Runner = ScenarioRunner<CachedParameters<Arc<dyn TaxParameterProvider>>>;

/// Marginal rate request plus series simulated on its income grid
#[derive(Debug, Deserialize)]
struct MtrPayload {
    #[serde(flatten)]
    request: MtrRequest,

    series: SimulationSeries,
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    headers
}

fn response(status: i64, body: Option<String>) -> ApiGatewayV2httpResponse {
    ApiGatewayV2httpResponse {
        status_code: status,
        headers: cors_headers(),
        body: body.map(Body::Text),
        ..Default::default()
    }
}

fn error_response(status: i64, message: &str) -> ApiGatewayV2httpResponse {
    response(status, Some(json!({ "error": message }).to_string()))
}

fn json_response<T: Serialize>(body: &T) -> ApiGatewayV2httpResponse {
    match serde_json::to_string(body) {
        Ok(text) => response(200, Some(text)),
        Err(e) => error_response(500, &format!("Failed to serialize response: {}", e)),
    }
}

/// Status code for a library error
fn calc_error_response(err: &CalcError) -> ApiGatewayV2httpResponse {
    let status = match err {
        e if e.is_validation() => 400,
        CalcError::ParametersUnavailable { .. } | CalcError::PlanUnavailable { .. } => 404,
        _ => 500,
    };
    if status == 500 {
        error!("Calculation failed: {}", err);
    } else {
        warn!("Rejected request: {}", err);
    }
    error_response(status, &err.to_string())
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, ApiGatewayV2httpResponse> {
    serde_json::from_str(body).map_err(|e| error_response(400, &format!("Invalid JSON: {}", e)))
}

fn calculate(runner: &Runner, body: &str) -> ApiGatewayV2httpResponse {
    let request: CalculatorRequest = match parse_body(body) {
        Ok(r) => r,
        Err(response) => return response,
    };

    match runner.calculate(&request) {
        Ok(result) => json_response(&result),
        Err(e) => calc_error_response(&e),
    }
}

fn complete_mtr(runner: &Runner, body: &str) -> ApiGatewayV2httpResponse {
    let payload: MtrPayload = match parse_body(body) {
        Ok(p) => p,
        Err(response) => return response,
    };

    let result = payload
        .request
        .axis()
        .and_then(|axis| SuppliedSeries::new(axis.values().to_vec(), payload.series))
        .and_then(|provider| runner.marginal_rates(&payload.request, &provider));

    match result {
        Ok(result) => json_response(&result),
        Err(e) => calc_error_response(&e),
    }
}

fn parameters(runner: &Runner, year: &str) -> ApiGatewayV2httpResponse {
    let year: i32 = match year.parse() {
        Ok(y) => y,
        Err(_) => return error_response(400, &format!("Invalid year: {}", year)),
    };

    match validate_tax_year(year).and_then(|_| runner.parameters().get(year)) {
        Ok(parameters) => json_response(&parameters),
        Err(e) => calc_error_response(&e),
    }
}

/// Route one request
fn route(runner: &Runner, method: &str, path: &str, body: &str) -> ApiGatewayV2httpResponse {
    let path = path.trim_end_matches('/');

    match (method, path) {
        ("OPTIONS", _) => response(200, None),
        ("GET", "") => json_response(&json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        })),
        ("GET", "/health") => json_response(&json!({ "status": "healthy" })),
        ("POST", "/calculate") => calculate(runner, body),
        ("POST", "/complete-mtr") => complete_mtr(runner, body),
        ("GET", p) if p.starts_with("/parameters/") => parameters(runner, &p["/parameters/".len()..]),
        _ => error_response(404, &format!("No route for {} {}", method, path)),
    }
}

/// Lambda handler function
async fn handler(runner: &Runner, event: LambdaEvent<ApiGatewayV2httpRequest>) -> Result<ApiGatewayV2httpResponse, Error> {
    let start = std::time::Instant::now();
    let request = event.payload;

    let method = request.request_context.http.method.as_str().to_string();
    let path = request
        .raw_path
        .as_deref()
        .or(request.request_context.http.path.as_deref())
        .unwrap_or("/")
        .to_string();
    let body = request.body.as_deref().unwrap_or("{}");

    let response = route(runner, &method, &path, body);

    info!(
        "{} {} -> {} in {:?} (cache {:.0}% hits)",
        method,
        path,
        response.status_code,
        start.elapsed(),
        runner.parameters().stats().hit_rate() * 100.0
    );
    Ok(response)
}

/// Built-in parameters unless `PARAMETERS_DIR` points at CSV files
fn load_parameters() -> Result<Arc<dyn TaxParameterProvider>, Error> {
    match std::env::var("PARAMETERS_DIR") {
        Ok(dir) => Ok(Arc::new(CsvParameterProvider::load_from(Path::new(&dir))?)),
        Err(_) => Ok(Arc::new(BuiltinParameters::new())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let runner: Arc<Runner> = Arc::new(ScenarioRunner::new(CachedParameters::new(load_parameters()?)));

    run(service_fn(move |event| {
        let runner = Arc::clone(&runner);
        async move { handler(&runner, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        let parameters: Arc<dyn TaxParameterProvider> = Arc::new(BuiltinParameters::new());
        ScenarioRunner::new(CachedParameters::new(parameters))
    }

    fn body_json(response: &ApiGatewayV2httpResponse) -> serde_json::Value {
        match &response.body {
            Some(Body::Text(text)) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_health_and_root() {
        let runner = runner();
        let health = route(&runner, "GET", "/health", "");
        assert_eq!(health.status_code, 200);
        assert_eq!(body_json(&health)["status"], "healthy");

        let root = route(&runner, "GET", "/", "");
        assert_eq!(body_json(&root)["service"], SERVICE_NAME);
        assert!(root.headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn test_preflight() {
        let response = route(&runner(), "OPTIONS", "/calculate", "");
        assert_eq!(response.status_code, 200);
        assert!(response.body.is_none());
        assert!(response.headers.contains_key(ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[test]
    fn test_calculate_defaults() {
        let response = route(&runner(), "POST", "/calculate", "{}");
        assert_eq!(response.status_code, 200);
        assert_eq!(body_json(&response)["summary"]["original_loan"], 45_000.0);
    }

    #[test]
    fn test_calculate_errors() {
        let runner = runner();

        let bad_json = route(&runner, "POST", "/calculate", "{not json");
        assert_eq!(bad_json.status_code, 400);

        let bad_rate = route(&runner, "POST", "/calculate", r#"{"salary_growth_rate": 0.5}"#);
        assert_eq!(bad_rate.status_code, 400);
        assert!(body_json(&bad_rate)["error"].as_str().unwrap().contains("salary_growth_rate"));

        let bad_plan = route(&runner, "POST", "/calculate", r#"{"plan": "plan9"}"#);
        assert_eq!(bad_plan.status_code, 400);
    }

    #[test]
    fn test_complete_mtr() {
        let points = student_loan_calculator::scenario::MTR_GRID_POINTS;
        let incomes: Vec<f64> = (0..points).map(|i| 1000.0 * i as f64).collect();
        let net: Vec<f64> = incomes.iter().map(|y| 0.8 * y).collect();
        let zeros = vec![0.0; points];
        let body = json!({
            "income_max": 80_000.0,
            "student_loan_plan": "NONE",
            "series": {
                "income_tax": zeros,
                "national_insurance": zeros,
                "student_loan_repayment": zeros,
                "universal_credit": zeros,
                "child_benefit": zeros,
                "child_benefit_after_clawback": zeros,
                "household_net_income": net,
            }
        });

        let response = route(&runner(), "POST", "/complete-mtr", &body.to_string());
        assert_eq!(response.status_code, 200);
        let value = body_json(&response);
        assert_eq!(value["rows"].as_array().unwrap().len(), points);
        assert!((value["summary"]["max_marginal_rate"].as_f64().unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_complete_mtr_wrong_grid() {
        // Three points cannot cover the default 81-point grid
        let body = json!({ "series": SimulationSeries::zeros(3) });
        let response = route(&runner(), "POST", "/complete-mtr", &body.to_string());
        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn test_parameters_route() {
        let runner = runner();
        assert_eq!(route(&runner, "GET", "/parameters/2026", "").status_code, 200);
        assert_eq!(route(&runner, "GET", "/parameters/2040", "").status_code, 400);
        assert_eq!(route(&runner, "GET", "/parameters/abc", "").status_code, 400);
        assert_eq!(route(&runner, "GET", "/nowhere", "").status_code, 404);
    }
}
