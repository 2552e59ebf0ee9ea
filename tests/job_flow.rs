use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tipcam::{
    AuditedRateRecord, ConfigError, ExchangeRate, FetchError, JobError, JobRunner, JobState,
    Origin, RateFetcher, RateSink, RateSource, RunConfig, WriteError,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils {
    use super::*;

    /// Stands in for the rate table: every write becomes a stored row.
    #[derive(Clone, Default)]
    pub struct MemorySink {
        pub rows: Arc<Mutex<Vec<AuditedRateRecord>>>,
    }

    impl MemorySink {
        pub fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RateSink for MemorySink {
        async fn write(
            &self,
            rate: &ExchangeRate,
            config: &RunConfig,
            audit_user: &str,
        ) -> Result<AuditedRateRecord, WriteError> {
            let now = rate.date.and_hms_opt(6, 0, 0).unwrap();
            let record = AuditedRateRecord::new(rate, audit_user, &config.origin, now);
            self.rows.lock().unwrap().push(record.clone());
            Ok(record)
        }
    }

    pub struct FixedSource(pub ExchangeRate);

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch_rate(&self, _config: &RunConfig) -> Result<ExchangeRate, FetchError> {
            Ok(self.0.clone())
        }
    }

    pub async fn create_mock_server(template: ResponseTemplate, expected: u64) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/indicadores/tc"))
            .respond_with(template)
            .expect(expected)
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn config_for(api_url: String) -> RunConfig {
        RunConfig {
            server: "localhost".to_string(),
            database: "arh".to_string(),
            username: "etl_user".to_string(),
            password: "secret".to_string(),
            trust_server_certificate: false,
            origin: Origin::default(),
            api_url,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn endpoint(server: &MockServer) -> String {
        format!("{}/indicadores/tc", server.uri())
    }
}

use test_utils::*;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn string_payload_run_inserts_one_row() {
    let server = create_mock_server(
        ResponseTemplate::new(200).set_body_string(
            r#"{"dolar":{"compra":{"valor":"520.50"},"venta":{"valor":"528.75"}}}"#,
        ),
        1,
    )
    .await;
    let sink = MemorySink::default();
    let runner = JobRunner::new(RateFetcher::new(), sink.clone());

    let outcome = runner.run(|| Ok(config_for(endpoint(&server)))).await;

    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(outcome.exit_status(), 0);
    assert_eq!(outcome.reached, JobState::Persisted);

    let rows = sink.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].buy_price, dec("520.50"));
    assert_eq!(rows[0].sell_price, dec("528.75"));
    assert_eq!(rows[0].reference_price, dec("520.50"));
    assert_eq!(rows[0].monthly_reference_price, dec("520.50"));
    assert_eq!(rows[0].created_by, "etl_user");
    assert_eq!(rows[0].modified_by, "etl_user");
}

#[tokio::test]
async fn unavailable_api_fails_without_writing() {
    let server = create_mock_server(ResponseTemplate::new(503), 1).await;
    let sink = MemorySink::default();
    let runner = JobRunner::new(RateFetcher::new(), sink.clone());

    let outcome = runner.run(|| Ok(config_for(endpoint(&server)))).await;

    assert_eq!(outcome.exit_status(), 1);
    assert_eq!(outcome.reached, JobState::ConfigLoaded);
    assert_eq!(sink.row_count(), 0);
    let err = outcome.result.unwrap_err();
    assert!(matches!(err, JobError::Fetch(FetchError::BadStatus(503))));
    assert!(err.to_string().contains("BadStatus(503)"), "{err}");
}

#[tokio::test]
async fn slow_api_times_out_without_writing() {
    let server = create_mock_server(
        ResponseTemplate::new(200)
            .set_body_string(r#"{"dolar":{"compra":{"valor":520.5},"venta":{"valor":528.75}}}"#)
            .set_delay(Duration::from_secs(3)),
        1,
    )
    .await;
    let sink = MemorySink::default();
    let runner = JobRunner::new(RateFetcher::new(), sink.clone());

    let mut config = config_for(endpoint(&server));
    config.timeout = Duration::from_millis(250);
    let outcome = runner.run(move || Ok(config)).await;

    assert!(matches!(
        outcome.result,
        Err(JobError::Fetch(FetchError::Timeout))
    ));
    assert_eq!(sink.row_count(), 0);
}

#[tokio::test]
async fn malformed_payload_fails_without_writing() {
    let server = create_mock_server(
        ResponseTemplate::new(200)
            .set_body_string(r#"{"dolar":{"compra":{"valor":520.5},"venta":{"valor":null}}}"#),
        1,
    )
    .await;
    let sink = MemorySink::default();
    let runner = JobRunner::new(RateFetcher::new(), sink.clone());

    let outcome = runner.run(|| Ok(config_for(endpoint(&server)))).await;

    assert!(matches!(
        outcome.result,
        Err(JobError::Fetch(FetchError::MalformedPayload(_)))
    ));
    assert_eq!(sink.row_count(), 0);
}

#[tokio::test]
async fn missing_config_never_calls_api() {
    let server = create_mock_server(ResponseTemplate::new(200), 0).await;
    let sink = MemorySink::default();
    let runner = JobRunner::new(RateFetcher::new(), sink.clone());

    let outcome = runner
        .run(|| {
            Err(ConfigError::MissingField(vec![
                "DB_USER".to_string(),
                "DB_PASSWORD".to_string(),
            ]))
        })
        .await;

    assert_eq!(outcome.exit_status(), 1);
    assert_eq!(outcome.reached, JobState::Init);
    let message = outcome.result.unwrap_err().to_string();
    assert!(message.contains("DB_USER") && message.contains("DB_PASSWORD"));
    assert_eq!(sink.row_count(), 0);
    drop(server);
}

#[tokio::test]
async fn same_day_reruns_insert_duplicates() {
    let rate = ExchangeRate {
        date: chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        buy_price: dec("520.50"),
        sell_price: dec("528.75"),
    };
    let sink = MemorySink::default();
    let runner = JobRunner::new(FixedSource(rate), sink.clone());
    let config = config_for("http://unused.invalid/indicadores/tc".to_string());

    let first = runner.run(|| Ok(config.clone())).await;
    let second = runner.run(|| Ok(config.clone())).await;

    assert!(first.is_success() && second.is_success());
    assert_ne!(first.run_id, second.run_id);
    let rows = sink.rows.lock().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], rows[1]);
}
