use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{Client, StatusCode};

use crate::{AccrualApiError, AccrualClientConfig, AccrualOrder};

/// What came back for one order. A throttle is not a verdict: the caller must back off for the
/// indicated duration and leave the order leased for a later attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Verdict(AccrualOrder),
    Throttled(Duration),
}

#[derive(Clone)]
pub struct AccrualApi {
    config: AccrualClientConfig,
    client: Arc<Client>,
}

impl AccrualApi {
    pub fn new(config: AccrualClientConfig) -> Result<Self, AccrualApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AccrualApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, number: &str) -> String {
        format!("{}/api/orders/{number}", self.config.base_url)
    }

    /// Asks the accrual service for its verdict on one order.
    ///
    /// * 200 — the decoded body, after checking that it is well-formed and answers for the order
    ///   we asked about.
    /// * 204 — the order is unknown to the accrual service; a synthetic INVALID verdict.
    /// * 429 — `FetchResult::Throttled` with the `Retry-After` duration.
    /// * anything else, including transport errors — an error for this order. No retries here.
    pub async fn fetch_verdict(&self, number: &str) -> Result<FetchResult, AccrualApiError> {
        let url = self.url(number);
        trace!("📤️ GET {url}");
        let response =
            self.client.get(&url).send().await.map_err(|e| AccrualApiError::Network(e.to_string()))?;
        match response.status() {
            StatusCode::OK => {
                let verdict = response
                    .json::<AccrualOrder>()
                    .await
                    .map_err(|e| AccrualApiError::InvalidResponse(e.to_string()))?;
                validate_verdict(number, verdict).map(FetchResult::Verdict)
            },
            StatusCode::NO_CONTENT => {
                debug!("📤️ Order {number} is unknown to the accrual service");
                Ok(FetchResult::Verdict(AccrualOrder::unknown(number)))
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let header = response.headers().get(reqwest::header::RETRY_AFTER).cloned();
                let delay = parse_retry_after(header.as_ref().and_then(|v| v.to_str().ok()))?;
                warn!("📤️ Accrual service is rate limiting us. Retry-After: {}s", delay.as_secs());
                Ok(FetchResult::Throttled(delay))
            },
            other => Err(AccrualApiError::UnexpectedStatus { status: other.as_u16(), order: number.to_string() }),
        }
    }
}

/// The body must answer for the order we asked about, otherwise the verdict cannot be trusted.
fn validate_verdict(number: &str, verdict: AccrualOrder) -> Result<AccrualOrder, AccrualApiError> {
    if verdict.order != number {
        return Err(AccrualApiError::OrderMismatch { expected: number.to_string(), got: verdict.order });
    }
    Ok(verdict)
}

fn parse_retry_after(header: Option<&str>) -> Result<Duration, AccrualApiError> {
    let value = header.ok_or_else(|| AccrualApiError::BadRetryAfter("header is missing".to_string()))?;
    let seconds =
        value.trim().parse::<u64>().map_err(|e| AccrualApiError::BadRetryAfter(format!("{value}: {e}")))?;
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod test {
    use gm_common::Points;

    use super::*;
    use crate::RemoteOrderStatus;

    #[test]
    fn verdicts_must_round_trip_the_order_number() {
        let verdict = AccrualOrder {
            order: "2503317444".to_string(),
            status: RemoteOrderStatus::Processed,
            accrual: Some(Points::from(200.7)),
        };
        assert!(validate_verdict("2503317444", verdict.clone()).is_ok());
        let err = validate_verdict("5857088487", verdict).unwrap_err();
        assert!(matches!(err, AccrualApiError::OrderMismatch { .. }));
    }

    #[test]
    fn retry_after_header_parsing() {
        assert_eq!(parse_retry_after(Some("2")).unwrap(), Duration::from_secs(2));
        assert_eq!(parse_retry_after(Some(" 60 ")).unwrap(), Duration::from_secs(60));
        assert!(matches!(parse_retry_after(None), Err(AccrualApiError::BadRetryAfter(_))));
        assert!(matches!(parse_retry_after(Some("soon")), Err(AccrualApiError::BadRetryAfter(_))));
    }

    #[test]
    fn urls_do_not_double_the_slash() {
        let api = AccrualApi::new(AccrualClientConfig::new("http://localhost:8080/", Duration::from_secs(1)))
            .unwrap();
        assert_eq!(api.url("42"), "http://localhost:8080/api/orders/42");
    }
}
