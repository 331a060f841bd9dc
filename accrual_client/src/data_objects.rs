use std::fmt::Display;

use gm_common::Points;
use serde::{Deserialize, Serialize};

//--------------------------------------  RemoteOrderStatus  ---------------------------------------------------------
/// Order status as reported by the accrual service. The upper-case wire spelling is the contract;
/// anything else in the `status` field fails deserialization and therefore fails the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteOrderStatus {
    /// The order is registered but not priced yet.
    Registered,
    /// Pricing is in progress.
    Processing,
    /// A reward has been computed; `accrual` is present.
    Processed,
    /// The order earns nothing. Terminal on the remote side.
    Invalid,
}

impl Display for RemoteOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteOrderStatus::Registered => write!(f, "REGISTERED"),
            RemoteOrderStatus::Processing => write!(f, "PROCESSING"),
            RemoteOrderStatus::Processed => write!(f, "PROCESSED"),
            RemoteOrderStatus::Invalid => write!(f, "INVALID"),
        }
    }
}

//--------------------------------------     AccrualOrder    ---------------------------------------------------------
/// The accrual service's verdict for one order, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualOrder {
    pub order: String,
    pub status: RemoteOrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
}

impl AccrualOrder {
    /// The synthetic verdict for an order the remote side has never heard of (HTTP 204).
    pub fn unknown(order: &str) -> Self {
        Self { order: order.to_string(), status: RemoteOrderStatus::Invalid, accrual: None }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_a_full_verdict() {
        let verdict: AccrualOrder =
            serde_json::from_str(r#"{"order":"5857088487","status":"PROCESSED","accrual":150.5}"#).unwrap();
        assert_eq!(verdict.order, "5857088487");
        assert_eq!(verdict.status, RemoteOrderStatus::Processed);
        assert_eq!(verdict.accrual, Some(Points::from(150.5)));
    }

    #[test]
    fn accrual_is_optional() {
        let verdict: AccrualOrder =
            serde_json::from_str(r#"{"order":"2503317444","status":"PROCESSING"}"#).unwrap();
        assert_eq!(verdict.accrual, None);
    }

    #[test]
    fn unknown_statuses_are_rejected() {
        let result = serde_json::from_str::<AccrualOrder>(r#"{"order":"1","status":"SHRUGGING"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(serde_json::from_str::<AccrualOrder>(r#"{"status":"INVALID"}"#).is_err());
        assert!(serde_json::from_str::<AccrualOrder>(r#"{"order":"1"}"#).is_err());
    }
}
