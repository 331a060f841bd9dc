use std::{fmt::Display, str::FromStr};

use accrual_client::RemoteOrderStatus;
use chrono::{DateTime, Utc};
use gm_common::Points;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------    OrderNumber      ---------------------------------------------------------
/// A lightweight wrapper around the decimal order number string. The number doubles as the
/// order's primary key; Luhn validation happens at the boundaries, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
/// The local lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Submitted, waiting to be picked up by the pipeline. Also the state an order returns to
    /// after a transient failure.
    New,
    /// Leased by the pipeline. Once the accrual is known but not yet credited, the order stays
    /// here until the balance stage settles it.
    Processing,
    /// The accrual service does not recognise the order. Terminal.
    Invalid,
    /// The accrual has been credited to the owner's balance. Terminal.
    Processed,
}

impl OrderStatus {
    /// Terminal orders take no further part in reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::Processing => write!(f, "PROCESSING"),
            OrderStatus::Invalid => write!(f, "INVALID"),
            OrderStatus::Processed => write!(f, "PROCESSED"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a verdict from the accrual service lands in the local lifecycle. Remote PROCESSED maps to
/// local PROCESSING ("accrual known, not yet credited"); the balance stage performs the terminal
/// transition atomically with the credit.
impl From<RemoteOrderStatus> for OrderStatus {
    fn from(remote: RemoteOrderStatus) -> Self {
        match remote {
            RemoteOrderStatus::Registered => OrderStatus::New,
            RemoteOrderStatus::Processing => OrderStatus::New,
            RemoteOrderStatus::Processed => OrderStatus::Processing,
            RemoteOrderStatus::Invalid => OrderStatus::Invalid,
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub number: OrderNumber,
    pub status: OrderStatus,
    pub accrual: Option<Points>,
    pub uploaded_at: DateTime<Utc>,
}

//--------------------------------------        User         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    /// Password hash. Never the cleartext.
    pub pass: String,
    #[sqlx(rename = "loyalty_balance")]
    pub balance: Points,
}

//--------------------------------------   WithdrawalRecord  ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WithdrawalRecord {
    pub order_number: OrderNumber,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

//--------------------------------------   BalanceSummary    ---------------------------------------------------------
/// A user's spendable balance and the lifetime total they have withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub current: Points,
    pub withdrawn: Points,
}

//--------------------------------------   NewOrderResult    ---------------------------------------------------------
/// What happened when a user submitted an order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewOrderResult {
    /// The order is new and now owned by the submitting user.
    Accepted,
    /// The same user already submitted this order.
    AlreadyYours,
    /// Another user owns this order.
    OwnedByOther,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remote_statuses_map_onto_the_local_lifecycle() {
        assert_eq!(OrderStatus::from(RemoteOrderStatus::Registered), OrderStatus::New);
        assert_eq!(OrderStatus::from(RemoteOrderStatus::Processing), OrderStatus::New);
        assert_eq!(OrderStatus::from(RemoteOrderStatus::Processed), OrderStatus::Processing);
        assert_eq!(OrderStatus::from(RemoteOrderStatus::Invalid), OrderStatus::Invalid);
    }

    #[test]
    fn status_round_trips_through_sql_text() {
        for status in [OrderStatus::New, OrderStatus::Processing, OrderStatus::Invalid, OrderStatus::Processed] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_invalid_and_processed_are_terminal() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
    }

    #[test]
    fn orders_serialize_for_the_api() {
        let order = Order {
            number: OrderNumber::from("5857088487"),
            status: OrderStatus::Processed,
            accrual: Some(Points::from(150.5)),
            uploaded_at: chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 2, 29, 13, 30, 0).unwrap(),
        };
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains(r#""number":"5857088487""#));
        assert!(json.contains(r#""status":"PROCESSED""#));
        assert!(json.contains(r#""accrual":150.5"#));
    }
}
