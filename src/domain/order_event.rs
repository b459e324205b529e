use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of order-lifecycle event. Append-only, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Placed,
    Filled,
    PartiallyFilled,
    Cancelled,
    Replaced,
    Expired,
}

impl OrderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::Placed => "placed",
            OrderEventKind::Filled => "filled",
            OrderEventKind::PartiallyFilled => "partially_filled",
            OrderEventKind::Cancelled => "cancelled",
            OrderEventKind::Replaced => "replaced",
            OrderEventKind::Expired => "expired",
        }
    }
}

impl fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderEventKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "placed" => Ok(OrderEventKind::Placed),
            "filled" => Ok(OrderEventKind::Filled),
            "partially_filled" => Ok(OrderEventKind::PartiallyFilled),
            "cancelled" => Ok(OrderEventKind::Cancelled),
            "replaced" => Ok(OrderEventKind::Replaced),
            "expired" => Ok(OrderEventKind::Expired),
            _ => Err(format!("unknown order_event kind: {s}")),
        }
    }
}

/// One append-only row in a signal's order-lifecycle log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Option<i64>,
    pub signal_id: i64,
    pub kind: OrderEventKind,
    pub old_price: Option<Decimal>,
    pub new_price: Option<Decimal>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn placed(signal_id: i64, price: Decimal) -> Self {
        Self {
            id: None,
            signal_id,
            kind: OrderEventKind::Placed,
            old_price: None,
            new_price: Some(price),
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn replaced(signal_id: i64, old_price: Decimal, new_price: Decimal) -> Self {
        Self {
            id: None,
            signal_id,
            kind: OrderEventKind::Replaced,
            old_price: Some(old_price),
            new_price: Some(new_price),
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn expired(signal_id: i64, old_price: Decimal) -> Self {
        Self {
            id: None,
            signal_id,
            kind: OrderEventKind::Expired,
            old_price: Some(old_price),
            new_price: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
