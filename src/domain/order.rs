//! Order Aggregate
//!
//! The aggregate root of the checkout subsystem. An order is created once,
//! with its line items and total frozen at creation time, and afterwards
//! only two narrow mutations exist: attaching a payment reference and
//! moving the status forward through the state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Line item captured at order time. Name and unit price are snapshots of
/// the catalog at checkout; they never track later catalog changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingSummary {
    pub address_line: String,
    pub city: String,
    pub state: String,
}

/// Order statuses. `PendingPayment` is the only initial state and nothing
/// ever returns to it. Provider statuses this service does not recognize
/// pass through as `Unknown` instead of being dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum OrderStatus {
    PendingPayment,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    Pending,
    Unknown(String),
}

impl OrderStatus {
    /// Maps a provider-reported status string onto the local vocabulary.
    /// Unrecognized strings are carried through unchanged.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            "in_process" | "pending" | "in_mediation" => Self::Pending,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::ChargedBack => "charged_back",
            Self::Pending => "pending",
            Self::Unknown(s) => s,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    /// Re-applying the current status is always legal (idempotent no-op at
    /// the store). `Pending` and `Unknown` may still be finalized by the
    /// provider; `Approved` may later be refunded or charged back; the
    /// remaining terminal states are frozen.
    pub fn can_transition(&self, next: &OrderStatus) -> bool {
        if self == next {
            return true;
        }
        if *next == Self::PendingPayment {
            return false;
        }
        match self {
            Self::PendingPayment | Self::Pending | Self::Unknown(_) => true,
            Self::Approved => matches!(next, Self::Refunded | Self::ChargedBack),
            Self::Rejected | Self::Cancelled | Self::Refunded | Self::ChargedBack => false,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending_payment" => Self::PendingPayment,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            "pending" => Self::Pending,
            _ => Self::Unknown(s),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(s: OrderStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of an idempotent status write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    /// The status changed.
    Updated,
    /// The same status was already in place.
    Unchanged,
    /// The transition is illegal and was not applied.
    Refused,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: String,
    user_id: String,
    status: OrderStatus,
    currency: String,
    total: Decimal,
    items: Vec<LineItem>,
    shipping: Option<ShippingSummary>,
    payment_provider: Option<String>,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new order in `pending_payment`. The id is generated by the
    /// caller (the orchestrator) and handed in; the total is computed here,
    /// exactly once, from the snapshotted line items.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        currency: impl Into<String>,
        items: Vec<LineItem>,
        shipping: Option<ShippingSummary>,
    ) -> Self {
        let total = items.iter().map(LineItem::line_total).sum();
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            status: OrderStatus::PendingPayment,
            currency: currency.into(),
            total,
            items,
            shipping,
            payment_provider: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from stored fields. Does not recompute the total:
    /// the persisted value is authoritative for historical orders.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: String,
        user_id: String,
        status: OrderStatus,
        currency: String,
        total: Decimal,
        items: Vec<LineItem>,
        shipping: Option<ShippingSummary>,
        payment_provider: Option<String>,
        payment_reference: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            status,
            currency,
            total,
            items,
            shipping,
            payment_provider,
            payment_reference,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn status(&self) -> &OrderStatus {
        &self.status
    }
    pub fn currency(&self) -> &str {
        &self.currency
    }
    pub fn total(&self) -> Decimal {
        self.total
    }
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }
    pub fn shipping(&self) -> Option<&ShippingSummary> {
        self.shipping.as_ref()
    }
    pub fn payment_provider(&self) -> Option<&str> {
        self.payment_provider.as_deref()
    }
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Attaches the payment session reference. Idempotent: reapplying the
    /// same reference is a no-op.
    pub fn attach_payment_reference(&mut self, provider: &str, reference: &str) {
        if self.payment_provider.as_deref() == Some(provider)
            && self.payment_reference.as_deref() == Some(reference)
        {
            return;
        }
        self.payment_provider = Some(provider.to_string());
        self.payment_reference = Some(reference.to_string());
        self.touch();
    }

    /// Applies a status per the state machine. Same-status writes report
    /// `Unchanged`; illegal transitions report `Refused` and leave the
    /// order untouched.
    pub fn apply_status(&mut self, next: OrderStatus) -> StatusWrite {
        if self.status == next {
            return StatusWrite::Unchanged;
        }
        if !self.status.can_transition(&next) {
            return StatusWrite::Refused;
        }
        self.status = next;
        self.touch();
        StatusWrite::Updated
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
