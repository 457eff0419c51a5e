//! Persisted entities from §3 of the data model. These are plain structs; the
//! repositories in `db` are responsible for mapping them to and from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "RIDER",
            Role::Driver => "DRIVER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "RIDER" => Role::Rider,
            "DRIVER" => Role::Driver,
            "ADMIN" => Role::Admin,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriverStatus {
    Offline,
    Online,
    Busy,
    Suspended,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "OFFLINE",
            DriverStatus::Online => "ONLINE",
            DriverStatus::Busy => "BUSY",
            DriverStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "OFFLINE" => DriverStatus::Offline,
            "ONLINE" => DriverStatus::Online,
            "BUSY" => DriverStatus::Busy,
            "SUSPENDED" => DriverStatus::Suspended,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: DriverStatus,
    pub service_type: String,
    pub plate_number: String,
    pub credit_balance: i64,
    pub credit_expires_at: Option<DateTime<Utc>>,
    pub base_fare: f64,
    pub per_km_rate: f64,
    pub city: String,
    pub province: String,
    pub stripe_account_id: Option<String>,
    pub rating: f64,
    /// Rolling acceptance rate over the last N=50 terminal offers, maintained by the
    /// dispatch engine's acceptance-rate feedback step.
    pub acceptance_rate: f64,
    pub last_accepted_at: Option<DateTime<Utc>>,
    pub suspended_until: Option<DateTime<Utc>>,
}

impl Driver {
    pub fn has_usable_credit(&self, now: DateTime<Utc>) -> bool {
        self.credit_balance > 0 && self.credit_expires_at.map_or(true, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverLocation {
    pub driver_id: Uuid,
    pub raw_lat: f64,
    pub raw_lng: f64,
    pub snapped_lat: f64,
    pub snapped_lng: f64,
    pub bearing: Option<f64>,
    pub deviation_m: f64,
    pub anomaly_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Requested,
    Accepted,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Requested => "REQUESTED",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::Arrived => "ARRIVED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "REQUESTED" => TripStatus::Requested,
            "ACCEPTED" => TripStatus::Accepted,
            "ARRIVED" => TripStatus::Arrived,
            "IN_PROGRESS" => TripStatus::InProgress,
            "COMPLETED" => TripStatus::Completed,
            "CANCELLED" => TripStatus::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Wallet => "WALLET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CASH" => PaymentMethod::Cash,
            "WALLET" => PaymentMethod::Wallet,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => PaymentStatus::Pending,
            "COMPLETED" => PaymentStatus::Completed,
            "FAILED" => PaymentStatus::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingChannel {
    App,
    Phone,
}

impl BookingChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingChannel::App => "APP",
            BookingChannel::Phone => "PHONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "APP" => BookingChannel::App,
            "PHONE" => BookingChannel::Phone,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: TripStatus,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub drop_lat: f64,
    pub drop_lng: f64,
    pub fare: f64,
    pub commission: Option<f64>,
    pub driver_earnings: Option<f64>,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub service_type: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub booking_channel: BookingChannel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => OfferStatus::Pending,
            "ACCEPTED" => OfferStatus::Accepted,
            "REJECTED" => OfferStatus::Rejected,
            "EXPIRED" => OfferStatus::Expired,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripOffer {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub driver_id: Uuid,
    pub score: f64,
    pub eta_min: f64,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub id: Uuid,
    pub phone: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub delivery_status: String,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OtpRequestWindow {
    pub phone_hash: u64,
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct OtpLock {
    pub phone: String,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "CREDIT",
            TransactionType::Debit => "DEBIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CREDIT" => TransactionType::Credit,
            "DEBIT" => TransactionType::Debit,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => TransactionStatus::Pending,
            "COMPLETED" => TransactionStatus::Completed,
            "FAILED" => TransactionStatus::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub stripe_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    PendingManualReview,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::PendingManualReview => "PENDING_MANUAL_REVIEW",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING_MANUAL_REVIEW" => PayoutStatus::PendingManualReview,
            "PROCESSING" => PayoutStatus::Processing,
            "COMPLETED" => PayoutStatus::Completed,
            "FAILED" => PayoutStatus::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub amount: f64,
    pub status: PayoutStatus,
    pub stripe_transfer_id: Option<String>,
    pub idempotency_key: String,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverCreditLedgerEntry {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub credits_delta: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CreditPurchaseStatus {
    Pending,
    Approved,
    Rejected,
}

impl CreditPurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditPurchaseStatus::Pending => "PENDING",
            CreditPurchaseStatus::Approved => "APPROVED",
            CreditPurchaseStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => CreditPurchaseStatus::Pending,
            "APPROVED" => CreditPurchaseStatus::Approved,
            "REJECTED" => CreditPurchaseStatus::Rejected,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPurchaseRequest {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub credits: i64,
    pub months: i64,
    pub status: CreditPurchaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationChannel {
    Whatsapp,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Whatsapp => "WHATSAPP",
            NotificationChannel::Sms => "SMS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "WHATSAPP" => NotificationChannel::Whatsapp,
            "SMS" => NotificationChannel::Sms,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Delivered => "DELIVERED",
            NotificationStatus::Read => "READ",
            NotificationStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => NotificationStatus::Pending,
            "SENT" => NotificationStatus::Sent,
            "DELIVERED" => NotificationStatus::Delivered,
            "READ" => NotificationStatus::Read,
            "FAILED" => NotificationStatus::Failed,
            _ => return None,
        })
    }

    /// The status sequence a webhook callback may advance through. Used to reject an
    /// out-of-order or duplicate callback (idempotent webhook processing).
    pub fn rank(&self) -> u8 {
        match self {
            NotificationStatus::Pending => 0,
            NotificationStatus::Sent => 1,
            NotificationStatus::Delivered => 2,
            NotificationStatus::Read => 3,
            NotificationStatus::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideNotification {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub driver_id: Uuid,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub message_id: Option<String>,
    pub retries: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationLog {
    pub id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub db_total: f64,
    pub provider_total: f64,
    pub mismatch: f64,
    pub details: String,
}
