use chrono::{DateTime, Utc};
use wag_common::InstanceStatus;

/// A registered WhatsApp tenant: one phone number, one worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub hash: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub status: InstanceStatus,
    pub container_id: Option<String>,
    pub port: Option<u16>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub status_webhook_url: Option<String>,
    pub status_webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Input to [`crate::InstanceStore::register`].
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub phone_number: String,
    pub name: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub status_webhook_url: Option<String>,
    pub status_webhook_secret: Option<String>,
}

/// Whitelisted fields accepted by [`crate::InstanceStore::update`]. Every
/// field left `None` is left unchanged; there is deliberately no way to
/// unset `hash` or `phone_number` through this type.
#[derive(Debug, Clone, Default)]
pub struct InstanceUpdate {
    pub status: Option<InstanceStatus>,
    pub name: Option<Option<String>>,
    pub container_id: Option<Option<String>>,
    pub port: Option<Option<u16>>,
    pub webhook_url: Option<Option<String>>,
    pub webhook_secret: Option<Option<String>>,
    pub status_webhook_url: Option<Option<String>>,
    pub status_webhook_secret: Option<Option<String>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Query filter for [`crate::InstanceStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<InstanceStatus>,
    pub limit: u32,
    pub offset: u32,
}

/// Counts by status bucket, returned by [`crate::InstanceStore::stats`].
#[derive(Debug, Clone, Default)]
pub struct InstanceStats {
    pub total: u64,
    pub by_status: Vec<(InstanceStatus, u64)>,
}
