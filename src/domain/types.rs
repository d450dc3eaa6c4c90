//! Shared types for the conveyor station

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Numbered storage position on the conveyor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotNumber(pub u32);

impl std::fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scanned barcode after normalization.
///
/// Only constructed through [`ScanCode::parse`], so every value held by the
/// controller is trimmed and at least the configured minimum length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScanCode(String);

/// Raw input that failed normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortCode {
    pub trimmed: String,
    pub min_len: usize,
}

impl ScanCode {
    /// Trim whitespace and enforce the minimum length
    pub fn parse(raw: &str, min_len: usize) -> Result<Self, ShortCode> {
        let trimmed = raw.trim();
        if trimmed.chars().count() < min_len {
            return Err(ShortCode { trimmed: trimmed.to_string(), min_len });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

impl Customer {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Processing,
    Complete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub full_invoice_number: String,
    pub display_invoice_number: String,
    pub number_of_items: u32,
    pub garments_processed: u32,
    pub invoice_dropoff_date: NaiveDateTime,
    pub invoice_pickup_date: NaiveDateTime,
    #[serde(default)]
    pub status: TicketStatus,
}

impl Ticket {
    /// Garments of this family not yet scanned
    pub fn remaining(&self) -> u32 {
        self.number_of_items.saturating_sub(self.garments_processed)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Garment {
    pub full_invoice_number: String,
    pub item_id: String,
    pub item_description: String,
    #[serde(default)]
    pub slot_number: Option<SlotNumber>,
    #[serde(default)]
    pub invoice_comments: String,
}

/// Aggregate slot occupancy as reported by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotStats {
    pub total_slots: u32,
    pub slots_used: u32,
    pub capacity_percentage: f64,
}

impl SlotStats {
    pub fn from_counts(total_slots: u32, slots_used: u32) -> Self {
        let capacity_percentage = if total_slots > 0 {
            (slots_used as f64 / total_slots as f64) * 100.0
        } else {
            0.0
        };
        Self { total_slots, slots_used, capacity_percentage }
    }

    pub fn slots_free(&self) -> u32 {
        self.total_slots.saturating_sub(self.slots_used)
    }
}
