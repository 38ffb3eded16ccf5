//! Append-only custody transaction log and the state derived from it.
//!
//! The log is the source of truth for who currently holds a product. The
//! denormalized [`Product`] snapshot is convenient for list views, but every
//! custody decision re-derives the holder from the log tail so the two can
//! never silently diverge.

use super::error::LedgerError;
use super::product::{Product, ProductStatus, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub enum TransactionType {
    #[n(0)]
    Harvest,
    #[n(1)]
    Transfer,
    #[n(2)]
    Sale,
}

/// One accepted custody event. Records are written exactly once and never
/// mutated; insertion order is chronological order.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct TransactionRecord {
    #[n(0)]
    pub product_id: u64,
    #[n(1)]
    pub transaction_type: TransactionType,
    #[n(2)]
    pub from: Option<String>, // None for the genesis harvest record
    #[n(3)]
    pub to: String,
    #[n(4)]
    pub location: String,
    #[n(5)]
    pub new_status: ProductStatus,
    #[n(6)]
    pub timestamp: TimeStamp<Utc>,
    #[n(7)]
    pub notes: String,
}

/// The full ordered record sequence for one product.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct ProductHistory {
    #[n(0)]
    pub product_id: u64,
    #[n(1)]
    pub records: Vec<TransactionRecord>,
}

/// One realized stage transition, shaped for timeline display.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StageEntry {
    pub stage: ProductStatus,
    pub transaction_type: TransactionType,
    pub actor: Option<String>,
    pub recipient: String,
    pub location: String,
    pub timestamp: TimeStamp<Utc>,
    pub notes: String,
}

/// Consumable summary of a product: snapshot plus everything folded out of
/// the transaction log.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProductSummary {
    pub product: Product,
    pub current_holder: String,
    pub stage_history: Vec<StageEntry>,
}

impl ProductHistory {
    pub fn new(product_id: u64) -> Self {
        Self {
            product_id,
            records: vec![],
        }
    }

    pub fn append(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    pub fn last(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }

    /// Derive the current custodian. While the product is still `Harvested`
    /// the registering farmer holds it; past that the log tail is
    /// authoritative. A product past `Harvested` with an empty log is an
    /// integrity violation, not a user error.
    pub fn current_holder(&self, product: &Product) -> Result<String, LedgerError> {
        if product.status == ProductStatus::Harvested {
            return Ok(product.farmer.clone());
        }

        self.records
            .last()
            .map(|record| record.to.clone())
            .ok_or(LedgerError::NoTransactionHistory(product.id))
    }

    /// Fold the log into one timeline entry per realized transition.
    pub fn stage_history(&self) -> Vec<StageEntry> {
        self.records
            .iter()
            .map(|record| StageEntry {
                stage: record.new_status,
                transaction_type: record.transaction_type.clone(),
                actor: record.from.clone(),
                recipient: record.to.clone(),
                location: record.location.clone(),
                timestamp: record.timestamp.clone(),
                notes: record.notes.clone(),
            })
            .collect()
    }
}
