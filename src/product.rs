//! Product snapshot types and the registration details builder.

use super::error::{DetailsError, LedgerError};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Custody stages in pipeline order. Transitions are strictly forward, one
/// stage at a time, and `Sold` is terminal.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum ProductStatus {
    #[n(0)]
    Harvested,
    #[n(1)]
    AtDistributor,
    #[n(2)]
    AtRetailer,
    #[n(3)]
    Sold,
}

impl ProductStatus {
    /// The only legal transition target from this stage, `None` once sold.
    pub fn next(self) -> Option<ProductStatus> {
        match self {
            ProductStatus::Harvested => Some(ProductStatus::AtDistributor),
            ProductStatus::AtDistributor => Some(ProductStatus::AtRetailer),
            ProductStatus::AtRetailer => Some(ProductStatus::Sold),
            ProductStatus::Sold => None,
        }
    }

    /// The role a recipient must hold to receive a product entering this
    /// stage. `Harvested` belongs to the registering farmer.
    pub fn recipient_role(self) -> crate::stakeholder::Role {
        use crate::stakeholder::Role;
        match self {
            ProductStatus::Harvested => Role::Farmer,
            ProductStatus::AtDistributor => Role::Distributor,
            ProductStatus::AtRetailer => Role::Retailer,
            ProductStatus::Sold => Role::Consumer,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            ProductStatus::Harvested => 0,
            ProductStatus::AtDistributor => 1,
            ProductStatus::AtRetailer => 2,
            ProductStatus::Sold => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<ProductStatus> {
        match index {
            0 => Some(ProductStatus::Harvested),
            1 => Some(ProductStatus::AtDistributor),
            2 => Some(ProductStatus::AtRetailer),
            3 => Some(ProductStatus::Sold),
            _ => None,
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProductStatus::Harvested => "Harvested",
            ProductStatus::AtDistributor => "At Distributor",
            ProductStatus::AtRetailer => "At Retailer",
            ProductStatus::Sold => "Sold",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

// Timestamps persist at whole-second precision, matching the Unix-seconds
// harvest dates supplied at registration.
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0.timestamp())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let secs = d.i64()?;

        DateTime::from_timestamp(secs, 0)
            .map(TimeStamp)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert timestamp to utc",
            ))
    }
}

/// Wallet plus the display fields snapshotted from the registry at transfer
/// time, so a summary never needs a second registry lookup.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct StageParty {
    #[n(0)]
    pub wallet: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub organization: String,
}

/// Denormalized product snapshot. The transaction log stays the source of
/// truth for custody; this record exists so list views avoid a full log scan.
/// The validator is the only writer and keeps both in step.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Product {
    #[n(0)]
    pub id: u64, // sequential, 1-based
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub variety: String,
    #[n(3)]
    pub quantity: u64,
    #[n(4)]
    pub farm_location: String,
    #[n(5)]
    pub harvest_date: TimeStamp<Utc>,
    #[n(6)]
    pub quality_grade: String,
    #[n(7)]
    pub farmer: String,
    #[n(8)]
    pub status: ProductStatus,
    #[n(9)]
    pub distributor: Option<StageParty>,
    #[n(10)]
    pub retailer: Option<StageParty>,
    #[n(11)]
    pub registered_at: TimeStamp<Utc>,
    #[n(12)]
    pub distributor_added_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub retailer_added_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub sold_at: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub data_hash: String, // sha256 over the finalised registration details
}

// Used for constructing registration drafts.
// The data hash *is* the hash of this struct encoded into CBOR.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Eq, PartialEq)]
pub struct ProductDetails {
    #[n(0)]
    name: Option<String>,
    #[n(1)]
    variety: Option<String>,
    #[n(2)]
    quantity: u64,
    #[n(3)]
    farm_location: Option<String>,
    #[n(4)]
    harvest_date: Option<TimeStamp<Utc>>,
    #[n(5)]
    quality_grade: Option<String>,
}

impl ProductDetails {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn set_variety(mut self, variety: &str) -> Self {
        self.variety = Some(variety.to_string());
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_farm_location(mut self, location: &str) -> Self {
        self.farm_location = Some(location.to_string());
        self
    }
    pub fn set_harvest_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.harvest_date = Some(date);
        self
    }
    pub fn set_quality_grade(mut self, grade: &str) -> Self {
        self.quality_grade = Some(grade.to_string());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn variety(&self) -> Option<&str> {
        self.variety.as_deref()
    }
    pub fn quantity(&self) -> u64 {
        self.quantity
    }
    pub fn farm_location(&self) -> Option<&str> {
        self.farm_location.as_deref()
    }
    pub fn harvest_date(&self) -> Option<&TimeStamp<Utc>> {
        self.harvest_date.as_ref()
    }
    pub fn quality_grade(&self) -> Option<&str> {
        self.quality_grade.as_deref()
    }

    /// Checks fields, then returns the content fingerprint of the draft and
    /// its contents serialised into CBOR. The fingerprint becomes the
    /// product's `data_hash` and is what authenticity checks compare against.
    pub fn validate_and_finalise(&self) -> Result<(String, Vec<u8>), LedgerError> {
        if self.name.is_none() {
            return Err(DetailsError::MissingField("name").into());
        }
        if self.variety.is_none() {
            return Err(DetailsError::MissingField("variety").into());
        }
        if self.quantity == 0 {
            return Err(DetailsError::ZeroQuantity.into());
        }
        if self.farm_location.is_none() {
            return Err(DetailsError::MissingField("farm_location").into());
        }
        if self.harvest_date.is_none() {
            return Err(DetailsError::MissingField("harvest_date").into());
        }
        if self.quality_grade.is_none() {
            return Err(DetailsError::MissingField("quality_grade").into());
        }

        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}
