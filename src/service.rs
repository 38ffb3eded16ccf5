//! Service layer API for supply chain custody operations
use super::error::{DetailsError, LedgerError};
use super::history::{ProductHistory, ProductSummary, TransactionRecord, TransactionType};
use super::product::{Product, ProductDetails, ProductStatus, StageParty, TimeStamp};
use super::stakeholder::{Role, Stakeholder};
use super::utils::normalize_fingerprint;
use parking_lot::Mutex;
use sled::Batch;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const PRODUCT_COUNT_KEY: &[u8] = b"meta/product_count";

fn stakeholder_key(wallet: &str) -> Vec<u8> {
    [b"stakeholder/".as_slice(), wallet.as_bytes()].concat()
}

fn product_key(product_id: u64) -> Vec<u8> {
    [b"product/".as_slice(), &product_id.to_be_bytes()].concat()
}

fn history_key(product_id: u64) -> Vec<u8> {
    [b"history/".as_slice(), &product_id.to_be_bytes()].concat()
}

/// The single writer of both the product snapshots and the transaction log.
///
/// All custody rules live here: dashboards and other callers go through
/// [`SupplyChainService::propose_transfer`] and
/// [`SupplyChainService::reconstruct`] instead of re-deriving holders
/// themselves.
pub struct SupplyChainService {
    instance: Arc<sled::Db>,
    // serialises id assignment so product ids stay dense from 1 upward
    registration_lock: Mutex<()>,
    // one lock per product; transfers for different products run in parallel
    transfer_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl SupplyChainService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            instance,
            registration_lock: Mutex::new(()),
            transfer_locks: Mutex::new(HashMap::new()),
        }
    }

    fn product_lock(&self, product_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.transfer_locks.lock();
        locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a product's lock entry once no transfer holds it, so the table
    /// tracks in-flight transfers instead of every id ever proposed.
    fn release_product_lock(&self, product_id: u64) {
        let mut locks = self.transfer_locks.lock();
        if let Some(entry) = locks.get(&product_id) {
            // only the map itself still references the lock
            if Arc::strong_count(entry) == 1 {
                locks.remove(&product_id);
            }
        }
    }

    /// Register a wallet as a stakeholder. The role is fixed for the
    /// wallet's lifetime; a second registration attempt is rejected.
    pub fn register_stakeholder(
        &self,
        wallet: &str,
        role: Role,
        name: &str,
        organization: &str,
    ) -> Result<Stakeholder, LedgerError> {
        let stakeholder = Stakeholder::new(
            wallet.to_string(),
            role,
            name.to_string(),
            organization.to_string(),
        );

        // compare-and-swap against an absent key, so two concurrent
        // registrations of the same wallet cannot both win
        let swap = self.instance.compare_and_swap(
            stakeholder_key(wallet),
            None::<&[u8]>,
            Some(minicbor::to_vec(&stakeholder)?),
        )?;
        if swap.is_err() {
            return Err(LedgerError::AlreadyRegistered(wallet.to_string()));
        }

        info!(wallet, role = %role, "stakeholder registered");

        Ok(stakeholder)
    }

    /// Look up a wallet's registry record. Unknown wallets come back as the
    /// unregistered sentinel rather than an error, callers check
    /// `is_registered`.
    pub fn lookup_stakeholder(&self, wallet: &str) -> Result<Stakeholder, LedgerError> {
        match self.instance.get(stakeholder_key(wallet))? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Ok(Stakeholder::unregistered(wallet.to_string())),
        }
    }

    /// Register a new product for a farmer. Assigns the next sequential id,
    /// computes the content fingerprint from the finalised details, and
    /// writes the snapshot, the genesis harvest record, and the counter as
    /// one atomic batch.
    pub fn register_product(
        &self,
        farmer_wallet: &str,
        details: &ProductDetails,
    ) -> Result<Product, LedgerError> {
        let farmer = self.lookup_stakeholder(farmer_wallet)?;
        if !farmer.is_registered || farmer.role != Role::Farmer {
            return Err(LedgerError::UnauthorizedRole {
                wallet: farmer_wallet.to_string(),
                required: Role::Farmer,
            });
        }

        let (data_hash, _contents) = details.validate_and_finalise()?;
        let harvest_date = details
            .harvest_date()
            .cloned()
            .ok_or(DetailsError::MissingField("harvest_date"))?;

        let _guard = self.registration_lock.lock();

        let product_id = self.product_count()? + 1;
        let now = TimeStamp::new();

        let product = Product {
            id: product_id,
            name: details.name().unwrap_or_default().to_string(),
            variety: details.variety().unwrap_or_default().to_string(),
            quantity: details.quantity(),
            farm_location: details.farm_location().unwrap_or_default().to_string(),
            harvest_date,
            quality_grade: details.quality_grade().unwrap_or_default().to_string(),
            farmer: farmer_wallet.to_string(),
            status: ProductStatus::Harvested,
            distributor: None,
            retailer: None,
            registered_at: now.clone(),
            distributor_added_at: None,
            retailer_added_at: None,
            sold_at: None,
            data_hash,
        };

        let mut history = ProductHistory::new(product_id);
        history.append(TransactionRecord {
            product_id,
            transaction_type: TransactionType::Harvest,
            from: None,
            to: farmer_wallet.to_string(),
            location: product.farm_location.clone(),
            new_status: ProductStatus::Harvested,
            timestamp: now,
            notes: String::new(),
        });

        // Snapshot, genesis record, and counter land together or not at all.
        let mut batch = Batch::default();
        batch.insert(product_key(product_id), minicbor::to_vec(&product)?);
        batch.insert(history_key(product_id), minicbor::to_vec(&history)?);
        batch.insert(PRODUCT_COUNT_KEY, product_id.to_be_bytes().to_vec());
        self.instance.apply_batch(batch)?;

        info!(product_id, farmer = farmer_wallet, "product registered");

        Ok(product)
    }

    /// Fetch a product snapshot by id.
    pub fn get_product(&self, product_id: u64) -> Result<Product, LedgerError> {
        match self.instance.get(product_key(product_id))? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Err(LedgerError::ProductNotFound(product_id)),
        }
    }

    /// Total products ever registered. Ids are dense, so callers may
    /// enumerate `1..=product_count()`.
    pub fn product_count(&self) -> Result<u64, LedgerError> {
        match self.instance.get(PRODUCT_COUNT_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    LedgerError::Decode(minicbor::decode::Error::message(
                        "product counter is corrupt",
                    ))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// All transaction records for a product in insertion order. The full
    /// sequence is re-read on every call, there is no cursor.
    pub fn transactions_for(&self, product_id: u64) -> Result<Vec<TransactionRecord>, LedgerError> {
        // existence check first so an unknown id is a ProductNotFound, not
        // an empty history
        self.get_product(product_id)?;
        Ok(self.load_history(product_id)?.records)
    }

    /// Ids of every product registered by the given farmer wallet.
    pub fn products_by_farmer(&self, farmer_wallet: &str) -> Result<Vec<u64>, LedgerError> {
        let mut ids = vec![];
        for product_id in 1..=self.product_count()? {
            match self.get_product(product_id) {
                Ok(product) if product.farmer == farmer_wallet => ids.push(product_id),
                Ok(_) => {}
                Err(LedgerError::ProductNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(ids)
    }

    /// Validate and apply a custody transfer. Checks run in order and the
    /// first failure rejects the proposal with nothing written:
    ///
    /// 1. the product must exist,
    /// 2. the current custodian is derived from the log tail (never trusted
    ///    from a cached pointer),
    /// 3. the actor must be that custodian,
    /// 4. the declared status must be exactly one stage forward, and a sold
    ///    product can never move again,
    /// 5. the recipient must be registered with the role the new stage
    ///    expects.
    ///
    /// On success the log append and the snapshot update are applied as a
    /// single batch. Accepted transfers are final.
    pub fn propose_transfer(
        &self,
        product_id: u64,
        actor_wallet: &str,
        recipient_wallet: &str,
        declared_status: ProductStatus,
        location: &str,
        transaction_type: TransactionType,
        notes: &str,
    ) -> Result<Product, LedgerError> {
        let lock = self.product_lock(product_id);
        let result = {
            let _guard = lock.lock();
            self.apply_transfer(
                product_id,
                actor_wallet,
                recipient_wallet,
                declared_status,
                location,
                transaction_type,
                notes,
            )
        };
        drop(lock);
        self.release_product_lock(product_id);
        result
    }

    // the body of a transfer; callers hold the product's lock
    fn apply_transfer(
        &self,
        product_id: u64,
        actor_wallet: &str,
        recipient_wallet: &str,
        declared_status: ProductStatus,
        location: &str,
        transaction_type: TransactionType,
        notes: &str,
    ) -> Result<Product, LedgerError> {
        let mut product = self.get_product(product_id)?;
        let mut history = self.load_history(product_id)?;

        let custodian = match history.current_holder(&product) {
            Ok(holder) => holder,
            Err(err @ LedgerError::NoTransactionHistory(_)) => {
                warn!(
                    product_id,
                    status = %product.status,
                    "snapshot advanced past harvest with an empty transaction log"
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if actor_wallet != custodian {
            return Err(LedgerError::NotCurrentHolder(actor_wallet.to_string()));
        }

        let expected = product
            .status
            .next()
            .ok_or(LedgerError::ProductAlreadySold(product_id))?;
        if declared_status != expected {
            return Err(LedgerError::IllegalStatusTransition {
                from: product.status,
                declared: declared_status,
            });
        }

        let recipient = self.lookup_stakeholder(recipient_wallet)?;
        let expected_role = declared_status.recipient_role();
        if !recipient.is_registered || recipient.role != expected_role {
            return Err(LedgerError::InvalidRecipientRole {
                wallet: recipient_wallet.to_string(),
                expected: expected_role,
            });
        }

        let now = TimeStamp::new();
        let party = StageParty {
            wallet: recipient.wallet.clone(),
            name: recipient.name.clone(),
            organization: recipient.organization.clone(),
        };

        product.status = declared_status;
        match declared_status {
            ProductStatus::AtDistributor => {
                product.distributor = Some(party);
                product.distributor_added_at = Some(now.clone());
            }
            ProductStatus::AtRetailer => {
                product.retailer = Some(party);
                product.retailer_added_at = Some(now.clone());
            }
            ProductStatus::Sold => {
                product.sold_at = Some(now.clone());
            }
            // next() never yields Harvested
            ProductStatus::Harvested => {}
        }

        history.append(TransactionRecord {
            product_id,
            transaction_type,
            from: Some(actor_wallet.to_string()),
            to: recipient_wallet.to_string(),
            location: location.to_string(),
            new_status: declared_status,
            timestamp: now,
            notes: notes.to_string(),
        });

        // Log append and snapshot update are one atomic unit, a reader can
        // see either the pre- or post-transfer pair but never a torn mix.
        let mut batch = Batch::default();
        batch.insert(product_key(product_id), minicbor::to_vec(&product)?);
        batch.insert(history_key(product_id), minicbor::to_vec(&history)?);
        self.instance.apply_batch(batch)?;

        info!(
            product_id,
            actor = actor_wallet,
            recipient = recipient_wallet,
            status = %declared_status,
            "transfer accepted"
        );

        Ok(product)
    }

    /// Fold the snapshot and transaction log into a consumable summary:
    /// current holder plus one timeline entry per realized transition.
    pub fn reconstruct(&self, product_id: u64) -> Result<ProductSummary, LedgerError> {
        let product = self.get_product(product_id)?;
        let history = self.load_history(product_id)?;
        let current_holder = history.current_holder(&product)?;

        Ok(ProductSummary {
            stage_history: history.stage_history(),
            current_holder,
            product,
        })
    }

    /// Opaque-fingerprint authenticity check: does the presented hash match
    /// the one stored at registration. No digest is recomputed here.
    pub fn is_product_authentic(
        &self,
        product_id: u64,
        declared_hash: &str,
    ) -> Result<bool, LedgerError> {
        let product = self.get_product(product_id)?;

        let Some(declared) = normalize_fingerprint(declared_hash) else {
            return Ok(false);
        };
        Ok(normalize_fingerprint(&product.data_hash)
            .map(|stored| stored == declared)
            .unwrap_or(false))
    }

    fn load_history(&self, product_id: u64) -> Result<ProductHistory, LedgerError> {
        match self.instance.get(history_key(product_id))? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Ok(ProductHistory::new(product_id)),
        }
    }
}
