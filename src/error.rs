use crate::product::ProductStatus;
use crate::stakeholder::Role;

/// Rejections raised while validating a registration or custody transfer,
/// plus the storage/codec failures the ledger can surface.
///
/// Every validation variant is a clean rejection: nothing is written when one
/// is returned. `NoTransactionHistory` means the stored snapshot and the
/// transaction log disagree and should be treated as an integrity fault
/// rather than a user error.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("wallet {0} is already registered as a stakeholder")]
    AlreadyRegistered(String),
    #[error("wallet {wallet} must hold the {required} role for this operation")]
    UnauthorizedRole { wallet: String, required: Role },
    #[error("product {0} does not exist")]
    ProductNotFound(u64),
    #[error("product {0} advanced past harvest but its transaction log is empty")]
    NoTransactionHistory(u64),
    #[error("wallet {0} is not the current holder of this product")]
    NotCurrentHolder(String),
    #[error("cannot move product from {from} to {declared}")]
    IllegalStatusTransition {
        from: ProductStatus,
        declared: ProductStatus,
    },
    #[error("product {0} has already been sold")]
    ProductAlreadySold(u64),
    #[error("recipient {wallet} is not a registered {expected}")]
    InvalidRecipientRole { wallet: String, expected: Role },
    #[error(transparent)]
    Details(#[from] DetailsError),
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error("failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
}

/// Field-level failures from finalising a product registration draft.
#[derive(thiserror::Error, Debug)]
pub enum DetailsError {
    #[error("required field `{0}` is not set")]
    MissingField(&'static str),
    #[error("quantity is set to zero")]
    ZeroQuantity,
}
