//! Domain models shared between drop-server and clients

pub mod drop;

pub use drop::{
    AccessTier, Drop, DropCreate, DropStatus, DropUpdate, SaleRecord, StockUpdate, Variant,
    VariantCreate,
};
