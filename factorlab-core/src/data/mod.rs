//! Data model: cursor-synchronized lines, OHLC tables, frames, instruments.

pub mod fill;
pub mod frame;
pub mod line;
pub mod table;

pub use fill::{fill_ohlc, reindex, AlignedColumns, FillError};
pub use frame::{
    Asset, Base, CommissionKind, ContractSpec, DataError, Frame, Hedge, CLOSE, HIGH, LOW, OPEN,
};
pub use line::{Line, LineError};
pub use table::PriceBar;
