//! Domain types shared by the pipeline stages.

pub mod candle;
pub mod gap;
pub mod symbol;

pub use candle::Candle;
pub use gap::{GapInfo, LogState};
pub use symbol::{SymbolMetadata, SymbolRecord};
