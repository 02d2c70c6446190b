//! Recorded price event source port trait.

use crate::domain::error::EngineError;
use crate::domain::market::PriceEvent;

pub trait EventPort {
    /// Events in timestamp order, optionally restricted to one symbol.
    fn fetch_events(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>, EngineError>;

    fn list_symbols(&self) -> Result<Vec<String>, EngineError>;
}
