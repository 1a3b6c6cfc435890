//! Market data sources

mod simulated;

pub use simulated::SimulatedMarket;
