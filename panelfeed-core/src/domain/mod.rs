//! Domain types for PanelFeed

pub mod instrument;
pub mod series;

pub use instrument::{Instrument, InstrumentError};
pub use series::{
    AlignedPanel, DailySeries, PanelColumn, QuarterlySeries, RawColumn, RawTable, SeriesError,
};
