//! Progress normalization for downloader output.
//!
//! [`ProgressParser`] is the per-task state machine; [`ProgressCoalescer`]
//! thins the resulting stream for observers that redraw on every update.

mod coalescer;
mod parser;

pub use coalescer::{DEFAULT_MIN_INTERVAL, ProgressCoalescer};
pub use parser::{
    DestinationKind, POSTPROCESSING_LABEL, PREPARING_LABEL, Phase, ProgressParser,
    ProgressUpdate, TRANSIENT_SUFFIXES,
};
