//! J/psi Extraction Environment Layer
//!
//! This crate holds the contracts between the extraction core and its
//! external collaborators, so the core never depends on a concrete event
//! generator or output format:
//!
//! - **Event record**: [`Event`] / [`Particle`] with mother and daughter links
//! - **Generator**: [`EventGenerator`] (`configure → initialize → next_event`)
//! - **Output**: [`RecordSink`] (`write → close`) and [`DatasetMerger`]
//!
//! # Example
//!
//! ```ignore
//! use jpsi_env::{EventGenerator, RecordSink};
//!
//! fn drain<G: EventGenerator, S: RecordSink<Event>>(gen: &mut G, sink: &mut S) {
//!     gen.initialize()?;
//!     while let Some(event) = gen.next_event() {
//!         sink.write(&event)?;
//!     }
//!     sink.close()?;
//! }
//! ```

mod error;
mod generator;
mod memory;
mod sink;
mod types;

pub use error::EnvError;
pub use generator::{parse_flag, parse_setting, EventGenerator, GeneratorStats};
pub use memory::{ConcatMerger, MemorySink};
pub use sink::{DatasetMerger, RecordSink};
pub use types::{Event, Particle, WorkerId};
