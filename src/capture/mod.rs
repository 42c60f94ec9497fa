//! Traffic capture, kept off the response path.
//!
//! - [`record`]: the [`CaptureRecord`](record::CaptureRecord) written per exchange.
//! - [`tap`]: the one-shot hand-off from an exchange to the sink.
//! - [`sink`]: bounded queue plus single writer task.
//! - [`writer`]: the [`CaptureWriter`](writer::CaptureWriter) seam and the
//!   size-rotated, age-pruned capture file.

pub mod record;
pub mod sink;
pub mod tap;
pub mod writer;

pub use record::{CaptureRecord, CapturedBody, Outcome};
pub use sink::{CaptureSink, CaptureWorker, SinkStats};
pub use tap::CaptureTap;
pub use writer::{CaptureWriter, RollingFileWriter};
