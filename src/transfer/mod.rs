mod fetch;
mod frame;
mod progress;
mod serve;

pub use fetch::{fetch_objects, IN_FLIGHT_LIMIT};
pub use frame::Frame;
pub use progress::{CountingReader, CountingWriter, ProgressMeter};
pub use serve::{push_objects, receive_objects, serve_objects};
