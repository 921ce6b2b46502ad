pub mod broadcaster;
pub mod pipeline;

pub use broadcaster::{PushBroadcaster, PushEvent};
pub use pipeline::{InvalidationOutcome, InvalidationPipeline};
