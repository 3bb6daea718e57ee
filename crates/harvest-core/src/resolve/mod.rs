pub mod driver;
pub mod resolver;

pub use driver::{AttemptPhase, InteractionDriver};
pub use resolver::{ResolvedStream, StreamResolver};
