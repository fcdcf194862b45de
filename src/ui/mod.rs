pub mod logger;
pub mod output;
pub mod progress;
pub mod signals;

pub use logger::setup_logger;
pub use output::{OutputFormatter, OutputMode};
pub use progress::ProgressManager;
pub use signals::GracefulShutdown;
