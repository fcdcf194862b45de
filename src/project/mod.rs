pub mod combiner;
pub mod output_manager;
pub mod progress;
pub mod reconstructor;

pub use combiner::{CombineReport, Combiner, IncludedFile, PathCommentStatus};
pub use output_manager::{write_document, DestinationState, OutputManager};
pub use progress::WorkProgress;
pub use reconstructor::{validate_relative_path, ReconstructionReport, Reconstructor, WrittenFile};
