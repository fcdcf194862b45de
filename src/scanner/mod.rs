pub mod exclusion;
pub mod source_scanner;

pub use exclusion::{ExclusionRule, ExclusionRules};
pub use source_scanner::{ScanOutcome, SkipReason, SkippedEntry, SourceFile, SourceScanner};
