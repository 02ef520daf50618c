//! Semantic terminal parsing module
//!
//! Turns raw assistant output into chat content: normalization, reply
//! extraction, input-wait detection and reporting helpers.

mod extractor;
mod input_wait;
mod normalize;
mod report;

pub use extractor::{BoxBorder, ContentExtractor, LineAssembler, MarkerConfig, OutputPipeline};
pub use input_wait::{InputWaitDetector, EXPLANATION_SUGGESTION, TAIL_LINES};
pub use normalize::{normalize, normalize_chunk, StreamNormalizer};
pub use report::{detect_completion, extract_command, extract_errors};
