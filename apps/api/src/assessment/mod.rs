pub mod extractor;
pub mod gap_scorer;
pub mod handlers;
pub mod normalizer;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod scoring;
