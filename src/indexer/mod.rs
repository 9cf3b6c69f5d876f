pub mod pipeline;

pub use pipeline::IndexerPipeline;
