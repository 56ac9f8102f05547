pub mod csv_loader;
pub mod image_upload;
pub mod llm_agent;
pub mod summarizer;
pub mod summary_cache;
