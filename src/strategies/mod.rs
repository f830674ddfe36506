pub mod llm;
pub mod traits;
