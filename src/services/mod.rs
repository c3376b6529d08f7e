pub mod llm;
pub mod markdown;
pub mod prompts;
pub mod transport;
