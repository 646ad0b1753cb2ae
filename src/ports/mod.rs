pub mod completion;
pub mod config;
pub mod export;
pub mod http;
pub mod speech;

pub use completion::CompletionClient;
pub use config::ConfigStore;
pub use export::ArtifactExporter;
pub use http::HttpClient;
pub use speech::SpeechEngine;
