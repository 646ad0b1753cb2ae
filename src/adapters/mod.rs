pub mod config_store;
pub mod gemini;
pub mod html_exporter;
pub mod http_client;
pub mod terminal_speech;

pub use config_store::TomlConfigStore;
pub use gemini::GeminiClient;
pub use html_exporter::HtmlFileExporter;
pub use http_client::GuardedHttpClient;
pub use terminal_speech::TerminalSpeechEngine;
