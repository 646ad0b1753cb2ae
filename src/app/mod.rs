mod acquirer;
mod controller;
mod orchestrator;
mod pacer;

pub use acquirer::SourceAcquirer;
pub use controller::AppController;
pub use orchestrator::{GenerationOrchestrator, GenerationPolicy};
pub use pacer::SpeechPacer;
