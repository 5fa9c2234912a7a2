//! HTTP collaborators behind the stage traits.

pub mod download;
pub mod feed;
pub mod gemini;
pub mod gradio;
pub mod papers;
pub mod podcast_host;

pub use feed::FeedSource;
pub use gemini::GeminiClient;
pub use gradio::GradioVoice;
pub use papers::DailyPapersClient;
pub use podcast_host::HostPublisher;
