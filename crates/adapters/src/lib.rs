mod anthropic;
mod base_url;
mod error;
mod gemini;
mod http;
mod openai;
mod registry;

pub use anthropic::{AnthropicProvider, KNOWN_MODELS as ANTHROPIC_MODELS};
pub use base_url::{resolve_base_url, ANTHROPIC_BASE_URL, GEMINI_BASE_URL, OPENAI_BASE_URL};
pub use error::AdapterError;
pub use gemini::GeminiProvider;
pub use http::{ProviderOptions, DEFAULT_TIMEOUT};
pub use openai::OpenAiProvider;
pub use registry::{connect_providers, create_provider, provider_options};
