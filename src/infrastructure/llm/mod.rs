mod dify;
mod http_client;
mod managed;
mod openai;
mod qwen;
mod registry;
mod sse;

pub use dify::{DifyConfig, DifyProvider};
pub use http_client::{ByteStream, HttpClient, HttpClientTrait};
pub use managed::{ManagedProvider, ProviderBackend};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use qwen::{QwenConfig, QwenProvider};
pub use registry::ProviderRegistry;
