/// Default configuration constants used across the system.

/// Default gateway port.
pub const DEFAULT_SERVER_PORT: u16 = 18290;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";

/// Default OpenAI-compatible API base.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model catalog base (the Hugging Face router).
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://router.huggingface.co/v1";

/// Placeholder key for keyless upstreams that still require the header shape.
pub const PLACEHOLDER_API_KEY: &str = "sk-";

/// Default starter model.
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";

/// Depth of the generation event channel between the adapter and consumers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
