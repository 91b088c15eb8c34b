/// Runtime configuration read once at startup from the environment.
///
/// `debug` loosens a few responses for local development (password-reset
/// tokens are echoed back instead of being delivered out of band).
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        let debug = std::env::var("NEXUSD_DEBUG")
            .map(|v| v == "1")
            .unwrap_or(false);
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        Self {
            debug,
            gemini_api_key,
            gemini_model,
        }
    }
}
