use std::time::Duration;

use url::Url;

use crate::BackendError;

const DEFAULT_QUOTES_TABLE: &str = "quotes";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL; always ends with `/` so relative joins keep its path.
    pub url: Url,
    pub api_key: String,
    pub quotes_table: String,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let mut url = Url::parse(url.trim())
            .map_err(|err| BackendError::Config(format!("invalid backend url: {err}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::Config("backend api key is empty".into()));
        }

        Ok(Self {
            url,
            api_key,
            quotes_table: DEFAULT_QUOTES_TABLE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_quotes_table(mut self, table: impl Into<String>) -> Self {
        self.quotes_table = table.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.url
            .join(path)
            .map_err(|err| BackendError::Config(format!("invalid backend path '{path}': {err}")))
    }
}
