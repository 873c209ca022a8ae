use std::time::Duration;

use reqwest::{Client, Proxy};

use crate::common::errors::{Error, Result};

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; Torii/0.3)";

/// Builds the shared HTTP client every pipeline component uses.
///
/// The client is read-only after construction and cheap to clone
/// (reqwest clients share their connection pool).
pub struct HttpClient;

impl HttpClient {
    pub fn new(
        user_agent: Option<&str>,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .timeout(timeout);

        if let Some(proxy) = proxy {
            builder = builder.proxy(
                Proxy::all(proxy).map_err(|e| Error::Network(format!("invalid proxy: {}", e)))?,
            );
        }

        Ok(builder.build()?)
    }
}
