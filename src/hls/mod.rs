pub mod assemble;
pub mod fetcher;
pub mod parser;
pub mod pool;
pub mod select;
pub mod types;

use crate::common::errors::{Error, Result};

pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let res = client
        .get(url)
        .header("Accept", "application/x-mpegURL, */*")
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(Error::Network(format!(
            "playlist fetch failed {}: {}",
            res.status(),
            url
        )));
    }

    Ok(res.text().await?)
}
