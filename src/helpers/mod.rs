pub mod download;
pub mod extract;

use reqwest::Client;

use crate::settings::Settings;

/// One client per run: carries the browser user agent the knowledge base
/// expects and the configured request timeout.
pub fn http_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent())
        .timeout(settings.timeout())
        .build()
}
