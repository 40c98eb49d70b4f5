use anyhow::Context;
use async_trait::async_trait;

use super::{Email, Mailer};

/// Sends mail through a Mailgun-compatible HTTP API.
pub struct MailgunMailer {
    api_base: String,
    domain: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl MailgunMailer {
    pub fn new(api_base: String, domain: String, api_key: String, from: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            domain,
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.domain.is_empty() && !self.api_key.is_empty() && !self.from.is_empty()
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        anyhow::ensure!(self.is_configured(), "mail transport is not configured");

        let url = format!("{}/{}/messages", self.api_base, self.domain);

        self.client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", email.to.as_str()),
                ("subject", email.subject.as_str()),
                ("html", email.html.as_str()),
            ])
            .send()
            .await
            .context("failed to send email")?
            .error_for_status()
            .context("mail API returned error")?;

        Ok(())
    }
}
