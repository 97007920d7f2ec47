//! Upstream "does this contact exist" call against the messaging provider.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    switchboard_config::ProviderConfig,
    tracing::debug,
};

use crate::{ContactError, Result};

/// A successful upstream answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found {
        name: Option<String>,
        picture_url: Option<String>,
    },
    /// The provider confirmed there is no such contact.
    Absent,
}

/// Consumed contact lookup. Errors mean "unknown", never "absent".
#[async_trait]
pub trait ContactLookup: Send + Sync {
    async fn fetch_contact(&self, instance_name: &str, phone_number: &str)
    -> Result<LookupOutcome>;
}

#[derive(Debug, Deserialize)]
struct NumberCheck {
    #[serde(default)]
    exists: bool,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilePicture {
    #[serde(default)]
    profile_picture_url: Option<String>,
}

/// HTTP client for the provider's REST API.
pub struct HttpContactLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl HttpContactLookup {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ContactError::transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.timeout(),
        )
    }

    /// The instance name is one encoded path segment; it never reaches
    /// another provider route.
    fn post(&self, path: &str, instance_name: &str) -> Result<reqwest::RequestBuilder> {
        if matches!(instance_name.trim(), "" | "." | "..") {
            return Err(ContactError::InvalidInstance {
                name: instance_name.to_string(),
            });
        }
        let url = format!(
            "{}/chat/{path}/{}",
            self.base_url,
            urlencoding::encode(instance_name)
        );
        let req = self.client.post(url);
        Ok(match &self.api_key {
            Some(key) => req.header("apikey", key.expose_secret()),
            None => req,
        })
    }

    async fn check_number(&self, instance_name: &str, phone_number: &str) -> Result<Vec<NumberCheck>> {
        let response = self
            .post("whatsappNumbers", instance_name)?
            .json(&serde_json::json!({ "numbers": [phone_number] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContactError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(ContactError::decode)
    }

    /// Profile pictures are optional decoration; failures yield `None`.
    async fn profile_picture(&self, instance_name: &str, phone_number: &str) -> Option<String> {
        let response = self
            .post("fetchProfilePictureUrl", instance_name)
            .ok()?
            .json(&serde_json::json!({ "number": phone_number }))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(
                instance = instance_name,
                phone = phone_number,
                status = response.status().as_u16(),
                "profile picture lookup failed"
            );
            return None;
        }
        let picture: ProfilePicture = response.json().await.ok()?;
        picture
            .profile_picture_url
            .filter(|url| !url.trim().is_empty())
    }
}

#[async_trait]
impl ContactLookup for HttpContactLookup {
    async fn fetch_contact(
        &self,
        instance_name: &str,
        phone_number: &str,
    ) -> Result<LookupOutcome> {
        if self.base_url.is_empty() {
            return Err(ContactError::not_configured("provider.base_url is empty"));
        }

        let checks = self.check_number(instance_name, phone_number).await?;
        let Some(check) = checks.into_iter().next() else {
            return Ok(LookupOutcome::Absent);
        };
        if !check.exists {
            return Ok(LookupOutcome::Absent);
        }

        let picture_url = self.profile_picture(instance_name, phone_number).await;
        Ok(LookupOutcome::Found {
            name: check.name.filter(|n| !n.trim().is_empty()),
            picture_url,
        })
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
