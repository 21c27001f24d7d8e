use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_aux::field_attributes::deserialize_number_from_string;
use validator::ValidateEmail;

use crate::domain::SubscriberEmail;
use crate::email_client::EmailClient;

pub const DEFAULT_SENDER_EMAIL: &str = "cards@cigarettecard.club";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub email_client: EmailClientSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub nypl: NyplSettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    #[serde(default)]
    pub response_style: ResponseStyle,
    #[serde(default = "default_thank_you_path")]
    pub thank_you_path: String,
    #[serde(
        default = "default_max_body_bytes",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub max_body_bytes: usize,
}

/// How a successful subscription is reported back to the caller.
#[derive(serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    /// `200` with a JSON body; CORS headers on every response.
    #[default]
    Json,
    /// `303 See Other` pointing at the thank-you page.
    Redirect,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    #[serde(default = "default_sender_email")]
    pub sender_email: String,
    pub auth_token: SecretString,
    #[serde(default)]
    pub audience_id: Option<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
}

impl EmailClientSettings {
    pub fn client(self) -> Result<EmailClient, anyhow::Error> {
        let sender = self.sender().map_err(anyhow::Error::msg)?;
        let timeout = self.timeout();
        Ok(EmailClient::new(
            self.base_url,
            sender,
            self.auth_token,
            timeout,
        )?)
    }

    /// The sender is operator-supplied, so it gets a strict check rather than
    /// the coarse one subscribers go through.
    pub fn sender(&self) -> Result<SubscriberEmail, String> {
        if !self.sender_email.validate_email() {
            return Err(format!(
                "{} is not a valid sender email address.",
                self.sender_email
            ));
        }
        SubscriberEmail::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// An empty audience id counts as not configured.
    pub fn audience_id(&self) -> Option<&str> {
        self.audience_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BroadcastSettings {
    pub metadata_path: PathBuf,
    pub posted_path: PathBuf,
    pub image_base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_delay_ms: u64,
    /// Off for test runs, so the same card can be broadcast again.
    pub mark_posted: bool,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            metadata_path: "metadata.json".into(),
            posted_path: "posted_cards.json".into(),
            image_base_url: "https://images.nypl.org".into(),
            max_attempts: 5,
            retry_delay_ms: 2000,
            mark_posted: true,
        }
    }
}

impl BroadcastSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Access to the NYPL Digital Collections API the card metadata comes from.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NyplSettings {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub collections: Vec<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub per_page: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_delay_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
    /// Where the per-collection files go. The merged file goes to
    /// `broadcast.metadata_path`.
    pub output_dir: PathBuf,
}

impl Default for NyplSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.repo.nypl.org/api/v2".into(),
            token: None,
            collections: vec![],
            per_page: 50,
            page_delay_ms: 1000,
            timeout_ms: 30000,
            output_dir: ".".into(),
        }
    }
}

impl NyplSettings {
    pub fn token(&self) -> Option<&SecretString> {
        self.token
            .as_ref()
            .filter(|token| !token.expose_secret().trim().is_empty())
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_sender_email() -> String {
    DEFAULT_SENDER_EMAIL.into()
}

fn default_thank_you_path() -> String {
    "/thank-you.html".into()
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "{other} is not supported environment. Try to use `local` or `production`",
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, anyhow::Error> {
    let base_path = std::env::current_dir()?;
    let conf_dir = base_path.join("configuration");
    let env: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(anyhow::Error::msg)?;

    let settings = config::Config::builder()
        .add_source(config::File::from(conf_dir.join("base.yaml")).required(true))
        .add_source(
            config::File::from(conf_dir.join(format!("{}.yaml", env.as_str()))).required(true),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .prefix_separator("_"),
        )
        // The email provider's conventional variable names win over everything else.
        .set_override_option("email_client.auth_token", provider_var("RESEND_API_KEY"))?
        .set_override_option("email_client.sender_email", provider_var("FROM_EMAIL"))?
        .set_override_option("email_client.audience_id", provider_var("RESEND_AUDIENCE_ID"))?
        .set_override_option("broadcast.metadata_path", provider_var("METADATA_PATH"))?
        .set_override_option("broadcast.posted_path", provider_var("POSTED_PATH"))?
        .set_override_option("nypl.token", provider_var("NYPL_TOKEN"))?
        .set_override_option(
            "broadcast.mark_posted",
            provider_var("MODE").filter(|mode| mode == "test").map(|_| false),
        )?
        .build()?;

    Ok(settings.try_deserialize::<Settings>()?)
}

fn provider_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
