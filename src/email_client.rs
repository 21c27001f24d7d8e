use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::SubscriberEmail;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("invalid email provider url: {0}")]
    Url(String),
}

/// The two provider operations the subscription pipeline relies on.
pub trait EmailDelivery {
    /// Sends a single HTML email from the configured sender, returning the
    /// provider's delivery id.
    fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    /// Adds `email` to the audience identified by `audience_id`, returning
    /// the provider's contact id.
    fn register_contact(
        &self,
        audience_id: &str,
        email: &SubscriberEmail,
        unsubscribed: bool,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: Client,
    base_url: Url,
    sender: SubscriberEmail,
    auth_token: SecretString,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Serialize)]
struct CreateContactRequest<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    unsubscribed: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTag {
    pub name: String,
    pub value: String,
}

#[derive(Serialize)]
struct CreateBroadcastRequest<'a> {
    audience_id: &'a str,
    from: &'a str,
    subject: &'a str,
    html: &'a str,
    tags: &'a [BroadcastTag],
}

#[derive(Serialize)]
struct EmptyBody {}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        auth_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(&base_url).map_err(|e| Error::Url(e.to_string()))?,
            sender,
            auth_token,
        })
    }

    #[tracing::instrument(name = "Creating a broadcast", skip(self, html_content, tags))]
    pub async fn create_broadcast(
        &self,
        audience_id: &str,
        subject: &str,
        html_content: &str,
        tags: &[BroadcastTag],
    ) -> Result<String, Error> {
        let body = CreateBroadcastRequest {
            audience_id,
            from: self.sender.as_ref(),
            subject,
            html: html_content,
            tags,
        };
        self.post("broadcasts", &body).await
    }

    #[tracing::instrument(name = "Sending a broadcast", skip(self))]
    pub async fn send_broadcast(&self, broadcast_id: &str) -> Result<String, Error> {
        self.post(&format!("broadcasts/{broadcast_id}/send"), &EmptyBody {})
            .await
    }

    async fn post<B: Serialize + ?Sized>(&self, route: &str, body: &B) -> Result<String, Error> {
        let url = self
            .base_url
            .join(route)
            .map_err(|e| Error::Url(e.to_string()))?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(self.auth_token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&raw)
                .map(|b| b.message)
                .unwrap_or_else(|_| {
                    if raw.is_empty() {
                        format!("The email provider responded with {status}")
                    } else {
                        raw
                    }
                });
            return Err(Error::Rejected { status, message });
        }

        let created: CreatedResponse = response.json().await?;
        Ok(created.id)
    }
}

impl EmailDelivery for EmailClient {
    #[tracing::instrument(
        name = "Sending an email",
        skip(self, html_content),
        fields(recipient = %recipient)
    )]
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<String, Error> {
        let body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: vec![recipient.as_ref()],
            subject,
            html: html_content,
        };
        self.post("emails", &body).await
    }

    #[tracing::instrument(name = "Registering a contact", skip(self), fields(email = %email))]
    async fn register_contact(
        &self,
        audience_id: &str,
        email: &SubscriberEmail,
        unsubscribed: bool,
    ) -> Result<String, Error> {
        let body = CreateContactRequest {
            email: email.as_ref(),
            first_name: "",
            last_name: "",
            unsubscribed,
        };
        self.post(&format!("audiences/{audience_id}/contacts"), &body)
            .await
    }
}
