//! The daily card broadcast: pick a card nobody has received yet, make sure
//! its image is reachable, and send it to the whole audience.

use reqwest::{Client, Url, header::CONTENT_TYPE};

use crate::{
    card_catalog::{CardCatalog, CatalogError},
    configuration::{BroadcastSettings, Settings},
    domain::{CardMetadata, clean_tag_value},
    email_client::{self, BroadcastTag, EmailClient},
    templates,
};

pub const BROADCAST_SUBJECT: &str = "today's cigarette card";

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("An audience id is required to send a broadcast")]
    MissingAudience,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Invalid image url for card {uuid}: {reason}")]
    InvalidImageUrl { uuid: String, reason: String },
    #[error("Failed to fetch the image of card {uuid}")]
    ImageUnreachable {
        uuid: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("The image of card {uuid} is not an image. Content-Type: {content_type}")]
    NotAnImage { uuid: String, content_type: String },
    #[error("Failed to render the broadcast email")]
    Template(#[from] tera::Error),
    #[error("Failed to create the broadcast")]
    Create(#[source] email_client::Error),
    #[error("Failed to send broadcast {id}")]
    Send {
        id: String,
        #[source]
        source: email_client::Error,
    },
}

pub fn card_image_url(image_base_url: &str, card: &CardMetadata) -> Result<Url, BroadcastError> {
    let endpoint = format!("{}/index.php", image_base_url.trim_end_matches('/'));
    Url::parse_with_params(&endpoint, &[("id", card.image_id.as_str()), ("t", "w")]).map_err(|e| {
        BroadcastError::InvalidImageUrl {
            uuid: card.uuid.clone(),
            reason: e.to_string(),
        }
    })
}

/// Checks that the card image can be fetched and really is an image.
/// Returns the public url the email links to.
#[tracing::instrument(name = "Verifying the card image", skip(http_client, image_base_url))]
pub async fn verify_card_image(
    http_client: &Client,
    image_base_url: &str,
    card: &CardMetadata,
) -> Result<Url, BroadcastError> {
    let url = card_image_url(image_base_url, card)?;
    let unreachable = |source| BroadcastError::ImageUnreachable {
        uuid: card.uuid.clone(),
        source,
    };

    let response = http_client
        .get(url.clone())
        .send()
        .await
        .map_err(unreachable)?
        .error_for_status()
        .map_err(unreachable)?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(BroadcastError::NotAnImage {
            uuid: card.uuid.clone(),
            content_type: content_type.to_owned(),
        });
    }

    Ok(url)
}

pub fn broadcast_tags(card: &CardMetadata) -> Vec<BroadcastTag> {
    vec![
        BroadcastTag {
            name: "content_type".into(),
            value: "cigarette_card".into(),
        },
        BroadcastTag {
            name: "card_title".into(),
            value: clean_tag_value(&card.title),
        },
    ]
}

pub fn broadcast_html(card: &CardMetadata, image_url: &Url) -> Result<String, tera::Error> {
    let date = chrono::Local::now().format("%A, %B %d, %Y").to_string();
    templates::render(
        templates::CARD_BROADCAST,
        &[
            ("date", date.as_str()),
            ("image_url", image_url.as_str()),
            ("title", card.title.as_str()),
        ],
    )
}

/// One attempt: pick, verify, create, send, record.
#[tracing::instrument(name = "Broadcasting a card", skip_all)]
async fn broadcast_once(
    catalog: &mut CardCatalog,
    http_client: &Client,
    email_client: &EmailClient,
    audience_id: &str,
    settings: &BroadcastSettings,
) -> Result<CardMetadata, BroadcastError> {
    let card = catalog.random_unposted_card()?;
    tracing::info!(card.uuid = %card.uuid, card.title = %card.title, "Selected card");

    let image_url = verify_card_image(http_client, &settings.image_base_url, &card).await?;
    let html = broadcast_html(&card, &image_url)?;

    let id = email_client
        .create_broadcast(audience_id, BROADCAST_SUBJECT, &html, &broadcast_tags(&card))
        .await
        .map_err(BroadcastError::Create)?;
    email_client
        .send_broadcast(&id)
        .await
        .map_err(|source| BroadcastError::Send {
            id: id.clone(),
            source,
        })?;
    tracing::info!(broadcast_id = %id, "Broadcast sent");

    if settings.mark_posted {
        catalog.mark_posted(&card.uuid);
        // The broadcast is already out; retrying now would send it twice.
        if let Err(e) = catalog.save() {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to record the posted card"
            );
        }
    } else {
        tracing::info!(card.uuid = %card.uuid, "Not marking the card as posted");
    }

    Ok(card)
}

/// Retries whole attempts, up to `settings.max_attempts`, returning the card
/// that went out or the error of the last attempt.
pub async fn broadcast_with_retries(
    catalog: &mut CardCatalog,
    http_client: &Client,
    email_client: &EmailClient,
    audience_id: &str,
    settings: &BroadcastSettings,
) -> Result<CardMetadata, BroadcastError> {
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match broadcast_once(catalog, http_client, email_client, audience_id, settings).await {
            Ok(card) => return Ok(card),
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    attempt,
                    max_attempts,
                    "Broadcast attempt failed. Retrying"
                );
                tokio::time::sleep(settings.retry_delay()).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn run_broadcast(config: Settings) -> Result<CardMetadata, anyhow::Error> {
    let audience_id = config
        .email_client
        .audience_id()
        .map(str::to_owned)
        .ok_or(BroadcastError::MissingAudience)?;
    let http_client = Client::builder()
        .timeout(config.email_client.timeout())
        .build()?;
    let mut catalog = CardCatalog::load(
        &config.broadcast.metadata_path,
        &config.broadcast.posted_path,
    );
    let email_client = config.email_client.client()?;

    let card = broadcast_with_retries(
        &mut catalog,
        &http_client,
        &email_client,
        &audience_id,
        &config.broadcast,
    )
    .await?;
    Ok(card)
}
