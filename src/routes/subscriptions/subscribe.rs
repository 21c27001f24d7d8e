use actix_web::{
    HttpRequest, HttpResponse, ResponseError,
    http::{
        Method,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, HeaderValue,
        },
    },
    web,
};
use anyhow::Context;
use serde_json::Value;

use crate::{
    configuration::{ResponseStyle, Settings},
    domain::{NewSubscriber, SubscriberEmail, SubscriptionRequest},
    email_client::EmailDelivery,
    routes::helpers::see_other,
    templates,
};

use super::errors::SubscribeError;

pub const WELCOME_SUBJECT: &str = "Welcome to Cigarette Card Club!";
pub const SUCCESS_MESSAGE: &str = "Subscription successful! Check your email for confirmation.";

/// The part of the settings the subscription pipeline needs, shared
/// read-only between workers.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub response_style: ResponseStyle,
    pub thank_you_path: String,
    pub audience_id: Option<String>,
    pub max_body_bytes: usize,
}

impl From<&Settings> for SubscriptionSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            response_style: settings.application.response_style,
            thank_you_path: settings.application.thank_you_path.clone(),
            audience_id: settings.email_client.audience_id().map(Into::into),
            max_body_bytes: settings.application.max_body_bytes,
        }
    }
}

#[derive(serde::Serialize)]
struct SuccessBody {
    success: bool,
    message: &'static str,
}

impl SubscriptionSettings {
    fn success_response(&self) -> HttpResponse {
        match self.response_style {
            ResponseStyle::Json => HttpResponse::Ok().json(SuccessBody {
                success: true,
                message: SUCCESS_MESSAGE,
            }),
            ResponseStyle::Redirect => see_other(&self.thank_you_path),
        }
    }

    fn finalize(&self, mut response: HttpResponse) -> HttpResponse {
        if self.response_style == ResponseStyle::Json {
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            );
        }
        response
    }
}

#[tracing::instrument(
    name = "Handling a subscription request",
    skip(request, payload, email_client, settings),
    fields(
        method = %request.method(),
        subscriber_email = tracing::field::Empty
    )
)]
pub async fn subscribe<D: EmailDelivery + 'static>(
    request: HttpRequest,
    payload: web::Payload,
    email_client: web::Data<D>,
    settings: web::Data<SubscriptionSettings>,
) -> HttpResponse {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    // Only a POST body is ever looked at.
    let body = if *request.method() == Method::POST {
        read_body(payload, settings.max_body_bytes).await
    } else {
        Ok(web::Bytes::new())
    };
    let outcome = match body {
        Ok(body) => {
            handle_subscription(
                request.method(),
                content_type,
                &body,
                email_client.get_ref(),
                &settings,
            )
            .await
        }
        Err(e) => Err(e),
    };

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            match &e {
                SubscribeError::MethodNotAllowed | SubscribeError::ValidationError(_) => {
                    tracing::info!(error.cause_chain = ?e, "Rejected a subscription request")
                }
                _ => tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to handle a subscription request"
                ),
            }
            e.error_response()
        }
    };

    settings.finalize(response)
}

/// Method check, body parse, validation, welcome email, then the optional
/// audience registration. Only the last step is allowed to fail silently.
pub async fn handle_subscription<D: EmailDelivery>(
    method: &Method,
    content_type: Option<&str>,
    body: &[u8],
    email_client: &D,
    settings: &SubscriptionSettings,
) -> Result<HttpResponse, SubscribeError> {
    if *method == Method::OPTIONS && settings.response_style == ResponseStyle::Json {
        return Ok(HttpResponse::Ok().finish());
    }
    if *method != Method::POST {
        return Err(SubscribeError::MethodNotAllowed);
    }

    let request = parse_body(content_type, body)?;
    let new_subscriber: NewSubscriber =
        request.try_into().map_err(SubscribeError::ValidationError)?;
    tracing::Span::current().record(
        "subscriber_email",
        tracing::field::display(&new_subscriber.email),
    );

    send_welcome_email(email_client, &new_subscriber.email).await?;

    if let Some(audience_id) = settings.audience_id.as_deref() {
        register_contact(email_client, audience_id, &new_subscriber.email).await;
    }

    Ok(settings.success_response())
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
}

async fn read_body(payload: web::Payload, limit: usize) -> Result<web::Bytes, SubscribeError> {
    match payload.to_bytes_limited(limit).await {
        Ok(body) => body.map_err(|e| SubscribeError::MalformedBody(e.to_string())),
        Err(_) => Err(SubscribeError::MalformedBody(format!(
            "The request body is larger than {limit} bytes"
        ))),
    }
}

fn parse_body(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<SubscriptionRequest, SubscribeError> {
    if is_json(content_type) {
        parse_json_body(body)
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| SubscribeError::MalformedBody(e.to_string()))
    }
}

/// Only a JSON object can carry an address. Any other non-null document has
/// no `email` field and falls through to validation.
fn parse_json_body(body: &[u8]) -> Result<SubscriptionRequest, SubscribeError> {
    let document: Value =
        serde_json::from_slice(body).map_err(|e| SubscribeError::MalformedBody(e.to_string()))?;

    let email = match document {
        Value::Null => {
            return Err(SubscribeError::MalformedBody(
                "Cannot read `email` of null".into(),
            ));
        }
        Value::Object(mut fields) => fields.remove("email"),
        _ => None,
    };

    match email {
        None | Some(Value::Null) => Ok(SubscriptionRequest::default()),
        Some(Value::String(email)) => Ok(SubscriptionRequest { email: Some(email) }),
        Some(other) => Err(SubscribeError::MalformedBody(format!(
            "`email` must be a string, found {other}"
        ))),
    }
}

#[tracing::instrument(name = "Sending a welcome email", skip(email_client))]
async fn send_welcome_email<D: EmailDelivery>(
    email_client: &D,
    recipient: &SubscriberEmail,
) -> Result<(), SubscribeError> {
    let html = templates::render(templates::WELCOME_EMAIL, &[])
        .context("Failed to render the welcome email.")?;

    let delivery_id = email_client
        .send_email(recipient, WELCOME_SUBJECT, &html)
        .await
        .map_err(SubscribeError::UpstreamError)?;
    tracing::info!(%delivery_id, "Welcome email accepted by the provider");

    Ok(())
}

#[tracing::instrument(name = "Adding the subscriber to the audience", skip(email_client))]
async fn register_contact<D: EmailDelivery>(
    email_client: &D,
    audience_id: &str,
    email: &SubscriberEmail,
) {
    match email_client.register_contact(audience_id, email, false).await {
        Ok(contact_id) => tracing::info!(%contact_id, "Subscriber added to the audience"),
        Err(e) => tracing::warn!(
            error.cause_chain = ?e,
            error.message = %e,
            "Failed to add the subscriber to the audience"
        ),
    }
}
