use super::SubscriberEmail;

/// Wire shape of a subscription request; the same for JSON and form bodies.
#[derive(serde::Deserialize, Debug, Default)]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
}

impl TryFrom<SubscriptionRequest> for NewSubscriber {
    type Error = String;

    fn try_from(value: SubscriptionRequest) -> Result<Self, Self::Error> {
        let email = value
            .email
            .ok_or_else(|| "The email field is missing.".to_string())?;
        let email = SubscriberEmail::parse(email)?;
        Ok(Self { email })
    }
}
