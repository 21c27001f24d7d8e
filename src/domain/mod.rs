mod card;
mod new_subscriber;
mod subscriber_email;

pub use card::{CardMetadata, clean_tag_value};
pub use new_subscriber::{NewSubscriber, SubscriptionRequest};
pub use subscriber_email::SubscriberEmail;
