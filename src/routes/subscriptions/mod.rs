mod errors;
mod subscribe;

pub use errors::SubscribeError;
pub use subscribe::{
    SUCCESS_MESSAGE, SubscriptionSettings, WELCOME_SUBJECT, handle_subscription, subscribe,
};
