use cardclub::{
    configuration::{ResponseStyle, Settings, get_configuration},
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};
use once_cell::sync::Lazy;
use wiremock::MockServer;

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub const AUDIENCE_ID: &str = "78261eea-8f8b-4381-83c6-79fa7120f1cf";

pub struct TestApp {
    pub address: String,
    pub email_server: MockServer,
    pub api_client: reqwest::Client,
}

impl TestApp {
    pub fn subscriptions_url(&self) -> String {
        format!("{}/subscriptions", self.address)
    }

    pub async fn post_json(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(self.subscriptions_url())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_form(&self, body: &str) -> reqwest::Response {
        self.api_client
            .post(self.subscriptions_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.to_owned())
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn request(&self, method: reqwest::Method) -> reqwest::Response {
        self.api_client
            .request(method, self.subscriptions_url())
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

/// JSON style, audience configured.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_redirect_app() -> TestApp {
    spawn_app_with(|c| c.application.response_style = ResponseStyle::Redirect).await
}

pub async fn spawn_app_without_audience() -> TestApp {
    spawn_app_with(|c| c.email_client.audience_id = None).await
}

pub async fn spawn_app_with(customise: impl FnOnce(&mut Settings)) -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;

    let config = {
        let mut c = get_configuration().expect("Failed to read configuration");
        c.application.port = 0;
        c.application.response_style = ResponseStyle::Json;
        c.email_client.base_url = email_server.uri();
        c.email_client.audience_id = Some(AUDIENCE_ID.into());
        customise(&mut c);
        c
    };

    let application = Application::build(config)
        .await
        .expect("Failed to build application.");
    let port = application.get_port();
    let _ = tokio::spawn(application.run_until_stopped());

    let api_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        email_server,
        api_client,
    }
}
