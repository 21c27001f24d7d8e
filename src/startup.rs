use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::email_client::EmailDelivery;
use crate::routes::{SubscriptionSettings, health_check, subscribe};

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let subscription_settings = SubscriptionSettings::from(&config);
        let email_client = config.email_client.client()?;

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();
        tracing::info!(%address, port, "Listening for subscriptions");

        let server = run(listener, email_client, subscription_settings)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run<D>(
    listener: TcpListener,
    email_client: D,
    settings: SubscriptionSettings,
) -> Result<Server, std::io::Error>
where
    D: EmailDelivery + Send + Sync + 'static,
{
    let email_client = web::Data::new(email_client);
    let settings = web::Data::new(settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::to(subscribe::<D>))
            .app_data(email_client.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
