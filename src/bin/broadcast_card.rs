use cardclub::{
    broadcast::run_broadcast,
    configuration::get_configuration,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("broadcast_card".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration()?;
    match run_broadcast(config).await {
        Ok(card) => {
            tracing::info!(card.uuid = %card.uuid, card.title = %card.title, "Card broadcast");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "All broadcast attempts failed"
            );
            Err(e)
        }
    }
}
