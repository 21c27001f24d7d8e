use cardclub::{
    configuration::get_configuration,
    nypl_client::run_download,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("download_metadata".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration()?;
    match run_download(config).await {
        Ok(summary) => {
            tracing::info!(
                collections = summary.collections,
                captures = summary.captures,
                path = %summary.metadata_path.display(),
                "Download complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to download the card metadata"
            );
            Err(e)
        }
    }
}
