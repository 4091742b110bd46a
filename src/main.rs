use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,attendd=debug")),
        )
        .init();

    let config = attendd::config::Config::from_env()?;
    tracing::info!(
        addr = %config.addr,
        data_dir = %config.data_dir.display(),
        "starting attendd"
    );
    attendd::serve(config).await
}
