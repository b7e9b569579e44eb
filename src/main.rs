use weblink::config;
use weblink::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_from_env()?;
    runtime::init_tracing(&config);
    config.print_summary();

    runtime::run(config).await
}
