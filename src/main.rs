use anyhow::Result;

use webagent::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("webagent=info"))
        .init();
    run_cli().await
}
