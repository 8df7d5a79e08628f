#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use nprpc::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    simple_logger::init_with_level(config.log.level.as_level())?;

    if config.rpc.tcp_port.is_none() && config.rpc.http_port.is_none() {
        log::warn!("no listeners configured, the process will idle without accepting connections");
    }

    let rpc = nprpc::startup(config).await?;
    log::info!("rpc origin {} listening as {}", rpc.origin(), rpc.hostname());

    std::future::pending::<()>().await;
    Ok(())
}
