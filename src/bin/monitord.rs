use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use host_monitor::{
    HostPool, InformationManager, MemoryHostPool,
    config::{Config, read_config_file},
    util::get_config_path,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $HOST_MONITOR_CONFIG)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("host_monitor", LevelFilter::DEBUG),
        ("host_monitord", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args
        .file
        .or_else(get_config_path)
        .context("no configuration file given")?;
    let config = read_config_file(&path)?;

    let pool = Arc::new(MemoryHostPool::new());
    let hosts = seed_pool(&pool, &config)?;

    let manager = InformationManager::new(config.manager.clone(), pool.clone()).start()?;

    for oid in hosts {
        let Some(mut host) = pool.get(oid) else {
            continue;
        };

        if manager.commands().start_monitor(&mut host, true).is_err() {
            // keep the diagnostic written by start_monitor
            if let Err(e) = pool.update(&host) {
                error!("failed to update host {oid}: {e}");
            }
        }
    }

    info!("information manager running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    manager.shutdown().await?;
    Ok(())
}

fn seed_pool(pool: &MemoryHostPool, config: &Config) -> anyhow::Result<Vec<i32>> {
    let mut hosts = vec![];
    for host in &config.hosts {
        let oid = pool.allocate(&host.name, &host.im_mad, &host.vm_mad)?;
        debug!("registered host {} ({oid})", host.name);
        hosts.push(oid);
    }
    Ok(hosts)
}
