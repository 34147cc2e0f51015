use anyhow::{Context, Result};
use burrow::{console, ServerArgs, ServerCommand};
use burrow_proxy::ProxyServer;
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    burrow_core::logging::init(&args.log).context("failed to initialise logging")?;

    let server = ProxyServer::bind(args.config())
        .await
        .with_context(|| format!("failed to bind {} and {}", args.tcp_listen, args.http_listen))?;
    let handle = server.handle();
    let running = tokio::spawn(server.run());

    let mut lines = console::stdin();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => match line.context("failed to read console")? {
                Some(line) => match ServerCommand::parse(&line) {
                    Some(ServerCommand::Status) => {
                        info!(listen = %args.tcp_listen, "status\n{}", handle.status());
                    }
                    Some(ServerCommand::Stop) => break,
                    Some(ServerCommand::Unknown(command)) => {
                        warn!(command = %command, "unknown command, expected `status` or `stop`");
                    }
                    None => {}
                },
                None => {
                    // no console attached
                    tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
                    info!("interrupted");
                    break;
                }
            },
        }
    }

    handle.shutdown();
    running.await.context("proxy task failed")??;
    Ok(())
}
