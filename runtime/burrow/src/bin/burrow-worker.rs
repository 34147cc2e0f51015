use anyhow::{Context, Result};
use burrow::{console, WorkerArgs, WorkerCommand};
use burrow_worker::Worker;
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    burrow_core::logging::init(&args.log).context("failed to initialise logging")?;

    let worker = Worker::connect(args.config())
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    let handle = worker.handle();
    let running = tokio::spawn(worker.run());
    tokio::pin!(running);

    let mut lines = console::stdin();
    let mut console_open = true;
    loop {
        tokio::select! {
            outcome = &mut running => {
                outcome.context("worker task failed")??;
                info!("proxy closed the tunnel");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line(), if console_open => match line.context("failed to read console")? {
                Some(line) => match WorkerCommand::parse(&line) {
                    Some(WorkerCommand::Quit) => break,
                    Some(WorkerCommand::Message(text)) => {
                        if let Err(e) = handle.message(text).await {
                            warn!(error = %e, "failed to send message");
                        }
                    }
                    None => {}
                },
                None => console_open = false,
            },
        }
    }

    handle.close().await.context("failed to close the tunnel")?;
    if let Err(e) = running.await.context("worker task failed")? {
        warn!(error = %e, "tunnel ended with error");
    }
    Ok(())
}
