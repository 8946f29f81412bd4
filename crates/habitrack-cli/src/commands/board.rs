use habitrack_core::{BoardSnapshot, LiveBoard};
use tracing::info;

use super::context::AppContext;
use super::{print_json, CommandResult};

pub async fn run_board() -> CommandResult {
    let ctx = AppContext::connect().await?;
    print_json(&ctx.tracker.snapshot().await?)?;
    Ok(())
}

/// One snapshot per line so the stream can be piped.
fn emit(snapshot: &BoardSnapshot) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}

pub async fn run_watch() -> CommandResult {
    let ctx = AppContext::connect().await?;
    let mut board = LiveBoard::open(ctx.tracker.clone()).await?;
    let mut changes = board.changes();
    emit(&changes.borrow_and_update())?;

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                emit(&snapshot)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    board.close();
    Ok(())
}
