use crate::cli::call_daemon;
use anyhow::Result;

pub async fn run() -> Result<()> {
    call_daemon::<_, ()>("Refresh", &()).await?;
    println!("Refresh triggered successfully");
    Ok(())
}
