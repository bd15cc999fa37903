use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    embedload_cli::main_entry().await
}
