#[tokio::main]
async fn main() -> anyhow::Result<()> {
    irrigation_monitor::run().await
}
