#[tokio::main]
async fn main() -> anyhow::Result<()> {
    report_downloader_lib::run().await
}
