#[tokio::main]
async fn main() -> std::io::Result<()> {
    twin_server::run_with_config().await
}
