#[tokio::main]
async fn main() -> std::io::Result<()> {
    session_mirror::run_with_config().await
}
