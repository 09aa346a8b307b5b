#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jsonstash_server::serve().await
}
