#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lexicon_backend::run().await
}
