#[tokio::main]
async fn main() -> anyhow::Result<()> {
    focus_timer_lib::run().await
}
