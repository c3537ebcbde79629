mod host;
mod mqtt_device;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
