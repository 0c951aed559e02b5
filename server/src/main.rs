#[tokio::main]
async fn main() {
    forecourt::start_server().await;
}
