#[tokio::main]
async fn main() {
    taskflow_app::run().await;
}
