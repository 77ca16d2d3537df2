#[tokio::main]
async fn main() {
    if let Err(e) = stepscribe::run().await {
        tracing::error!(error = %e, "stepscribe exited with error");
        eprintln!("stepscribe: {e}");
        std::process::exit(1);
    }
}
