use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    stagehand_cli::run().await
}
