use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    ackbucket_cli::run().await
}
