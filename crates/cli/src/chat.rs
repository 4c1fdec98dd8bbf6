use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use ackbucket_agent::{CapabilitySession, ConversationOrchestrator, InferenceEngine};

pub const BANNER: &str = "ackbucket client started. Ask for a bucket, or type 'quit' to exit.";
const PROMPT: &[u8] = b"\nQuery: ";

/// Reads queries line by line until `quit` or end of input. Each query is
/// answered before the next one is read; failures are printed and the loop
/// keeps going. Bytes that are not UTF-8 are replaced, not fatal. Returns the
/// number of queries answered.
pub async fn chat_loop<E, S, R, W>(
    orchestrator: &ConversationOrchestrator<E>,
    session: &S,
    mut input: R,
    output: &mut W,
) -> std::io::Result<usize>
where
    E: InferenceEngine,
    S: CapabilitySession + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(BANNER.as_bytes()).await?;
    output.write_all(b"\n").await?;

    let mut buffer = Vec::new();
    let mut answered = 0;
    loop {
        output.write_all(PROMPT).await?;
        output.flush().await?;

        buffer.clear();
        if input.read_until(b'\n', &mut buffer).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buffer);
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        let answer = orchestrator.respond(session, query).await;
        output.write_all(format!("\n{answer}\n").as_bytes()).await?;
        answered += 1;
    }

    output.flush().await?;
    Ok(answered)
}
