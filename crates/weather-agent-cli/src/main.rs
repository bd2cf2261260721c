//! Ask the weather agent a question and print the streamed reply.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use weather_agent_stream::prelude::*;
use weather_agent_stream::init_observability;

#[derive(Debug, Parser)]
#[command(name = "weather-agent", about = "Stream a reply from the weather agent")]
struct Args {
    /// Agent stream endpoint (defaults to WEATHER_AGENT_ENDPOINT or the hosted agent).
    #[arg(long)]
    endpoint: Option<String>,

    /// Conversation thread id; digits are sent as a number.
    #[arg(long, default_value = "12345")]
    thread_id: ThreadId,

    /// Request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// One or more user messages, oldest first.
    #[arg(required = true)]
    messages: Vec<String>,
}

fn build_client(args: &Args) -> Result<WeatherAgentClient, ClientError> {
    let mut config = StreamConfig::from_env()?;
    if let Some(endpoint) = &args.endpoint {
        config = config.endpoint(endpoint.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config = config.timeout(Duration::from_secs(secs));
    }
    WeatherAgentClient::new(config)
}

/// Writes reply deltas, keeping the first write failure.
///
/// Once a write fails (for example a closed pipe) later deltas are skipped.
struct ReplyWriter<W> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> ReplyWriter<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn write(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            tracing::warn!(%err, "failed to write reply to stdout");
            self.error = Some(err);
        }
    }

    fn finish(mut self, end_line: bool) -> io::Result<()> {
        if end_line {
            self.write("\n");
        }
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_observability();
    let args = Args::parse();

    let client = match build_client(&args) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let history: Vec<ChatMessage> = args.messages.iter().map(ChatMessage::user).collect();

    let mut writer = ReplyWriter::new(io::stdout());
    let mut failure: Option<StreamError> = None;
    let phase = client
        .stream_response(
            &history,
            args.thread_id.clone(),
            CallbackSink::new(
                |text: &str| writer.write(text),
                || {},
                |err: StreamError| failure = Some(err),
            ),
        )
        .await;

    let written = writer.finish(phase == Phase::Completed);
    if let Some(err) = failure {
        tracing::error!(%err, "weather agent stream failed");
        eprintln!("An error occurred: {err}. Please try again.");
        return ExitCode::FAILURE;
    }
    if phase != Phase::Completed {
        eprintln!("stream ended in unexpected phase {phase:?}");
        return ExitCode::FAILURE;
    }
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("failed to write reply: {err}");
            ExitCode::FAILURE
        }
    }
}
