use weather_agent_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    weather_agent_stream::init_observability();
    let client = WeatherAgentClient::from_env()?;

    let mut stream = client.start_stream(
        &[ChatMessage::user("What's the weather like in Berlin today?")],
        12345_i64,
    )?;

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Delta { text, .. } => print!("{text}"),
            StreamEvent::Completed { .. } => println!(),
            StreamEvent::Error { error, .. } => eprintln!("stream error: {error}"),
        }
    }

    let _ = stream.finish().await?;
    Ok(())
}
