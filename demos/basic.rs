use webhook_simulator::{DelaySelector, DispatchAck, DispatchRequest, Dispatcher, DispatcherConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dispatcher = Dispatcher::new(DispatcherConfig::from_env())?;

    for meta in dispatcher.gateway_metadata() {
        println!("{}: {} events", meta.gateway, meta.events.len());
    }

    let request = DispatchRequest::new("stripe", "payment_intent.succeeded")
        .with_webhook_url("http://localhost:3000/webhooks/stripe");
    match dispatcher.dispatch(request).await? {
        DispatchAck::Completed(result) => println!("status {} success {}", result.status, result.success),
        DispatchAck::Queued(queued) => println!("queued as log {}", queued.log_id),
    }

    // Reuses the URL stored by the previous dispatch.
    let delayed = DispatchRequest::new("stripe", "charge.succeeded").with_delay(DelaySelector::FiveSeconds);
    dispatcher.dispatch(delayed).await?;
    tokio::time::sleep(std::time::Duration::from_secs(6)).await;

    for entry in dispatcher.logs().await? {
        println!("{} {} {} -> {}", entry.timestamp, entry.gateway, entry.event, entry.http_status);
    }

    Ok(())
}
