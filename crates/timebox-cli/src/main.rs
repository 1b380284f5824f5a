use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use timebox_core::consumer::BatchConsumer;
use timebox_core::impls::{InMemoryMessageQueue, RecordingRecurrentCaller};
use timebox_core::lifecycle::Lifecycle;
use timebox_core::ports::{Ctx, StaticContext};

#[derive(Debug, Deserialize)]
struct Order {
    id: u32,
    amount: i64,
}

fn order_consumer(
    queue: Arc<InMemoryMessageQueue>,
    recurrent: Arc<RecordingRecurrentCaller>,
) -> BatchConsumer {
    let mut consumer =
        BatchConsumer::new(Lifecycle::new(), queue).with_recurrent_caller(recurrent);
    consumer.max_batch_size = 3;
    consumer.timeout_margin = Duration::from_secs(1);
    consumer.callbacks.on_consuming_message(|body| {
        tracing::info!(%body, "consuming message");
    });
    consumer.callbacks.on_message_error(|err, body| {
        tracing::warn!(error = %err, %body, "message failed");
    });
    consumer
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,timebox_core=debug".into()),
        )
        .init();

    // (A) seed the in-memory queue: five orders plus one poison message
    let queue = Arc::new(InMemoryMessageQueue::new());
    for id in 1..=5u32 {
        queue
            .publish(serde_json::json!({"id": id, "amount": i64::from(id) * 100}))
            .await;
    }
    queue.publish(serde_json::json!({"poison": true})).await;

    let recurrent = Arc::new(RecordingRecurrentCaller::new());
    let ctx: Ctx = Arc::new(StaticContext::with_budget(
        "drain-orders",
        Duration::from_secs(30),
    ));

    // (B) a strictly-typed processor: the poison message fails to decode,
    //     the orders processed before it are still deleted
    let consumer = order_consumer(queue.clone(), recurrent.clone());
    let handler = consumer.build(|pull, _ctx| async move {
        while let Some(order) = pull.next::<Order>().await? {
            tracing::info!(order.id, order.amount, "processed order");
        }
        Ok(())
    });
    handler
        .bus()
        .subscribe(|event| println!("lifecycle event: {}", event.kind()));

    match handler.handle(serde_json::json!({}), Arc::clone(&ctx)).await {
        Ok(output) => println!("first invocation output: {output}"),
        Err(err) => println!("first invocation failed: {err}"),
    }

    // (C) the poison message becomes visible again, as if its visibility
    //     timeout elapsed
    queue.reset_in_flight().await;
    println!("redeliverable: {:?}", queue.available().await);

    // (D) a lenient retry pass: pull raw JSON and skip what does not decode
    let consumer = order_consumer(queue.clone(), recurrent.clone());
    let handler = consumer.build(|pull, _ctx| async move {
        while let Some(body) = pull.next_raw().await? {
            match serde_json::from_value::<Order>(body.clone()) {
                Ok(order) => tracing::info!(order.id, order.amount, "processed order"),
                Err(_) => tracing::warn!(%body, "skipping undecodable message"),
            }
        }
        Ok(())
    });

    match handler.handle(serde_json::json!({}), ctx).await {
        Ok(output) => println!("retry invocation output: {output}"),
        Err(err) => println!("retry invocation failed: {err}"),
    }
    println!(
        "follow-up invocations requested: {}, queue drained: {}",
        recurrent.calls(),
        queue.available().await.is_empty()
    );
}
