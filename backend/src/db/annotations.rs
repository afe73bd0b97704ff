use anyhow::Result;
use sqlx::PgPool;
use crate::services::annotations::InMemoryAnnotations;

/// Snapshot both annotation tables into memory.
///
/// The pipeline only ever reads annotations, so one load at startup is enough.
pub async fn load_annotations(pool: &PgPool) -> Result<InMemoryAnnotations> {
    let names = sqlx::query_as::<_, (String, String)>(
        "SELECT wallet_address, display_name FROM tipper_names",
    )
    .fetch_all(pool)
    .await?;

    let messages = sqlx::query_as::<_, (String, String, String)>(
        "SELECT sender_address, transaction_hash, message FROM tip_messages",
    )
    .fetch_all(pool)
    .await?;

    let mut annotations = InMemoryAnnotations::new();
    for (address, name) in &names {
        annotations.insert_name(address, name.as_str());
    }
    for (address, transaction_hash, message) in &messages {
        annotations.insert_message(address, transaction_hash, message.as_str());
    }

    tracing::info!(
        names = names.len(),
        messages = annotations.message_count(),
        "Loaded tip annotations"
    );
    Ok(annotations)
}
