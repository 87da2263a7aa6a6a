use snapvault_api::Snapshot;
use snapvault_store::FileStore;

use super::config::{Effective, QueryMode};
use super::error::CliError;

async fn select(store: &FileStore, mode: &QueryMode) -> Result<Vec<Snapshot>, CliError> {
    let snapshots = match mode {
        QueryMode::All => store.read_all().await?,
        QueryMode::At { at } => store.read_str(Some(at.as_str()), None).await?,
        QueryMode::Range { from, to } => store.read_str(Some(from.as_str()), Some(to.as_str())).await?,
        // Negative counts fall through to the store's positive-count check.
        QueryMode::Last { count } => store.read_last(usize::try_from(*count).unwrap_or(0)).await?,
        QueryMode::Latest => store.read_latest().await?.into_iter().collect(),
    };
    Ok(snapshots)
}

pub async fn run(eff: &Effective, mode: &QueryMode) -> Result<(), CliError> {
    let store = FileStore::new(&eff.engine.data_dir);
    let snapshots = select(&store, mode).await?;
    tracing::debug!(count = snapshots.len(), dir = %store.data_dir().display(), "query done");
    println!("{}", serde_json::to_string_pretty(&snapshots)?);
    Ok(())
}
