use std::sync::Arc;

use snapvault_engine::{CycleOutcome, Snapshotter};
use snapvault_store::FileStore;

use super::config::Effective;
use super::error::CliError;
use super::fetch::HttpFetcher;
use super::gate::ActiveHours;

/// Build the snapshotter described by `eff`.
pub fn build(eff: &Effective) -> Result<Snapshotter, CliError> {
    let source = eff
        .source
        .as_ref()
        .ok_or_else(|| CliError::Config("no [source] configured and no --url given".into()))?;

    let fetcher = Arc::new(HttpFetcher::new(source)?);
    let store = Arc::new(FileStore::new(&eff.engine.data_dir));
    let snapshotter = Snapshotter::from_config(&eff.engine.scheduler, store, fetcher)?;

    if let Some(gate) = eff.gate {
        let hours = ActiveHours::try_from(gate)?;
        tracing::info!(?hours, "capture window enabled");
        snapshotter.set_gate(move |timestamp, _| hours.allows(timestamp));
    }

    snapshotter.set_on_capture(|_, timestamp, count| {
        tracing::info!(%timestamp, count, "captured snapshot");
    });

    Ok(snapshotter)
}

pub async fn run(eff: &Effective, once: bool) -> Result<(), CliError> {
    let snapshotter = build(eff)?;

    if once {
        return match snapshotter.capture().await {
            CycleOutcome::Failed { count } => Err(CliError::CaptureFailed(count)),
            CycleOutcome::Vetoed { count } => {
                tracing::info!(count, "capture vetoed by the active-hours window");
                Ok(())
            }
            CycleOutcome::Captured { .. } | CycleOutcome::Skipped => Ok(()),
        };
    }

    snapshotter.start();
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    snapshotter.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use snapvault_engine::EngineConfig;

    use super::*;
    use crate::cmd::fetch::SourceConfig;
    use crate::cmd::gate::GateConfig;

    fn effective(data_dir: PathBuf, source: Option<SourceConfig>, gate: Option<GateConfig>) -> Effective {
        Effective {
            engine: EngineConfig {
                data_dir,
                ..EngineConfig::default()
            },
            source,
            gate,
        }
    }

    #[test]
    fn missing_source_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let eff = effective(dir.path().into(), None, None);
        assert!(matches!(build(&eff), Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_gate_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateConfig { from_hour: 30, to_hour: 2, weekdays_only: false };
        let eff = effective(
            dir.path().into(),
            Some(SourceConfig::from_url("http://localhost/".into())),
            Some(gate),
        );
        assert!(matches!(build(&eff), Err(CliError::Config(_))));
    }

    #[tokio::test]
    async fn once_against_unreachable_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let eff = effective(
            dir.path().into(),
            Some(SourceConfig::from_url(format!("http://{addr}/board"))),
            None,
        );
        let err = run(&eff, true).await.unwrap_err();
        assert!(matches!(err, CliError::CaptureFailed(1)), "{err}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
