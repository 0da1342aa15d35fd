use flag_change_notifier::config::Config;
use flag_change_notifier::{ChangeHandler, ChangeNotifier, Error, FlagKeys, FlagSnapshot, Owner};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Replays one snapshot replacement and logs what a wildcard observer receives.
#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let old = FlagSnapshot::load(&config.old_snapshot, config.old_source)?;
    let new = FlagSnapshot::load(&config.new_snapshot, config.new_source)?;
    info!(old = old.len(), new = new.len(), "snapshots loaded");

    let notifier = ChangeNotifier::with_options(config.diff_options())?;
    let owner = Owner::new();

    notifier.subscribe(
        FlagKeys::All,
        &owner,
        ChangeHandler::single(|flag| {
            let new_value = flag.new_value.as_ref().map(ToString::to_string);
            let old_value = flag.old_value.as_ref().map(ToString::to_string);
            info!(
                key = %flag.key,
                old = old_value.as_deref().unwrap_or("<absent>"),
                old_source = %flag.old_value_source,
                new = new_value.as_deref().unwrap_or("<absent>"),
                new_source = %flag.new_value_source,
                "flag changed"
            );
        }),
    );
    notifier.subscribe_unchanged(&owner, || info!("no flag values changed"));

    notifier.notify("replay", &new, &old, config.old_source);
    notifier.flush().await;

    Ok(())
}
