//! Sign-in demo CLI.
//!
//! Seeds an anonymous cart from the command line, signs in as `identity`, and
//! logs the merged cart the coordinator writes to the signed-in store.
//!
//! # Usage
//!
//! ```bash
//! signin <identity> [item=quantity ...]
//! ```
//!
//! # Example
//!
//! ```bash
//! CARTSYNC_LOG=debug signin alice p1=2 p3=1
//! ```
//!
//! `CARTSYNC_COORDINATOR` may hold a JSON coordinator config, e.g.
//! `{"clear_attempts": 3}`.

use std::sync::Arc;

use cartsync_migration::{
    ContextSwitchCoordinator, CoordinatorConfig, IdentityContext, IdentityToken,
    InMemoryAnonymousStore, InMemoryIdentifiedStore, MigrationStatus,
};
use cartsync_reactive::Observable;
use cartsync_reconcile::QuantityCollection;
use cartsync_telemetry::TracingConfig;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    TracingConfig::from_env().init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: <identity> [item=quantity ...]");
        eprintln!("Example: alice p1=2 p3=1");
        std::process::exit(1);
    }

    let identity = IdentityToken::new(args[1].as_str());
    let anonymous_items = parse_items(&args[2..]).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let config = match std::env::var("CARTSYNC_COORDINATOR") {
        Ok(json) => CoordinatorConfig::from_json(&json).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }),
        Err(_) => CoordinatorConfig::default(),
    };

    // The signed-in account already holds one item from an earlier session.
    let anonymous = Arc::new(InMemoryAnonymousStore::with_items(anonymous_items));
    let identified = Arc::new(InMemoryIdentifiedStore::new());
    identified.set_items(
        identity.clone(),
        QuantityCollection::from_entries([("p1", 1)]),
    );

    let coordinator = Arc::new(ContextSwitchCoordinator::new(
        anonymous.clone(),
        identified.clone(),
        config,
    ));

    let session: Observable<IdentityContext> = Observable::new(None);
    let handle = match coordinator.attach(&session) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    session.publish(Some(identity.clone()));
    handle.detach().await;

    match coordinator.status().get() {
        MigrationStatus::Completed(report) => tracing::info!(
            identity = %report.identity,
            cart = ?report.merged,
            conflicts = ?report.conflicting_keys,
            anonymous_left = ?anonymous.snapshot(),
            "signed in"
        ),
        MigrationStatus::Aborted { phase, error, .. } => {
            tracing::error!(phase = %phase, error = %error, "sign-in migration aborted");
        }
        other => tracing::warn!(status = ?other, "no migration ran"),
    }
}

fn parse_items(args: &[String]) -> Result<QuantityCollection, String> {
    let mut entries = Vec::with_capacity(args.len());
    for arg in args {
        let Some((key, quantity)) = arg.split_once('=') else {
            return Err(format!("expected item=quantity, got `{arg}`"));
        };
        let quantity: i64 = quantity
            .parse()
            .map_err(|e| format!("invalid quantity in `{arg}`: {e}"))?;
        entries.push((key.to_owned(), quantity));
    }
    QuantityCollection::try_from_entries(entries).map_err(|e| e.to_string())
}
