//! Tessera Operator - installs and removes a multi-product suite

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tessera::client::{KubeClient, KubeClientImpl, FIELD_MANAGER};
use tessera::config::{ControllerArgs, OperatorConfig};
use tessera::controller::{error_policy, installation_for_namespace, reconcile, Context};
use tessera::crd::Installation;
use tessera::product::INSTALLATION_LABEL;

/// Tessera - CRD-driven operator that installs a suite of products in stages
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Installation controller
    ///
    /// Installs the Installation CRD, creates a default Installation when
    /// the watch namespace has none, then reconciles Installations until a
    /// shutdown signal arrives.
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = Installation::crd_yaml()?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => Err(anyhow::anyhow!(
            "no command given; run `tessera controller --help`"
        )),
    }
}

/// Ensure the Installation CRD is installed
///
/// Server-side apply keeps the stored schema in step with the running
/// binary on every upgrade.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Installation CRD...");
    crds.patch(
        "installations.tessera.dev",
        &params,
        &Patch::Apply(&Installation::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Installation CRD: {}", e))?;

    tracing::info!("Installation CRD installed/updated");
    Ok(())
}

/// Create the configured default Installation if the namespace has none
async fn ensure_default_installation(
    kube: &dyn KubeClient,
    config: &OperatorConfig,
) -> anyhow::Result<()> {
    let existing = kube
        .list_installations(&config.watch_namespace)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list Installations: {}", e))?;
    if !existing.is_empty() {
        tracing::debug!(count = existing.len(), "Installations already present");
        return Ok(());
    }

    let installation = config.default_installation();
    match kube.create_installation(&installation).await {
        Ok(created) => {
            tracing::info!(
                installation = %created.name_any(),
                installation_type = %created.spec.type_,
                "Created default Installation"
            );
            Ok(())
        }
        // Another replica got there first
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to create default Installation: {}",
            e
        )),
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Tessera controller starting...");

    let config = args
        .into_config()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    tracing::info!(
        watch_namespace = %config.watch_namespace,
        products = ?config.products,
        installation_types = ?config.catalog.type_names().collect::<Vec<_>>(),
        "Loaded operator configuration"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let kube = KubeClientImpl::new(client.clone());
    ensure_default_installation(&kube, &config).await?;

    let installations: Api<Installation> =
        Api::namespaced(client.clone(), &config.watch_namespace);
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let watch_namespace = config.watch_namespace.clone();
    let ctx = Arc::new(Context::builder(client, config).build());

    tracing::info!("Starting Installation controller...");
    Controller::new(installations, WatcherConfig::default())
        .watches(
            namespaces,
            WatcherConfig::default().labels(INSTALLATION_LABEL),
            move |namespace| installation_for_namespace(&namespace, &watch_namespace),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Installation reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Installation reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Tessera controller shutting down");
    Ok(())
}
