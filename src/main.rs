//! sitekeeper operator - keeps NginxStaticSite dependents converged

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitekeeper::config::{ReconcileSettings, SettingsArgs};
use sitekeeper::controller::{error_policy, reconcile, Context};
use sitekeeper::crd::NginxStaticSite;
use sitekeeper::store::FIELD_MANAGER;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
///
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// sitekeeper - CRD-driven operator for static nginx sites
#[derive(Parser, Debug)]
#[command(name = "sitekeeper", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Only watch sites in this namespace (all namespaces if unset)
    #[arg(long, env = "SITEKEEPER_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the NginxStaticSite CRD, then watches sites and the
    /// claims, deployments, services and ingresses they own.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&NginxStaticSite::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => {
            run_controller(cli.settings.into(), cli.watch_namespace).await
        }
    }
}

/// Install or update the NginxStaticSite CRD with server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing NginxStaticSite CRD...");
    crds.patch(
        "nginxstaticsites.web.sitekeeper.dev",
        &params,
        &Patch::Apply(&NginxStaticSite::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install NginxStaticSite CRD: {}", e))?;

    Ok(())
}

/// Scope an API to the watched namespace, or all namespaces
fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the site controller until a shutdown signal arrives
async fn run_controller(
    settings: ReconcileSettings,
    watch_namespace: Option<String>,
) -> anyhow::Result<()> {
    tracing::info!("sitekeeper controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRD on startup
    ensure_crd_installed(&client).await?;

    let ns = watch_namespace.as_deref();
    match ns {
        Some(ns) => tracing::info!(namespace = %ns, "Watching a single namespace"),
        None => tracing::info!("Watching all namespaces"),
    }
    tracing::info!(
        base_image = %settings.base_image,
        backoff = ?settings.backoff,
        "Reconcile settings"
    );

    let ctx = Arc::new(Context::new(client.clone(), settings));
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    Controller::new(scoped::<NginxStaticSite>(&client, ns), watcher())
        .owns(scoped::<PersistentVolumeClaim>(&client, ns), watcher())
        .owns(scoped::<Deployment>(&client, ns), watcher())
        .owns(scoped::<Service>(&client, ns), watcher())
        .owns(scoped::<Ingress>(&client, ns), watcher())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Site reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Site reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("sitekeeper controller stopped");
    Ok(())
}
