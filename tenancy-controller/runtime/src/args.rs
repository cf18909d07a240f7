use crate::{
    admission::{self, Admission},
    core::{GroupPolicy, DEFAULT_CAPSULE_GROUP},
    index::{self, Index},
    k8s,
    webhook::{namespace::NamespaceHandler, tenant::TenantHandler, Decoder, Gated, Routes},
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "tenancy", about = "A multi-tenancy admission controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "tenancy=info,warn",
        env = "TENANCY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Groups whose members are tenant principals. May be repeated.
    #[clap(long = "capsule-user-group", default_value = DEFAULT_CAPSULE_GROUP)]
    capsule_user_groups: Vec<String>,

    /// Groups whose members are never tenant principals. May be repeated.
    #[clap(long = "exclude-user-group")]
    exclude_user_groups: Vec<String>,

    /// Upper bound on the time an admission decision may spend reading
    /// cluster state.
    #[clap(long, default_value = "5000")]
    lookup_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            capsule_user_groups,
            exclude_user_groups,
            lookup_timeout_ms,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let index = Index::shared();

        let mut prom = <Registry>::default();
        index::metrics::register(prom.sub_registry_with_prefix("tenant_index"), index.clone());
        let admission_metrics =
            admission::Metrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let tenants = runtime.watch_all::<k8s::Tenant>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index.clone(), tenants).instrument(info_span!("tenants")),
        );

        let policy = Arc::new(GroupPolicy {
            allowed: capsule_user_groups,
            excluded: exclude_user_groups,
        });
        info!(allowed = ?policy.allowed, excluded = ?policy.excluded, "Tenant principal groups");

        let reader = index::Reader::new(index);
        let decoder = Decoder::default();
        let namespaces = Routes::new(
            &Gated::new(NamespaceHandler::default(), policy),
            reader.clone(),
            decoder,
        );
        let tenants = Routes::new(&TenantHandler, reader, decoder);
        let lookup_timeout = Duration::from_millis(lookup_timeout_ms);

        let admission = Admission::new(namespaces, tenants, lookup_timeout, admission_metrics);
        let runtime = runtime.spawn_server(move || admission.clone());

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
