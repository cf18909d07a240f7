use super::SharedIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();

        let tenants = ConstGauge::new(this.len() as u32);
        let tenants_encoder = encoder.encode_descriptor(
            "tenant_index_size",
            "The number of tenants in index",
            None,
            MetricType::Gauge,
        )?;
        tenants.encode(tenants_encoder)?;

        let namespaces = ConstGauge::new(this.namespaces_len() as u32);
        let namespaces_encoder = encoder.encode_descriptor(
            "namespace_index_size",
            "The number of tenant namespaces in index",
            None,
            MetricType::Gauge,
        )?;
        namespaces.encode(namespaces_encoder)?;

        let conflicts = ConstGauge::new(this.conflicting_namespaces() as u32);
        let conflicts_encoder = encoder.encode_descriptor(
            "conflicting_namespaces",
            "The number of namespaces claimed by more than one tenant",
            None,
            MetricType::Gauge,
        )?;
        conflicts.encode(conflicts_encoder)?;

        let synced = ConstGauge::new(u32::from(this.is_synced()));
        let synced_encoder = encoder.encode_descriptor(
            "synced",
            "Whether the index has observed the initial list of tenants",
            None,
            MetricType::Gauge,
        )?;
        synced.encode(synced_encoder)?;

        Ok(())
    }
}
