//! Sync run orchestration.

use crate::config::SyncConfig;
use crate::destination::DestinationStore;
use crate::entity::EntityKind;
use crate::error::{SyncError, SyncResult};
use crate::mode::{SyncModeResolver, SyncPlan};
use crate::pagination::{PaginatedSource, RecordStream};
use crate::records::Provenance;
use crate::report::{SyncReport, TableReport};
use crate::sink::StreamingUpsertSink;
use crate::snapshot::ForeignKeySnapshot;
use crate::transform::{
    CommissionTransformer, ContactTransformer, DealTransformer, EntityTransformer,
    LineItemTransformer, OwnerTransformer, PipelineTransformer, CONTACT_ASSOCIATION,
    DEAL_ASSOCIATION,
};
use crate::transport::SourceTransport;
use chrono::Utc;
use hubsync_protocol::ListEndpoint;
use parking_lot::RwLock;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

const OWNERS_PATH: &str = "/crm/v3/owners/";
const DEAL_PIPELINES_PATH: &str = "/crm/v3/pipelines/deals";
const PIPELINE_OBJECT_TYPE: &str = "deals";

/// Kinds pre-loaded from the destination before an incremental run.
const PRELOADED_KINDS: [EntityKind; 5] = [
    EntityKind::Owner,
    EntityKind::Pipeline,
    EntityKind::PipelineStage,
    EntityKind::Contact,
    EntityKind::Deal,
];

/// The phase a run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No run in progress.
    Idle,
    /// Reading watermarks.
    ResolvingMode,
    /// Loading validity sets from the destination.
    PreloadingSnapshots,
    /// Loading owners.
    Owners,
    /// Loading pipelines and their stages.
    Pipelines,
    /// Loading contacts.
    Contacts,
    /// Loading deals.
    Deals,
    /// Loading line items.
    LineItems,
    /// Loading commissions.
    Commissions,
    /// Building the report.
    Summarizing,
    /// The run finished and produced a report.
    Completed,
    /// The run stopped on a fatal fault.
    Failed,
}

impl SyncPhase {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncPhase::Idle | SyncPhase::Completed | SyncPhase::Failed)
    }

    /// Returns true if a new run may start.
    pub fn can_start_run(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if `to` may follow this phase.
    pub fn can_transition_to(&self, to: SyncPhase) -> bool {
        use SyncPhase::*;
        match (self, to) {
            (from, Failed) => from.is_active(),
            (Idle | Completed | Failed, ResolvingMode) => true,
            (ResolvingMode, PreloadingSnapshots | Owners) => true,
            (PreloadingSnapshots, Owners) => true,
            (Owners, Pipelines) => true,
            (Pipelines, Contacts) => true,
            (Contacts, Deals) => true,
            (Deals, LineItems) => true,
            (LineItems, Commissions) => true,
            (Commissions, Summarizing) => true,
            (Summarizing, Completed) => true,
            _ => false,
        }
    }
}

/// Runs the extraction pipeline in dependency order.
///
/// Owns the validity snapshot for the duration of a run. Failures of a
/// single table are isolated in its report; only a fault outside table
/// extraction, such as a failing watermark read, aborts the run.
pub struct SyncOrchestrator<T: SourceTransport, D: DestinationStore> {
    config: SyncConfig,
    transport: T,
    store: D,
    phase: RwLock<SyncPhase>,
    history: RwLock<Vec<SyncPhase>>,
}

impl<T: SourceTransport, D: DestinationStore> SyncOrchestrator<T, D> {
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, transport: T, store: D) -> Self {
        Self {
            config,
            transport,
            store,
            phase: RwLock::new(SyncPhase::Idle),
            history: RwLock::new(Vec::new()),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Phases entered by the last run, in order.
    pub fn phase_history(&self) -> Vec<SyncPhase> {
        self.history.read().clone()
    }

    /// The run configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The source transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The destination store.
    pub fn store(&self) -> &D {
        &self.store
    }

    fn transition(&self, to: SyncPhase) -> SyncResult<()> {
        let mut phase = self.phase.write();
        if !phase.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *phase),
                to: format!("{to:?}"),
            });
        }
        *phase = to;
        self.history.write().push(to);
        Ok(())
    }

    /// Executes one run and returns its report.
    ///
    /// Table-level failures are reported, not returned; check
    /// [`SyncReport::is_success`].
    pub fn run(&self) -> SyncResult<SyncReport> {
        let current = self.phase();
        if !current.can_start_run() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{current:?}"),
                to: "run".into(),
            });
        }
        self.config.validate()?;
        self.history.write().clear();

        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        let _guard = span.enter();
        info!("sync run started");

        match self.execute(run_id) {
            Ok(report) => {
                info!(
                    success = report.total_success(),
                    errors = report.total_errors(),
                    clean = report.is_success(),
                    "sync run finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(phase = ?self.phase(), error = %err, "sync run failed");
                let _ = self.transition(SyncPhase::Failed);
                Err(err)
            }
        }
    }

    fn execute(&self, run_id: Uuid) -> SyncResult<SyncReport> {
        let started_at = Utc::now();

        self.transition(SyncPhase::ResolvingMode)?;
        let plan = SyncModeResolver::from_config(&self.config).resolve(&self.store)?;

        let mut snapshot = ForeignKeySnapshot::new();
        if plan.incremental_since().is_some() {
            self.transition(SyncPhase::PreloadingSnapshots)?;
            for kind in PRELOADED_KINDS {
                let ids = snapshot.load(kind, &self.store, self.config.id_scan_page_size);
                info!(%kind, ids, "preloaded validity set");
            }
        }

        let mut tables = Vec::with_capacity(EntityKind::ALL.len());

        self.transition(SyncPhase::Owners)?;
        tables.push(self.extract_owners(&mut snapshot));

        self.transition(SyncPhase::Pipelines)?;
        tables.extend(self.extract_pipelines(&mut snapshot));

        self.transition(SyncPhase::Contacts)?;
        let contacts = ContactTransformer::new(self.provenance());
        let stream = self.object_records("contacts", ContactTransformer::PROPERTIES, None, &plan);
        tables.push(self.load(&contacts, stream, &mut snapshot));

        self.transition(SyncPhase::Deals)?;
        let deals = DealTransformer::new(self.provenance());
        let stream = self.object_records(
            "deals",
            DealTransformer::PROPERTIES,
            Some(CONTACT_ASSOCIATION),
            &plan,
        );
        tables.push(self.load(&deals, stream, &mut snapshot));
        snapshot.release(EntityKind::Contact);

        self.transition(SyncPhase::LineItems)?;
        let line_items = LineItemTransformer::new(self.provenance());
        let stream = self.object_records(
            "line_items",
            LineItemTransformer::PROPERTIES,
            Some(DEAL_ASSOCIATION),
            &plan,
        );
        tables.push(self.load(&line_items, stream, &mut snapshot));
        snapshot.release(EntityKind::Deal);
        snapshot.release(EntityKind::Pipeline);
        snapshot.release(EntityKind::PipelineStage);

        self.transition(SyncPhase::Commissions)?;
        let commissions =
            CommissionTransformer::new(self.provenance(), &self.config.commission_object_type);
        let stream = self.object_records(
            &self.config.commission_object_type,
            CommissionTransformer::PROPERTIES,
            None,
            &plan,
        );
        tables.push(self.load(&commissions, stream, &mut snapshot));
        snapshot.release(EntityKind::Owner);

        self.transition(SyncPhase::Summarizing)?;
        let report = SyncReport {
            run_id,
            mode: plan.mode,
            since: plan.since,
            started_at,
            finished_at: Utc::now(),
            tables,
        };
        self.transition(SyncPhase::Completed)?;
        Ok(report)
    }

    fn provenance(&self) -> Provenance {
        Provenance::now(&self.config.source_system)
    }

    fn source(&self) -> PaginatedSource<'_, T> {
        PaginatedSource::new(&self.transport, self.config.modified_property.clone())
    }

    fn sink(&self) -> StreamingUpsertSink<'_> {
        StreamingUpsertSink::new(&self.store, self.config.upsert_batch_size)
    }

    /// Streams a CRM object type: a full listing, or a search from the
    /// watermark when the plan is incremental.
    fn object_records(
        &self,
        object_type: &str,
        properties: &[&str],
        association: Option<&str>,
        plan: &SyncPlan,
    ) -> RecordStream<'_, T> {
        let source = self.source();
        let page_size = self.config.api_page_size;
        match plan.incremental_since() {
            Some(since) => source.fetch_incremental(
                object_type,
                properties.iter().map(|p| p.to_string()).collect(),
                since,
                page_size,
                association,
            ),
            None => {
                let mut endpoint = ListEndpoint::get(format!("/crm/v3/objects/{object_type}"))
                    .with_query("properties", properties.join(","));
                if let Some(association) = association {
                    endpoint = endpoint.with_query("associations", association);
                }
                source.fetch_full(endpoint, page_size)
            }
        }
    }

    /// Transforms and upserts one stream, marking the table truncated if the
    /// stream ended on a fault.
    fn load<X: EntityTransformer>(
        &self,
        transformer: &X,
        mut records: RecordStream<'_, T>,
        snapshot: &mut ForeignKeySnapshot,
    ) -> TableReport {
        let kind = transformer.kind();
        info!(%kind, "extracting");
        let rows = records
            .by_ref()
            .filter_map(|raw| transformer.transform(raw, snapshot));
        let mut report = self.sink().drain(kind.table(), rows, kind.conflict_key());
        if let Some(fault) = records.fault() {
            warn!(%kind, fetched = records.yielded(), error = %fault, "extraction truncated");
            report.mark_truncated(fault);
        }
        report
    }

    fn extract_owners(&self, snapshot: &mut ForeignKeySnapshot) -> TableReport {
        let owners = OwnerTransformer::new(self.provenance());
        let stream = self
            .source()
            .fetch_full(ListEndpoint::get(OWNERS_PATH), self.config.api_page_size);
        self.load(&owners, stream, snapshot)
    }

    /// Pipelines are few; they and their stages are collected before loading.
    fn extract_pipelines(&self, snapshot: &mut ForeignKeySnapshot) -> [TableReport; 2] {
        info!(kind = %EntityKind::Pipeline, "extracting");
        let transformer = PipelineTransformer::new(self.provenance(), PIPELINE_OBJECT_TYPE);
        let mut stream = self
            .source()
            .fetch_full(ListEndpoint::get(DEAL_PIPELINES_PATH), self.config.api_page_size);

        let mut pipelines = Vec::new();
        let mut stages = Vec::new();
        for raw in stream.by_ref() {
            if let Some((pipeline, pipeline_stages)) = transformer.split(raw, snapshot) {
                pipelines.push(pipeline);
                stages.extend(pipeline_stages);
            }
        }

        let sink = self.sink();
        let mut reports = [
            sink.drain(
                EntityKind::Pipeline.table(),
                pipelines,
                EntityKind::Pipeline.conflict_key(),
            ),
            sink.drain(
                EntityKind::PipelineStage.table(),
                stages,
                EntityKind::PipelineStage.conflict_key(),
            ),
        ];
        if let Some(fault) = stream.fault() {
            warn!(error = %fault, "pipeline extraction truncated");
            for report in &mut reports {
                report.mark_truncated(fault);
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::MemoryStore;
    use crate::transport::MockTransport;
    use hubsync_protocol::SourceRecord;
    use serde_json::json;

    #[test]
    fn phase_transitions() {
        use SyncPhase::*;
        assert!(Idle.can_transition_to(ResolvingMode));
        assert!(ResolvingMode.can_transition_to(Owners));
        assert!(ResolvingMode.can_transition_to(PreloadingSnapshots));
        assert!(Deals.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Owners.can_transition_to(Deals));
        assert!(!Completed.can_transition_to(Summarizing));
        assert!(Completed.can_start_run());
        assert!(!Contacts.can_start_run());
    }

    #[test]
    fn empty_full_run_walks_every_phase() {
        let orchestrator =
            SyncOrchestrator::new(SyncConfig::default(), MockTransport::new(), MemoryStore::new());
        let report = orchestrator.run().unwrap();

        assert!(report.is_success());
        assert_eq!(report.tables.len(), 7);
        assert!(report.tables.iter().all(TableReport::is_empty));
        assert_eq!(orchestrator.phase(), SyncPhase::Completed);
        assert_eq!(
            orchestrator.phase_history(),
            vec![
                SyncPhase::ResolvingMode,
                SyncPhase::Owners,
                SyncPhase::Pipelines,
                SyncPhase::Contacts,
                SyncPhase::Deals,
                SyncPhase::LineItems,
                SyncPhase::Commissions,
                SyncPhase::Summarizing,
                SyncPhase::Completed,
            ]
        );
    }

    #[test]
    fn watermark_failure_fails_the_run() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let orchestrator = SyncOrchestrator::new(SyncConfig::default(), MockTransport::new(), store);

        assert!(orchestrator.run().is_err());
        assert_eq!(orchestrator.phase(), SyncPhase::Failed);
        assert!(orchestrator.store().upsert_calls().is_empty());

        orchestrator.store().fail_reads(false);
        assert!(orchestrator.run().is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SyncConfig::default().with_upsert_batch_size(0);
        let orchestrator = SyncOrchestrator::new(config, MockTransport::new(), MemoryStore::new());
        assert!(matches!(orchestrator.run(), Err(SyncError::Config(_))));
        assert_eq!(orchestrator.phase(), SyncPhase::Idle);
    }

    #[test]
    fn pipeline_stages_land_in_their_own_table() {
        let transport = MockTransport::new();
        transport.set_list_pages(
            DEAL_PIPELINES_PATH,
            vec![vec![SourceRecord::new("default")
                .with_field("label", "Sales")
                .with_field("stages", json!([{"id": "s1"}, {"id": "s2"}]))]],
        );
        let orchestrator = SyncOrchestrator::new(SyncConfig::default(), transport, MemoryStore::new());
        let report = orchestrator.run().unwrap();

        assert_eq!(report.table("hubspot_pipelines").unwrap().success, 1);
        assert_eq!(report.table("hubspot_pipeline_stages").unwrap().success, 2);
        let stage = orchestrator
            .store()
            .row("hubspot_pipeline_stages", "s1")
            .unwrap();
        assert_eq!(stage["pipeline_id"], json!("default"));
    }
}
