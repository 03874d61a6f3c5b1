//! End-to-end sync runs against the in-memory source and destination.

use chrono::{TimeZone, Utc};
use hubsync_engine::{
    ContactTransformer, DealTransformer, DestinationStore, LineItemTransformer, MemoryStore,
    MockTransport, SourceCall, SyncConfig, SyncMode, SyncOrchestrator, SyncPhase,
};
use hubsync_protocol::SourceRecord;
use serde_json::{json, Value};
use std::collections::HashMap;

const OWNERS: &str = "/crm/v3/owners/";
const PIPELINES: &str = "/crm/v3/pipelines/deals";
const CONTACTS: &str = "/crm/v3/objects/contacts";
const DEALS: &str = "/crm/v3/objects/deals";
const LINE_ITEMS: &str = "/crm/v3/objects/line_items";
const COMMISSIONS: &str = "/crm/v3/objects/2-45314755";

fn owner(id: &str) -> SourceRecord {
    SourceRecord::new(id)
        .with_field("email", format!("{id}@example.com"))
        .with_field("firstName", "Owner")
}

fn pipeline() -> SourceRecord {
    SourceRecord::new("default").with_field("label", "Sales").with_field(
        "stages",
        json!([
            {"id": "qualified", "label": "Qualified", "displayOrder": 0},
            {"id": "closedwon", "label": "Won", "displayOrder": 1},
        ]),
    )
}

fn contact(id: &str, owner: &str) -> SourceRecord {
    SourceRecord::new(id)
        .with_property("email", format!("{id}@client.com"))
        .with_property("hubspot_owner_id", owner)
}

fn deal(id: &str) -> SourceRecord {
    SourceRecord::new(id)
        .with_property("dealname", format!("Deal {id}"))
        .with_property("amount", "1500")
        .with_property("closedate", "2026-04-30T18:00:00Z")
        .with_property("pipeline", "default")
        .with_property("dealstage", "closedwon")
        .with_property("hubspot_owner_id", "o1")
}

fn line_item(id: &str) -> SourceRecord {
    SourceRecord::new(id)
        .with_property("quantity", "2")
        .with_property("price", "750")
}

fn commission(id: &str, owner: &str) -> SourceRecord {
    SourceRecord::new(id)
        .with_property("hubspot_owner_id", owner)
        .with_property("valor_do_negocio", "1500")
}

fn scripted_full_source() -> MockTransport {
    let transport = MockTransport::new();
    transport.set_list_pages(OWNERS, vec![vec![owner("o1"), owner("o2")]]);
    transport.set_list_pages(PIPELINES, vec![vec![pipeline()]]);
    transport.set_list_pages(
        CONTACTS,
        vec![
            vec![contact("c1", "o1"), contact("c2", "o404")],
            vec![contact("c3", "o2")],
        ],
    );
    transport.set_list_pages(
        DEALS,
        vec![vec![
            deal("d1").with_association("contacts", "c1"),
            deal("d2").with_association("contacts", "c404"),
        ]],
    );
    transport.set_list_pages(
        LINE_ITEMS,
        vec![vec![
            line_item("li1").with_association("deals", "d1"),
            line_item("li2"),
        ]],
    );
    transport.set_list_pages(COMMISSIONS, vec![vec![commission("k1", "o2")]]);
    transport
}

fn config() -> SyncConfig {
    SyncConfig::default().with_api_page_size(2)
}

fn seed_previous_run(store: &MemoryStore) {
    store.seed(
        "hubspot_owners",
        "hubspot_id",
        vec![json!({"hubspot_id": "o1", "_extracted_at": "2026-01-05T10:00:00+00:00"})],
    );
    store.seed(
        "hubspot_pipelines",
        "hubspot_id",
        vec![json!({"hubspot_id": "default"})],
    );
    store.seed(
        "hubspot_pipeline_stages",
        "stage_id",
        vec![json!({"stage_id": "closedwon", "pipeline_id": "default"})],
    );
    store.seed(
        "hubspot_contacts",
        "hubspot_id",
        vec![json!({"hubspot_id": "c-old", "_extracted_at": "2026-01-05T10:00:00+00:00"})],
    );
    store.seed(
        "hubspot_deals",
        "hubspot_id",
        vec![json!({"hubspot_id": "d-old", "_extracted_at": "2026-01-05T12:00:00+00:00"})],
    );
}

#[test]
fn first_run_is_full_and_loads_everything() {
    let orchestrator = SyncOrchestrator::new(config(), scripted_full_source(), MemoryStore::new());
    let report = orchestrator.run().unwrap();

    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.since, None);
    assert!(report.is_success());
    assert_eq!(report.exit_code(), 0);

    let success: Vec<(&str, u64)> = report
        .tables
        .iter()
        .map(|t| (t.table.as_str(), t.success))
        .collect();
    assert_eq!(
        success,
        vec![
            ("hubspot_owners", 2),
            ("hubspot_pipelines", 1),
            ("hubspot_pipeline_stages", 2),
            ("hubspot_contacts", 3),
            ("hubspot_deals", 2),
            ("hubspot_line_items", 2),
            ("hubspot_commissions_obj", 1),
        ]
    );

    let store = orchestrator.store();
    let c1 = store.row("hubspot_contacts", "c1").unwrap();
    assert_eq!(c1["owner_id"], json!("o1"));
    assert_eq!(c1["_source_system"], json!("HubSpot"));
    assert!(c1["_extracted_at"].is_string());
    assert_eq!(store.row("hubspot_contacts", "c2").unwrap()["owner_id"], Value::Null);

    let d1 = store.row("hubspot_deals", "d1").unwrap();
    assert_eq!(d1["contact_id"], json!("c1"));
    assert_eq!(d1["pipeline_id"], json!("default"));
    assert_eq!(d1["pipeline_stage_id"], json!("closedwon"));
    assert_eq!(d1["close_date"], json!("2026-04-30"));
    assert_eq!(d1["amount"], json!(1500.0));

    let li1 = store.row("hubspot_line_items", "li1").unwrap();
    assert_eq!(li1["deal_id"], json!("d1"));
    assert_eq!(store.row("hubspot_line_items", "li2").unwrap()["deal_id"], Value::Null);
    assert_eq!(
        store.row("hubspot_commissions_obj", "k1").unwrap()["owner_id"],
        json!("o2")
    );

    let transport = orchestrator.transport();
    assert_eq!(transport.list_calls(CONTACTS), 2);
    assert!(transport.search_calls("contacts").is_empty());
    assert!(!transport
        .calls()
        .iter()
        .any(|c| matches!(c, SourceCall::BatchRead { .. })));
}

fn listing_query(transport: &MockTransport, path: &str) -> Vec<(String, String)> {
    transport
        .calls()
        .into_iter()
        .find_map(|call| match call {
            SourceCall::List { path: p, query, .. } if p == path => Some(query),
            _ => None,
        })
        .unwrap()
}

fn param(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[test]
fn full_listings_request_properties_and_associations() {
    let orchestrator = SyncOrchestrator::new(config(), scripted_full_source(), MemoryStore::new());
    orchestrator.run().unwrap();
    let transport = orchestrator.transport();

    assert_eq!(
        listing_query(transport, CONTACTS),
        vec![param("properties", &ContactTransformer::PROPERTIES.join(","))]
    );
    assert_eq!(
        listing_query(transport, DEALS),
        vec![
            param("properties", &DealTransformer::PROPERTIES.join(",")),
            param("associations", "contacts"),
        ]
    );
    assert_eq!(
        listing_query(transport, LINE_ITEMS),
        vec![
            param("properties", &LineItemTransformer::PROPERTIES.join(",")),
            param("associations", "deals"),
        ]
    );
    assert!(listing_query(transport, OWNERS).is_empty());
}

#[test]
fn dangling_contact_reference_is_nulled_but_deal_is_written() {
    let orchestrator = SyncOrchestrator::new(config(), scripted_full_source(), MemoryStore::new());
    let report = orchestrator.run().unwrap();

    assert_eq!(report.table("hubspot_deals").unwrap().error, 0);
    let d2 = orchestrator.store().row("hubspot_deals", "d2").unwrap();
    assert_eq!(d2["contact_id"], Value::Null);
    assert_eq!(d2["deal_name"], json!("Deal d2"));
}

#[test]
fn incremental_run_searches_from_oldest_watermark() {
    let store = MemoryStore::new();
    seed_previous_run(&store);

    let transport = MockTransport::new();
    transport.set_list_pages(OWNERS, vec![vec![owner("o1")]]);
    transport.set_search_pages("contacts", vec![vec![contact("c-new", "o1")]]);
    transport.set_search_pages("deals", vec![vec![deal("d-new")]]);
    transport.set_associations(
        "deals",
        "contacts",
        HashMap::from([("d-new".to_string(), vec!["c-old".to_string()])]),
    );
    transport.set_search_pages("line_items", vec![vec![line_item("li-new")]]);
    transport.set_associations(
        "line_items",
        "deals",
        HashMap::from([("li-new".to_string(), vec!["d-old".to_string()])]),
    );

    let orchestrator = SyncOrchestrator::new(config(), transport, store);
    let report = orchestrator.run().unwrap();

    let expected_since = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.since, Some(expected_since));
    assert!(report.is_success());
    assert!(orchestrator
        .phase_history()
        .contains(&SyncPhase::PreloadingSnapshots));

    let transport = orchestrator.transport();
    assert_eq!(transport.list_calls(CONTACTS), 0);
    assert_eq!(transport.list_calls(DEALS), 0);
    assert_eq!(transport.list_calls(OWNERS), 1);
    assert_eq!(transport.list_calls(PIPELINES), 1);
    let searches = transport.search_calls("contacts");
    assert_eq!(searches.len(), 1);
    assert!(matches!(
        &searches[0],
        SourceCall::Search { since_ms: Some(ms), after: None, .. }
            if *ms == expected_since.timestamp_millis().to_string()
    ));

    let store = orchestrator.store();
    let deal = store.row("hubspot_deals", "d-new").unwrap();
    assert_eq!(deal["contact_id"], json!("c-old"));
    assert_eq!(deal["pipeline_id"], json!("default"));
    assert_eq!(deal["pipeline_stage_id"], json!("closedwon"));
    assert_eq!(
        store.row("hubspot_line_items", "li-new").unwrap()["deal_id"],
        json!("d-old")
    );
    assert_eq!(store.count("hubspot_contacts"), 2);
}

#[test]
fn failed_batch_is_isolated() {
    let transport = MockTransport::new();
    let contacts: Vec<SourceRecord> = (0..450)
        .map(|i| contact(&format!("c{i:03}"), "o1"))
        .collect();
    transport.set_list_pages(CONTACTS, vec![contacts]);
    transport.set_list_pages(DEALS, vec![vec![deal("d1")]]);

    let store = MemoryStore::new();
    store.fail_next_upserts("hubspot_contacts", 1);
    let orchestrator = SyncOrchestrator::new(SyncConfig::default(), transport, store);
    let report = orchestrator.run().unwrap();

    let contacts = report.table("hubspot_contacts").unwrap();
    assert_eq!(contacts.total, 450);
    assert_eq!(contacts.error, 200);
    assert_eq!(contacts.success, 250);
    assert_eq!(
        orchestrator.store().upsert_sizes("hubspot_contacts"),
        vec![200, 200, 50]
    );
    assert_eq!(orchestrator.store().count("hubspot_contacts"), 250);

    assert_eq!(report.table("hubspot_deals").unwrap().success, 1);
    assert!(!report.is_success());
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed_tables(), vec!["hubspot_contacts"]);
    assert!(report.render_summary().contains("hubspot_contacts"));
}

#[test]
fn page_fault_truncates_table_and_later_tables_still_run() {
    let transport = scripted_full_source();
    transport.fail_list_page(CONTACTS, 1);
    let orchestrator = SyncOrchestrator::new(config(), transport, MemoryStore::new());
    let report = orchestrator.run().unwrap();

    let contacts = report.table("hubspot_contacts").unwrap();
    assert_eq!(contacts.success, 2);
    assert_eq!(contacts.error, 0);
    assert!(contacts.is_truncated());
    assert!(!report.is_success());
    assert_eq!(report.exit_code(), 1);

    assert_eq!(report.table("hubspot_deals").unwrap().success, 2);
    assert_eq!(report.table("hubspot_commissions_obj").unwrap().success, 1);
    assert_eq!(orchestrator.phase(), SyncPhase::Completed);
}

#[test]
fn enrichment_failure_leaves_references_absent() {
    let store = MemoryStore::new();
    seed_previous_run(&store);

    let transport = MockTransport::new();
    transport.set_search_pages("deals", vec![vec![deal("d-new")]]);
    transport.fail_batch_reads("deals");

    let orchestrator = SyncOrchestrator::new(config(), transport, store);
    let report = orchestrator.run().unwrap();

    assert_eq!(report.table("hubspot_deals").unwrap().success, 1);
    let deal = orchestrator.store().row("hubspot_deals", "d-new").unwrap();
    assert_eq!(deal["contact_id"], Value::Null);
    assert_eq!(deal["pipeline_id"], json!("default"));
}

#[test]
fn rerun_is_idempotent() {
    let transport = scripted_full_source();
    transport.set_search_pages("contacts", vec![vec![contact("c1", "o1"), contact("c2", "o404")]]);
    transport.set_search_pages("deals", vec![vec![deal("d1")]]);

    let orchestrator = SyncOrchestrator::new(config(), transport, MemoryStore::new());
    let first = orchestrator.run().unwrap();
    let counts = |store: &MemoryStore| -> Vec<usize> {
        first.tables.iter().map(|t| store.count(&t.table)).collect()
    };
    let before = counts(orchestrator.store());

    let second = orchestrator.run().unwrap();
    assert_eq!(second.mode, SyncMode::Incremental);
    assert!(second.is_success());
    assert_eq!(counts(orchestrator.store()), before);
    assert_eq!(
        orchestrator.store().row("hubspot_contacts", "c1").unwrap()["owner_id"],
        json!("o1")
    );
    assert!(orchestrator
        .store()
        .latest_extraction("hubspot_contacts")
        .unwrap()
        .is_some());
}
