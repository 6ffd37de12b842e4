use reconcile::{
    Error, MemorySource, MemoryTransport, NoReport, Plan, RunContext, Topology, Verb,
};
use serde_json::{Value, json};

fn doc(body: Value) -> Value {
    let mut body = body;
    body["format"] = json!("0.1");
    json!({ "dbtopo": body })
}

fn shop() -> MemorySource {
    MemorySource::new()
        .with(
            "dev",
            doc(json!({
                "import": ["base"],
                "code": "shop",
                "params": {"port": 8010, "forests": 2},
                "databases": [
                    {"id": "content", "forests": "${forests}", "compose": "merge"}
                ]
            })),
        )
        .with(
            "base",
            doc(json!({
                "code": "base",
                "databases": [
                    {
                        "id": "content",
                        "name": "@{code}-content",
                        "forests": 1,
                        "schema": {"ref": "schemas"},
                        "triggers": {"system": "Triggers"},
                        "indexes": {
                            "triples": true,
                            "ranges": [
                                {"type": "string", "name": "title"},
                                {"type": "dateTime", "path": "/meta/created"},
                                {"type": "int", "parent": {"name": "book"}, "name": "year"}
                            ]
                        },
                        "lexicons": {"uri": true, "coll": true}
                    },
                    {"id": "schemas", "name": "@{code}-schemas", "schema": {"ref": "schemas"}}
                ],
                "servers": [
                    {
                        "name": "@{code}-app",
                        "type": "http",
                        "port": "${port}",
                        "root": "/app/",
                        "content": {"ref": "content"},
                        "modules": {"name": "@{code}-modules", "forests": 1}
                    }
                ]
            })),
        )
}

fn plan(topology: &Topology, transport: &MemoryTransport) -> Plan {
    let mut reporter = NoReport;
    let mut ctx = RunContext::new(transport, &mut reporter);
    topology.plan(&mut ctx).unwrap()
}

#[test]
fn test_round_trip_idempotence() {
    let topology = Topology::load(&shop(), "dev").unwrap();
    let transport = MemoryTransport::new();

    let first = plan(&topology, &transport);
    assert!(first.is_executable());
    let mut executor = first.into_executor().unwrap();
    assert!(executor.execute(&transport, &mut NoReport).is_success());

    let second = plan(&topology, &transport);
    assert!(second.is_empty(), "unexpected actions: {:?}", second.actions);
}

#[test]
fn test_creation_order() {
    let topology = Topology::load(&shop(), "dev").unwrap();
    let names: Vec<_> = topology.databases.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["shop-schemas", "shop-modules", "shop-content"]);

    let transport = MemoryTransport::new();
    let plan = plan(&topology, &transport);
    let created: Vec<_> = plan
        .actions
        .iter()
        .filter(|a| a.verb == Verb::CreateDatabase)
        .map(|a| a.target.name())
        .collect();
    assert_eq!(created, names);
    assert_eq!(plan.actions.last().unwrap().verb, Verb::CreateServer);

    let content = topology.databases.iter().find(|d| d.name == "shop-content").unwrap();
    assert_eq!(content.forests.len(), 2);
    assert_eq!(content.properties.get_str("schema-database"), Some("shop-schemas"));
    assert_eq!(content.properties.get_str("triggers-database"), Some("Triggers"));
}

#[test]
fn test_reconfiguration_after_apply() {
    let changed = MemorySource::new()
        .with(
            "dev",
            doc(json!({
                "databases": [{
                    "name": "content",
                    "forests": ["content-001", "extra"],
                    "lexicons": {"uri": false}
                }],
                "servers": [
                    {"name": "app", "type": "http", "port": 8010, "content": {"ref": "content"}}
                ]
            })),
        );
    let first = MemorySource::new().with(
        "dev",
        doc(json!({
            "databases": [{"name": "content", "forests": 2, "lexicons": {"uri": true}}],
            "servers": [
                {"name": "app", "type": "http", "port": 8010, "content": {"ref": "content"}}
            ]
        })),
    );

    let transport = MemoryTransport::new();
    let initial = Topology::load(&first, "dev").unwrap();
    let mut executor = plan(&initial, &transport).into_executor().unwrap();
    assert!(executor.execute(&transport, &mut NoReport).is_success());

    let updated = Topology::load(&changed, "dev").unwrap();
    let actions: Vec<_> = plan(&updated, &transport)
        .actions
        .into_iter()
        .map(|a| (a.verb, a.target.name().to_string(), a.payload))
        .collect();
    assert_eq!(actions.len(), 3);
    assert_eq!((actions[0].0, actions[0].1.as_str()), (Verb::CreateForest, "extra"));
    assert_eq!((actions[1].0, actions[1].1.as_str()), (Verb::DetachForest, "content-002"));
    assert_eq!(actions[2].0, Verb::UpdateDatabaseProperty);
    assert_eq!(actions[2].2, json!({"uri-lexicon": false}));
}

#[test]
fn test_detached_forest_is_reattached() {
    let two = MemorySource::new().with(
        "dev",
        doc(json!({"databases": [{"name": "content", "forests": 2}]})),
    );
    let one = MemorySource::new().with(
        "dev",
        doc(json!({"databases": [{"name": "content", "forests": 1}]})),
    );
    let transport = MemoryTransport::new();

    for source in [&two, &one] {
        let topology = Topology::load(source, "dev").unwrap();
        let mut executor = plan(&topology, &transport).into_executor().unwrap();
        assert!(executor.execute(&transport, &mut NoReport).is_success());
    }

    let topology = Topology::load(&two, "dev").unwrap();
    let again = plan(&topology, &transport);
    assert_eq!(again.len(), 1);
    assert_eq!(again.actions[0].verb, Verb::AttachForest);
    assert_eq!(again.actions[0].target.name(), "content-002");
}

#[test]
fn test_fail_fast_leaves_remaining_actions() {
    let topology = Topology::load(&shop(), "dev").unwrap();
    let transport = MemoryTransport::new();
    transport.fail_on(Verb::CreateDatabase, "shop-modules", "HTTP 500: Internal Server Error");

    let plan = plan(&topology, &transport);
    let total = plan.len();
    let mut executor = plan.into_executor().unwrap();
    let summary = executor.execute(&transport, &mut NoReport);

    // shop-schemas and its forest come first
    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pending, total - 3);
    assert!(transport.database("shop-schemas").is_some());
    assert!(transport.database("shop-content").is_none());
}

#[test]
fn test_hide_keeps_nearer_declaration() {
    let source = MemorySource::new()
        .with(
            "dev",
            doc(json!({
                "import": "base",
                "servers": [{
                    "name": "app",
                    "compose": "hide",
                    "type": "xdbc",
                    "port": 9000,
                    "content": {"system": "Documents"}
                }]
            })),
        )
        .with(
            "base",
            doc(json!({
                "servers": [{
                    "name": "app",
                    "type": "http",
                    "port": 8000,
                    "root": "/x/",
                    "content": {"system": "Documents"}
                }]
            })),
        );
    let topology = Topology::load(&source, "dev").unwrap();
    assert_eq!(topology.servers.len(), 1);
    let app = &topology.servers[0];
    assert_eq!(app.properties.get_str("server-type"), Some("xdbc"));
    assert_eq!(app.properties.get_str("root"), Some("/"));
}

#[test]
fn test_unsolvable_graph_fails_before_planning() {
    let source = MemorySource::new().with(
        "dev",
        doc(json!({
            "databases": [
                {"id": "A", "security": {"ref": "B"}},
                {"id": "B", "security": {"ref": "A"}}
            ]
        })),
    );
    let err = Topology::load(&source, "dev").unwrap_err();
    assert!(matches!(err, Error::UnresolvedDependency { .. }));
    assert!(err.category().is_pre_flight());
}

#[test]
fn test_parameterized_name_merges_with_import() {
    let source = MemorySource::new()
        .with(
            "dev",
            doc(json!({
                "import": "base",
                "code": "shop",
                "databases": [{"name": "@{code}-content", "forests": 3}]
            })),
        )
        .with(
            "base",
            doc(json!({"databases": [{"name": "shop-content", "lexicons": {"uri": true}}]})),
        );
    let topology = Topology::load(&source, "dev").unwrap();
    assert_eq!(topology.databases.len(), 1);
    let content = &topology.databases[0];
    assert_eq!(content.name, "shop-content");
    assert_eq!(content.forests.len(), 3);
    assert_eq!(
        content.properties.get("uri-lexicon").map(|p| p.value.clone()),
        Some(reconcile::PropValue::Boolean(true))
    );
}
