//! End-to-end aggregation scenarios: raw lines in, scrape document out.

use promagg_core::{AggregateError, LineError, Observation, Universe, parse_line};

// ==================== Helper Functions ====================

fn parse_all(lines: &[&str]) -> Vec<Observation> {
    lines
        .iter()
        .map(|line| parse_line(line.as_bytes()).expect("fixture line should parse"))
        .collect()
}

fn load(universe: &Universe, lines: &[&str]) {
    for obs in parse_all(lines) {
        universe
            .observe(&obs)
            .unwrap_or_else(|e| panic!("{obs:?}: {e}"));
    }
}

fn expected(lines: &[&str]) -> String {
    let mut doc = lines.join("\n");
    doc.push('\n');
    doc
}

// ==================== Scenario Tests ====================

#[test]
fn three_metric_types() {
    let universe = Universe::new();
    load(
        &universe,
        &[
            r#"{"name":"foo_total","type":"counter","help":"Total number of foos."}"#,
            r#"{"name":"foo_total","labels":{"code":"200"},"value": 1}"#,
            r#"{"name":"foo_total","labels":{"code":"404"},"value": 2}"#,
            r#"foo_total{code="200"} 4"#,
            r#"foo_total{code="404"} 8"#,
            r#"{"name":"bar_seconds","type":"histogram","help":"Bar duration in seconds.","buckets":[0.01, 0.05, 0.1, 0.5, 1, 2, 5, 10]}"#,
            r#"{"name":"bar_seconds","value":0.123}"#,
            r#"{"name":"bar_seconds","value":0.234}"#,
            r#"{"name":"bar_seconds","value":0.501}"#,
            r#"{"name":"bar_seconds","value":8.000}"#,
            r#"{"name":"baz_size","type":"gauge","help":"Current size of baz widget."}"#,
            r#"{"name":"baz_size","value": 1}"#,
            r#"{"name":"baz_size","value": 2}"#,
            "baz_size{} 4",
        ],
    );

    assert_eq!(
        universe.render(),
        expected(&[
            "# HELP bar_seconds Bar duration in seconds.",
            "# TYPE bar_seconds histogram",
            r#"bar_seconds_bucket{le="0.01"} 0"#,
            r#"bar_seconds_bucket{le="0.05"} 0"#,
            r#"bar_seconds_bucket{le="0.1"} 0"#,
            r#"bar_seconds_bucket{le="0.5"} 2"#,
            r#"bar_seconds_bucket{le="1"} 3"#,
            r#"bar_seconds_bucket{le="2"} 3"#,
            r#"bar_seconds_bucket{le="5"} 3"#,
            r#"bar_seconds_bucket{le="10"} 4"#,
            r#"bar_seconds_bucket{le="+Inf"} 4"#,
            "bar_seconds_sum{} 8.858000",
            "bar_seconds_count{} 4",
            "",
            "# HELP baz_size Current size of baz widget.",
            "# TYPE baz_size gauge",
            "baz_size{} 4.000000",
            "",
            "# HELP foo_total Total number of foos.",
            "# TYPE foo_total counter",
            r#"foo_total{code="200"} 5.000000"#,
            r#"foo_total{code="404"} 10.000000"#,
            "",
        ])
    );
}

#[test]
fn initial_declarations() {
    let universe = Universe::with_declarations(parse_all(&[
        r#"{"name":"foo_total","type":"counter","help":"Total number of foos."}"#,
        r#"{"name":"bar_seconds","type":"histogram","help":"Bar duration in seconds.","buckets":[0.01, 0.05, 0.1, 0.5, 1, 2, 5, 10]}"#,
        r#"{"name":"baz_size","type":"gauge","help":"Current size of baz widget."}"#,
        r#"{"name":"qux_count","type":"counter","help":"Count of qux events."}"#,
    ]))
    .expect("valid declarations");

    load(
        &universe,
        &[
            r#"foo_total{label="value"} 1"#,
            "bar_seconds{} 0.234",
            "baz_size{} 5",
        ],
    );

    let rendered = universe.render();
    assert!(rendered.contains(r#"bar_seconds_bucket{le="0.1"} 0"#));
    assert!(rendered.contains(r#"bar_seconds_bucket{le="0.5"} 1"#));
    assert!(rendered.contains(r#"bar_seconds_bucket{le="+Inf"} 1"#));
    assert!(rendered.contains("bar_seconds_sum{} 0.234000\n"));
    assert!(rendered.contains("baz_size{} 5.000000\n"));
    assert!(rendered.contains("foo_total{label=\"value\"} 1.000000\n"));
    assert!(!rendered.contains("qux_count"), "untouched family must not render");
    assert_eq!(universe.family_count(), 4);
}

#[test]
fn keys_alias_and_repeated_metadata() {
    let universe = Universe::new();
    load(
        &universe,
        &[
            r#"{"name":"foo","type":"counter","help":"Total foos.","keys":{"code":"412"},"value":1}"#,
            r#"{"name":"foo","type":"counter","help":"Total foos.","keys":{"code":"412"},"value":2}"#,
            r#"{"name":"foo","type":"counter","help":"Total foos.","keys":{"code":"412"},"value":3}"#,
        ],
    );

    assert_eq!(
        universe.render(),
        expected(&[
            "# HELP foo Total foos.",
            "# TYPE foo counter",
            r#"foo{code="412"} 6.000000"#,
            "",
        ])
    );
}

#[test]
fn gauge_add_and_set() {
    let universe = Universe::new();
    load(
        &universe,
        &[
            r#"{"name":"q","type":"gauge","help":"Queue depth."}"#,
            r#"{"name":"q","value":10}"#,
            r#"{"name":"q","op":"add","value":-3}"#,
            r#"{"name":"q","op":"add","value":1.5}"#,
        ],
    );
    assert!(universe.render().contains("q{} 8.500000\n"));

    load(&universe, &["q{} 2"]);
    assert!(universe.render().contains("q{} 2.000000\n"));
}

// ==================== Rejection Tests ====================

#[test]
fn rejected_lines_leave_state_unchanged() {
    let universe = Universe::new();
    load(
        &universe,
        &[
            r#"{"name":"foo_total","type":"counter","help":"Total foos."}"#,
            r#"foo_total{code="200"} 1"#,
        ],
    );
    let before = universe.render();

    for line in [
        "",
        "foo_total{} A",
        r#"foo_total{code=200} 1"#,
        r#"foo_total{code="200", x="y"} 1"#,
        r#"{"name":"foo_total","value":"#,
        r#"{"name":"new_one","value":1}"#,
        r#"{"name":"bad","type":"summary","help":"x","value":1}"#,
        r#"{"name":"nohelp","type":"gauge","value":1}"#,
        r#"{"type":"gauge","help":"x","value":1}"#,
        r#"undeclared{} 1"#,
        r#"foo_total{code="200"} -1"#,
    ] {
        assert!(universe.ingest(line.as_bytes()).is_err(), "{line:?} should be rejected");
    }

    assert_eq!(universe.render(), before);
    assert_eq!(universe.family_count(), 1);
    assert_eq!(universe.series_count(), 1);
}

#[test]
fn error_kinds_are_distinguishable() {
    let universe = Universe::new();

    assert!(matches!(
        universe.ingest(br#"{"type":"gauge","help":"x"}"#),
        Err(LineError::Observe(AggregateError::MissingName))
    ));
    assert!(matches!(
        universe.ingest(br#"{"name":"a","type":"summary","help":"x"}"#),
        Err(LineError::Observe(AggregateError::InvalidKind { .. }))
    ));
    assert!(matches!(
        universe.ingest(br#"{"name":"a","type":"gauge","help":""}"#),
        Err(LineError::Observe(AggregateError::MissingHelp { .. }))
    ));
    assert!(matches!(
        universe.ingest(b"a{} 1"),
        Err(LineError::Observe(AggregateError::UnknownFamily { .. }))
    ));
    assert!(matches!(universe.ingest(b"a{} x"), Err(LineError::Parse(_))));
}

// ==================== Declaration Dump Tests ====================

#[test]
fn declarations_reload_into_equivalent_universe() {
    let universe = Universe::new();
    load(
        &universe,
        &[
            r#"{"name":"h","type":"histogram","help":"H.","buckets":[0.1,1]}"#,
            r#"{"name":"c","type":"counter","help":"C."}"#,
        ],
    );

    let json = serde_json::to_string(&universe.declarations()).expect("serializable");
    let reloaded: Vec<Observation> = serde_json::from_str(&json).expect("deserializable");
    let copy = Universe::with_declarations(reloaded).expect("valid declarations");

    assert_eq!(copy.declarations(), universe.declarations());
}
