use std::sync::Arc;

use chrono::{TimeZone, Utc};
use frameql_core::dataframe::DataFrame;
use frameql_core::format::Format;
use frameql_core::scalar::ScalarValue;
use frameql_core::testutil::{column_ints, column_strings, double, frame, int, text};
use frameql_sqlite::config::{QueryConfig, StorageMode};
use frameql_sqlite::run_query;
use frameql_sqlite::runtime::SqliteRuntime;

const MODES: [StorageMode; 3] = [StorageMode::Memory, StorageMode::File, StorageMode::Pushdown];

fn config(mode: StorageMode) -> QueryConfig {
    QueryConfig::default().with_storage_mode(mode)
}

fn ints(name: &str, vals: &[i64]) -> Arc<DataFrame> {
    Arc::new(frame(
        name,
        &[("a", Format::Integer)],
        vals.iter().map(|v| vec![int(*v)]).collect(),
    ))
}

fn people() -> Arc<DataFrame> {
    let rows = [
        ("ann", Some(34), 1.5, "red green blue"),
        ("bob", Some(27), 2.0, "one two"),
        ("cat", None, 0.5, "alpha"),
        ("dan", Some(41), 3.25, "x y z"),
        ("amy", Some(30), 1.0, "left right"),
    ];
    Arc::new(frame(
        "people",
        &[
            ("name", Format::String),
            ("age", Format::Integer),
            ("score", Format::Double),
            ("title", Format::String),
        ],
        rows.iter()
            .map(|(name, age, score, title)| {
                vec![text(name), age.and_then(int), double(*score), text(title)]
            })
            .collect(),
    ))
}

#[test]
fn end_to_end_join() {
    logutil::init_test();

    for mode in MODES {
        let out = run_query(
            "select t1.a from t1, t2 where t1.a = t2.a",
            &[ints("t1", &[1, 2]), ints("t2", &[2, 3])],
            &config(mode),
        )
        .unwrap();

        assert_eq!(1, out.num_columns(), "mode: {mode}");
        assert_eq!(Format::Integer, out.schema().field(0).unwrap().format, "mode: {mode}");
        assert_eq!(vec![Some(2)], column_ints(&out, 0), "mode: {mode}");
    }
}

#[test]
fn pushdown_matches_memory() {
    logutil::init_test();

    let queries = [
        "SELECT name, age FROM people WHERE age >= 30 ORDER BY age DESC",
        "SELECT name FROM people WHERE age = 27",
        "SELECT name FROM people WHERE age > 0 ORDER BY name",
        "SELECT name, score FROM people WHERE score < 2 AND age <= 34 ORDER BY score",
        "SELECT name FROM people WHERE name LIKE 'A%' ORDER BY name",
        "SELECT name FROM people WHERE name GLOB '[bc]*' ORDER BY name",
        "SELECT name FROM people WHERE name REGEXP '^d' ORDER BY name",
        "SELECT name FROM people WHERE title MATCH 'o' ORDER BY name",
        "SELECT text_extract(title, 1) AS second FROM people ORDER BY name",
        "SELECT count(*), sum(age) FROM people WHERE age < 40",
        "SELECT name FROM people ORDER BY age DESC, name",
        "SELECT name FROM people WHERE age IS NULL",
        "SELECT name FROM people WHERE name = 'ANN' COLLATE NOCASE",
    ];

    assert_same_in_memory_and_pushdown(&queries, &[people()]);
}

#[test]
fn pushdown_matches_memory_across_types() {
    logutil::init_test();

    let queries = [
        "SELECT name, score FROM mixed WHERE flag = 'true'",
        "SELECT name FROM mixed WHERE flag = 1",
        "SELECT name, score FROM mixed WHERE score LIKE '%.0'",
        "SELECT name FROM mixed WHERE score GLOB '2.5'",
        "SELECT name FROM mixed WHERE age < '!' ORDER BY name",
        "SELECT name FROM mixed WHERE age > 'a'",
        "SELECT name FROM mixed WHERE age = '30'",
        "SELECT name FROM mixed WHERE name = 1.0",
        "SELECT name FROM mixed WHERE name >= 1 ORDER BY name",
        "SELECT name FROM mixed WHERE name = 'ANN' COLLATE NOCASE",
        "SELECT name FROM mixed WHERE name > 'B' COLLATE NOCASE ORDER BY name",
        "SELECT a.name FROM mixed a, mixed b WHERE a.name = b.score",
        "SELECT name FROM mixed WHERE score IS NULL",
        "SELECT name FROM mixed ORDER BY score, name",
    ];

    assert_same_in_memory_and_pushdown(&queries, &[mixed()]);
}

fn mixed() -> Arc<DataFrame> {
    Arc::new(frame(
        "mixed",
        &[
            ("name", Format::String),
            ("age", Format::Integer),
            ("score", Format::Double),
            ("flag", Format::Bool),
        ],
        vec![
            vec![text("ann"), int(30), double(1.0), Some(ScalarValue::Bool(true))],
            vec![text("1.0"), int(41), double(2.5), Some(ScalarValue::Bool(false))],
            vec![text("Bob"), None, double(f64::NAN), None],
        ],
    ))
}

fn assert_same_in_memory_and_pushdown(queries: &[&str], frames: &[Arc<DataFrame>]) {
    let memory = SqliteRuntime::try_new(config(StorageMode::Memory)).unwrap();
    let pushdown = SqliteRuntime::try_new(config(StorageMode::Pushdown)).unwrap();

    for sql in queries {
        let expected = memory.run_query(sql, frames).unwrap();
        let got = pushdown.run_query(sql, frames).unwrap();
        assert_eq!(expected.to_string(), got.to_string(), "query: {sql}");
    }
}

#[test]
fn pushdown_filter_values() {
    let out = run_query(
        "SELECT name FROM people WHERE age > 29 AND name LIKE 'a%' ORDER BY age",
        &[people()],
        &config(StorageMode::Pushdown),
    )
    .unwrap();

    assert_eq!(
        vec![Some("amy".to_string()), Some("ann".to_string())],
        column_strings(&out, 0)
    );
}

#[test]
fn scalar_functions_in_every_mode() {
    for mode in MODES {
        let out = run_query(
            "SELECT text_extract(title, 2), regexp('^r', title), match('two', title) \
             FROM people WHERE name = 'ann' OR name = 'bob' ORDER BY name",
            &[people()],
            &config(mode),
        )
        .unwrap();

        assert_eq!(
            vec![Some("blue".to_string()), None],
            column_strings(&out, 0),
            "mode: {mode}"
        );
        assert_eq!(vec![Some(1), Some(0)], column_ints(&out, 1), "mode: {mode}");
        assert_eq!(vec![Some(0), Some(1)], column_ints(&out, 2), "mode: {mode}");
    }
}

#[test]
fn datetime_and_bool_round_trip() {
    let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap();
    let events = Arc::new(frame(
        "events",
        &[
            ("id", Format::Integer),
            ("at", Format::DateTime),
            ("flag", Format::Bool),
        ],
        vec![
            vec![int(1), Some(ScalarValue::DateTime(at(1, 6))), Some(ScalarValue::Bool(true))],
            vec![int(2), Some(ScalarValue::DateTime(at(2, 18))), Some(ScalarValue::Bool(false))],
            vec![int(3), None, None],
        ],
    ));

    for mode in MODES {
        let out = run_query("SELECT * FROM events ORDER BY id", &[events.clone()], &config(mode))
            .unwrap();

        assert_eq!(events.schema().as_ref(), out.schema().as_ref(), "mode: {mode}");
        for (expected, got) in events.iter().zip(out.iter()) {
            assert_eq!(expected.values(), got.values(), "mode: {mode}");
        }

        let out = run_query(
            "SELECT id FROM events WHERE flag = 1 AND at < '2024-01-02 00:00:00' ",
            &[events.clone()],
            &config(mode),
        )
        .unwrap();
        assert_eq!(vec![Some(1)], column_ints(&out, 0), "mode: {mode}");
    }
}

#[test]
fn duplicate_names_fail_registration() {
    for mode in MODES {
        let err = run_query(
            "SELECT * FROM t",
            &[ints("t", &[1]), ints("T", &[2])],
            &config(mode),
        )
        .unwrap_err();
        assert!(err.field("table").is_some(), "mode: {mode}, err: {err}");
    }
}

#[test]
fn many_frames_register_in_parallel() {
    let frames: Vec<_> = (0..12).map(|i| ints(&format!("t{i}"), &[i])).collect();
    let sql = (0..12)
        .map(|i| format!("SELECT a FROM t{i}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
        + " ORDER BY a";

    for mode in MODES {
        let mut config = config(mode);
        config.registration_workers = 3;
        let out = run_query(&sql, &frames, &config).unwrap();
        assert_eq!(
            (0..12).map(Some).collect::<Vec<_>>(),
            column_ints(&out, 0),
            "mode: {mode}"
        );
    }
}

#[test]
fn small_batches_load_every_row() {
    let frames = [ints("t", &(0..101).collect::<Vec<_>>())];
    let mut config = config(StorageMode::Memory);
    config.set("insert_batch_size", "7").unwrap();
    config.set("result_name", "counted").unwrap();

    let out = run_query("SELECT count(*), sum(a) FROM t", &frames, &config).unwrap();
    assert_eq!("counted", out.name());
    assert_eq!(vec![Some(101)], column_ints(&out, 0));
    assert_eq!(vec![Some(5050)], column_ints(&out, 1));
}

#[test]
fn missing_table_is_an_error() {
    for mode in MODES {
        run_query("SELECT * FROM nope", &[ints("t", &[1])], &config(mode)).unwrap_err();
    }
}

#[test]
fn config_from_json() {
    let config = QueryConfig::from_json(r#"{"storage_mode": "pushdown", "result_name": "out"}"#)
        .unwrap();
    let out = run_query("SELECT a FROM t WHERE a >= 2", &[ints("t", &[1, 2, 3])], &config).unwrap();
    assert_eq!("out", out.name());
    assert_eq!(vec![Some(2), Some(3)], column_ints(&out, 0));
}
