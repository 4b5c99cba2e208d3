//! Session tests against the in-process mock engine.
//!
//! These exercise the flat API end to end: literal emission, the existence
//! fence, reply decoding, the registry, temp files and shutdown.

use std::path::Path;

use rbridge_kernel::{BridgeConfig, BridgeError, Matrix, Scalar, ShapeError, StateError, ValueType};
use rbridge_testutil::{mock_session, mock_session_with};
use rstest::rstest;

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

// ============================================================================
// Scalar Round Trips
// ============================================================================

#[rstest]
#[case::one(1.0)]
#[case::fraction(0.1)]
#[case::third(1.0 / 3.0)]
#[case::negative(-2.5)]
#[case::huge(1e300)]
#[case::tiny(-2.5e-8)]
#[case::zero(0.0)]
#[case::nan(f64::NAN)]
#[case::pos_inf(f64::INFINITY)]
#[case::neg_inf(f64::NEG_INFINITY)]
fn double_round_trip(#[case] value: f64) {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("x", value).unwrap();
    let back = session.get_scalar("x").unwrap();
    assert!(back.same_value(&Scalar::Double(value)), "{value:?} came back as {back:?}");
}

#[rstest]
#[case::i32_max(i32::MAX as i64)]
#[case::above_i32(i32::MAX as i64 + 1)]
#[case::i32_min(i32::MIN as i64)]
#[case::below_i32(i32::MIN as i64 - 1)]
#[case::zero(0)]
#[case::large(3_000_000_000_000)]
fn long_round_trip(#[case] value: i64) {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("n", value).unwrap();
    assert_eq!(session.get_scalar("n").unwrap(), Scalar::Long(value));
}

#[rstest]
#[case(true)]
#[case(false)]
fn bool_round_trip(#[case] value: bool) {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("flag", value).unwrap();
    assert_eq!(session.get_scalar("flag").unwrap(), Scalar::Bool(value));
}

#[test]
fn set_scalar_emits_statement_then_fence() {
    let (session, engine) = mock_session().unwrap();
    let before = engine.command_count();
    let var = session.set_scalar("x", 2147483648i64).unwrap();
    assert_eq!(var.ty, ValueType::Long);
    insta::assert_snapshot!(engine.script_since(before), @r#"
    x<-(as.double(2147483648));
    exists("x");
    "#);
}

// ============================================================================
// Matrix Round Trips
// ============================================================================

#[test]
fn small_matrix_round_trip_is_inline() {
    let (session, engine) = mock_session().unwrap();
    let m = Matrix::from_fn(3, 3, |r, c| r as f64 * 3.0 + c as f64 + 0.5).unwrap();
    let before = engine.command_count();

    session.set_matrix("m", &m, false).unwrap();
    assert!(engine.commands()[before].starts_with("m<-(matrix(c(0.5,3.5,6.5,"));
    assert_eq!(files_in(session.temp_dir()), 0);

    assert_eq!(session.get_matrix("m").unwrap(), m);
    assert_eq!(session.variable_type("m"), Some(ValueType::Matrix));
}

#[test]
fn large_matrix_round_trip_spools_and_cleans_up() {
    let (session, engine) = mock_session().unwrap();
    let m = Matrix::from_fn(10, 10, |r, c| (r * 10 + c) as f64).unwrap().with_integer(true);
    let temp = session.temp_dir().to_path_buf();
    let before = engine.command_count();

    session.set_matrix("big", &m, false).unwrap();
    let commands = engine.commands();
    let sent = &commands[before];
    assert!(sent.contains("scan(\""), "{sent}");
    assert!(sent.ends_with(",n=100,quiet=TRUE),nrow=10,ncol=10,byrow=FALSE));"), "{sent}");
    // Purged as soon as the assignment closed
    assert_eq!(files_in(&temp), 0);

    let back = session.get_matrix("big").unwrap();
    assert_eq!(back, m);
    assert!(back.is_integer());

    session.close().unwrap();
    assert!(!temp.exists());
}

#[test]
fn vector_comes_back_as_column() {
    let (session, _engine) = mock_session().unwrap();
    let v = Matrix::row(vec![1.0, f64::NAN, f64::INFINITY, -4.0]);
    let var = session.set_matrix("v", &v, true).unwrap();
    assert_eq!(var.ty, ValueType::Vector);
    assert_eq!(
        session.get_matrix("v").unwrap(),
        Matrix::column(vec![1.0, f64::NAN, f64::INFINITY, -4.0])
    );
}

#[test]
fn vector_shape_is_checked_before_sending() {
    let (session, engine) = mock_session().unwrap();
    let before = engine.command_count();
    let err = session
        .set_matrix("v", &Matrix::from_fn(2, 2, |_, _| 1.0).unwrap(), true)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Shape(_)));
    assert_eq!(engine.command_count(), before);
    assert!(!session.is_busy());
}

#[test]
fn empty_dimension_matrix_is_rejected_before_sending() {
    let (session, engine) = mock_session().unwrap();
    let before = engine.command_count();
    let flat = Matrix::new(0, 3, vec![]).unwrap();

    let err = session.set_matrix("e", &flat, false).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Shape(ShapeError::EmptyDimension { rows: 0, cols: 3 })
    ));
    assert_eq!(engine.command_count(), before);
    assert_eq!(session.variable_type("e"), None);
    assert!(!session.is_busy());

    let none = Matrix::new(0, 0, vec![]).unwrap();
    session.set_matrix("e", &none, false).unwrap();
    assert_eq!(session.get_matrix("e").unwrap(), none);
}

#[test]
fn spool_threshold_comes_from_config() {
    let config = BridgeConfig::default().with_spool_threshold(4);
    let (session, engine) = mock_session_with(&config).unwrap();
    let before = engine.command_count();

    session.set_matrix("v", &Matrix::row(vec![1.0; 5]), true).unwrap();
    assert!(engine.commands()[before].starts_with("v<-(scan("));
    assert_eq!(files_in(session.temp_dir()), 0);
}

// ============================================================================
// Registry Consistency
// ============================================================================

#[test]
fn scalar_read_of_vector_is_state_failure() {
    let (session, engine) = mock_session().unwrap();
    session.set_matrix("v", &Matrix::column(vec![1.0, 2.0]), true).unwrap();
    let before = engine.command_count();

    let err = session.get_scalar("v").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::State(StateError::TypeMismatch {
            expected: "scalar",
            actual: ValueType::Vector,
            ..
        })
    ));
    // Rejected without a round trip
    assert_eq!(engine.command_count(), before);
}

#[test]
fn matrix_read_of_scalar_is_state_failure() {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("x", 1.5).unwrap();
    let err = session.get_matrix("x").unwrap_err();
    assert!(err.is_state_failure());
}

#[test]
fn dispose_unbinds() {
    let (session, engine) = mock_session().unwrap();
    session.set_scalar("x", 1.0).unwrap();
    assert!(engine.has_variable("x"));

    session.dispose("x").unwrap();
    assert!(!engine.has_variable("x"));
    assert!(session.variables().iter().all(|v| v.name != "x"));
    assert!(matches!(
        session.get_scalar("x").unwrap_err(),
        BridgeError::NotBound(name) if name == "x"
    ));
    // Fire and forget: no fence after rm
    assert_eq!(engine.commands().last().map(String::as_str), Some("rm(\"x\");"));
}

#[test]
fn reassignment_changes_type() {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("x", true).unwrap();
    session.set_matrix("x", &Matrix::column(vec![1.0, 2.0]), true).unwrap();
    assert_eq!(session.variable_type("x"), Some(ValueType::Vector));
}

#[test]
fn fresh_variables_are_unique_and_unbound() {
    let (session, _engine) = mock_session().unwrap();
    let a = session.fresh_variable().unwrap();
    let b = session.fresh_variable().unwrap();
    assert_ne!(a.name, b.name);
    assert_eq!(a.ty, ValueType::Unknown);
    assert!(matches!(session.get_scalar(&a.name), Err(BridgeError::NotBound(_))));

    session.set_scalar(&a.name, 7).unwrap();
    assert_eq!(session.variable_type(&a.name), Some(ValueType::Long));
}

#[test]
fn invalid_names_never_reach_the_engine() {
    let (session, engine) = mock_session().unwrap();
    let before = engine.command_count();
    for name in ["1x", "a b", "x);q(", "TRUE"] {
        assert!(matches!(
            session.set_scalar(name, 1.0),
            Err(BridgeError::InvalidName(_))
        ));
    }
    assert_eq!(engine.command_count(), before);
}

#[test]
fn variables_lists_registry_sorted() {
    let (session, _engine) = mock_session().unwrap();
    session.set_scalar("b", 1.0).unwrap();
    session.set_scalar("a", true).unwrap();
    let names: Vec<_> = session.variables().into_iter().map(|v| (v.name, v.ty)).collect();
    assert_eq!(
        names,
        vec![
            ("a".to_string(), ValueType::Boolean),
            ("b".to_string(), ValueType::Double)
        ]
    );
}

// ============================================================================
// Scripts
// ============================================================================

#[test]
fn execute_returns_output_before_marker() {
    let (session, engine) = mock_session().unwrap();
    let before = engine.command_count();
    let lines = session.execute("cat(1);cat('\\n');print(2);").unwrap();
    assert_eq!(lines, vec!["1", "[1] 2"]);
    insta::assert_snapshot!(engine.script_since(before), @r#"
    cat(1);cat('\n');print(2);
    print("--rbridge-end--");
    "#);
}

#[test]
fn init_script_runs_on_start() {
    let (_session, engine) = mock_session().unwrap();
    assert_eq!(
        engine.commands(),
        vec!["options(digits=17);", "print(\"--rbridge-end--\");"]
    );
}

#[test]
fn failed_binding_is_rejected() {
    let (session, engine) = mock_session().unwrap();
    let mut assignment = session.assign("x").unwrap();
    {
        let mut expression = assignment.expression().unwrap();
        expression.raw("undefined_thing", ValueType::Double).unwrap();
        expression.close().unwrap();
    }
    let err = assignment.close().unwrap_err();
    assert!(matches!(err, BridgeError::Rejected(ref name) if name == "x"));
    assert_eq!(session.variable_type("x"), None);
    assert_eq!(engine.errors().len(), 1);
    // The session is still usable
    session.set_scalar("y", 1.0).unwrap();
}

// ============================================================================
// Failures and Shutdown
// ============================================================================

#[test]
fn broken_pipe_closes_session() {
    let (session, engine) = mock_session().unwrap();
    session.set_scalar("x", 1.0).unwrap();
    engine.break_pipe();

    let err = session.get_scalar("x").unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert!(matches!(err, BridgeError::Io { .. }));
    assert!(session.is_closed());
    assert!(matches!(session.set_scalar("y", 2.0), Err(BridgeError::Closed)));
}

#[test]
fn close_quits_and_removes_temp_dir() {
    let (session, engine) = mock_session().unwrap();
    let temp = session.temp_dir().to_path_buf();
    assert!(temp.is_dir());

    session.close().unwrap();
    assert!(engine.quit_received());
    assert!(engine.finished());
    assert!(!temp.exists());
    assert_eq!(engine.commands().last().map(String::as_str), Some("q();"));

    // Idempotent, and everything else fails fast
    session.close().unwrap();
    assert!(matches!(session.get_scalar("x"), Err(BridgeError::Closed)));
    assert!(matches!(session.execute("1"), Err(BridgeError::Closed)));
}

#[test]
fn close_reports_removed_temp_dir_once() {
    let (session, engine) = mock_session().unwrap();
    std::fs::remove_dir_all(session.temp_dir()).unwrap();

    let err = session.close().unwrap_err();
    let BridgeError::Shutdown(shutdown) = err else {
        panic!("expected a shutdown error, got {err:?}");
    };
    assert_eq!(shutdown.failures.len(), 1, "{shutdown}");
    // The engine was still told to quit and reaped
    assert!(engine.quit_received());
    assert!(engine.finished());
}

#[test]
fn vanished_spool_file_is_a_cleanup_failure_after_binding() {
    let (session, engine) = mock_session().unwrap();
    engine.unlink_scanned_files();
    let big = Matrix::from_fn(5, 5, |r, c| (r * 5 + c) as f64).unwrap();

    let mut assignment = session.assign("big").unwrap();
    {
        let mut expression = assignment.expression().unwrap();
        expression.matrix(&big).unwrap();
        expression.close().unwrap();
    }
    assert_eq!(files_in(session.temp_dir()), 1);
    let err = assignment.close().unwrap_err();
    assert_eq!(files_in(session.temp_dir()), 0);
    let BridgeError::Cleanup(cleanup) = err else {
        panic!("expected a cleanup error, got {err:?}");
    };
    assert_eq!(cleanup.failures.len(), 1, "{cleanup}");
    assert_eq!(
        cleanup.failures[0].1.kind(),
        std::io::ErrorKind::NotFound
    );

    // The binding went through before the purge failed
    assert_eq!(session.variable_type("big"), Some(ValueType::Matrix));
    assert!(engine.has_variable("big"));
    assert!(!session.is_busy());
    assert_eq!(session.get_matrix("big").unwrap(), big);

    session.close().unwrap();
    assert!(engine.quit_received());
    assert!(engine.finished());
}

#[test]
fn close_after_broken_pipe_still_reaps() {
    let (session, engine) = mock_session().unwrap();
    engine.break_pipe();
    assert!(session.execute("1").unwrap_err().is_fatal());

    let err = session.close().unwrap_err();
    assert!(matches!(err, BridgeError::Shutdown(_)));
    assert!(engine.finished());
    assert!(!engine.quit_received());
}

#[test]
fn drop_closes_session() {
    let (session, engine) = mock_session().unwrap();
    let temp = session.temp_dir().to_path_buf();
    drop(session);
    assert!(engine.quit_received());
    assert!(!temp.exists());
}
